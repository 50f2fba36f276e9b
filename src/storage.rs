use std::{io, path::PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

/// Where post files come from.
///
/// The repository only talks to this trait so tests (or a database-backed
/// store) can stand in for the filesystem.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Names of the regular files available, without any directory prefix.
    async fn list(&self) -> io::Result<Vec<String>>;

    /// Full contents of one file. A missing file is `io::ErrorKind::NotFound`.
    async fn read(&self, file_name: &str) -> io::Result<String>;

    /// Human-readable location of a file, for error messages.
    fn location(&self, file_name: &str) -> String;
}

/// Posts stored as files in a single directory.
#[derive(Debug, Clone)]
pub struct FsPostSource {
    dir: PathBuf,
}

impl FsPostSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl PostSource for FsPostSource {
    async fn list(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => warn!("Skipping non UTF-8 file name: {:?}", name),
            }
        }
        Ok(names)
    }

    async fn read(&self, file_name: &str) -> io::Result<String> {
        fs::read_to_string(self.dir.join(file_name)).await
    }

    fn location(&self, file_name: &str) -> String {
        self.dir.join(file_name).display().to_string()
    }
}
