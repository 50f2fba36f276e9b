use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_CONTENT_DIR: &str = "content";
const DEFAULT_PORT: u16 = 8080;
const SITE_CONFIG_FILE: &str = "blog.toml";

/// Site-wide settings read from `blog.toml`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SiteConfig {
    pub title: String,
    pub description: String,
    pub author: String,
    pub base_url: String,
    pub lang: String,
    /// chrono format string used for displayed dates.
    pub date_format: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Blog".to_string(),
            description: "Posts".to_string(),
            author: String::new(),
            base_url: String::new(),
            lang: "en".to_string(),
            date_format: "%Y-%m-%d".to_string(),
        }
    }
}

impl SiteConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub content_dir: PathBuf,
    pub posts_dir: PathBuf,
    pub port: u16,
    pub is_development: bool,
    pub site: SiteConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from a variable lookup, so tests need not
    /// touch the process environment.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let is_development = var("RUST_ENV").is_some_and(|v| v == "development");

        let content_dir = PathBuf::from(
            var("CONTENT_DIR").unwrap_or_else(|| DEFAULT_CONTENT_DIR.to_string()),
        );
        let posts_dir = var("POSTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| content_dir.join("posts"));

        let port = match var("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PORT must be a port number, got {raw:?}"))?,
            None => DEFAULT_PORT,
        };

        let site_path = content_dir.join(SITE_CONFIG_FILE);
        let site = if site_path.exists() {
            SiteConfig::load(&site_path)?
        } else {
            SiteConfig::default()
        };

        Ok(Self {
            content_dir,
            posts_dir,
            port,
            is_development,
            site,
        })
    }
}
