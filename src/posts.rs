use std::{cmp::Ordering, io, path::PathBuf, sync::Arc};

use futures::future::join_all;
use gray_matter::{engine::YAML, Matter};
use tracing::{debug, warn};

use crate::error::PostError;
use crate::markdown::render_markdown_to_html;
use crate::models::{FrontMatter, PostHtml, PostMarkdown, PostMeta};
use crate::storage::{FsPostSource, PostSource};

pub const POST_EXTENSION: &str = "md";

/// Read-only view over a directory of markdown posts.
///
/// Nothing is cached: every call lists and reads the source again, so edits
/// show up on the next request.
#[derive(Clone)]
pub struct PostRepository {
    source: Arc<dyn PostSource>,
}

impl PostRepository {
    pub fn new(source: Arc<dyn PostSource>) -> Self {
        Self { source }
    }

    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FsPostSource::new(dir)))
    }

    /// Metadata of every post, newest first.
    ///
    /// Fails as a whole on the first invalid file (in file name order); no
    /// partial list is ever returned.
    pub async fn list_summaries(&self) -> Result<Vec<PostMeta>, PostError> {
        let listing = self.source.list().await.map_err(|source| PostError::Io {
            path: self.source.location(""),
            source,
        })?;

        let mut names: Vec<String> = listing
            .into_iter()
            .filter(|name| {
                let is_post = slug_from_file_name(name).is_some();
                if !is_post {
                    debug!("Ignoring non-post file: {}", name);
                }
                is_post
            })
            .collect();
        names.sort();

        let loaded = join_all(names.iter().map(|name| self.load_summary(name))).await;
        let mut posts = loaded.into_iter().collect::<Result<Vec<_>, _>>()?;
        sort_newest_first(&mut posts);

        debug!("Listed {} posts", posts.len());
        Ok(posts)
    }

    /// One post with its body rendered to HTML.
    pub async fn get_html(&self, slug: &str) -> Result<PostHtml, PostError> {
        let (meta, markdown) = self.load(slug).await?;
        let html = render_markdown_to_html(&markdown);
        Ok(PostHtml { meta, html })
    }

    /// One post with its body left as markdown, byte for byte as it follows
    /// the closing front-matter delimiter.
    pub async fn get_markdown(&self, slug: &str) -> Result<PostMarkdown, PostError> {
        let (meta, markdown) = self.load(slug).await?;
        Ok(PostMarkdown { meta, markdown })
    }

    async fn load(&self, slug: &str) -> Result<(PostMeta, String), PostError> {
        check_slug(slug)?;

        let file_name = format!("{slug}.{POST_EXTENSION}");
        let location = self.source.location(&file_name);
        debug!("Loading post {}", location);

        let contents = self
            .source
            .read(&file_name)
            .await
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => PostError::NotFound {
                    slug: slug.to_string(),
                },
                _ => PostError::Io {
                    path: location.clone(),
                    source,
                },
            })?;

        parse_post(slug, &location, &contents)
    }

    async fn load_summary(&self, file_name: &str) -> Result<PostMeta, PostError> {
        let location = self.source.location(file_name);
        let slug = slug_from_file_name(file_name).unwrap_or(file_name);

        let contents = self
            .source
            .read(file_name)
            .await
            .map_err(|source| PostError::Io {
                path: location.clone(),
                source,
            })?;

        parse_post(slug, &location, &contents).map(|(meta, _)| meta)
    }
}

fn slug_from_file_name(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(POST_EXTENSION)
        .and_then(|stem| stem.strip_suffix('.'))
        .filter(|slug| !slug.is_empty() && !slug.starts_with('.'))
}

fn check_slug(slug: &str) -> Result<(), PostError> {
    if slug.is_empty() {
        return Err(PostError::InvalidArgument("slug is required".to_string()));
    }
    if slug.contains(['/', '\\']) || slug.starts_with('.') || slug.chars().any(char::is_control) {
        warn!("Rejected slug {:?}", slug);
        return Err(PostError::InvalidArgument(format!(
            "slug must be a plain file name: {slug:?}"
        )));
    }
    Ok(())
}

fn parse_post(slug: &str, location: &str, contents: &str) -> Result<(PostMeta, String), PostError> {
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);

    let matter = Matter::<YAML>::new();
    let parsed = matter
        .parse::<FrontMatter>(contents)
        .map_err(|e| PostError::Validation {
            path: location.to_string(),
            reason: format!("malformed front matter: {e}"),
        })?;

    let meta = validate(slug, location, parsed.data.unwrap_or_default())?;
    let body = raw_body(contents).map_or(parsed.content, str::to_string);
    Ok((meta, body))
}

/// The text after the closing `---` line, untrimmed. `None` when the file
/// does not open with a front-matter block.
fn raw_body(contents: &str) -> Option<&str> {
    let mut lines = contents.split_inclusive('\n');
    let opening = lines.next()?;
    if opening.trim_end() != "---" {
        return None;
    }

    let mut offset = opening.len();
    for line in lines {
        offset += line.len();
        if line.trim_end() == "---" {
            return Some(&contents[offset..]);
        }
    }
    None
}

fn validate(slug: &str, location: &str, front_matter: FrontMatter) -> Result<PostMeta, PostError> {
    let title = front_matter
        .title
        .filter(|title| !title.trim().is_empty())
        .ok_or_else(|| PostError::Validation {
            path: location.to_string(),
            reason: "missing required `title`".to_string(),
        })?;

    Ok(PostMeta {
        title,
        slug: slug.to_string(),
        description: front_matter.description.unwrap_or_default(),
        created_at: front_matter.created_at.unwrap_or_default(),
        updated_at: front_matter.updated_at,
        is_show: front_matter.is_show.unwrap_or(true),
    })
}

/// Newest `createdAt` first, undated posts last, equal dates by slug.
fn sort_newest_first(posts: &mut [PostMeta]) {
    posts.sort_by(newest_first);
}

fn newest_first(a: &PostMeta, b: &PostMeta) -> Ordering {
    let by_date = match (a.created_date(), b.created_date()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_date.then_with(|| a.slug.cmp(&b.slug))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashMap,
        fs,
        sync::atomic::{AtomicUsize, Ordering as AtomicOrdering},
    };

    use async_trait::async_trait;
    use scraper::{Html, Selector};
    use tempfile::TempDir;

    fn post(title: &str, created_at: &str) -> String {
        format!("---\ntitle: {title}\ndescription: About {title}\ncreatedAt: {created_at}\n---\nBody of {title}\n")
    }

    fn posts_dir(files: &[(&str, String)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            fs::write(dir.path().join(name), contents).unwrap();
        }
        dir
    }

    /// Serves files from memory and counts every storage call.
    #[derive(Default)]
    struct RecordingSource {
        files: HashMap<String, io::Result<String>>,
        calls: AtomicUsize,
    }

    impl RecordingSource {
        fn with_error(name: &str, kind: io::ErrorKind) -> Self {
            let mut files = HashMap::new();
            files.insert(name.to_string(), Err(io::Error::from(kind)));
            Self {
                files,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(AtomicOrdering::SeqCst)
        }
    }

    #[async_trait]
    impl PostSource for RecordingSource {
        async fn list(&self) -> io::Result<Vec<String>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(self.files.keys().cloned().collect())
        }

        async fn read(&self, file_name: &str) -> io::Result<String> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            match self.files.get(file_name) {
                Some(Ok(contents)) => Ok(contents.clone()),
                Some(Err(e)) => Err(io::Error::from(e.kind())),
                None => Err(io::Error::from(io::ErrorKind::NotFound)),
            }
        }

        fn location(&self, file_name: &str) -> String {
            format!("memory://{file_name}")
        }
    }

    #[tokio::test]
    async fn lists_one_summary_per_post_with_slug_from_file_name() {
        let dir = posts_dir(&[
            ("first-post.md", post("First", "2023-01-01")),
            ("second.md", post("Second", "2023-02-01")),
            ("third-one.md", post("Third", "2023-03-01")),
        ]);
        let repo = PostRepository::from_dir(dir.path());

        let posts = repo.list_summaries().await.unwrap();
        assert_eq!(posts.len(), 3);
        let mut slugs: Vec<_> = posts.iter().map(|p| p.slug.as_str()).collect();
        slugs.sort();
        assert_eq!(slugs, vec!["first-post", "second", "third-one"]);
    }

    #[tokio::test]
    async fn summaries_are_sorted_newest_first() {
        let dir = posts_dir(&[
            ("a.md", post("A", "2021-06-01")),
            ("b.md", post("B", "2023-01-01T09:00:00")),
            ("c.md", post("C", "2022-12-31")),
            ("d.md", post("D", "2023-01-01")),
        ]);
        let repo = PostRepository::from_dir(dir.path());

        let posts = repo.list_summaries().await.unwrap();
        let slugs: Vec<_> = posts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["b", "d", "c", "a"]);
        for pair in posts.windows(2) {
            assert!(pair[0].created_date() >= pair[1].created_date());
        }
    }

    #[tokio::test]
    async fn equal_dates_break_ties_by_slug_and_undated_posts_go_last() {
        let dir = posts_dir(&[
            ("zeta.md", post("Zeta", "2023-05-05")),
            ("alpha.md", post("Alpha", "2023-05-05")),
            ("undated.md", "---\ntitle: Undated\n---\nbody".to_string()),
            ("garbled.md", post("Garbled", "someday")),
        ]);
        let repo = PostRepository::from_dir(dir.path());

        let posts = repo.list_summaries().await.unwrap();
        let slugs: Vec<_> = posts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["alpha", "zeta", "garbled", "undated"]);
    }

    #[tokio::test]
    async fn ignores_files_that_are_not_posts() {
        let dir = posts_dir(&[
            ("real.md", post("Real", "2023-01-01")),
            ("notes.txt", "no front matter".to_string()),
            (".hidden.md", "not a post".to_string()),
            ("real.md~", "editor backup".to_string()),
        ]);
        let repo = PostRepository::from_dir(dir.path());

        let posts = repo.list_summaries().await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].slug, "real");
    }

    #[tokio::test]
    async fn missing_title_fails_the_whole_listing() {
        let dir = posts_dir(&[
            ("good.md", post("Good", "2023-01-01")),
            ("bad.md", "---\ndescription: no title here\ncreatedAt: 2023-01-02\n---\nbody".to_string()),
        ]);
        let repo = PostRepository::from_dir(dir.path());

        let result = repo.list_summaries().await;
        match result {
            Err(PostError::Validation { path, .. }) => assert!(path.ends_with("bad.md")),
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn listing_reports_the_first_invalid_file_by_name() {
        let dir = posts_dir(&[
            ("b-broken.md", "---\ntitle: ''\n---\n".to_string()),
            ("a-broken.md", "---\ndescription: x\n---\n".to_string()),
            ("c-fine.md", post("Fine", "2023-01-01")),
        ]);
        let repo = PostRepository::from_dir(dir.path());

        for _ in 0..3 {
            match repo.list_summaries().await {
                Err(PostError::Validation { path, .. }) => assert!(path.ends_with("a-broken.md")),
                other => panic!("expected a validation error, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn renders_a_post_to_html() {
        let dir = posts_dir(&[(
            "hello-world.md",
            "---\ntitle: Hello World\ndescription: A test\ncreatedAt: 2023-01-01\n---\n# Hi\n\nThere".to_string(),
        )]);
        let repo = PostRepository::from_dir(dir.path());

        let post = repo.get_html("hello-world").await.unwrap();
        assert_eq!(post.meta.title, "Hello World");
        assert_eq!(post.meta.slug, "hello-world");
        assert_eq!(post.meta.description, "A test");
        assert_eq!(post.meta.created_at, "2023-01-01");

        let document = Html::parse_fragment(&post.html);
        let h1 = Selector::parse("h1").unwrap();
        let p = Selector::parse("p").unwrap();
        let heading: String = document.select(&h1).next().unwrap().text().collect();
        let paragraph: String = document.select(&p).next().unwrap().text().collect();
        assert_eq!(heading, "Hi");
        assert_eq!(paragraph, "There");
    }

    #[tokio::test]
    async fn html_and_markdown_share_metadata() {
        let dir = posts_dir(&[(
            "same.md",
            "---\ntitle: Same\ndescription: Twice\ncreatedAt: 2023-04-01\nupdatedAt: 2023-04-02\nisShow: false\n---\n*body*\n".to_string(),
        )]);
        let repo = PostRepository::from_dir(dir.path());

        let html = repo.get_html("same").await.unwrap();
        let markdown = repo.get_markdown("same").await.unwrap();
        assert_eq!(html.meta, markdown.meta);
        assert_eq!(markdown.meta.updated_at.as_deref(), Some("2023-04-02"));
        assert!(!markdown.meta.is_show);
        assert!(markdown.markdown.contains("*body*"));
        assert!(html.html.contains("<em>body</em>"));
    }

    #[tokio::test]
    async fn optional_fields_fall_back_to_defaults() {
        let dir = posts_dir(&[("bare.md", "---\ntitle: Bare\n---\ntext".to_string())]);
        let repo = PostRepository::from_dir(dir.path());

        let post = repo.get_markdown("bare").await.unwrap();
        assert_eq!(post.meta.description, "");
        assert_eq!(post.meta.created_at, "");
        assert_eq!(post.meta.updated_at, None);
        assert!(post.meta.is_show);
    }

    #[tokio::test]
    async fn unknown_slug_is_not_found() {
        let dir = posts_dir(&[]);
        let repo = PostRepository::from_dir(dir.path());

        assert!(matches!(
            repo.get_html("missing").await,
            Err(PostError::NotFound { slug }) if slug == "missing"
        ));
        assert!(matches!(
            repo.get_markdown("missing").await,
            Err(PostError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn empty_slug_is_rejected_before_any_storage_access() {
        let source = Arc::new(RecordingSource::default());
        let repo = PostRepository::new(source.clone());

        assert!(matches!(repo.get_html("").await, Err(PostError::InvalidArgument(_))));
        assert!(matches!(repo.get_markdown("").await, Err(PostError::InvalidArgument(_))));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn path_like_slugs_are_rejected() {
        let source = Arc::new(RecordingSource::default());
        let repo = PostRepository::new(source.clone());

        for slug in ["../secret", "a/b", "a\\b", ".env"] {
            assert!(matches!(repo.get_html(slug).await, Err(PostError::InvalidArgument(_))));
        }
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn read_failures_other_than_missing_are_io_errors() {
        let source = Arc::new(RecordingSource::with_error(
            "locked.md",
            io::ErrorKind::PermissionDenied,
        ));
        let repo = PostRepository::new(source.clone());

        match repo.get_html("locked").await {
            Err(PostError::Io { path, source }) => {
                assert_eq!(path, "memory://locked.md");
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("expected an io error, got {other:?}"),
        }
        assert!(matches!(repo.list_summaries().await, Err(PostError::Io { .. })));
    }

    #[tokio::test]
    async fn missing_or_malformed_front_matter_is_a_validation_error() {
        let dir = posts_dir(&[
            ("plain.md", "# Just markdown\n".to_string()),
            ("typed.md", "---\ntitle: Typed\nisShow: sometimes\n---\nx".to_string()),
        ]);
        let repo = PostRepository::from_dir(dir.path());

        assert!(matches!(repo.get_html("plain").await, Err(PostError::Validation { .. })));
        assert!(matches!(repo.get_html("typed").await, Err(PostError::Validation { .. })));
    }

    #[tokio::test]
    async fn repeated_reads_are_identical() {
        let dir = posts_dir(&[
            ("one.md", post("One", "2023-01-01")),
            ("two.md", post("Two", "2023-01-02")),
        ]);
        let repo = PostRepository::from_dir(dir.path());

        assert_eq!(repo.list_summaries().await.unwrap(), repo.list_summaries().await.unwrap());
        assert_eq!(repo.get_html("one").await.unwrap(), repo.get_html("one").await.unwrap());
        assert_eq!(
            repo.get_markdown("two").await.unwrap(),
            repo.get_markdown("two").await.unwrap()
        );
    }

    #[tokio::test]
    async fn edits_are_visible_on_the_next_call() {
        let dir = posts_dir(&[("live.md", post("Before", "2023-01-01"))]);
        let repo = PostRepository::from_dir(dir.path());
        assert_eq!(repo.get_html("live").await.unwrap().meta.title, "Before");

        fs::write(dir.path().join("live.md"), post("After", "2023-01-01")).unwrap();
        fs::write(dir.path().join("new.md"), post("New", "2024-01-01")).unwrap();

        assert_eq!(repo.get_html("live").await.unwrap().meta.title, "After");
        assert_eq!(repo.list_summaries().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn byte_order_mark_before_front_matter_is_ignored() {
        let dir = posts_dir(&[
            ("bom.md", "\u{feff}---\ntitle: Bom\ncreatedAt: 2023-01-01\n---\n# Hi\n".to_string()),
            ("plain.md", post("Plain", "2022-01-01")),
        ]);
        let repo = PostRepository::from_dir(dir.path());

        let post = repo.get_html("bom").await.unwrap();
        assert_eq!(post.meta.title, "Bom");
        assert!(post.html.contains("<h1 id=\"hi\">Hi</h1>"));

        let posts = repo.list_summaries().await.unwrap();
        let slugs: Vec<_> = posts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["bom", "plain"]);
    }

    #[tokio::test]
    async fn numeric_scalars_are_read_as_text() {
        let dir = posts_dir(&[
            ("year.md", "---\ntitle: 2024\ncreatedAt: 2023\n---\nx".to_string()),
            ("novel.md", "---\ntitle: 1984\ndescription: 42\ncreatedAt: 2023-01-01\n---\ny".to_string()),
            ("blank.md", "---\ntitle: '  '\n---\nz".to_string()),
        ]);
        let repo = PostRepository::from_dir(dir.path());

        let year = repo.get_markdown("year").await.unwrap();
        assert_eq!(year.meta.title, "2024");
        assert_eq!(year.meta.created_at, "2023");

        let novel = repo.get_markdown("novel").await.unwrap();
        assert_eq!(novel.meta.title, "1984");
        assert_eq!(novel.meta.description, "42");

        assert!(matches!(repo.get_markdown("blank").await, Err(PostError::Validation { .. })));
    }

    #[tokio::test]
    async fn control_characters_in_slug_are_rejected() {
        let source = Arc::new(RecordingSource::default());
        let repo = PostRepository::new(source.clone());

        for slug in ["a\0b", "line\nbreak", "tab\there"] {
            assert!(matches!(repo.get_html(slug).await, Err(PostError::InvalidArgument(_))));
        }
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn markdown_body_is_kept_exactly() {
        let dir = posts_dir(&[
            ("crlf.md", "---\ntitle: Crlf\n---\n# Hi\r\n".to_string()),
            ("padded.md", "---\ntitle: Padded\n---\n\n  indented\n\n".to_string()),
        ]);
        let repo = PostRepository::from_dir(dir.path());

        assert_eq!(repo.get_markdown("crlf").await.unwrap().markdown, "# Hi\r\n");
        assert_eq!(repo.get_markdown("padded").await.unwrap().markdown, "\n  indented\n\n");
    }

    #[test]
    fn raw_body_needs_an_opening_and_closing_delimiter() {
        assert_eq!(raw_body("---\ntitle: a\n---\nbody"), Some("body"));
        assert_eq!(raw_body("---\ntitle: a\n---"), Some(""));
        assert_eq!(raw_body("# no front matter\n"), None);
        assert_eq!(raw_body("---\ntitle: never closed\n"), None);
    }
}
