use thiserror::Error;

/// Failures surfaced by [`crate::posts::PostRepository`].
#[derive(Debug, Error)]
pub enum PostError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Post not found: {slug}")]
    NotFound { slug: String },

    #[error("Invalid post attributes: {path}: {reason}")]
    Validation { path: String, reason: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
