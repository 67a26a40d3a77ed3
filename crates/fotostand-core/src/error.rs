use thiserror::Error;

/// Errors produced by the gallery core.
#[derive(Error, Debug)]
pub enum GalleryError {
    /// A gallery id or filename failed the path-safety guard.
    #[error("Invalid path segment: {0:?}")]
    InvalidPath(String),

    /// A gallery with this id is already on disk.
    #[error("Gallery already exists: {0}")]
    AlreadyExists(String),

    /// The gallery or the requested file does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Unauthorized")]
    Unauthorized,

    /// Uploads were attempted but no token hash is configured.
    #[error("Upload not configured")]
    NotConfigured,

    /// The multipart form carried no `file` field.
    #[error("No file provided")]
    MissingFile,

    /// Random allocation hit only existing galleries for every attempt.
    #[error("Could not allocate a free gallery id after {0} attempts")]
    AllocationExhausted(usize),

    #[error("Word list error: {0}")]
    WordList(String),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Filesystem failure other than not-found.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GalleryError>;
