/// Errors from walking or rewriting a container.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Source container unreadable or sink write failure. Fatal.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The container (or a nested container) is not a valid archive. Fatal.
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A scratch extraction file could not be created or written. Fatal only
    /// for the entry being processed.
    #[error("scratch file for {entry}: {source}")]
    Scratch {
        entry: String,
        source: std::io::Error,
    },
}

/// Result alias for walk/rewrite operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// A single class's transform step failed. The rewriter recovers by keeping
/// the original bytes for that entry.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// The class bytes could not be understood.
    #[error("malformed class file: {0}")]
    Malformed(String),

    /// The init hook could not splice the payload.
    #[error("init hook injection failed: {0}")]
    Inject(String),
}

/// Result alias for per-class transforms.
pub type TransformResult<T> = Result<T, TransformError>;
