/// Errors from usage store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A persisted log line could not be split into a state prefix and a name.
    #[error("malformed store line {line}: {content:?}")]
    Parse { line: usize, content: String },

    /// A session option string was malformed or named an unknown key.
    #[error("invalid session option: {0}")]
    InvalidOption(String),

    /// I/O error reading or writing the persisted log.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
