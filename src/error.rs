use thiserror::Error;

/// Main error type for quarry operations
#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode failed at decoded offset {offset}: {reason}")]
    Decode { offset: u64, reason: String },

    #[error("invalid separator: {0}")]
    SeparatorCompile(String),

    #[error("unsupported encoding tag: {0}")]
    CodecUnsupported(String),

    #[error("storage error: {0}")]
    Storage(#[from] fjall::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("catalog is corrupt: {0}")]
    CatalogCorrupt(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid size: {0}")]
    InvalidSize(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for quarry operations
pub type Result<T> = std::result::Result<T, QuarryError>;

impl QuarryError {
    /// Build a decode error anchored at a decoded-stream offset.
    pub fn decode(offset: u64, reason: impl std::fmt::Display) -> Self {
        QuarryError::Decode {
            offset,
            reason: reason.to_string(),
        }
    }

    /// Whether this error came from cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QuarryError::Cancelled)
    }

    /// Whether an import failing with this error leaves a partially
    /// populated catalog that must be discarded and re-run.
    pub fn leaves_partial_catalog(&self) -> bool {
        matches!(
            self,
            QuarryError::Io(_)
                | QuarryError::Decode { .. }
                | QuarryError::Storage(_)
                | QuarryError::Cancelled
        )
    }
}
