use thiserror::Error;

pub type Result<T> = std::result::Result<T, FeatherError>;

#[derive(Debug, Error)]
pub enum FeatherError {
    /// Dimension zero at create/open
    #[error("Invalid dimension: must be greater than zero")]
    InvalidDimension,

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector not found: {0}")]
    NotFound(u64),

    #[error("Invalid k: at least one neighbor must be requested")]
    InvalidK,

    /// Only raised under `DuplicatePolicy::Reject`
    #[error("Duplicate id: {0}")]
    DuplicateId(u64),

    #[error("Corrupt store: {0}")]
    CorruptStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Poisoned lock")]
    LockPoisoned,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl FeatherError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        FeatherError::CorruptStore(msg.into())
    }
}
