//! Error type shared by every stage of the estimation pipeline.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VntrError>;

#[derive(Debug, Error)]
pub enum VntrError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Empty alignment, rows of unequal length, or no usable column.
    #[error("malformed alignment: {0}")]
    InputShape(String),

    #[error("symbol {:?} at position {position} is outside the alphabet", *symbol as char)]
    Alphabet { symbol: u8, position: usize },

    #[error("cannot decode an empty sequence")]
    EmptySequence,

    #[error("malformed cached model: {0}")]
    ModelCache(String),

    /// The state graph breaks an invariant the decoder depends on.
    #[error("invalid model: {0}")]
    Model(String),

    #[error("external tool failed: {0}")]
    ExternalTool(String),

    #[error("malformed SAM record: {0}")]
    Sam(String),
}
