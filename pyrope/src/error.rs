//! Error types shared by the pyrope crates.

use thiserror::Error;

/// Result type alias using pyrope's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pyrope operations.
///
/// Nothing is retried or recovered locally: every kernel and I/O
/// failure propagates unchanged to the caller of `forward_decode`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed safetensors container: {0}")]
    MalformedContainer(String),

    #[error("tensor not found: {0}")]
    TensorNotFound(String),

    #[error("unsupported dtype: {0}")]
    UnsupportedDtype(String),

    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("index out of range: {0}")]
    OutOfRange(String),

    #[error("invalid model config: {0}")]
    Config(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}
