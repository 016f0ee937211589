use thiserror::Error;

/// Errors returned by encoding and classification operations.
#[derive(Debug, Error)]
pub enum ClipError {
    /// Image bytes could not be decoded into an RGB raster. Not retried;
    /// surfaced to the caller as-is.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// Model weights or tokenizer failed to load. Fatal for the process;
    /// there is no per-request recovery.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Inference itself failed after a successful load.
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
