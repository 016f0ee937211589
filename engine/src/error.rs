use thiserror::Error;

use shoebox_clip::ClipError;

/// Errors returned by ingest and cluster-query operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Decode, model-load or inference failure, propagated unmodified.
    #[error(transparent)]
    Clip(#[from] ClipError),

    /// A stored embedding blob is not a whole number of little-endian f32
    /// values.
    #[error("malformed embedding: byte length {0} is not a multiple of 4")]
    BadEmbedding(usize),

    /// A blocking-pool task failed to complete.
    #[error("offloaded task failed: {0}")]
    Offload(String),
}
