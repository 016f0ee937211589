//! Embedding byte serialization.
//!
//! Embeddings are stored as flat little-endian f32 byte sequences,
//! matching the layout storage backends persist alongside each image.

use crate::EngineError;

/// Serializes an embedding as little-endian f32 bytes.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(embedding.len() * 4);
    for &v in embedding {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Parses a little-endian f32 byte sequence back into an embedding.
pub fn embedding_from_bytes(bytes: &[u8]) -> Result<Vec<f32>, EngineError> {
    if bytes.len() % 4 != 0 {
        return Err(EngineError::BadEmbedding(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
