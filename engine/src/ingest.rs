//! Per-image ingest: dimensions, embedding, and both category labels.

use std::sync::Arc;

use shoebox_clip::{Classifier, ClipModel, DecodeCache, Encoder, TtaConfig, Vocabulary};

use crate::codec::embedding_to_bytes;
use crate::types::IngestedImage;
use crate::EngineError;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Derives everything the core owes storage for one uploaded image.
///
/// The encoder and classifier share one decode cache, so classifying and
/// embedding the same bytes decodes them once. A failed ingest rejects
/// that single image; it has no effect on other uploads.
pub struct Ingest {
    encoder: Encoder,
    classifier: Classifier,
    subjects: Vocabulary,
    backgrounds: Vocabulary,
}

impl Ingest {
    /// Ingest pipeline with the built-in vocabularies.
    pub fn new(model: Arc<dyn ClipModel>, tta: TtaConfig) -> Self {
        Self::with_vocabularies(model, tta, Vocabulary::subjects(), Vocabulary::backgrounds())
    }

    pub fn with_vocabularies(
        model: Arc<dyn ClipModel>,
        tta: TtaConfig,
        subjects: Vocabulary,
        backgrounds: Vocabulary,
    ) -> Self {
        let cache = Arc::new(DecodeCache::default());
        Self {
            encoder: Encoder::new(Arc::clone(&model), Arc::clone(&cache), tta),
            classifier: Classifier::new(model, cache, tta),
            subjects,
            backgrounds,
        }
    }

    /// Processes one upload. Blocking; async callers use
    /// [`Ingest::process_offloaded`].
    pub fn process(&self, bytes: &[u8], content_type: &str) -> Result<IngestedImage, EngineError> {
        let (width, height) = self.encoder.dimensions(bytes)?;
        let embedding = self.encoder.encode(bytes)?;
        let object_category = self.classifier.classify(bytes, &self.subjects)?;
        let background_category = self.classifier.classify(bytes, &self.backgrounds)?;

        tracing::debug!(
            width,
            height,
            subject = %object_category,
            background = %background_category,
            "ingested image"
        );

        Ok(IngestedImage {
            width,
            height,
            embedding: embedding_to_bytes(&embedding),
            object_category,
            background_category,
            content_type: if content_type.is_empty() {
                DEFAULT_CONTENT_TYPE.to_string()
            } else {
                content_type.to_string()
            },
            size_bytes: bytes.len(),
        })
    }

    /// Runs [`Ingest::process`] on the blocking pool so model inference
    /// never occupies an async dispatch thread.
    pub async fn process_offloaded(
        self: &Arc<Self>,
        bytes: Vec<u8>,
        content_type: String,
    ) -> Result<IngestedImage, EngineError> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.process(&bytes, &content_type))
            .await
            .map_err(|e| EngineError::Offload(e.to_string()))?
    }
}
