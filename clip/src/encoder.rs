//! Augmentation-averaged image embeddings.

use std::sync::Arc;

use image::RgbImage;

use crate::augment::Augmenter;
use crate::cache::DecodeCache;
use crate::model::ClipModel;
use crate::simil::l2_normalize;
use crate::ClipError;

/// Test-time augmentation policy shared by the encoder and classifier.
#[derive(Debug, Clone, Copy)]
pub struct TtaConfig {
    /// Whether perturbed views participate at all.
    pub enabled: bool,
    /// Total view count including the unaugmented view. Values of 1 or
    /// less behave like `enabled: false`.
    pub views: usize,
}

impl Default for TtaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            views: 3,
        }
    }
}

impl TtaConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            views: 1,
        }
    }

    fn effective_views(&self) -> usize {
        if self.enabled {
            self.views.max(1)
        } else {
            1
        }
    }
}

/// Turns raw image bytes into a single embedding vector.
///
/// Each view's embedding is L2-normalized before averaging so no single
/// view dominates through magnitude. With augmentation enabled the result
/// is the arithmetic mean of the normalized views and is intentionally not
/// re-normalized; with augmentation off the result is the single
/// unit-length view embedding.
pub struct Encoder {
    model: Arc<dyn ClipModel>,
    cache: Arc<DecodeCache>,
    augmenter: Augmenter,
    tta: TtaConfig,
}

impl Encoder {
    pub fn new(model: Arc<dyn ClipModel>, cache: Arc<DecodeCache>, tta: TtaConfig) -> Self {
        Self::with_augmenter(model, cache, tta, Augmenter::new())
    }

    /// Like [`Encoder::new`] but with caller-provided perturbation draws,
    /// for deterministic tests.
    pub fn with_augmenter(
        model: Arc<dyn ClipModel>,
        cache: Arc<DecodeCache>,
        tta: TtaConfig,
        augmenter: Augmenter,
    ) -> Self {
        Self {
            model,
            cache,
            augmenter,
            tta,
        }
    }

    /// Encodes image bytes into an embedding vector.
    pub fn encode(&self, bytes: &[u8]) -> Result<Vec<f32>, ClipError> {
        let raster = self.cache.get_or_decode(bytes)?;

        let views = self.tta.effective_views();
        let mut sum = self.view_embedding(&raster)?;
        if views == 1 {
            return Ok(sum);
        }

        for _ in 1..views {
            let perturbed = self.augmenter.perturb(&raster);
            let emb = self.view_embedding(&perturbed)?;
            for (slot, x) in sum.iter_mut().zip(&emb) {
                *slot += x;
            }
        }

        let n = views as f32;
        for slot in &mut sum {
            *slot /= n;
        }
        Ok(sum)
    }

    /// Width and height decoded from the bytes, via the shared cache.
    pub fn dimensions(&self, bytes: &[u8]) -> Result<(u32, u32), ClipError> {
        Ok(self.cache.get_or_decode(bytes)?.dimensions())
    }

    pub fn dimension(&self) -> usize {
        self.model.dimension()
    }

    fn view_embedding(&self, view: &RgbImage) -> Result<Vec<f32>, ClipError> {
        let mut emb = self.model.image_features(view)?;
        l2_normalize(&mut emb);
        Ok(emb)
    }
}
