//! Zero-shot classification against fixed label vocabularies.

use std::sync::Arc;

use crate::augment::Augmenter;
use crate::cache::DecodeCache;
use crate::encoder::TtaConfig;
use crate::model::ClipModel;
use crate::simil::{cosine_sim, l2_normalize};
use crate::ClipError;

/// The built-in primary-subject phrases, in ranking order.
pub const SUBJECT_PHRASES: [&str; 9] = [
    "a photo of a cat",
    "a photo of a dog",
    "a photo of a car",
    "a photo of a person",
    "a photo of a bird",
    "a photo of food",
    "a photo of a building",
    "a photo of nature",
    "a photo of an animal",
];

/// The built-in background/setting phrases, in ranking order.
pub const BACKGROUND_PHRASES: [&str; 5] = [
    "indoor background",
    "outdoor background",
    "nature background",
    "urban background",
    "simple background",
];

/// An ordered set of candidate phrases plus the boilerplate to strip from
/// the winning phrase before returning it as a category token.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    phrases: Vec<String>,
    strip_prefixes: Vec<String>,
    strip_suffixes: Vec<String>,
}

impl Vocabulary {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            phrases: phrases.into_iter().map(Into::into).collect(),
            strip_prefixes: Vec::new(),
            strip_suffixes: Vec::new(),
        }
    }

    /// Prefixes removed from a winning phrase; the first match wins.
    pub fn strip_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strip_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Suffixes removed from a winning phrase; the first match wins.
    pub fn strip_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strip_suffixes = suffixes.into_iter().map(Into::into).collect();
        self
    }

    /// The built-in subject vocabulary ("a photo of ..." carrier stripped).
    pub fn subjects() -> Self {
        Self::new(SUBJECT_PHRASES).strip_prefixes([
            "a photo of a ",
            "a photo of an ",
            "a photo of ",
        ])
    }

    /// The built-in background vocabulary (" background" suffix stripped).
    pub fn backgrounds() -> Self {
        Self::new(BACKGROUND_PHRASES).strip_suffixes([" background"])
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// The category token for entry `idx`: the phrase with carrier
    /// boilerplate stripped.
    fn label(&self, idx: usize) -> String {
        let mut label = self.phrases[idx].as_str();
        for prefix in &self.strip_prefixes {
            if let Some(rest) = label.strip_prefix(prefix.as_str()) {
                label = rest;
                break;
            }
        }
        for suffix in &self.strip_suffixes {
            if let Some(rest) = label.strip_suffix(suffix.as_str()) {
                label = rest;
                break;
            }
        }
        label.to_string()
    }
}

/// Assigns the best-matching vocabulary label to an image by text-image
/// similarity.
///
/// With augmentation enabled, similarities (not embeddings) are averaged
/// across views before ranking. Exact ties resolve to the earliest
/// vocabulary entry.
pub struct Classifier {
    model: Arc<dyn ClipModel>,
    cache: Arc<DecodeCache>,
    augmenter: Augmenter,
    tta: TtaConfig,
}

impl Classifier {
    pub fn new(model: Arc<dyn ClipModel>, cache: Arc<DecodeCache>, tta: TtaConfig) -> Self {
        Self::with_augmenter(model, cache, tta, Augmenter::new())
    }

    /// Like [`Classifier::new`] but with caller-provided perturbation
    /// draws, for deterministic tests.
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

    /// Classifies image bytes against `vocabulary`, returning the stripped
    /// category token of the best match.
    pub fn classify(&self, bytes: &[u8], vocabulary: &Vocabulary) -> Result<String, ClipError> {
        if vocabulary.is_empty() {
            return Err(ClipError::Inference("empty vocabulary".into()));
        }

        let raster = self.cache.get_or_decode(bytes)?;

        let phrases: Vec<&str> = vocabulary.phrases().iter().map(String::as_str).collect();
        let mut text = self.model.text_features(&phrases)?;
        for t in &mut text {
            l2_normalize(t);
        }

        let views = if self.tta.enabled {
            self.tta.views.max(1)
        } else {
            1
        };

        // Per-view similarities, accumulated then averaged across views.
        let mut sims = vec![0.0f64; text.len()];
        for view_idx in 0..views {
            let view;
            let raster_ref = if view_idx == 0 {
                &*raster
            } else {
                view = self.augmenter.perturb(&raster);
                &view
            };

            let mut emb = self.model.image_features(raster_ref)?;
            l2_normalize(&mut emb);
            for (slot, t) in sims.iter_mut().zip(&text) {
                *slot += cosine_sim(&emb, t) as f64;
            }
        }

        let n = views as f64;
        let mut best = 0usize;
        let mut best_sim = f64::NEG_INFINITY;
        for (i, &s) in sims.iter().enumerate() {
            let avg = s / n;
            if avg > best_sim {
                best_sim = avg;
                best = i;
            }
        }

        Ok(vocabulary.label(best))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{png_bytes, StubClip};
    use image::RgbImage;

    /// Maps bright rasters toward the "bright" axis and phrases containing
    /// "bright" onto the same axis.
    struct ShadeStub;

    impl ClipModel for ShadeStub {
        fn image_features(&self, view: &RgbImage) -> Result<Vec<f32>, ClipError> {
            let n = (view.width() * view.height()) as f32;
            let mean = view.pixels().map(|p| p[0] as f32).sum::<f32>() / n / 255.0;
            Ok(vec![mean, 1.0 - mean])
        }

        fn text_features(&self, phrases: &[&str]) -> Result<Vec<Vec<f32>>, ClipError> {
            Ok(phrases
                .iter()
                .map(|p| {
                    if p.contains("bright") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[test]
    fn picks_the_most_similar_phrase() {
        let classifier = Classifier::new(
            Arc::new(ShadeStub),
            Arc::new(DecodeCache::default()),
            TtaConfig::disabled(),
        );
        let vocab = Vocabulary::new(["a dark scene", "a bright scene"]);

        assert_eq!(classifier.classify(&png_bytes(240), &vocab).unwrap(), "a bright scene");
        assert_eq!(classifier.classify(&png_bytes(10), &vocab).unwrap(), "a dark scene");
    }

    #[test]
    fn exact_tie_goes_to_earliest_entry() {
        // Every phrase collapses to the same text vector, so all averaged
        // similarities are identical.
        let classifier = Classifier::new(
            Arc::new(StubClip::with_tied_text(8)),
            Arc::new(DecodeCache::default()),
            TtaConfig::default(),
        );
        let vocab = Vocabulary::new(["first", "second", "third"]);

        assert_eq!(classifier.classify(&png_bytes(33), &vocab).unwrap(), "first");
    }

    #[test]
    fn subject_carrier_phrase_is_stripped() {
        let vocab = Vocabulary::subjects();
        assert_eq!(vocab.label(0), "cat");
        assert_eq!(vocab.label(5), "food");
        assert_eq!(vocab.label(7), "nature");
        assert_eq!(vocab.label(8), "animal");
    }

    #[test]
    fn background_suffix_is_stripped() {
        let vocab = Vocabulary::backgrounds();
        assert_eq!(vocab.label(0), "indoor");
        assert_eq!(vocab.label(4), "simple");
    }

    #[test]
    fn seeded_classification_is_reproducible() {
        let bytes = png_bytes(120);
        let vocab = Vocabulary::subjects();

        let run = |seed| {
            let classifier = Classifier::with_augmenter(
                Arc::new(StubClip::new(8)),
                Arc::new(DecodeCache::default()),
                TtaConfig::default(),
                Augmenter::seeded(seed),
            );
            classifier.classify(&bytes, &vocab).unwrap()
        };

        assert_eq!(run(5), run(5));
    }

    #[test]
    fn empty_vocabulary_is_an_error() {
        let classifier = Classifier::new(
            Arc::new(StubClip::new(8)),
            Arc::new(DecodeCache::default()),
            TtaConfig::disabled(),
        );
        let empty = Vocabulary::new(Vec::<String>::new());
        assert!(classifier.classify(&png_bytes(1), &empty).is_err());
    }

    #[test]
    fn decode_failure_propagates() {
        let classifier = Classifier::new(
            Arc::new(StubClip::new(8)),
            Arc::new(DecodeCache::default()),
            TtaConfig::disabled(),
        );
        assert!(matches!(
            classifier.classify(b"nope", &Vocabulary::subjects()),
            Err(ClipError::Decode(_))
        ));
    }
}
