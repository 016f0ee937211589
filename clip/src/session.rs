//! ONNX Runtime backend for [`ClipModel`] and the process-wide shared
//! model handle.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use image::RgbImage;
use once_cell::sync::OnceCell;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use tokenizers::Tokenizer;

use crate::model::ClipModel;
use crate::raster;
use crate::ClipError;

/// Configuration for [`ClipSession`].
#[derive(Debug, Clone)]
pub struct ClipConfig {
    /// Path to the image-tower ONNX export.
    pub image_model: PathBuf,
    /// Path to the text-tower ONNX export.
    pub text_model: PathBuf,
    /// Path to the HF `tokenizer.json` for the text tower.
    pub tokenizer: PathBuf,
    /// Embedding dimension (default: 512).
    pub dimension: usize,
    /// Model input resolution (default: 224).
    pub image_size: u32,
    /// Token context length for the text tower (default: 77).
    pub context_length: usize,
    /// Intra-op thread count for ONNX Runtime (default: 4).
    pub threads: usize,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            image_model: PathBuf::from("models/clip_visual.onnx"),
            text_model: PathBuf::from("models/clip_textual.onnx"),
            tokenizer: PathBuf::from("models/tokenizer.json"),
            dimension: 512,
            image_size: 224,
            context_length: 77,
            threads: 4,
        }
    }
}

/// [`ClipModel`] implementation backed by two ONNX Runtime sessions.
///
/// The sessions are loaded once and shared; inference serializes per tower
/// behind a mutex, which matches the blocking, offloaded execution model.
#[derive(Debug)]
pub struct ClipSession {
    image: Mutex<Session>,
    text: Mutex<Session>,
    tokenizer: Tokenizer,
    cfg: ClipConfig,
}

impl ClipSession {
    /// Loads both towers and the tokenizer from disk.
    pub fn load(cfg: ClipConfig) -> Result<Self, ClipError> {
        let image = build_session(&cfg.image_model, cfg.threads)?;
        let text = build_session(&cfg.text_model, cfg.threads)?;
        let tokenizer = Tokenizer::from_file(&cfg.tokenizer)
            .map_err(|e| ClipError::ModelUnavailable(format!("tokenizer: {e}")))?;

        tracing::info!(
            image = %cfg.image_model.display(),
            text = %cfg.text_model.display(),
            dim = cfg.dimension,
            "clip model loaded"
        );

        Ok(Self {
            image: Mutex::new(image),
            text: Mutex::new(text),
            tokenizer,
            cfg,
        })
    }

    pub fn config(&self) -> &ClipConfig {
        &self.cfg
    }

    /// Pads or truncates token ids to the configured context length and
    /// produces the matching attention mask.
    fn tokenize(&self, phrase: &str) -> Result<(Vec<i64>, Vec<i64>), ClipError> {
        let encoding = self
            .tokenizer
            .encode(phrase, true)
            .map_err(|e| ClipError::Inference(format!("tokenize: {e}")))?;

        let len = self.cfg.context_length;
        let mut ids = vec![0i64; len];
        let mut mask = vec![0i64; len];
        for (i, &id) in encoding.get_ids().iter().take(len).enumerate() {
            ids[i] = id as i64;
            mask[i] = 1;
        }
        Ok((ids, mask))
    }
}

fn build_session(path: &std::path::Path, threads: usize) -> Result<Session, ClipError> {
    Session::builder()
        .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
        .and_then(|b| b.with_intra_threads(threads))
        .and_then(|b| b.commit_from_file(path))
        .map_err(|e| ClipError::ModelUnavailable(format!("{}: {e}", path.display())))
}

impl ClipModel for ClipSession {
    fn image_features(&self, view: &RgbImage) -> Result<Vec<f32>, ClipError> {
        let (shape, data) = raster::to_model_input(view, self.cfg.image_size);
        let input = Value::from_array((shape, data))
            .map_err(|e| ClipError::Inference(e.to_string()))?;

        let mut session = self.image.lock().unwrap();
        let outputs = session
            .run(ort::inputs!["pixel_values" => input])
            .map_err(|e| ClipError::Inference(e.to_string()))?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClipError::Inference(e.to_string()))?;

        if raw.len() != self.cfg.dimension {
            return Err(ClipError::DimensionMismatch {
                expected: self.cfg.dimension,
                got: raw.len(),
            });
        }
        Ok(raw.to_vec())
    }

    fn text_features(&self, phrases: &[&str]) -> Result<Vec<Vec<f32>>, ClipError> {
        if phrases.is_empty() {
            return Ok(Vec::new());
        }

        let len = self.cfg.context_length;
        let mut ids = Vec::with_capacity(phrases.len() * len);
        let mut mask = Vec::with_capacity(phrases.len() * len);
        for phrase in phrases {
            let (phrase_ids, phrase_mask) = self.tokenize(phrase)?;
            ids.extend(phrase_ids);
            mask.extend(phrase_mask);
        }

        let shape = vec![phrases.len(), len];
        let ids = Value::from_array((shape.clone(), ids))
            .map_err(|e| ClipError::Inference(e.to_string()))?;
        let mask = Value::from_array((shape, mask))
            .map_err(|e| ClipError::Inference(e.to_string()))?;

        let mut session = self.text.lock().unwrap();
        let outputs = session
            .run(ort::inputs!["input_ids" => ids, "attention_mask" => mask])
            .map_err(|e| ClipError::Inference(e.to_string()))?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClipError::Inference(e.to_string()))?;

        let dim = self.cfg.dimension;
        if raw.len() != phrases.len() * dim {
            return Err(ClipError::DimensionMismatch {
                expected: phrases.len() * dim,
                got: raw.len(),
            });
        }
        Ok(raw.chunks(dim).map(|c| c.to_vec()).collect())
    }

    fn dimension(&self) -> usize {
        self.cfg.dimension
    }
}

/// Single-flight, process-lifetime handle to a lazily loaded [`ClipSession`].
///
/// The first caller to [`SharedClip::get`] performs the load; concurrent
/// first-use callers block until that one load finishes rather than loading
/// twice. A failed load is returned to every caller — weights that cannot
/// be loaded are fatal for the process, not per-request recoverable.
pub struct SharedClip {
    cfg: ClipConfig,
    cell: OnceCell<Arc<ClipSession>>,
}

impl SharedClip {
    pub fn new(cfg: ClipConfig) -> Self {
        Self {
            cfg,
            cell: OnceCell::new(),
        }
    }

    /// Returns the loaded model, loading it on first use.
    pub fn get(&self) -> Result<Arc<ClipSession>, ClipError> {
        self.cell
            .get_or_try_init(|| ClipSession::load(self.cfg.clone()).map(Arc::new))
            .map(Arc::clone)
    }

    /// True if the model has already been loaded.
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}
