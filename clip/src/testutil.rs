//! Deterministic stand-ins for the model seam, used across test modules.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use image::{ImageBuffer, Rgb, RgbImage};

use crate::model::ClipModel;
use crate::ClipError;

/// [`ClipModel`] stub producing deterministic pseudo-features.
///
/// Image features are a pure function of the raster content, so perturbed
/// views yield different (but reproducible) vectors. Text features hash the
/// phrase, or collapse to one shared vector when constructed with
/// [`StubClip::with_tied_text`] to force exact similarity ties.
pub(crate) struct StubClip {
    dim: usize,
    tied_text: bool,
}

impl StubClip {
    pub(crate) fn new(dim: usize) -> Self {
        Self {
            dim,
            tied_text: false,
        }
    }

    pub(crate) fn with_tied_text(dim: usize) -> Self {
        Self {
            dim,
            tied_text: true,
        }
    }

    fn feature(seed: &[u8], component: usize) -> f32 {
        let mut hasher = DefaultHasher::new();
        seed.hash(&mut hasher);
        component.hash(&mut hasher);
        let h = hasher.finish();
        (h % 2001) as f32 / 1000.0 - 1.0
    }
}

impl ClipModel for StubClip {
    fn image_features(&self, view: &RgbImage) -> Result<Vec<f32>, ClipError> {
        let raw = view.as_raw();
        Ok((0..self.dim).map(|d| Self::feature(raw, d)).collect())
    }

    fn text_features(&self, phrases: &[&str]) -> Result<Vec<Vec<f32>>, ClipError> {
        Ok(phrases
            .iter()
            .map(|p| {
                let seed: &[u8] = if self.tied_text { b"tied" } else { p.as_bytes() };
                (0..self.dim).map(|d| Self::feature(seed, d)).collect()
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// A 16x12 PNG whose red channel is `shade` everywhere and whose other
/// channels carry spatial structure, so flips and local contrast changes
/// actually alter the raster.
pub(crate) fn png_bytes(shade: u8) -> Vec<u8> {
    let img: RgbImage = ImageBuffer::from_fn(16, 12, |x, y| {
        Rgb([shade, (x * 16) as u8, (y * 20) as u8])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("in-memory png encode");
    out.into_inner()
}
