use image::RgbImage;

use crate::ClipError;

/// A frozen dual-encoder vision-language model.
///
/// Maps RGB rasters and short text phrases into one shared similarity
/// space. Returned feature vectors are raw model output — callers
/// normalize before comparing or averaging.
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use. Inference is blocking
/// and computationally heavy; callers on an async runtime are expected to
/// offload (see `shoebox-engine`).
pub trait ClipModel: Send + Sync {
    /// Computes the image-side feature vector for one raster view.
    fn image_features(&self, view: &RgbImage) -> Result<Vec<f32>, ClipError>;

    /// Computes one text-side feature vector per phrase.
    fn text_features(&self, phrases: &[&str]) -> Result<Vec<Vec<f32>>, ClipError>;

    /// Dimensionality of the feature vectors (e.g. 512 for ViT-B/32).
    fn dimension(&self) -> usize;
}
