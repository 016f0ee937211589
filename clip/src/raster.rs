//! Byte decoding and CLIP input preprocessing.

use image::imageops::FilterType;
use image::RgbImage;

use crate::ClipError;

/// Normalization constants of the CLIPProcessor for
/// openai/clip-vit-base-patch32.
const MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Decodes raw image bytes into a canonical RGB raster.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, ClipError> {
    let img = image::load_from_memory(bytes).map_err(|e| ClipError::Decode(e.to_string()))?;
    Ok(img.to_rgb8())
}

/// Resizes a raster to `size`x`size`, scales to [0, 1], applies CLIP
/// mean/std normalization and lays the result out as a NCHW tensor.
///
/// Returns `(shape, data)` ready for `ort::value::Value::from_array`.
pub fn to_model_input(view: &RgbImage, size: u32) -> (Vec<usize>, Vec<f32>) {
    let resized = image::imageops::resize(view, size, size, FilterType::CatmullRom);
    let side = size as usize;
    let plane = side * side;

    let mut data = vec![0.0f32; 3 * plane];
    for (x, y, px) in resized.enumerate_pixels() {
        let idx = y as usize * side + x as usize;
        for c in 0..3 {
            let v = px[c] as f32 / 255.0;
            data[c * plane + idx] = (v - MEAN[c]) / STD[c];
        }
    }

    (vec![1, 3, side, side], data)
}
