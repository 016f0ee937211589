//! Stochastic image perturbations for test-time augmentation.
//!
//! Each transform fires independently with its own probability, mirroring
//! the augmentation policy the embeddings were tuned against: horizontal
//! flip, brightness/contrast jitter, gamma adjustment, tile-based local
//! contrast equalization, and additive Gaussian noise.
//!
//! Production draws come from an entropy-seeded RNG; tests construct a
//! seeded augmenter so perturbation sequences are reproducible.

use std::sync::Mutex;

use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

const FLIP_P: f32 = 0.5;

const BRIGHTNESS_CONTRAST_P: f32 = 0.5;
const BRIGHTNESS_LIMIT: f32 = 0.2;
const CONTRAST_LIMIT: f32 = 0.2;

const GAMMA_P: f32 = 0.3;
const GAMMA_LO: f32 = 0.8;
const GAMMA_HI: f32 = 1.2;

const CLAHE_P: f32 = 0.3;
const CLAHE_CLIP_LIMIT: f32 = 2.0;
const CLAHE_GRID: u32 = 8;

const NOISE_P: f32 = 0.2;
const NOISE_VAR_LO: f32 = 10.0;
const NOISE_VAR_HI: f32 = 50.0;

/// Draws and applies random perturbations to decoded rasters.
pub struct Augmenter {
    rng: Mutex<StdRng>,
}

impl Augmenter {
    /// Entropy-seeded augmenter for production use.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic augmenter for reproducible tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Returns a perturbed copy of `img`. The input is never modified.
    pub fn perturb(&self, img: &RgbImage) -> RgbImage {
        let mut rng = self.rng.lock().unwrap();
        let mut out = img.clone();

        if rng.gen_range(0.0f32..1.0) < FLIP_P {
            out = image::imageops::flip_horizontal(&out);
        }

        if rng.gen_range(0.0f32..1.0) < BRIGHTNESS_CONTRAST_P {
            let alpha = 1.0 + rng.gen_range(-CONTRAST_LIMIT..=CONTRAST_LIMIT);
            let beta = rng.gen_range(-BRIGHTNESS_LIMIT..=BRIGHTNESS_LIMIT);
            apply_lut(&mut out, |v| v as f32 * alpha + beta * 255.0);
        }

        if rng.gen_range(0.0f32..1.0) < GAMMA_P {
            let gamma = rng.gen_range(GAMMA_LO..=GAMMA_HI);
            apply_lut(&mut out, |v| 255.0 * (v as f32 / 255.0).powf(gamma));
        }

        if rng.gen_range(0.0f32..1.0) < CLAHE_P {
            equalize_local_contrast(&mut out, CLAHE_CLIP_LIMIT, CLAHE_GRID);
        }

        if rng.gen_range(0.0f32..1.0) < NOISE_P {
            let var = rng.gen_range(NOISE_VAR_LO..=NOISE_VAR_HI);
            if let Ok(normal) = Normal::new(0.0f32, var.sqrt()) {
                for px in out.pixels_mut() {
                    for c in 0..3 {
                        let noisy = px[c] as f32 + normal.sample(&mut *rng);
                        px[c] = noisy.clamp(0.0, 255.0) as u8;
                    }
                }
            }
        }

        out
    }
}

impl Default for Augmenter {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies a per-value transfer function through a 256-entry table,
/// identically across channels.
fn apply_lut(img: &mut RgbImage, f: impl Fn(u8) -> f32) {
    let mut lut = [0u8; 256];
    for (v, slot) in lut.iter_mut().enumerate() {
        *slot = f(v as u8).clamp(0.0, 255.0) as u8;
    }
    for px in img.pixels_mut() {
        for c in 0..3 {
            px[c] = lut[px[c] as usize];
        }
    }
}

/// Contrast-limited adaptive histogram equalization on the luma channel.
///
/// The raster is divided into a `grid`x`grid` tile layout; each tile gets a
/// clipped, equalized luma mapping, and per-pixel mappings are bilinearly
/// interpolated between the four nearest tile centers. RGB channels are
/// rescaled by the luma ratio so hue is preserved.
fn equalize_local_contrast(img: &mut RgbImage, clip_limit: f32, grid: u32) {
    let (w, h) = img.dimensions();
    if w < grid || h < grid {
        return;
    }

    let luma: Vec<f32> = img
        .pixels()
        .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
        .collect();

    let tile_w = w.div_ceil(grid);
    let tile_h = h.div_ceil(grid);
    let g = grid as usize;

    // One clipped-CDF lookup table per tile.
    let mut luts = vec![[0u8; 256]; g * g];
    for ty in 0..grid {
        for tx in 0..grid {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);

            let mut hist = [0u32; 256];
            let mut count = 0u32;
            for y in y0..y1 {
                for x in x0..x1 {
                    let v = luma[(y * w + x) as usize].clamp(0.0, 255.0) as usize;
                    hist[v] += 1;
                    count += 1;
                }
            }
            if count == 0 {
                continue;
            }

            // Clip the histogram and redistribute the excess so total mass
            // is preserved; the remainder is spread at even strides.
            let limit = ((clip_limit * count as f32 / 256.0).max(1.0)) as u32;
            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > limit {
                    excess += *bin - limit;
                    *bin = limit;
                }
            }
            let bonus = excess / 256;
            for bin in hist.iter_mut() {
                *bin += bonus;
            }
            let rem = (excess % 256) as usize;
            if rem > 0 {
                let step = (256 / rem).max(1);
                for bin in hist.iter_mut().step_by(step).take(rem) {
                    *bin += 1;
                }
            }

            let lut = &mut luts[(ty as usize) * g + tx as usize];
            let mut cdf = 0u32;
            for (v, &bin) in hist.iter().enumerate() {
                cdf += bin;
                lut[v] = (cdf as f32 * 255.0 / count as f32).clamp(0.0, 255.0) as u8;
            }
        }
    }

    // Bilinear blend between surrounding tile mappings.
    for y in 0..h {
        for x in 0..w {
            let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
            let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
            let tx0 = (fx.floor().max(0.0) as usize).min(g - 1);
            let ty0 = (fy.floor().max(0.0) as usize).min(g - 1);
            let tx1 = (tx0 + 1).min(g - 1);
            let ty1 = (ty0 + 1).min(g - 1);
            let wx = (fx - fx.floor()).clamp(0.0, 1.0);
            let wy = (fy - fy.floor()).clamp(0.0, 1.0);

            let old = luma[(y * w + x) as usize].clamp(0.0, 255.0);
            let v = old as usize;
            let top = luts[ty0 * g + tx0][v] as f32 * (1.0 - wx) + luts[ty0 * g + tx1][v] as f32 * wx;
            let bottom =
                luts[ty1 * g + tx0][v] as f32 * (1.0 - wx) + luts[ty1 * g + tx1][v] as f32 * wx;
            let new = top * (1.0 - wy) + bottom * wy;

            if old > 0.0 {
                let scale = new / old;
                let px = img.get_pixel_mut(x, y);
                for c in 0..3 {
                    px[c] = (px[c] as f32 * scale).clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}
