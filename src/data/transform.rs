// ============================================================
// Layer 4 — Image Transform
// ============================================================
// Decodes a photograph and turns it into a normalised
// channel-major float image for the backbone.
//
// Train (random, driven by the per-sample seed):
//   1. Random resized crop (area 8%–100%, aspect 3/4–4/3)
//   2. Random horizontal flip, random vertical flip
//   3. Random rotation ±10° about the centre, black fill
//   4. Colour jitter: brightness, contrast, saturation ±20%,
//      hue ±0.1 of a turn
//   5. Random grayscale (10%)
//
// Val / Test (deterministic):
//   1. Resize so the shorter side is `resize`
//   2. Centre crop `image_size`
//
// Then for every phase:
//   pixels / 255 → subtract ImageNet mean → divide by ImageNet std
//
// Reference: image crate documentation (imageops),
//            imageproc geometric_transformations

use anyhow::{Context, Result};
use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::path::Path;

use crate::domain::sample::Phase;
use crate::domain::traits::ImageDecoder;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD:  [f32; 3] = [0.229, 0.224, 0.225];

const CROP_SCALE:      (f64, f64) = (0.08, 1.0);
const CROP_RATIO:      (f64, f64) = (3.0 / 4.0, 4.0 / 3.0);
const ROTATION_DEG:    f32 = 10.0;
const JITTER:          f32 = 0.2;
const HUE_JITTER:      f32 = 0.1;
const GRAYSCALE_PROB:  f64 = 0.1;

/// Decodes files from disk with the `image` crate.
#[derive(Debug, Clone)]
pub struct FileImageDecoder {
    image_size: u32,
    resize:     u32,
}

impl FileImageDecoder {
    pub fn new(image_size: usize, resize: usize) -> Self {
        Self { image_size: image_size as u32, resize: resize.max(image_size) as u32 }
    }

    /// Apply the phase's geometric + colour pipeline to a decoded image.
    pub fn transform(&self, img: RgbImage, phase: Phase, seed: u64) -> Vec<f32> {
        if phase.is_train() {
            let mut rng = StdRng::seed_from_u64(seed);
            let img = random_resized_crop(&img, self.image_size, &mut rng);
            let img = random_flips(img, &mut rng);
            let img = random_rotation(&img, &mut rng);
            let img = jitter_hue(img, &mut rng);
            let mut pixels = to_unit_chw(&img);
            jitter_colour(&mut pixels, &mut rng);
            if rng.gen_bool(GRAYSCALE_PROB) {
                to_grayscale(&mut pixels);
            }
            normalize(&mut pixels);
            pixels
        } else {
            let img = resize_shorter_side(&img, self.resize);
            let img = center_crop(&img, self.image_size);
            let mut pixels = to_unit_chw(&img);
            normalize(&mut pixels);
            pixels
        }
    }
}

impl ImageDecoder for FileImageDecoder {
    fn decode(&self, path: &Path, phase: Phase, seed: u64) -> Result<Vec<f32>> {
        let img = image::open(path)
            .with_context(|| format!("Cannot decode image '{}'", path.display()))?
            .to_rgb8();
        Ok(self.transform(img, phase, seed))
    }

    fn image_size(&self) -> usize {
        self.image_size as usize
    }
}

// ─── Geometry ─────────────────────────────────────────────────────────────────

fn random_resized_crop(img: &RgbImage, size: u32, rng: &mut StdRng) -> RgbImage {
    let (w, h) = img.dimensions();
    let area   = (w as f64) * (h as f64);
    let (log_lo, log_hi) = (CROP_RATIO.0.ln(), CROP_RATIO.1.ln());

    for _ in 0..10 {
        let target_area = area * rng.gen_range(CROP_SCALE.0..=CROP_SCALE.1);
        let ratio       = rng.gen_range(log_lo..=log_hi).exp();
        let cw = (target_area * ratio).sqrt().round() as u32;
        let ch = (target_area / ratio).sqrt().round() as u32;
        if cw > 0 && ch > 0 && cw <= w && ch <= h {
            let x = rng.gen_range(0..=w - cw);
            let y = rng.gen_range(0..=h - ch);
            let crop = imageops::crop_imm(img, x, y, cw, ch).to_image();
            return imageops::resize(&crop, size, size, FilterType::Triangle);
        }
    }

    // Fallback: centre crop at the closest allowed aspect ratio
    let (cw, ch) = fallback_crop(w, h);
    let crop = imageops::crop_imm(img, (w - cw) / 2, (h - ch) / 2, cw, ch).to_image();
    imageops::resize(&crop, size, size, FilterType::Triangle)
}

/// Largest centred crop whose aspect ratio lies within `CROP_RATIO`
fn fallback_crop(w: u32, h: u32) -> (u32, u32) {
    let ratio = w as f64 / h.max(1) as f64;
    if ratio < CROP_RATIO.0 {
        let ch = ((w as f64) / CROP_RATIO.0).round() as u32;
        (w, ch.clamp(1, h))
    } else if ratio > CROP_RATIO.1 {
        let cw = ((h as f64) * CROP_RATIO.1).round() as u32;
        (cw.clamp(1, w), h)
    } else {
        (w, h)
    }
}

fn random_flips(mut img: RgbImage, rng: &mut StdRng) -> RgbImage {
    if rng.gen_bool(0.5) {
        img = imageops::flip_horizontal(&img);
    }
    if rng.gen_bool(0.5) {
        img = imageops::flip_vertical(&img);
    }
    img
}

fn random_rotation(img: &RgbImage, rng: &mut StdRng) -> RgbImage {
    rotate(img, rng.gen_range(-ROTATION_DEG..=ROTATION_DEG))
}

fn rotate(img: &RgbImage, degrees: f32) -> RgbImage {
    rotate_about_center(img, degrees.to_radians(), Interpolation::Nearest, Rgb([0, 0, 0]))
}

fn resize_shorter_side(img: &RgbImage, shorter: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let (nw, nh) = if w <= h {
        (shorter, ((h as f64) * shorter as f64 / w.max(1) as f64).round() as u32)
    } else {
        (((w as f64) * shorter as f64 / h.max(1) as f64).round() as u32, shorter)
    };
    imageops::resize(img, nw.max(1), nh.max(1), FilterType::Triangle)
}

fn center_crop(img: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if w < size || h < size {
        return imageops::resize(img, size, size, FilterType::Triangle);
    }
    imageops::crop_imm(img, (w - size) / 2, (h - size) / 2, size, size).to_image()
}

// ─── Colour ───────────────────────────────────────────────────────────────────

fn jitter_hue(img: RgbImage, rng: &mut StdRng) -> RgbImage {
    let degrees = rng.gen_range(-HUE_JITTER..=HUE_JITTER) * 360.0;
    imageops::huerotate(&img, degrees.round() as i32)
}

/// Brightness, contrast and saturation, applied in random order.
fn jitter_colour(pixels: &mut [f32], rng: &mut StdRng) {
    let brightness = rng.gen_range(1.0 - JITTER..=1.0 + JITTER);
    let contrast   = rng.gen_range(1.0 - JITTER..=1.0 + JITTER);
    let saturation = rng.gen_range(1.0 - JITTER..=1.0 + JITTER);

    let mut order = [0u8, 1, 2];
    order.shuffle(rng);

    for step in order {
        match step {
            0 => pixels.iter_mut().for_each(|p| *p = (*p * brightness).clamp(0.0, 1.0)),
            1 => {
                let plane = pixels.len() / 3;
                let mean  = luminance(pixels).iter().sum::<f32>() / plane.max(1) as f32;
                pixels.iter_mut().for_each(|p| *p = blend(*p, mean, contrast));
            }
            _ => {
                let gray  = luminance(pixels);
                let plane = gray.len();
                for (i, p) in pixels.iter_mut().enumerate() {
                    *p = blend(*p, gray[i % plane], saturation);
                }
            }
        }
    }
}

fn to_grayscale(pixels: &mut [f32]) {
    let gray  = luminance(pixels);
    let plane = gray.len();
    for (i, p) in pixels.iter_mut().enumerate() {
        *p = gray[i % plane];
    }
}

/// ITU-R 601 luma per pixel of a CHW image in [0, 1]
fn luminance(pixels: &[f32]) -> Vec<f32> {
    let plane = pixels.len() / 3;
    (0..plane)
        .map(|i| 0.299 * pixels[i] + 0.587 * pixels[plane + i] + 0.114 * pixels[2 * plane + i])
        .collect()
}

fn blend(value: f32, other: f32, factor: f32) -> f32 {
    (factor * value + (1.0 - factor) * other).clamp(0.0, 1.0)
}

// ─── Tensor layout ────────────────────────────────────────────────────────────

/// HWC u8 → CHW f32 in [0, 1]
fn to_unit_chw(img: &RgbImage) -> Vec<f32> {
    let (w, h) = img.dimensions();
    let plane  = (w * h) as usize;
    let mut out = vec![0.0f32; plane * 3];
    for (i, px) in img.pixels().enumerate() {
        for c in 0..3 {
            out[c * plane + i] = px.0[c] as f32 / 255.0;
        }
    }
    out
}

fn normalize(pixels: &mut [f32]) {
    let plane = pixels.len() / 3;
    for c in 0..3 {
        for p in &mut pixels[c * plane..(c + 1) * plane] {
            *p = (*p - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, 128]))
    }

    #[test]
    fn test_eval_output_shape() {
        let dec = FileImageDecoder::new(32, 40);
        let out = dec.transform(gradient(80, 50), Phase::Val, 0);
        assert_eq!(out.len(), 3 * 32 * 32);
    }

    #[test]
    fn test_train_output_shape_and_determinism() {
        let dec = FileImageDecoder::new(24, 28);
        let a = dec.transform(gradient(64, 48), Phase::Train, 9);
        let b = dec.transform(gradient(64, 48), Phase::Train, 9);
        assert_eq!(a.len(), 3 * 24 * 24);
        assert_eq!(a, b);
    }

    #[test]
    fn test_eval_is_independent_of_seed() {
        let dec = FileImageDecoder::new(16, 20);
        let a = dec.transform(gradient(30, 30), Phase::Test, 1);
        let b = dec.transform(gradient(30, 30), Phase::Test, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_train_seeds_change_the_output() {
        let dec = FileImageDecoder::new(24, 28);
        let a = dec.transform(gradient(64, 48), Phase::Train, 1);
        let b = dec.transform(gradient(64, 48), Phase::Train, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_rotation_fills_corners_with_black() {
        let white = RgbImage::from_pixel(32, 32, Rgb([255, 255, 255]));
        for degrees in [-10.0, 10.0] {
            let out = rotate(&white, degrees);
            assert_eq!(out.dimensions(), (32, 32));
            assert_eq!(*out.get_pixel(0, 0), Rgb([0, 0, 0]));
            assert_eq!(*out.get_pixel(16, 16), Rgb([255, 255, 255]));
        }
    }

    #[test]
    fn test_random_rotation_is_seeded() {
        let img = gradient(40, 40);
        let a = random_rotation(&img, &mut StdRng::seed_from_u64(5));
        let b = random_rotation(&img, &mut StdRng::seed_from_u64(5));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fallback_crop_clamps_aspect_ratio() {
        // 4:1 panorama → 4/3 crop of full height
        assert_eq!(fallback_crop(400, 100), (133, 100));
        // 1:4 strip → 3/4 crop of full width
        assert_eq!(fallback_crop(100, 400), (100, 133));
        assert_eq!(fallback_crop(120, 100), (120, 100));
    }

    #[test]
    fn test_normalize_uses_imagenet_stats() {
        let mut px = vec![IMAGENET_MEAN[0], IMAGENET_MEAN[1], 1.0];
        normalize(&mut px);
        assert!(px[0].abs() < 1e-6);
        assert!(px[1].abs() < 1e-6);
        assert!((px[2] - (1.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2]).abs() < 1e-6);
    }

    #[test]
    fn test_decode_reads_png_from_disk() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.png");
        gradient(40, 40).save(&path).unwrap();

        let dec = FileImageDecoder::new(16, 20);
        assert_eq!(dec.decode(&path, Phase::Val, 0).unwrap().len(), 3 * 16 * 16);
    }

    #[test]
    fn test_decode_corrupt_file_is_an_error() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let dec = FileImageDecoder::new(16, 20);
        assert!(dec.decode(&path, Phase::Val, 0).is_err());
    }
}
