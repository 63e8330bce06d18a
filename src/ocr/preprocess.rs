//! Image clean-up before local OCR: grayscale, 3x3 median denoise and
//! local-mean adaptive thresholding.

use std::path::Path;

use anyhow::Context;
use image::{DynamicImage, GrayImage, Luma};

/// Neighbourhood side for the adaptive threshold (odd).
const THRESHOLD_BLOCK: u32 = 31;
/// A pixel is ink when darker than its local mean minus this offset.
const THRESHOLD_OFFSET: i64 = 10;

pub fn preprocess(img: &DynamicImage) -> GrayImage {
    let gray = img.to_luma8();
    let denoised = median3(&gray);
    adaptive_threshold(&denoised, THRESHOLD_BLOCK / 2, THRESHOLD_OFFSET)
}

/// Decode `src`, clean it up and write a PNG to `dst`.
pub fn preprocess_file(src: &Path, dst: &Path) -> anyhow::Result<()> {
    let img = image::open(src).with_context(|| format!("Cannot decode {}", src.display()))?;
    preprocess(&img)
        .save(dst)
        .with_context(|| format!("Cannot write {}", dst.display()))
}

/// 3x3 median filter with edge clamping.
pub fn median3(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);
    let mut window = [0u8; 9];

    for y in 0..h {
        for x in 0..w {
            let mut i = 0;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let sx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                    let sy = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                    window[i] = img.get_pixel(sx, sy)[0];
                    i += 1;
                }
            }
            window.sort_unstable();
            out.put_pixel(x, y, Luma([window[4]]));
        }
    }
    out
}

/// Binarize against the mean of the `(2r+1)^2` neighbourhood, computed from
/// an integral image so cost is independent of `radius`.
pub fn adaptive_threshold(img: &GrayImage, radius: u32, offset: i64) -> GrayImage {
    let (w, h) = img.dimensions();
    let (wu, hu) = (w as usize, h as usize);

    // integral[(y+1)*(w+1) + (x+1)] = sum of img[0..=y][0..=x]
    let stride = wu + 1;
    let mut integral = vec![0u64; stride * (hu + 1)];
    for y in 0..hu {
        let mut row_sum = 0u64;
        for x in 0..wu {
            row_sum += img.get_pixel(x as u32, y as u32)[0] as u64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }

    let r = radius as usize;
    let mut out = GrayImage::new(w, h);
    for y in 0..hu {
        let y0 = y.saturating_sub(r);
        let y1 = (y + r + 1).min(hu);
        for x in 0..wu {
            let x0 = x.saturating_sub(r);
            let x1 = (x + r + 1).min(wu);

            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let count = ((y1 - y0) * (x1 - x0)) as i64;
            let mean = sum as i64 / count;

            let value = img.get_pixel(x as u32, y as u32)[0] as i64;
            let level = if value > mean - offset { 255 } else { 0 };
            out.put_pixel(x as u32, y as u32, Luma([level]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_removes_salt_noise() {
        let mut img = GrayImage::from_pixel(5, 5, Luma([200]));
        img.put_pixel(2, 2, Luma([0]));
        let out = median3(&img);
        assert_eq!(out.get_pixel(2, 2)[0], 200);
        assert_eq!(out.dimensions(), (5, 5));
    }

    #[test]
    fn test_threshold_separates_ink_from_paper() {
        // Light background with a dark vertical stroke.
        let mut img = GrayImage::from_pixel(40, 40, Luma([220]));
        for y in 0..40 {
            for x in 18..22 {
                img.put_pixel(x, y, Luma([30]));
            }
        }
        let out = adaptive_threshold(&img, 15, 10);
        assert_eq!(out.get_pixel(20, 20)[0], 0);
        assert_eq!(out.get_pixel(2, 2)[0], 255);
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_uniform_image_is_all_paper() {
        let img = GrayImage::from_pixel(8, 8, Luma([90]));
        let out = adaptive_threshold(&img, 3, 10);
        assert!(out.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_preprocess_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("scan.png");
        let dst = dir.path().join("clean.png");
        DynamicImage::ImageRgb8(image::RgbImage::from_pixel(12, 9, image::Rgb([250, 240, 230])))
            .save(&src)
            .unwrap();

        preprocess_file(&src, &dst).unwrap();
        let cleaned = image::open(&dst).unwrap();
        assert_eq!((cleaned.width(), cleaned.height()), (12, 9));
    }

    #[test]
    fn test_preprocess_file_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("note.png");
        std::fs::write(&src, b"not an image").unwrap();
        assert!(preprocess_file(&src, &dir.path().join("out.png")).is_err());
    }
}
