//! Low-level image filters used to build OCR variants.
//!
//! Everything here works on 8-bit grayscale buffers and is a pure function of
//! its inputs. Binarized outputs follow the usual convention: 255 where the
//! source pixel is above the threshold, 0 elsewhere.

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, Rgba, RgbaImage};
use imageproc::contrast::otsu_level;
use imageproc::edges::canny;
use imageproc::filter::{box_filter, gaussian_blur_f32};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use imageproc::hough::{LineDetectionOptions, detect_lines};

use crate::config::{RelativeRect, VariantConfig};
use crate::error::VariantError;

/// Upper bound on rescaled image area.
const MAX_RESCALED_PIXELS: u64 = 64 * 1024 * 1024;

/// Lines considered when estimating skew.
const DESKEW_MAX_LINES: usize = 10;

/// Skew below this many degrees is left alone.
const DESKEW_MIN_ANGLE: f32 = 0.5;

/// Crops a sub-region from an image using relative coordinates.
///
/// Converts the relative rect (0.0–1.0) to absolute pixel coordinates,
/// clamps to image bounds, and returns the cropped sub-image.
pub fn crop_region(img: &ImageBuffer<Rgba<u8>, Vec<u8>>, region: &RelativeRect) -> RgbaImage {
    let (w, h) = img.dimensions();

    let x0 = ((region.x.max(0.0) * w as f32) as u32).min(w);
    let y0 = ((region.y.max(0.0) * h as f32) as u32).min(h);
    let rw = ((region.width.max(0.0) * w as f32) as u32).min(w - x0);
    let rh = ((region.height.max(0.0) * h as f32) as u32).min(h - y0);

    imageops::crop_imm(img, x0, y0, rw, rh).to_image()
}

/// Thresholds a grayscale image at a fixed level.
pub fn binarize(gray: &GrayImage, level: u8) -> GrayImage {
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] > level {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Global binarization at the level that minimizes intra-class variance.
pub fn otsu_binarize(gray: &GrayImage) -> GrayImage {
    if gray.width() == 0 || gray.height() == 0 {
        return gray.clone();
    }
    binarize(gray, otsu_level(gray))
}

/// Keeps pixels brighter than `local_mean - c`.
fn threshold_against(gray: &GrayImage, local_mean: &GrayImage, c: i32) -> GrayImage {
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let value = gray.get_pixel(x, y)[0] as i32;
        let mean = local_mean.get_pixel(x, y)[0] as i32;
        if value > mean - c {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Normalizes a block size to an odd value of at least 3.
fn odd_block(block_size: u32) -> u32 {
    let b = block_size.max(3);
    if b % 2 == 0 { b + 1 } else { b }
}

/// Gaussian sigma matching a square kernel of `block_size` pixels.
fn sigma_for_block(block_size: u32) -> f32 {
    0.3 * ((odd_block(block_size) as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Locally adaptive threshold against a Gaussian-weighted neighbourhood mean.
pub fn adaptive_threshold_gaussian(gray: &GrayImage, block_size: u32, c: i32) -> GrayImage {
    if gray.width() == 0 || gray.height() == 0 {
        return gray.clone();
    }
    let local_mean = gaussian_blur_f32(gray, sigma_for_block(block_size));
    threshold_against(gray, &local_mean, c)
}

/// Locally adaptive threshold against a plain box mean.
pub fn adaptive_threshold_mean(gray: &GrayImage, block_size: u32, c: i32) -> GrayImage {
    if gray.width() == 0 || gray.height() == 0 {
        return gray.clone();
    }
    let radius = odd_block(block_size) / 2;
    let local_mean = box_filter(gray, radius, radius);
    threshold_against(gray, &local_mean, c)
}

/// Gaussian blur with the sigma a `kernel`-pixel square kernel implies.
pub fn gaussian_blur(gray: &GrayImage, kernel: u32) -> GrayImage {
    if gray.width() == 0 || gray.height() == 0 {
        return gray.clone();
    }
    gaussian_blur_f32(gray, sigma_for_block(kernel))
}

/// Builds the equalization table for one CLAHE tile.
fn clahe_tile_lut(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if area == 0 {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
        return lut;
    }

    if clip_limit > 0.0 {
        let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > clip {
                excess += *bin - clip;
                *bin = clip;
            }
        }
        let share = excess / 256;
        let remainder = (excess % 256) as usize;
        for (i, bin) in hist.iter_mut().enumerate() {
            *bin += share + u32::from(i < remainder);
        }
    }

    let mut cdf = 0u64;
    for (i, bin) in hist.iter().enumerate() {
        cdf += *bin as u64;
        lut[i] = ((cdf * 255 + area as u64 / 2) / area as u64).min(255) as u8;
    }
    lut
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into `grid`×`grid` tiles (fewer when the image is
/// smaller than the grid). Each tile gets its own clipped equalization table
/// and pixels are bilinearly interpolated between the four nearest tiles.
pub fn clahe(gray: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }

    let tiles_x = grid.clamp(1, w);
    let tiles_y = grid.clamp(1, h);
    let tile_w = w / tiles_x;
    let tile_h = h / tiles_y;

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        let y0 = ty * tile_h;
        let y1 = if ty == tiles_y - 1 { h } else { y0 + tile_h };
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let x1 = if tx == tiles_x - 1 { w } else { x0 + tile_w };

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            luts.push(clahe_tile_lut(&mut hist, (x1 - x0) * (y1 - y0), clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32, v: usize| luts[(ty * tiles_x + tx) as usize][v] as f32;

    ImageBuffer::from_fn(w, h, |x, y| {
        let v = gray.get_pixel(x, y)[0] as usize;

        let fx = ((x as f32 + 0.5) / tile_w as f32 - 0.5).clamp(0.0, (tiles_x - 1) as f32);
        let fy = ((y as f32 + 0.5) / tile_h as f32 - 0.5).clamp(0.0, (tiles_y - 1) as f32);
        let tx0 = fx.floor() as u32;
        let ty0 = fy.floor() as u32;
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let ax = fx - tx0 as f32;
        let ay = fy - ty0 as f32;

        let top = lut_at(tx0, ty0, v) * (1.0 - ax) + lut_at(tx1, ty0, v) * ax;
        let bottom = lut_at(tx0, ty1, v) * (1.0 - ax) + lut_at(tx1, ty1, v) * ax;
        Luma([(top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8])
    })
}

/// Applies `out = 255 * (in / 255) ^ gamma`.
pub fn gamma_correct(gray: &GrayImage, gamma: f32) -> GrayImage {
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = ((i as f32 / 255.0).powf(gamma) * 255.0).clamp(0.0, 255.0) as u8;
    }
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p[0] = lut[p[0] as usize];
    }
    out
}

/// Pads the image with a constant white border.
pub fn add_border(gray: &GrayImage, size: u32) -> GrayImage {
    let mut canvas = GrayImage::from_pixel(
        gray.width() + 2 * size,
        gray.height() + 2 * size,
        Luma([255u8]),
    );
    imageops::replace(&mut canvas, gray, size as i64, size as i64);
    canvas
}

/// Scale factor that brings a `width`×`height` crop to the target resolution.
///
/// Starts from `target_dpi / source_dpi`, shrinks it so the longest side stays
/// within `max_dimension`, then clamps to `[min_scale, max_scale]`.
pub fn rescale_factor(width: u32, height: u32, config: &VariantConfig) -> f32 {
    let mut factor = config.target_dpi / config.source_dpi.max(1.0);
    let longest = width.max(height) as f32;
    if longest > 0.0 && longest * factor > config.max_dimension as f32 {
        factor = config.max_dimension as f32 / longest;
    }
    factor.max(config.min_scale).min(config.max_scale)
}

/// Resamples by `factor`: cubic when enlarging, blur + triangle when shrinking.
pub fn rescale(gray: &GrayImage, factor: f32) -> Result<GrayImage, VariantError> {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return Err(VariantError::EmptyImage);
    }

    let overflow = VariantError::ScaleOverflow { width: w, height: h, factor };
    if !factor.is_finite() || factor <= 0.0 {
        return Err(overflow);
    }

    let new_w = (w as f32 * factor).round();
    let new_h = (h as f32 * factor).round();
    if new_w < 1.0 || new_h < 1.0 || (new_w as u64) * (new_h as u64) > MAX_RESCALED_PIXELS {
        return Err(overflow);
    }
    let (new_w, new_h) = (new_w as u32, new_h as u32);

    if (new_w, new_h) == (w, h) {
        return Ok(gray.clone());
    }

    if factor > 1.0 {
        Ok(imageops::resize(gray, new_w, new_h, FilterType::CatmullRom))
    } else {
        let sigma = ((1.0 / factor) - 1.0).max(0.3) * 0.5;
        let smoothed = gaussian_blur_f32(gray, sigma);
        Ok(imageops::resize(&smoothed, new_w, new_h, FilterType::Triangle))
    }
}

/// Estimates text skew from dominant Hough lines and rotates it level.
///
/// Returns a copy of the input when no near-horizontal line is found or the
/// skew is negligible.
pub fn deskew(gray: &GrayImage) -> GrayImage {
    if gray.width() < 3 || gray.height() < 3 {
        return gray.clone();
    }

    let edges = canny(gray, 50.0, 150.0);
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold: 100,
            suppression_radius: 8,
        },
    );

    // Normal angle 90° is a horizontal line.
    let skews: Vec<f32> = lines
        .iter()
        .take(DESKEW_MAX_LINES)
        .filter(|line| (45..=135).contains(&line.angle_in_degrees))
        .map(|line| line.angle_in_degrees as f32 - 90.0)
        .collect();

    if skews.is_empty() {
        return gray.clone();
    }

    let skew = skews.iter().sum::<f32>() / skews.len() as f32;
    if skew.abs() < DESKEW_MIN_ANGLE {
        return gray.clone();
    }

    log::debug!("Deskewing by {:.2}°", skew);
    rotate_about_center(gray, -skew.to_radians(), Interpolation::Bilinear, Luma([255u8]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> GrayImage {
        ImageBuffer::from_fn(w, h, |x, _| Luma([(x * 255 / w.max(1)) as u8]))
    }

    #[test]
    fn test_crop_region() {
        // 100x200 image
        let img: RgbaImage =
            ImageBuffer::from_fn(100, 200, |x, y| Rgba([x as u8, y as u8, 0, 255]));

        let region = RelativeRect {
            x: 0.1,
            y: 0.25,
            width: 0.5,
            height: 0.1,
        };
        let cropped = crop_region(&img, &region);

        assert_eq!(cropped.dimensions(), (50, 20));
        // Top-left pixel should be (10, 50) from original
        assert_eq!(cropped.get_pixel(0, 0)[0], 10);
        assert_eq!(cropped.get_pixel(0, 0)[1], 50);
    }

    #[test]
    fn test_crop_region_clamps() {
        let img: RgbaImage = ImageBuffer::new(100, 100);
        let region = RelativeRect {
            x: 0.9,
            y: 0.9,
            width: 0.5,
            height: 0.5,
        };
        let cropped = crop_region(&img, &region);

        // Should clamp to 10x10 (remaining pixels)
        assert_eq!(cropped.dimensions(), (10, 10));
    }

    #[test]
    fn test_binarize() {
        let mut img = GrayImage::new(3, 1);
        img.put_pixel(0, 0, Luma([100]));
        img.put_pixel(1, 0, Luma([200]));
        img.put_pixel(2, 0, Luma([150]));

        let out = binarize(&img, 150);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 0)[0], 255);
        assert_eq!(out.get_pixel(2, 0)[0], 0, "Equal to level stays dark");
    }

    #[test]
    fn test_otsu_splits_two_tones() {
        let img = ImageBuffer::from_fn(20, 10, |x, _| {
            if x < 10 {
                Luma([30u8])
            } else {
                Luma([220u8])
            }
        });
        let out = otsu_binarize(&img);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(19, 9)[0], 255);
    }

    #[test]
    fn test_adaptive_threshold_flat_image_is_white() {
        // Every pixel equals its local mean, and mean - c is below it.
        let img = GrayImage::from_pixel(16, 16, Luma([128]));
        let out = adaptive_threshold_gaussian(&img, 11, 2);
        assert!(out.pixels().all(|p| p[0] == 255));

        let out = adaptive_threshold_mean(&img, 15, 3);
        assert!(out.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_adaptive_threshold_dark_dot() {
        let mut img = GrayImage::from_pixel(21, 21, Luma([200]));
        img.put_pixel(10, 10, Luma([20]));
        let out = adaptive_threshold_mean(&img, 11, 2);
        assert_eq!(out.get_pixel(10, 10)[0], 0);
        assert_eq!(out.get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn test_clahe_keeps_dimensions_and_flat_stays_flat() {
        let img = GrayImage::from_pixel(40, 30, Luma([90]));
        let out = clahe(&img, 2.0, 8);
        assert_eq!(out.dimensions(), (40, 30));
        let first = out.get_pixel(0, 0)[0];
        assert!(out.pixels().all(|p| p[0] == first));
    }

    #[test]
    fn test_clahe_tiny_image() {
        let img = gradient(3, 2);
        let out = clahe(&img, 2.0, 8);
        assert_eq!(out.dimensions(), (3, 2));
    }

    #[test]
    fn test_clahe_preserves_ordering() {
        let img = gradient(64, 8);
        let out = clahe(&img, 2.0, 1);
        let row: Vec<u8> = (0..64).map(|x| out.get_pixel(x, 0)[0]).collect();
        assert!(row.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_gamma_endpoints() {
        let mut img = GrayImage::new(2, 1);
        img.put_pixel(0, 0, Luma([0]));
        img.put_pixel(1, 0, Luma([255]));
        let out = gamma_correct(&img, 1.2);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn test_add_border() {
        let img = GrayImage::from_pixel(4, 3, Luma([0]));
        let out = add_border(&img, 10);
        assert_eq!(out.dimensions(), (24, 23));
        assert_eq!(out.get_pixel(0, 0)[0], 255);
        assert_eq!(out.get_pixel(10, 10)[0], 0);
    }

    #[test]
    fn test_rescale_factor_clamps() {
        let config = VariantConfig::default();
        // 300/72 = 4.17, clamped to max_scale 4.0
        assert!((rescale_factor(100, 50, &config) - 4.0).abs() < 1e-4);
        // A huge crop is limited by max_dimension
        let f = rescale_factor(2000, 100, &config);
        assert!((f - 2.0).abs() < 1e-4);
        // Never below min_scale
        let f = rescale_factor(40_000, 100, &config);
        assert!((f - config.min_scale).abs() < 1e-4);
    }

    #[test]
    fn test_rescale_up_and_down() {
        let img = gradient(10, 5);
        assert_eq!(rescale(&img, 2.0).unwrap().dimensions(), (20, 10));
        assert_eq!(rescale(&img, 0.5).unwrap().dimensions(), (5, 3));
        assert_eq!(rescale(&img, 1.0).unwrap().dimensions(), (10, 5));
    }

    #[test]
    fn test_rescale_errors() {
        assert!(matches!(rescale(&GrayImage::new(0, 5), 2.0), Err(VariantError::EmptyImage)));
        assert!(matches!(
            rescale(&gradient(10, 10), f32::NAN),
            Err(VariantError::ScaleOverflow { .. })
        ));
        assert!(matches!(
            rescale(&gradient(10, 10), 10_000.0),
            Err(VariantError::ScaleOverflow { .. })
        ));
    }

    #[test]
    fn test_deskew_blank_image_unchanged() {
        let img = GrayImage::from_pixel(50, 20, Luma([255]));
        let out = deskew(&img);
        assert_eq!(out, img);
    }
}
