//! Binarization.
//!
//! Both functions produce pure black (0) and white (255) images. Dark ink
//! ends up black.

use image::{GrayImage, Luma};
use imageproc::{contrast::otsu_level, filter::gaussian_blur_f32};

/// Binarize with a single global threshold chosen by Otsu's method.
///
/// Returns the image and the threshold that was used.
pub fn otsu(image: &GrayImage) -> (GrayImage, u8) {
    let level = otsu_level(image);
    let output = GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y)[0] > level {
            Luma([255])
        } else {
            Luma([0])
        }
    });
    (output, level)
}

/// Binarize against a Gaussian-weighted local mean.
///
/// A pixel is white if it is brighter than its neighbourhood mean minus
/// `offset`. The Gaussian's sigma is derived from `block_size` the same way
/// common vision libraries derive it for a kernel of that width, so a block
/// size of 11 gives a sigma of 2.0.
pub fn adaptive(image: &GrayImage, block_size: u32, offset: i16) -> GrayImage {
    let local_mean = gaussian_blur_f32(image, sigma_for_block(block_size));
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let value = i32::from(image.get_pixel(x, y)[0]);
        let mean = i32::from(local_mean.get_pixel(x, y)[0]);
        if value > mean - i32::from(offset) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Gaussian sigma for an odd kernel width.
fn sigma_for_block(block_size: u32) -> f32 {
    0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}
