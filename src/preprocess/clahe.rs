//! Contrast-limited adaptive histogram equalization.
//!
//! The image is split into a grid of tiles. Each tile gets its own
//! equalization lookup table, built from a histogram whose tall bins are
//! clipped and redistributed so that flat regions don't have their noise
//! amplified. Each output pixel is a bilinear blend of the lookup tables of
//! the four nearest tile centres, which hides the tile seams.

use image::{GrayImage, Luma};

/// Equalize `image` using `grid` (`[columns, rows]`) tiles.
///
/// `clip_limit` is relative to the mean bin height of a tile histogram, so
/// `1.0` disables equalization almost completely and large values approach
/// plain per-tile histogram equalization.
pub fn clahe(image: &GrayImage, clip_limit: f32, grid: [u32; 2]) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    // Never use more tiles than there are pixels along an axis.
    let tiles_x = grid[0].clamp(1, width);
    let tiles_y = grid[1].clamp(1, height);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            luts.push(tile_lut(
                image,
                tile_span(width, tiles_x, tx),
                tile_span(height, tiles_y, ty),
                clip_limit,
            ));
        }
    }

    let tile_width = width as f32 / tiles_x as f32;
    let tile_height = height as f32 / tiles_y as f32;
    GrayImage::from_fn(width, height, |x, y| {
        let (x0, x1, ax) = neighbouring_tiles(x, tile_width, tiles_x);
        let (y0, y1, ay) = neighbouring_tiles(y, tile_height, tiles_y);
        let value = image.get_pixel(x, y)[0] as usize;
        let lookup =
            |tx: u32, ty: u32| f32::from(luts[(ty * tiles_x + tx) as usize][value]);

        let top = lookup(x0, y0) * (1.0 - ax) + lookup(x1, y0) * ax;
        let bottom = lookup(x0, y1) * (1.0 - ax) + lookup(x1, y1) * ax;
        let blended = top * (1.0 - ay) + bottom * ay;
        Luma([blended.round().clamp(0.0, 255.0) as u8])
    })
}

/// The half-open pixel range covered by tile `index` along one axis.
fn tile_span(len: u32, tiles: u32, index: u32) -> (u32, u32) {
    let start = u64::from(index) * u64::from(len) / u64::from(tiles);
    let end = u64::from(index + 1) * u64::from(len) / u64::from(tiles);
    (start as u32, end as u32)
}

/// The two tiles whose centres surround `pos`, and the weight of the second.
fn neighbouring_tiles(pos: u32, tile_size: f32, tiles: u32) -> (u32, u32, f32) {
    let centre_offset = (pos as f32 + 0.5) / tile_size - 0.5;
    if centre_offset <= 0.0 {
        return (0, 0, 0.0);
    }
    let first = centre_offset.floor() as u32;
    if first >= tiles - 1 {
        return (tiles - 1, tiles - 1, 0.0);
    }
    (first, first + 1, centre_offset - first as f32)
}

/// Build the clipped equalization table for one tile.
fn tile_lut(
    image: &GrayImage,
    (x_start, x_end): (u32, u32),
    (y_start, y_end): (u32, u32),
    clip_limit: f32,
) -> [u8; 256] {
    let mut histogram = [0u32; 256];
    for y in y_start..y_end {
        for x in x_start..x_end {
            histogram[image.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let area = (x_end - x_start) * (y_end - y_start);
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);

    let mut excess = 0;
    for bin in histogram.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }

    // Spread the clipped counts evenly, with any remainder going to the
    // lowest bins, so the histogram still sums to `area`.
    let share = excess / 256;
    let remainder = excess % 256;
    for (i, bin) in histogram.iter_mut().enumerate() {
        *bin += share + u32::from((i as u32) < remainder);
    }

    let mut lut = [0u8; 256];
    let mut cumulative = 0u64;
    let area = u64::from(area);
    for (entry, &count) in lut.iter_mut().zip(histogram.iter()) {
        cumulative += u64::from(count);
        *entry = ((cumulative * 255 + area / 2) / area).min(255) as u8;
    }
    lut
}
