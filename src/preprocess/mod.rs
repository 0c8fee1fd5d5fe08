//! Turn one source image into a fixed set of recognition candidates.
//!
//! Photographed tables suffer from uneven lighting, sensor noise and small
//! text. We don't know in advance which cleanup works best for a given photo,
//! so we produce several variants and let recognition confidence decide.

use std::fmt;

use image::{DynamicImage, GrayImage, ImageReader, imageops::FilterType};
use imageproc::filter::median_filter;

use crate::{config::PipelineConfig, errors::PipelineError, prelude::*};

pub mod clahe;
pub mod threshold;

/// A decoded input image. Never modified once loaded.
#[derive(Clone, Debug)]
pub struct SourceImage {
    image: DynamicImage,
}

impl SourceImage {
    /// Load and decode an image, guessing its format from its contents.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        let image_load = |reason: String| PipelineError::ImageLoad {
            path: path.to_owned(),
            reason,
        };
        let image = ImageReader::open(path)
            .map_err(|err| image_load(err.to_string()))?
            .with_guessed_format()
            .map_err(|err| image_load(err.to_string()))?
            .decode()
            .map_err(|err| image_load(err.to_string()))?;
        debug!(width = image.width(), height = image.height(), "Loaded image");
        Ok(Self { image })
    }

    /// Wrap an already-decoded image.
    #[cfg(test)]
    pub fn from_image(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// The kinds of variant we produce, in their fixed priority order.
///
/// The declaration order is the order in which [`Preprocessor::derive`]
/// returns variants, and it breaks ties between equally confident trials.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum VariantKind {
    /// Upscaled single-channel intensity.
    Grayscale,
    /// Locally equalized and denoised.
    Equalized,
    /// Global Otsu binarization of [`VariantKind::Equalized`].
    Otsu,
    /// Local adaptive binarization of [`VariantKind::Equalized`].
    Adaptive,
}

impl VariantKind {
    /// Every variant kind, in priority order.
    pub const ALL: [VariantKind; 4] = [
        VariantKind::Grayscale,
        VariantKind::Equalized,
        VariantKind::Otsu,
        VariantKind::Adaptive,
    ];

    /// A short identifier, safe for use in file names.
    pub fn id(self) -> &'static str {
        match self {
            VariantKind::Grayscale => "grayscale",
            VariantKind::Equalized => "equalized",
            VariantKind::Otsu => "otsu",
            VariantKind::Adaptive => "adaptive",
        }
    }

    /// Has this variant been reduced to pure black and white?
    pub fn is_binarized(self) -> bool {
        matches!(self, VariantKind::Otsu | VariantKind::Adaptive)
    }

    /// Position in the priority order. Lower wins ties.
    pub fn priority(self) -> usize {
        self as usize
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// The parameters used to derive a variant.
#[derive(Clone, Debug, PartialEq)]
pub enum VariantParams {
    Grayscale {
        /// How much the source was upscaled. 1.0 if it was large enough.
        scale: f32,
    },
    Equalized {
        clip_limit: f32,
        tile_grid: [u32; 2],
        denoise_radius: u32,
    },
    Otsu {
        /// The global threshold Otsu's method picked.
        level: u8,
    },
    Adaptive {
        block_size: u32,
        offset: i16,
    },
}

impl fmt::Display for VariantParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantParams::Grayscale { scale } => write!(f, "scale={scale:.3}"),
            VariantParams::Equalized {
                clip_limit,
                tile_grid,
                denoise_radius,
            } => write!(
                f,
                "clip_limit={clip_limit} tile_grid={}x{} denoise_radius={denoise_radius}",
                tile_grid[0], tile_grid[1]
            ),
            VariantParams::Otsu { level } => write!(f, "level={level}"),
            VariantParams::Adaptive { block_size, offset } => {
                write!(f, "block_size={block_size} offset={offset}")
            }
        }
    }
}

/// One preprocessed version of the source image.
#[derive(Clone, Debug)]
pub struct ImageVariant {
    pub kind: VariantKind,
    pub image: GrayImage,
    pub params: VariantParams,
}

/// Derives [`ImageVariant`]s from a [`SourceImage`].
#[derive(Clone, Debug)]
pub struct Preprocessor {
    min_long_edge: u32,
    clip_limit: f32,
    tile_grid: [u32; 2],
    denoise_radius: u32,
    adaptive_block_size: u32,
    adaptive_offset: i16,
}

impl Preprocessor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            min_long_edge: config.min_long_edge,
            clip_limit: config.clahe_clip_limit,
            tile_grid: config.clahe_tile_grid,
            denoise_radius: config.denoise_radius,
            adaptive_block_size: config.adaptive_block_size,
            adaptive_offset: config.adaptive_offset,
        }
    }

    /// Produce every variant, in [`VariantKind::ALL`] order.
    ///
    /// This is CPU-heavy. Call it from a blocking thread.
    #[instrument(
        level = "debug",
        skip_all,
        fields(width = source.width(), height = source.height())
    )]
    pub fn derive(&self, source: &SourceImage) -> Vec<ImageVariant> {
        // Small text recognizes badly, so upscale before doing anything else.
        let scale = self.upscale_factor(source.width(), source.height());
        let grayscale = if scale > 1.0 {
            let width = (source.width() as f32 * scale).round() as u32;
            let height = (source.height() as f32 * scale).round() as u32;
            debug!(width, height, scale, "Upscaling small image");
            source
                .image
                .resize_exact(width, height, FilterType::CatmullRom)
                .to_luma8()
        } else {
            source.image.to_luma8()
        };

        // A global equalization can't fix shadow gradients, so work per tile,
        // then smooth away the noise that equalization amplifies.
        let equalized = clahe::clahe(&grayscale, self.clip_limit, self.tile_grid);
        let equalized =
            median_filter(&equalized, self.denoise_radius, self.denoise_radius);

        // Neither binarization wins across all lighting conditions, so keep
        // both.
        let (otsu, level) = threshold::otsu(&equalized);
        let adaptive = threshold::adaptive(
            &equalized,
            self.adaptive_block_size,
            self.adaptive_offset,
        );
        trace!(level, "Computed Otsu threshold");

        let variants = vec![
            ImageVariant {
                kind: VariantKind::Grayscale,
                image: grayscale,
                params: VariantParams::Grayscale { scale },
            },
            ImageVariant {
                kind: VariantKind::Equalized,
                image: equalized,
                params: VariantParams::Equalized {
                    clip_limit: self.clip_limit,
                    tile_grid: self.tile_grid,
                    denoise_radius: self.denoise_radius,
                },
            },
            ImageVariant {
                kind: VariantKind::Otsu,
                image: otsu,
                params: VariantParams::Otsu { level },
            },
            ImageVariant {
                kind: VariantKind::Adaptive,
                image: adaptive,
                params: VariantParams::Adaptive {
                    block_size: self.adaptive_block_size,
                    offset: self.adaptive_offset,
                },
            },
        ];
        for variant in &variants {
            debug!(variant = %variant.kind, params = %variant.params, "Derived variant");
        }
        variants
    }

    /// How much to enlarge an image so its long edge reaches
    /// `min_long_edge`. Never shrinks.
    fn upscale_factor(&self, width: u32, height: u32) -> f32 {
        let long_edge = width.max(height);
        if long_edge == 0 || long_edge >= self.min_long_edge {
            1.0
        } else {
            self.min_long_edge as f32 / long_edge as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use image::{Luma, RgbImage};

    use super::*;

    fn preprocessor(min_long_edge: u32) -> Preprocessor {
        Preprocessor::new(&PipelineConfig {
            min_long_edge,
            ..PipelineConfig::default()
        })
    }

    /// A light page with a darker band of "text" and a shadow on the right.
    fn sample_source() -> SourceImage {
        let image = RgbImage::from_fn(120, 80, |x, y| {
            let shade = 220 - (x / 3) as u8;
            let value = if (30..40).contains(&y) && x % 6 < 3 {
                shade - 120
            } else {
                shade
            };
            image::Rgb([value, value, value])
        });
        SourceImage::from_image(DynamicImage::ImageRgb8(image))
    }

    #[test]
    fn variants_come_out_in_priority_order() {
        let variants = preprocessor(100).derive(&sample_source());
        let kinds = variants.iter().map(|v| v.kind).collect::<Vec<_>>();
        assert_eq!(kinds, VariantKind::ALL.to_vec());
    }

    #[test]
    fn small_images_are_upscaled_on_the_long_edge() {
        let variants = preprocessor(240).derive(&sample_source());
        for variant in &variants {
            assert_eq!(variant.image.dimensions(), (240, 160));
        }
        assert_eq!(variants[0].params, VariantParams::Grayscale { scale: 2.0 });
    }

    #[test]
    fn large_images_are_left_alone() {
        let variants = preprocessor(100).derive(&sample_source());
        assert_eq!(variants[0].image.dimensions(), (120, 80));
        assert_eq!(variants[0].params, VariantParams::Grayscale { scale: 1.0 });
    }

    #[test]
    fn binarized_variants_are_black_and_white() {
        let variants = preprocessor(100).derive(&sample_source());
        for variant in variants.iter().filter(|v| v.kind.is_binarized()) {
            assert!(
                variant.image.pixels().all(|&Luma([p])| p == 0 || p == 255),
                "{} is not binary",
                variant.kind
            );
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let preprocessor = preprocessor(100);
        let first = preprocessor.derive(&sample_source());
        let second = preprocessor.derive(&sample_source());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.image, b.image);
            assert_eq!(a.params, b.params);
        }
    }

    #[test]
    fn missing_images_are_typed_errors() {
        let err = SourceImage::open(Path::new("/nonexistent/scan.png")).unwrap_err();
        assert!(matches!(err, PipelineError::ImageLoad { .. }));
    }
}
