//! Pipeline configuration.
//!
//! Values come from built-in defaults, then an optional TOML or JSON file,
//! then command-line flags (see [`crate::cmd::ocr`]).

use crate::{async_utils::io::read_json_or_toml, prelude::*};

/// Tunable parameters for preprocessing and recognition.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Images whose long edge is shorter than this are upscaled first.
    pub min_long_edge: u32,

    /// CLAHE contrast clip limit, as a multiple of the mean tile histogram
    /// bin height.
    pub clahe_clip_limit: f32,

    /// CLAHE tile grid, as `[columns, rows]`.
    pub clahe_tile_grid: [u32; 2],

    /// Median denoising radius. 1 means a 3x3 window.
    pub denoise_radius: u32,

    /// Neighbourhood size for adaptive thresholding. Must be odd.
    pub adaptive_block_size: u32,

    /// Constant subtracted from the local mean in adaptive thresholding.
    pub adaptive_offset: i16,

    /// Language passed to the recognition engine.
    pub lang: String,

    /// The recognition engine binary.
    pub engine_command: String,

    /// How many trials may run at once.
    pub jobs: usize,

    /// Run every variant against every config, ignoring the exclusion policy.
    pub exhaustive: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_long_edge: 1000,
            clahe_clip_limit: 2.0,
            clahe_tile_grid: [8, 8],
            denoise_radius: 1,
            adaptive_block_size: 11,
            adaptive_offset: 2,
            lang: "eng".to_owned(),
            engine_command: std::env::var("TABLESCAN_TESSERACT")
                .unwrap_or_else(|_| "tesseract".to_owned()),
            jobs: num_cpus::get(),
            exhaustive: false,
        }
    }
}

impl PipelineConfig {
    /// Load a config file, or return defaults if there is none.
    #[instrument(level = "debug")]
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => read_json_or_toml::<PipelineConfig>(path).await?,
            None => PipelineConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the image operations cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.adaptive_block_size < 3 || self.adaptive_block_size % 2 == 0 {
            return Err(anyhow!(
                "adaptive_block_size must be an odd number >= 3, got {}",
                self.adaptive_block_size
            ));
        }
        if self.adaptive_offset.unsigned_abs() > 255 {
            return Err(anyhow!(
                "adaptive_offset must be between -255 and 255, got {}",
                self.adaptive_offset
            ));
        }
        if self.clahe_tile_grid.contains(&0) {
            return Err(anyhow!("clahe_tile_grid entries must be non-zero"));
        }
        if self.clahe_clip_limit.is_nan() || self.clahe_clip_limit <= 0.0 {
            return Err(anyhow!(
                "clahe_clip_limit must be positive, got {}",
                self.clahe_clip_limit
            ));
        }
        if self.jobs == 0 {
            return Err(anyhow!("jobs must be at least 1"));
        }
        Ok(())
    }
}
