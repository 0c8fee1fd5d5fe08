//! Command-line entry points.

use clap::Args;

use crate::{config::PipelineConfig, prelude::*};

pub mod ocr;
pub mod structure;

/// Options that change how images are cleaned up before recognition.
#[derive(Debug, Clone, Args)]
pub struct PreprocessOpts {
    /// Upscale images whose long edge is shorter than this many pixels.
    #[clap(long, value_name = "PIXELS")]
    min_long_edge: Option<u32>,

    /// Contrast clip limit for local equalization.
    #[clap(long)]
    clip_limit: Option<f32>,

    /// Neighbourhood size for adaptive thresholding. Must be odd.
    #[clap(long, value_name = "PIXELS")]
    block_size: Option<u32>,
}

/// Options for the recognition engine and trial runner.
#[derive(Debug, Clone, Args)]
pub struct RecognitionOpts {
    /// Recognition language, in tesseract's notation (e.g. `eng`, `fra`,
    /// `eng+deu`).
    #[clap(short = 'l', long)]
    lang: Option<String>,

    /// Path to the `tesseract` binary.
    #[clap(long, value_name = "PATH")]
    tesseract: Option<String>,

    /// Max number of trials to run at a time.
    #[clap(short = 'j', long = "jobs")]
    job_count: Option<usize>,

    /// Try every image variant with every page segmentation mode.
    #[clap(long)]
    exhaustive: bool,
}

impl PreprocessOpts {
    /// Override config values with any flags that were given.
    pub fn apply_to(&self, config: &mut PipelineConfig) {
        if let Some(min_long_edge) = self.min_long_edge {
            config.min_long_edge = min_long_edge;
        }
        if let Some(clip_limit) = self.clip_limit {
            config.clahe_clip_limit = clip_limit;
        }
        if let Some(block_size) = self.block_size {
            config.adaptive_block_size = block_size;
        }
    }
}

impl RecognitionOpts {
    /// Override config values with any flags that were given.
    pub fn apply_to(&self, config: &mut PipelineConfig) {
        if let Some(lang) = &self.lang {
            config.lang = lang.clone();
        }
        if let Some(tesseract) = &self.tesseract {
            config.engine_command = tesseract.clone();
        }
        if let Some(job_count) = self.job_count {
            config.jobs = job_count;
        }
        if self.exhaustive {
            config.exhaustive = true;
        }
    }
}

/// Load the config file (if any), then apply command-line overrides.
pub async fn load_config(
    path: Option<&Path>,
    preprocess: &PreprocessOpts,
    recognition: &RecognitionOpts,
) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(path).await?;
    preprocess.apply_to(&mut config);
    recognition.apply_to(&mut config);
    config.validate()?;
    debug!(?config, "Using config");
    Ok(config)
}
