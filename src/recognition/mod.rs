//! Recognition engine interface.
//!
//! An engine turns one [`ImageVariant`] into text lines with confidences,
//! under one page-segmentation assumption. Everything downstream (selection,
//! column structuring, export) only sees [`TrialResult`]s, so any engine that
//! can produce lines and confidences plugs in here.

use std::{fmt, sync::Arc};

use crate::{
    config::PipelineConfig,
    errors::PipelineError,
    preprocess::{ImageVariant, VariantKind},
    prelude::*,
};

pub mod tesseract;
pub mod tsv;

/// A page-segmentation assumption passed to the engine.
///
/// Declaration order is priority order: when two trials are equally
/// confident, the one whose config is declared first wins.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum RecognitionConfig {
    /// A single uniform block of text.
    UniformBlock,
    /// A single column of text of variable sizes.
    SingleColumn,
    /// Fully automatic page segmentation.
    Auto,
    /// As much text as possible, in no particular order.
    Sparse,
    /// Sparse text, with orientation and script detection.
    SparseOsd,
}

impl RecognitionConfig {
    /// Every config, in priority order.
    pub const ALL: [RecognitionConfig; 5] = [
        RecognitionConfig::UniformBlock,
        RecognitionConfig::SingleColumn,
        RecognitionConfig::Auto,
        RecognitionConfig::Sparse,
        RecognitionConfig::SparseOsd,
    ];

    /// A short identifier, safe for use in file names.
    pub fn id(self) -> &'static str {
        match self {
            RecognitionConfig::UniformBlock => "uniform-block",
            RecognitionConfig::SingleColumn => "single-column",
            RecognitionConfig::Auto => "auto",
            RecognitionConfig::Sparse => "sparse",
            RecognitionConfig::SparseOsd => "sparse-osd",
        }
    }

    /// Tesseract's `--psm` value for this config.
    pub fn page_segmentation_mode(self) -> u8 {
        match self {
            RecognitionConfig::UniformBlock => 6,
            RecognitionConfig::SingleColumn => 4,
            RecognitionConfig::Auto => 3,
            RecognitionConfig::Sparse => 11,
            RecognitionConfig::SparseOsd => 12,
        }
    }

    /// Does this config expect a continuous-tone photograph, where layout
    /// analysis measures text density on the original shading?
    pub fn assumes_photograph(self) -> bool {
        matches!(
            self,
            RecognitionConfig::Auto
                | RecognitionConfig::Sparse
                | RecognitionConfig::SparseOsd
        )
    }

    /// Position in the priority order. Lower wins ties.
    pub fn priority(self) -> usize {
        self as usize
    }
}

impl fmt::Display for RecognitionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Identifies one variant/config pairing.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TrialId {
    pub variant: VariantKind,
    pub config: RecognitionConfig,
}

impl TrialId {
    /// Sort key for tie-breaking: config priority first, then variant.
    pub fn priority(self) -> (usize, usize) {
        (self.config.priority(), self.variant.priority())
    }
}

impl fmt::Display for TrialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.variant, self.config)
    }
}

/// One recognized line of text.
#[derive(Clone, Debug, PartialEq)]
pub struct RecognizedLine {
    pub text: String,
    /// Mean confidence of the line's tokens, from 0 to 100.
    pub confidence: f32,
}

impl RecognizedLine {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Everything one trial produced.
#[derive(Clone, Debug)]
pub struct TrialResult {
    pub id: TrialId,
    pub lines: Vec<RecognizedLine>,
    /// Set if the engine failed on this trial. Such a trial has no lines.
    pub error: Option<String>,
}

impl TrialResult {
    pub fn new(id: TrialId, lines: Vec<RecognizedLine>) -> Self {
        Self {
            id,
            lines,
            error: None,
        }
    }

    /// A trial that failed. It scores as a guaranteed loser.
    pub fn failed(id: TrialId, error: &anyhow::Error) -> Self {
        Self {
            id,
            lines: vec![],
            error: Some(format!("{error:#}")),
        }
    }

    /// Mean of the per-line confidences, or negative infinity if there are
    /// no lines.
    pub fn mean_confidence(&self) -> f64 {
        if self.lines.is_empty() {
            return f64::NEG_INFINITY;
        }
        let total = self
            .lines
            .iter()
            .map(|line| f64::from(line.confidence))
            .sum::<f64>();
        total / self.lines.len() as f64
    }

    /// The recognized text, one entry per line.
    pub fn texts(&self) -> Vec<String> {
        self.lines.iter().map(|line| line.text.clone()).collect()
    }
}

/// Interface to a recognition engine.
#[async_trait]
pub trait RecognitionEngine: Send + Sync + 'static {
    /// A human-readable name, used in logs and diagnostics.
    fn name(&self) -> &str;

    /// The recognition language, if the engine has one.
    fn language(&self) -> Option<&str> {
        None
    }

    /// Make sure the engine can run at all. Called once, before any trials.
    async fn check_available(&self) -> Result<(), PipelineError>;

    /// Recognize the lines of `variant` under `config`.
    ///
    /// Lines without any confident tokens must be left out.
    async fn recognize(
        &self,
        variant: &ImageVariant,
        config: RecognitionConfig,
    ) -> Result<Vec<RecognizedLine>>;
}

/// Get the engine with the specified name.
pub fn engine_for_name(
    name: &str,
    config: &PipelineConfig,
) -> Result<Arc<dyn RecognitionEngine>> {
    match name {
        "tesseract" => Ok(Arc::new(tesseract::TesseractEngine::new(
            config.engine_command.clone(),
            config.lang.clone(),
        ))),
        _ => Err(anyhow!("unknown recognition engine {:?}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> TrialId {
        TrialId {
            variant: VariantKind::Otsu,
            config: RecognitionConfig::UniformBlock,
        }
    }

    #[test]
    fn empty_trials_score_negative_infinity() {
        let trial = TrialResult::new(id(), vec![]);
        assert_eq!(trial.mean_confidence(), f64::NEG_INFINITY);
    }

    #[test]
    fn trial_confidence_is_the_mean_of_line_confidences() {
        let trial = TrialResult::new(
            id(),
            vec![RecognizedLine::new("a", 90.0), RecognizedLine::new("b", 70.0)],
        );
        assert!((trial.mean_confidence() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn failed_trials_keep_their_error() {
        let trial = TrialResult::failed(id(), &anyhow!("tesseract crashed"));
        assert!(trial.lines.is_empty());
        assert_eq!(trial.error.as_deref(), Some("tesseract crashed"));
    }

    #[test]
    fn priority_orders_match_declarations() {
        let psms = RecognitionConfig::ALL
            .iter()
            .map(|c| c.page_segmentation_mode())
            .collect::<Vec<_>>();
        assert_eq!(psms, vec![6, 4, 3, 11, 12]);
        for (i, config) in RecognitionConfig::ALL.iter().enumerate() {
            assert_eq!(config.priority(), i);
        }
    }

    #[test]
    fn unknown_engines_are_rejected() {
        assert!(engine_for_name("ouija", &PipelineConfig::default()).is_err());
    }
}
