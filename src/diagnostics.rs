//! Optional diagnostic output.
//!
//! When a caller asks for it, the pipeline reports every variant image and
//! every trial result to a [`DiagnosticSink`]. Nothing in the pipeline
//! depends on the sink succeeding.

use std::{fmt::Write as _, fs};

use crate::{
    preprocess::{ImageVariant, VariantKind},
    prelude::*,
    recognition::{TrialId, TrialResult},
};

/// Receives intermediate results from the pipeline.
///
/// Trials may report concurrently, so implementations must be safe to call
/// from several tasks at once.
pub trait DiagnosticSink: Send + Sync {
    /// Record a preprocessed image.
    fn record_variant(&self, variant: &ImageVariant) -> Result<()>;

    /// Record the result of one trial.
    fn record_trial(&self, trial: &TrialResult) -> Result<()>;
}

/// Writes diagnostics into a directory, one file per variant and per trial.
///
/// File names are keyed by variant and config, so concurrent trials never
/// write to the same file.
#[derive(Clone, Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    stem: String,
}

impl DirectorySink {
    /// Create the directory if needed. `stem` prefixes every file name.
    pub fn create(dir: &Path, stem: &str) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create debug directory {:?}", dir))?;
        Ok(Self {
            dir: dir.to_owned(),
            stem: stem.to_owned(),
        })
    }

    pub fn variant_path(&self, kind: VariantKind) -> PathBuf {
        self.dir.join(format!("{}_{}.png", self.stem, kind.id()))
    }

    pub fn trial_path(&self, id: TrialId) -> PathBuf {
        self.dir.join(format!(
            "{}_trial_{}_{}.txt",
            self.stem,
            id.variant.id(),
            id.config.id()
        ))
    }
}

impl DiagnosticSink for DirectorySink {
    fn record_variant(&self, variant: &ImageVariant) -> Result<()> {
        let path = self.variant_path(variant.kind);
        variant
            .image
            .save(&path)
            .with_context(|| format!("cannot write debug image {:?}", path))
    }

    fn record_trial(&self, trial: &TrialResult) -> Result<()> {
        let path = self.trial_path(trial.id);
        fs::write(&path, format_trial(trial))
            .with_context(|| format!("cannot write debug trial {:?}", path))
    }
}

/// Render a trial as human-readable text.
pub fn format_trial(trial: &TrialResult) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Variant: {}", trial.id.variant);
    let _ = writeln!(
        output,
        "Config: {} (psm {})",
        trial.id.config,
        trial.id.config.page_segmentation_mode()
    );
    let _ = writeln!(output, "Mean confidence: {:.1}", trial.mean_confidence());
    let _ = writeln!(output, "Lines: {}", trial.lines.len());
    if let Some(error) = &trial.error {
        let _ = writeln!(output, "Error: {error}");
    }
    output.push('\n');
    for line in &trial.lines {
        let _ = writeln!(output, "[{:5.1}] {}", line.confidence, line.text);
    }
    output
}
