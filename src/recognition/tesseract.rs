//! Tesseract recognition engine.

use tokio::process::Command;

use crate::{
    async_utils::{check_for_command_failure, spawn_blocking_propagating_panics},
    cpu_limit::with_cpu_semaphore,
    errors::PipelineError,
    preprocess::ImageVariant,
    prelude::*,
};

use super::{RecognitionConfig, RecognitionEngine, RecognizedLine, tsv::lines_from_tsv};

/// Recognition engine wrapping the `tesseract` CLI tool.
pub struct TesseractEngine {
    /// The `tesseract` binary to run.
    command: String,
    /// The language (or `+`-joined languages) to recognize.
    lang: String,
}

impl TesseractEngine {
    /// Create a new `tesseract` engine.
    pub fn new(command: String, lang: String) -> Self {
        Self { command, lang }
    }

    fn unavailable(&self, reason: impl Into<String>) -> PipelineError {
        PipelineError::EngineUnavailable {
            engine: self.command.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RecognitionEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn language(&self) -> Option<&str> {
        Some(&self.lang)
    }

    #[instrument(level = "debug", skip_all, fields(command = %self.command))]
    async fn check_available(&self) -> Result<(), PipelineError> {
        let output = Command::new(&self.command)
            .arg("--version")
            .output()
            .await
            .map_err(|err| self.unavailable(err.to_string()))?;
        if !output.status.success() {
            return Err(self.unavailable(format!(
                "`{} --version` exited with {}",
                self.command, output.status
            )));
        }
        let version = String::from_utf8_lossy(&output.stdout);
        debug!(
            version = version.lines().next().unwrap_or_default(),
            "Found tesseract"
        );
        Ok(())
    }

    #[instrument(
        level = "debug",
        skip_all,
        fields(variant = %variant.kind, config = %config)
    )]
    async fn recognize(
        &self,
        variant: &ImageVariant,
        config: RecognitionConfig,
    ) -> Result<Vec<RecognizedLine>> {
        // Write our input to a temporary file.
        let tmpdir = tempfile::TempDir::with_prefix("tesseract")?;
        let input_path = tmpdir.path().join("input.png");
        let image = variant.image.clone();
        let path = input_path.clone();
        spawn_blocking_propagating_panics(move || image.save(&path))
            .await
            .context("cannot write tesseract input file")?;

        // Run tesseract, printing TSV to standard output.
        //
        // We use `with_cpu_semaphore` because each `tesseract` process will
        // use 100% of a CPU.
        let mut cmd = Command::new(&self.command);
        cmd.arg(&input_path)
            .arg("stdout")
            .args(["--oem", "3"])
            .args(["--psm", &config.page_segmentation_mode().to_string()])
            .args(["-l", &self.lang])
            .arg("tsv")
            // Tesseract starts its own threads. We already run one process
            // per CPU.
            .env("OMP_THREAD_LIMIT", "1");
        let output = with_cpu_semaphore(move || async move {
            cmd.output().await.context("cannot run tesseract")
        })
        .await?;
        check_for_command_failure("tesseract", &output)?;

        let tsv = String::from_utf8_lossy(&output.stdout);
        let lines = lines_from_tsv(&tsv);
        debug!(lines = lines.len(), "Recognized lines");
        Ok(lines)
    }
}
