//! The whole image-to-table pipeline.
//!
//! preprocess → run trials → select → structure → export

use std::sync::Arc;

use indicatif::ProgressBar;

use crate::{
    async_utils::spawn_blocking_propagating_panics,
    config::PipelineConfig,
    diagnostics::{DiagnosticSink, DirectorySink},
    errors::PipelineError,
    export::{DebugReport, RecognitionSummary, export_csv, write_debug_report},
    preprocess::{Preprocessor, SourceImage},
    prelude::*,
    recognition::{RecognitionEngine, TrialId, TrialResult},
    select::select,
    structure::{ColumnLayout, structure},
    trials::{TrialOpts, run_trials},
};

/// The trials we ran on one image, and which one won.
#[derive(Debug)]
pub struct Recognition {
    /// Every trial, in grid order.
    pub trials: Vec<TrialResult>,
    winner: usize,
}

impl Recognition {
    pub fn winner(&self) -> &TrialResult {
        &self.trials[self.winner]
    }
}

/// What a successful run produced.
#[derive(Debug)]
pub struct PipelineOutput {
    pub csv_path: PathBuf,
    /// Only present when debug output was requested.
    pub debug_path: Option<PathBuf>,
    pub winner: TrialId,
    pub confidence: f64,
    pub layout: ColumnLayout,
}

/// Runs images through a recognition engine and exports the tables found.
pub struct Pipeline {
    config: PipelineConfig,
    engine: Arc<dyn RecognitionEngine>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, engine: Arc<dyn RecognitionEngine>) -> Self {
        Self { config, engine }
    }

    /// Run the full pipeline on `image_path`, writing
    /// `<output_dir>/<stem>.csv`.
    ///
    /// If `debug` is set, variant images and trial results go into
    /// `<output_dir>/debug/`, and a report goes next to the CSV. Those
    /// diagnostics are kept even when no trial finds any text.
    #[instrument(level = "debug", skip_all, fields(image = %image_path.display()))]
    pub async fn run(
        &self,
        image_path: &Path,
        output_dir: &Path,
        debug: bool,
        progress: &ProgressBar,
    ) -> Result<PipelineOutput> {
        let stem = image_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("no file name in {:?}", image_path))?;
        let sink = if debug {
            let sink = DirectorySink::create(&output_dir.join("debug"), &stem)?;
            Some(Arc::new(sink) as Arc<dyn DiagnosticSink>)
        } else {
            None
        };

        let recognition = self.recognize(image_path, sink, progress).await?;
        let winner = recognition.winner();
        let lines = winner.texts();
        let layout = structure(&lines);

        tokio::fs::create_dir_all(output_dir).await.map_err(|source| {
            PipelineError::ExportWriteFailed {
                path: output_dir.to_owned(),
                source,
            }
        })?;
        let csv_path = export_csv(&layout, &output_dir.join(format!("{stem}.csv")))?;

        let debug_path = if debug {
            let report = DebugReport {
                raw_lines: &lines,
                layout: &layout,
                recognition: Some(RecognitionSummary {
                    engine: self.engine.name(),
                    language: self.engine.language(),
                    winner,
                    trials: &recognition.trials,
                }),
            };
            Some(write_debug_report(&report, &csv_path)?)
        } else {
            None
        };

        Ok(PipelineOutput {
            csv_path,
            debug_path,
            winner: winner.id,
            confidence: winner.mean_confidence(),
            layout,
        })
    }

    /// Recognize the lines of `image_path` without structuring or exporting
    /// them.
    ///
    /// Fails with [`PipelineError::EngineUnavailable`] before doing any
    /// work if the engine can't run.
    #[instrument(level = "debug", skip_all, fields(image = %image_path.display()))]
    pub async fn recognize(
        &self,
        image_path: &Path,
        sink: Option<Arc<dyn DiagnosticSink>>,
        progress: &ProgressBar,
    ) -> Result<Recognition> {
        self.engine.check_available().await?;

        let path = image_path.to_owned();
        let source = spawn_blocking_propagating_panics(move || SourceImage::open(&path))
            .await?;

        let preprocessor = Preprocessor::new(&self.config);
        let variant_sink = sink.clone();
        let variants = spawn_blocking_propagating_panics(move || {
            let variants = preprocessor.derive(&source);
            if let Some(sink) = variant_sink {
                for variant in &variants {
                    if let Err(err) = sink.record_variant(variant) {
                        warn!("Could not record variant diagnostics: {:#}", err);
                    }
                }
            }
            variants
        })
        .await;

        let opts = TrialOpts {
            jobs: self.config.jobs,
            exhaustive: self.config.exhaustive,
        };
        let trials =
            run_trials(&*self.engine, &variants, opts, sink.as_ref(), progress).await;
        let winner = select(&trials)?.id;
        let winner = trials
            .iter()
            .position(|trial| trial.id == winner)
            .ok_or_else(|| anyhow!("selected trial {} is missing", winner))?;
        Ok(Recognition { trials, winner })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use image::GrayImage;

    use super::*;
    use crate::{
        preprocess::VariantKind,
        recognition::RecognitionConfig,
        trials::tests::ScriptedEngine,
    };

    struct Fixture {
        dir: tempfile::TempDir,
        image: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::TempDir::new().unwrap();
            let image = dir.path().join("scan.png");
            GrayImage::from_fn(40, 20, |x, _| image::Luma([if x % 4 < 2 { 30 } else { 220 }]))
                .save(&image)
                .unwrap();
            Self { dir, image }
        }

        fn output_dir(&self) -> PathBuf {
            self.dir.path().join("output")
        }
    }

    fn pipeline(engine: Arc<ScriptedEngine>) -> Pipeline {
        let config = PipelineConfig {
            min_long_edge: 40,
            jobs: 3,
            ..PipelineConfig::default()
        };
        Pipeline::new(config, engine)
    }

    fn table_engine() -> ScriptedEngine {
        ScriptedEngine::new()
            .respond(
                VariantKind::Otsu,
                RecognitionConfig::UniformBlock,
                &[("Name   Qty", 70.0), ("Apple   3", 60.0)],
            )
            .respond(
                VariantKind::Adaptive,
                RecognitionConfig::SingleColumn,
                &[("Name   Qty", 90.0), ("Apple   3", 88.0), ("Pear   12", 86.0)],
            )
            .respond(
                VariantKind::Grayscale,
                RecognitionConfig::Sparse,
                &[("Name", 40.0)],
            )
    }

    #[tokio::test]
    async fn writes_the_best_trial_as_csv() {
        let fixture = Fixture::new();
        let engine = Arc::new(table_engine());
        let output = pipeline(engine.clone())
            .run(&fixture.image, &fixture.output_dir(), false, &ProgressBar::hidden())
            .await
            .unwrap();

        assert_eq!(output.csv_path, fixture.output_dir().join("scan.csv"));
        assert_eq!(
            output.winner,
            TrialId {
                variant: VariantKind::Adaptive,
                config: RecognitionConfig::SingleColumn,
            }
        );
        assert!((output.confidence - 88.0).abs() < 1e-6);
        assert_eq!(
            fs::read_to_string(&output.csv_path).unwrap(),
            "Column_1,Column_2\nName,Qty\nApple,3\nPear,12\n"
        );
        assert!(output.debug_path.is_none());
        assert!(!fixture.output_dir().join("debug").exists());
        assert_eq!(engine.calls.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn repeated_runs_agree() {
        let fixture = Fixture::new();
        let pipeline = pipeline(Arc::new(table_engine()));
        let first = pipeline
            .run(&fixture.image, &fixture.output_dir(), false, &ProgressBar::hidden())
            .await
            .unwrap();
        let first_csv = fs::read_to_string(&first.csv_path).unwrap();
        let second = pipeline
            .run(&fixture.image, &fixture.output_dir(), false, &ProgressBar::hidden())
            .await
            .unwrap();
        assert_eq!(first.winner, second.winner);
        assert_eq!(first_csv, fs::read_to_string(&second.csv_path).unwrap());
    }

    #[tokio::test]
    async fn equal_confidence_goes_to_the_earlier_config() {
        let fixture = Fixture::new();
        let engine = ScriptedEngine::new()
            .respond(
                VariantKind::Otsu,
                RecognitionConfig::SingleColumn,
                &[("b  c", 80.0)],
            )
            .respond(
                VariantKind::Adaptive,
                RecognitionConfig::UniformBlock,
                &[("a  b", 80.0)],
            );
        let recognition = pipeline(Arc::new(engine))
            .recognize(&fixture.image, None, &ProgressBar::hidden())
            .await
            .unwrap();
        assert_eq!(
            recognition.winner().id.config,
            RecognitionConfig::UniformBlock
        );
    }

    #[tokio::test]
    async fn blank_results_write_nothing() {
        let fixture = Fixture::new();
        let err = pipeline(Arc::new(ScriptedEngine::new()))
            .run(&fixture.image, &fixture.output_dir(), false, &ProgressBar::hidden())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NoViableTrial { trial_count: 10 })
        ));
        assert!(!fixture.output_dir().join("scan.csv").exists());
    }

    #[tokio::test]
    async fn failed_debug_runs_keep_diagnostics_but_no_csv() {
        let fixture = Fixture::new();
        let err = pipeline(Arc::new(ScriptedEngine::new()))
            .run(&fixture.image, &fixture.output_dir(), true, &ProgressBar::hidden())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NoViableTrial { .. })
        ));
        let debug_dir = fixture.output_dir().join("debug");
        assert!(debug_dir.join("scan_trial_otsu_uniform-block.txt").exists());
        assert!(debug_dir.join("scan_grayscale.png").exists());
        assert!(!fixture.output_dir().join("scan.csv").exists());
        assert!(!fixture.output_dir().join("scan.debug.txt").exists());
    }

    #[tokio::test]
    async fn missing_engines_fail_before_any_trial() {
        let fixture = Fixture::new();
        let engine = Arc::new(ScriptedEngine {
            available: false,
            ..ScriptedEngine::new()
        });
        let err = pipeline(engine.clone())
            .run(&fixture.image, &fixture.output_dir(), false, &ProgressBar::hidden())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::EngineUnavailable { .. })
        ));
        assert!(engine.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreadable_images_are_typed_errors() {
        let fixture = Fixture::new();
        let bogus = fixture.dir.path().join("bogus.png");
        fs::write(&bogus, b"not an image").unwrap();
        let err = pipeline(Arc::new(table_engine()))
            .run(&bogus, &fixture.output_dir(), false, &ProgressBar::hidden())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ImageLoad { .. })
        ));
    }

    #[tokio::test]
    async fn debug_runs_keep_diagnostics() {
        let fixture = Fixture::new();
        let output = pipeline(Arc::new(table_engine()))
            .run(&fixture.image, &fixture.output_dir(), true, &ProgressBar::hidden())
            .await
            .unwrap();

        let debug_dir = fixture.output_dir().join("debug");
        for kind in VariantKind::ALL {
            assert!(debug_dir.join(format!("scan_{}.png", kind.id())).exists());
        }
        assert!(
            debug_dir
                .join("scan_trial_adaptive_single-column.txt")
                .exists()
        );
        let report = fs::read_to_string(output.debug_path.unwrap()).unwrap();
        assert!(report.contains("Winning trial: adaptive/single-column (psm 4)"));
        assert!(report.contains("Engine: scripted"));
    }
}
