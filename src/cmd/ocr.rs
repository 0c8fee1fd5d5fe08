//! The `ocr` subcommand.

use clap::Args;

use crate::{
    cmd::{PreprocessOpts, RecognitionOpts, load_config},
    pipeline::Pipeline,
    prelude::*,
    recognition::engine_for_name,
    ui::{ProgressConfig, Ui},
};

/// Where and how to write results.
#[derive(Debug, Clone, Args)]
pub struct OutputOpts {
    /// Directory for CSV output. Defaults to `output` next to each image.
    #[clap(short = 'o', long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Keep every preprocessed image and trial result, and write a report
    /// next to each CSV.
    #[clap(long)]
    pub debug: bool,
}

/// OCR command line arguments.
#[derive(Debug, Args)]
pub struct OcrOpts {
    /// Images to convert (PNG, JPEG, BMP or TIFF).
    #[clap(required = true, value_name = "IMAGE")]
    pub images: Vec<PathBuf>,

    /// A TOML or JSON file with pipeline settings.
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[clap(flatten)]
    pub preprocess: PreprocessOpts,

    #[clap(flatten)]
    pub recognition: RecognitionOpts,

    #[clap(flatten)]
    pub output: OutputOpts,
}

/// The default output directory for `image`.
fn default_output_dir(image: &Path) -> PathBuf {
    match image.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join("output"),
        _ => PathBuf::from("output"),
    }
}

/// The `ocr` subcommand.
///
/// Images are processed one at a time, and we stop at the first failure.
/// The path of each CSV is printed to stdout.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_ocr(ui: Ui, opts: &OcrOpts) -> Result<()> {
    let config =
        load_config(opts.config.as_deref(), &opts.preprocess, &opts.recognition).await?;
    let engine = engine_for_name("tesseract", &config)?;
    let pipeline = Pipeline::new(config, engine);

    for image in &opts.images {
        let output_dir = opts
            .output
            .output_dir
            .clone()
            .unwrap_or_else(|| default_output_dir(image));
        let pb = ui.new_progress_bar(
            &ProgressConfig {
                emoji: "🔎",
                msg: "Running trials",
                done_msg: "Ran trials",
            },
            0,
        );
        let output = pipeline
            .run(image, &output_dir, opts.output.debug, &pb)
            .await
            .with_context(|| format!("failed to convert {:?}", image))?;
        pb.finish_and_clear();

        info!(
            winner = %output.winner,
            confidence = output.confidence,
            rows = output.layout.rows.len(),
            columns = output.layout.column_count,
            "Converted {}",
            image.display()
        );
        if let Some(debug_path) = &output.debug_path {
            info!("Debug report written to {}", debug_path.display());
        }
        println!("{}", output.csv_path.display());
    }
    Ok(())
}
