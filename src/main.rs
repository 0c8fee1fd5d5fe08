use std::{process::ExitCode, str::FromStr};

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{errors::exit_code_for, prelude::*, ui::Ui};

mod async_utils;
mod cmd;
mod config;
mod cpu_limit;
mod diagnostics;
mod errors;
mod export;
mod pipeline;
mod prelude;
mod preprocess;
mod recognition;
mod select;
mod structure;
mod toml_utils;
mod trials;
mod ui;

/// Turn photographed tables into CSV files.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Exit Codes:
  2  The recognition engine could not be run.
  3  No recognition trial found any text.
  4  The CSV could not be written.
  5  The input image could not be read.

Environment Variables:
  - TABLESCAN_TESSERACT (optional): Path to the `tesseract` binary.
  - TESSDATA_PREFIX (optional): Where tesseract finds its language data.
  - RUST_LOG (optional): Log filter, e.g. `tablescan=debug`.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Recognize the table in each image and write it out as CSV.
    Ocr(cmd::ocr::OcrOpts),
    /// Split already-recognized text lines into columns and write CSV.
    Structure(cmd::structure::StructureOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Ocr(_) => false,
            Cmd::Structure(opts) => opts.output_path.is_none(),
        }
    }
}

/// Our entry point. Errors are printed here, and [`errors::PipelineError`]s
/// get their own exit codes.
#[tokio::main]
async fn main() -> ExitCode {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);

    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    match real_main(ui).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            exit_code_for(&err)
        }
    }
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Hide the progress bar if we're using stdout for output.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Ocr(opts) => cmd::ocr::cmd_ocr(ui, opts).await?,
        Cmd::Structure(opts) => cmd::structure::cmd_structure(opts).await?,
    }
    Ok(())
}
