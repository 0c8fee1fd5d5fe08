//! The `structure` subcommand.
//!
//! This takes lines that were recognized elsewhere and runs only the column
//! structuring and export stages.

use clap::Args;

use crate::{
    async_utils::io::read_lines,
    export::{
        DebugReport, export_csv, export_table, padded_layout, write_csv,
        write_debug_report,
    },
    prelude::*,
    structure::{ColumnLayout, structure},
};

/// Structure command line arguments.
#[derive(Debug, Args)]
pub struct StructureOpts {
    /// A UTF-8 text file with one table row per line. Defaults to standard
    /// input.
    pub input_path: Option<PathBuf>,

    /// Where to write the CSV. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    /// Treat tabs as the only cell boundaries, and skip column inference.
    #[clap(long)]
    pub pre_split: bool,

    /// Write a report next to the CSV.
    #[clap(long, requires = "output_path", conflicts_with = "pre_split")]
    pub debug: bool,
}

/// The `structure` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_structure(opts: &StructureOpts) -> Result<()> {
    let lines = read_lines(opts.input_path.as_deref()).await?;
    if lines.is_empty() {
        return Err(anyhow!("no lines to structure"));
    }

    if opts.pre_split {
        let rows = lines
            .iter()
            .map(|line| line.split('\t').map(|cell| cell.trim().to_owned()).collect())
            .collect::<Vec<Vec<String>>>();
        match &opts.output_path {
            Some(path) => {
                export_table(&rows, path)?;
            }
            None => write_to_stdout(&padded_layout(&rows)?)?,
        }
        return Ok(());
    }

    let layout = structure(&lines);
    match &opts.output_path {
        Some(path) => {
            let csv_path = export_csv(&layout, path)?;
            if opts.debug {
                let report = DebugReport {
                    raw_lines: &lines,
                    layout: &layout,
                    recognition: None,
                };
                write_debug_report(&report, &csv_path)?;
            }
        }
        None => write_to_stdout(&layout)?,
    }
    Ok(())
}

fn write_to_stdout(layout: &ColumnLayout) -> Result<()> {
    write_csv(std::io::stdout().lock(), layout.column_count, &layout.rows)
        .context("failed to write CSV to standard output")
}
