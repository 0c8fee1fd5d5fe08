//! Write tables out as CSV, plus an optional human-readable debug report.
//!
//! Every file is written to a temporary file next to its destination and
//! renamed into place once complete, so a failed export never leaves a
//! partial file behind.

use std::{
    fmt::Write as _,
    fs::File,
    io::{self, Write as _},
};

use crate::{
    errors::PipelineError,
    prelude::*,
    recognition::TrialResult,
    structure::ColumnLayout,
};

/// Positional column names: `Column_1`, `Column_2`, ...
pub fn column_header(column_count: usize) -> Vec<String> {
    (1..=column_count).map(|i| format!("Column_{i}")).collect()
}

/// Write a header row and `rows` as UTF-8 CSV.
///
/// Every row must already have `column_count` fields.
pub fn write_csv<W: io::Write>(
    writer: W,
    column_count: usize,
    rows: &[Vec<String>],
) -> io::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(column_header(column_count))?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()
}

/// Export a [`ColumnLayout`] to `dest`.
#[instrument(level = "debug", skip_all, fields(dest = %dest.display()))]
pub fn export_csv(layout: &ColumnLayout, dest: &Path) -> Result<PathBuf, PipelineError> {
    write_atomically(dest, |file| {
        write_csv(file, layout.column_count, &layout.rows)
    })?;
    info!(
        rows = layout.rows.len(),
        columns = layout.column_count,
        "Wrote {}",
        dest.display()
    );
    Ok(dest.to_owned())
}

/// Build a layout from rows whose cells are already known, padding short
/// rows with empty strings to the width of the widest row.
pub fn padded_layout(rows: &[Vec<String>]) -> Result<ColumnLayout> {
    let column_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    if column_count == 0 {
        return Err(anyhow!("no table data to export"));
    }
    let rows = rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            row.resize(column_count, String::new());
            row
        })
        .collect();
    Ok(ColumnLayout {
        column_count,
        rows,
        ambiguous: false,
    })
}

/// Export a table whose cells are already known, without inferring any
/// column boundaries. See [`padded_layout`].
#[instrument(level = "debug", skip_all, fields(dest = %dest.display()))]
pub fn export_table(rows: &[Vec<String>], dest: &Path) -> Result<PathBuf> {
    let layout = padded_layout(rows)
        .with_context(|| format!("cannot export table to {:?}", dest))?;
    Ok(export_csv(&layout, dest)?)
}

/// Where the debug report for `csv_path` goes.
pub fn debug_report_path(csv_path: &Path) -> PathBuf {
    csv_path.with_extension("debug.txt")
}

/// How the recognized lines were chosen.
pub struct RecognitionSummary<'a> {
    /// Engine name.
    pub engine: &'a str,
    /// Recognition language, if the engine has one.
    pub language: Option<&'a str>,
    /// The winning trial.
    pub winner: &'a TrialResult,
    /// Every trial, in grid order.
    pub trials: &'a [TrialResult],
}

/// Everything that goes into a debug report.
pub struct DebugReport<'a> {
    /// The lines before structuring.
    pub raw_lines: &'a [String],
    pub layout: &'a ColumnLayout,
    /// Missing when lines were supplied directly rather than recognized.
    pub recognition: Option<RecognitionSummary<'a>>,
}

impl DebugReport<'_> {
    /// Render as plain text.
    pub fn render(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "=== RAW LINES ===");
        for (i, line) in self.raw_lines.iter().enumerate() {
            let _ = writeln!(output, "{:2}: {}", i + 1, line);
        }

        let _ = writeln!(output, "\n=== STRUCTURED ROWS ===");
        for (i, row) in self.layout.rows.iter().enumerate() {
            let _ = writeln!(output, "{:2}: {:?}", i + 1, row);
        }

        let _ = writeln!(output, "\n=== SUMMARY ===");
        let _ = writeln!(output, "Lines: {}", self.raw_lines.len());
        let _ = writeln!(output, "Rows: {}", self.layout.rows.len());
        let _ = writeln!(output, "Columns: {}", self.layout.column_count);
        let _ = writeln!(
            output,
            "Ambiguous column count: {}",
            if self.layout.ambiguous { "yes" } else { "no" }
        );

        if let Some(recognition) = &self.recognition {
            let winner = recognition.winner;
            let _ = writeln!(output, "\n=== RECOGNITION ===");
            let _ = writeln!(output, "Engine: {}", recognition.engine);
            if let Some(language) = recognition.language {
                let _ = writeln!(output, "Language: {language}");
            }
            let _ = writeln!(
                output,
                "Winning trial: {} (psm {})",
                winner.id,
                winner.id.config.page_segmentation_mode()
            );
            let _ = writeln!(output, "Confidence: {:.1}", winner.mean_confidence());

            let _ = writeln!(output, "\n=== TRIALS ===");
            for trial in recognition.trials {
                let _ = write!(
                    output,
                    "{:<28} {:>6.1} {:>3} lines",
                    trial.id.to_string(),
                    trial.mean_confidence(),
                    trial.lines.len()
                );
                if let Some(error) = &trial.error {
                    let _ = write!(output, "  error: {}", error.replace('\n', " "));
                }
                output.push('\n');
            }
        }
        output
    }
}

/// Write a [`DebugReport`] next to `csv_path`.
pub fn write_debug_report(
    report: &DebugReport<'_>,
    csv_path: &Path,
) -> Result<PathBuf, PipelineError> {
    let path = debug_report_path(csv_path);
    let text = report.render();
    write_atomically(&path, |file| file.write_all(text.as_bytes()))?;
    debug!("Wrote {}", path.display());
    Ok(path)
}

/// Write a file by way of a temporary file in the same directory.
fn write_atomically(
    dest: &Path,
    write: impl FnOnce(&mut File) -> io::Result<()>,
) -> Result<(), PipelineError> {
    let failed = |source: io::Error| PipelineError::ExportWriteFailed {
        path: dest.to_owned(),
        source,
    };
    let dir = match dest.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".tablescan-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(failed)?;
    write(tmp.as_file_mut()).map_err(failed)?;
    tmp.as_file_mut().sync_all().map_err(failed)?;
    // If this fails, the temporary file is deleted when `err` is dropped.
    tmp.persist(dest).map_err(|err| failed(err.error))?;
    Ok(())
}
