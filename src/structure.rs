//! Turn recognized text lines into a rectangular table.
//!
//! Recognition gives us lines, not cells. We guess where the field
//! boundaries are in each line, take the most common field count as the
//! table's width, and then fit every line to that width.

use std::{collections::BTreeMap, ops::Range, sync::LazyLock};

use regex::Regex;

use crate::prelude::*;

/// Two or more consecutive spaces.
static MULTI_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" {2,}").expect("failed to compile regex"));

/// A run of non-whitespace characters.
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+").expect("failed to compile regex"));

/// Quantities, prices, percentages and accounting negatives, like `12`,
/// `-3.5`, `1,234.00`, `45%`, `(120)` or `€9,99`.
static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+]?\(?[$€£¥]?\d[\d.,']*%?\)?[$€£¥]?$")
        .expect("failed to compile regex")
});

/// Which rule found the field boundaries in a line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BoundaryRule {
    /// Tab characters.
    Tab,
    /// Runs of two or more spaces.
    MultiSpace,
    /// A numeric token following a non-numeric one, as in `Apples 3`.
    NumericAfterLabel,
    /// No boundaries. The line is a single field.
    Unsplit,
}

/// The inferred table.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnLayout {
    /// The number of columns. Every row has exactly this many fields.
    pub column_count: usize,
    /// The fields of each line, in input order.
    pub rows: Vec<Vec<String>>,
    /// Set when several field counts were equally common, so the column count
    /// is a judgement call.
    pub ambiguous: bool,
}

/// Structure `lines` into a [`ColumnLayout`].
///
/// With fewer than two lines there is nothing to vote on, so each line
/// becomes a single-column row.
#[instrument(level = "debug", skip_all, fields(lines = lines.len()))]
pub fn structure<S: AsRef<str>>(lines: &[S]) -> ColumnLayout {
    if lines.len() < 2 {
        return ColumnLayout {
            column_count: 1,
            rows: lines
                .iter()
                .map(|line| vec![line.as_ref().trim().to_owned()])
                .collect(),
            ambiguous: false,
        };
    }

    let spans = lines
        .iter()
        .map(|line| {
            let (rule, spans) = field_spans(line.as_ref());
            trace!(line = line.as_ref(), ?rule, fields = spans.len(), "Split line");
            spans
        })
        .collect::<Vec<_>>();
    let counts = spans.iter().map(Vec::len).collect::<Vec<_>>();
    let (column_count, ambiguous) = column_count_mode(&counts);
    if ambiguous {
        warn!(
            ?counts,
            column_count,
            "Structuring ambiguous: several field counts are equally common, using the largest"
        );
    } else {
        debug!(column_count, "Inferred column count");
    }

    let rows = lines
        .iter()
        .zip(&spans)
        .map(|(line, spans)| fit_row(line.as_ref(), spans, column_count))
        .collect();
    ColumnLayout {
        column_count,
        rows,
        ambiguous,
    }
}

/// The most common value in `counts`, preferring the largest on ties.
///
/// Returns the chosen count and whether there was a tie. `counts` must not
/// be empty.
pub fn column_count_mode(counts: &[usize]) -> (usize, bool) {
    let mut frequencies = BTreeMap::<usize, usize>::new();
    for &count in counts {
        *frequencies.entry(count).or_default() += 1;
    }
    let top = frequencies.values().copied().max().unwrap_or(0);
    let winners = frequencies
        .iter()
        .filter(|&(_, &frequency)| frequency == top)
        .map(|(&count, _)| count)
        .collect::<Vec<_>>();
    // Splitting too little loses more than splitting too much.
    let chosen = winners.last().copied().unwrap_or(1);
    (chosen, winners.len() > 1)
}

/// Find field boundaries in `line`, returning byte ranges of each field.
///
/// Rules are tried in order, and the first one that produces at least two
/// fields wins. The ranges never include surrounding whitespace.
pub fn field_spans(line: &str) -> (BoundaryRule, Vec<Range<usize>>) {
    let tab_fields = split_on(line, line.match_indices('\t').map(|(i, _)| i..i + 1));
    if tab_fields.len() >= 2 {
        return (BoundaryRule::Tab, tab_fields);
    }

    let space_fields = split_on(line, MULTI_SPACE.find_iter(line).map(|m| m.range()));
    if space_fields.len() >= 2 {
        return (BoundaryRule::MultiSpace, space_fields);
    }

    let label_fields = split_before_numbers(line);
    if label_fields.len() >= 2 {
        return (BoundaryRule::NumericAfterLabel, label_fields);
    }

    let whole = trim_range(line, 0..line.len()).unwrap_or(0..0);
    (BoundaryRule::Unsplit, vec![whole])
}

/// Split `line` around `separators`, dropping empty fields.
fn split_on(
    line: &str,
    separators: impl Iterator<Item = Range<usize>>,
) -> Vec<Range<usize>> {
    let mut fields = vec![];
    let mut start = 0;
    for separator in separators {
        fields.extend(trim_range(line, start..separator.start));
        start = separator.end;
    }
    fields.extend(trim_range(line, start..line.len()));
    fields
}

/// Split before every numeric token that follows a non-numeric token.
fn split_before_numbers(line: &str) -> Vec<Range<usize>> {
    let tokens = TOKEN.find_iter(line).collect::<Vec<_>>();
    let Some(first) = tokens.first() else {
        return vec![];
    };

    let mut fields = vec![];
    let mut field_start = first.start();
    for pair in tokens.windows(2) {
        let (previous, token) = (&pair[0], &pair[1]);
        if NUMERIC.is_match(token.as_str()) && !NUMERIC.is_match(previous.as_str()) {
            fields.push(field_start..previous.end());
            field_start = token.start();
        }
    }
    if let Some(last) = tokens.last() {
        fields.push(field_start..last.end());
    }
    fields
}

/// Shrink `range` to exclude leading and trailing whitespace. Returns `None`
/// if nothing is left.
fn trim_range(line: &str, range: Range<usize>) -> Option<Range<usize>> {
    let piece = &line[range.clone()];
    let start = range.start + (piece.len() - piece.trim_start().len());
    let end = range.start + piece.trim_end().len();
    (start < end).then_some(start..end)
}

/// Fit one line's fields to exactly `column_count` columns.
///
/// Short rows are padded with empty strings. Extra fields are folded into
/// the last column, keeping the original text between them, so we never
/// invent a boundary inside an earlier column.
fn fit_row(line: &str, spans: &[Range<usize>], column_count: usize) -> Vec<String> {
    let mut row = Vec::with_capacity(column_count);
    if spans.len() <= column_count {
        row.extend(spans.iter().map(|span| line[span.clone()].to_owned()));
        row.resize(column_count, String::new());
    } else {
        let keep = column_count - 1;
        row.extend(spans[..keep].iter().map(|span| line[span.clone()].to_owned()));
        let merged = spans[keep].start..spans[spans.len() - 1].end;
        row.push(line[merged].to_owned());
    }
    row
}
