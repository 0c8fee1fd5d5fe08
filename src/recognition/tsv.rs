//! Parse Tesseract's TSV output into lines.
//!
//! Each TSV row describes a page, block, paragraph, line or word. We only use
//! word rows, grouping them by the line they belong to.

use std::collections::HashMap;

use super::RecognizedLine;

/// Tesseract's level number for word rows.
const WORD_LEVEL: u32 = 5;

/// The number of columns in a full TSV row.
const MIN_FIELDS: usize = 12;

/// Gaps wider than this many average character widths become column gaps.
const COLUMN_GAP_CHARS: f32 = 2.0;

/// What we put between words separated by a column gap. Anything with two or
/// more spaces is treated as a field boundary later on.
const COLUMN_GAP: &str = "   ";

/// One recognized word.
#[derive(Clone, Debug, PartialEq)]
struct Word {
    text: String,
    left: i64,
    width: i64,
    confidence: f32,
}

/// Identifies a line within a page: `(page, block, paragraph, line)`.
type LineKey = (u32, u32, u32, u32);

/// Convert TSV output into text lines, in reading order.
///
/// Words with a negative confidence (Tesseract's marker for "not really a
/// word") are ignored, and lines left with no words are dropped. A line's
/// confidence is the mean of its words' confidences.
pub fn lines_from_tsv(tsv: &str) -> Vec<RecognizedLine> {
    let mut order: Vec<LineKey> = vec![];
    let mut lines: HashMap<LineKey, Vec<Word>> = HashMap::new();

    for row in tsv.lines().skip(1) {
        let Some((key, word)) = parse_word_row(row) else {
            continue;
        };
        lines
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                vec![]
            })
            .push(word);
    }

    order
        .into_iter()
        .filter_map(|key| lines.remove(&key))
        .filter(|words| !words.is_empty())
        .map(|words| join_words(&words))
        .collect()
}

/// Parse a word row, skipping anything that isn't a confident word.
fn parse_word_row(row: &str) -> Option<(LineKey, Word)> {
    let fields = row.split('\t').collect::<Vec<_>>();
    if fields.len() < MIN_FIELDS {
        return None;
    }
    if fields[0].trim().parse::<u32>().ok()? != WORD_LEVEL {
        return None;
    }

    let confidence = fields[10].trim().parse::<f32>().ok()?;
    let text = fields[11..].join("\t").trim().to_owned();
    if confidence < 0.0 || text.is_empty() {
        return None;
    }

    let number = |i: usize| fields[i].trim().parse::<u32>().ok();
    let key = (number(1)?, number(2)?, number(3)?, number(4)?);
    let word = Word {
        text,
        left: fields[6].trim().parse().ok()?,
        width: fields[8].trim().parse().ok()?,
        confidence: confidence.min(100.0),
    };
    Some((key, word))
}

/// Join a line's words, widening large horizontal gaps into column gaps.
fn join_words(words: &[Word]) -> RecognizedLine {
    let total_chars = words.iter().map(|w| w.text.chars().count()).sum::<usize>();
    let total_width = words.iter().map(|w| w.width.max(0)).sum::<i64>();
    let char_width = total_width as f32 / total_chars.max(1) as f32;

    let mut text = words[0].text.clone();
    for pair in words.windows(2) {
        let gap = pair[1].left - (pair[0].left + pair[0].width);
        if char_width > 0.0 && gap as f32 > COLUMN_GAP_CHARS * char_width {
            text.push_str(COLUMN_GAP);
        } else {
            text.push(' ');
        }
        text.push_str(&pair[1].text);
    }

    let confidence =
        words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32;
    RecognizedLine::new(text, confidence)
}
