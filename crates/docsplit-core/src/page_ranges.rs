//! Extraction-range parsing.
//!
//! Input is free text typed by a person, e.g. `"1-4, 9; 10–12\n55"`. Each group
//! (separated by `;` or a newline) becomes one output; within a group, parts
//! separated by `,` are either a single unit `N` or an inclusive span `N-M`.

use serde::{Deserialize, Serialize};

/// Inclusive, 1-based span of source units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start: u32,
    pub end: u32,
}

impl Segment {
    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Canonical form: `N` for a single unit, `N-M` otherwise.
    pub fn label(&self) -> String {
        if self.start == self.end {
            self.start.to_string()
        } else {
            format!("{}-{}", self.start, self.end)
        }
    }
}

/// One requested output: its canonical label and the segments it concatenates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeGroup {
    pub label: String,
    pub segments: Vec<Segment>,
}

impl RangeGroup {
    /// Units this group extracts (overlaps counted twice, as they are extracted twice).
    pub fn unit_count(&self) -> u64 {
        self.segments.iter().map(|s| u64::from(s.len())).sum()
    }

    /// Highest unit referenced by this group.
    pub fn max_unit(&self) -> u32 {
        self.segments.iter().map(|s| s.end).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("Page ranges are required")]
    Empty,
    #[error("Invalid segment: '{0}'. Use 1-4 or 55")]
    Malformed(String),
    #[error("Invalid segment: '{0}'. Ensure start/end are positive and end >= start")]
    OutOfOrder(String),
}

fn is_dash(c: char) -> bool {
    matches!(c, '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2212}')
}

/// Normalize one line of range text: NBSP becomes a space, typographic dashes
/// become `-`, whitespace runs collapse to one space, and commas become `", "`.
pub fn normalize(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{00a0}' => cleaned.push(' '),
            c if is_dash(c) => cleaned.push('-'),
            c => cleaned.push(c),
        }
    }
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .split(',')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(", ")
        .trim()
        .to_string()
}

/// Split range text into groups. Newlines separate groups just like `;`.
fn split_groups(text: &str) -> Vec<String> {
    text.split(|c| c == ';' || c == '\n' || c == '\r')
        .map(normalize)
        .filter(|g| !g.is_empty())
        .collect()
}

fn parse_number(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_part(part: &str) -> Result<Segment, RangeError> {
    let (start, end) = match part.split_once('-') {
        Some((a, b)) => (parse_number(a.trim()), parse_number(b.trim())),
        None => {
            let n = parse_number(part);
            (n, n)
        }
    };
    let (Some(start), Some(end)) = (start, end) else {
        return Err(RangeError::Malformed(part.to_string()));
    };
    if start < 1 || end < start {
        return Err(RangeError::OutOfOrder(part.to_string()));
    }
    Ok(Segment { start, end })
}

/// Parse range text into output groups, in the order given.
pub fn parse_groups(text: &str) -> Result<Vec<RangeGroup>, RangeError> {
    let groups_raw = split_groups(text);
    if groups_raw.is_empty() {
        return Err(RangeError::Empty);
    }

    let mut groups = Vec::with_capacity(groups_raw.len());
    for raw in groups_raw {
        let mut segments = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            segments.push(parse_part(part)?);
        }
        if segments.is_empty() {
            return Err(RangeError::Malformed(raw));
        }
        let label = segments
            .iter()
            .map(Segment::label)
            .collect::<Vec<_>>()
            .join(", ");
        groups.push(RangeGroup { label, segments });
    }
    Ok(groups)
}
