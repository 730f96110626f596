use std::path::Path;

use crate::error::CaptionError;

use super::record::CaptionRecord;

/// A time-range line that could not be split into start and end.
///
/// The block it belongs to is dropped and parsing carries on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedBlock {
    pub line_number: usize,
    pub line: String,
}

#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub track: CaptionTrack,
    pub malformed: Vec<MalformedBlock>,
}

enum ParseState {
    AwaitingIndex,
    AwaitingTimeRange { index: u32 },
    AwaitingText { index: u32, start: String, end: String },
}

/// Caption records in presentation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptionTrack {
    records: Vec<CaptionRecord>,
}

impl CaptionTrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Self {
        Self::parse_with_diagnostics(text).track
    }

    /// Best-effort parse of SubRip text.
    ///
    /// Each block is an index line, a `start --> end` line and a single text
    /// line. Lines that don't start a block are skipped, a bad time-range line
    /// drops its block, and a block cut off by the end of input is discarded.
    pub fn parse_with_diagnostics(text: &str) -> ParseOutcome {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut outcome = ParseOutcome::default();
        let mut state = ParseState::AwaitingIndex;

        for (line_number, raw) in text.lines().enumerate() {
            let line = raw.trim_end();
            state = match state {
                ParseState::AwaitingIndex => match parse_index(line) {
                    Some(index) => ParseState::AwaitingTimeRange { index },
                    None => ParseState::AwaitingIndex,
                },
                ParseState::AwaitingTimeRange { index } => match split_time_range(line) {
                    Some((start, end)) => ParseState::AwaitingText {
                        index,
                        start: start.to_string(),
                        end: end.to_string(),
                    },
                    None => {
                        tracing::warn!(
                            line_number = line_number + 1,
                            "expected start --> end for caption {index}, got {line:?}"
                        );
                        outcome.malformed.push(MalformedBlock {
                            line_number: line_number + 1,
                            line: line.to_string(),
                        });
                        ParseState::AwaitingIndex
                    }
                },
                ParseState::AwaitingText { index, start, end } => {
                    outcome.track.push(CaptionRecord {
                        index,
                        start,
                        end,
                        text: line.to_string(),
                    });
                    ParseState::AwaitingIndex
                }
            };
        }

        if !matches!(state, ParseState::AwaitingIndex) {
            tracing::debug!("input ended inside a caption block, dropping it");
        }

        outcome
    }

    pub fn read_from(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let outcome = Self::parse_with_diagnostics(&text);
        tracing::debug!(
            path = %path.display(),
            records = outcome.track.len(),
            malformed = outcome.malformed.len(),
            "parsed subtitle file"
        );
        Ok(outcome.track)
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_srt())
    }

    pub fn to_srt(&self) -> String {
        self.records.iter().map(CaptionRecord::to_srt).collect()
    }

    /// Renumber every record by `index_offset` and shift it `minutes` later.
    pub fn offset(&mut self, index_offset: u32, minutes: u32) -> Result<(), CaptionError> {
        for record in &mut self.records {
            record.offset_by(index_offset, minutes)?;
        }
        Ok(())
    }

    pub fn push(&mut self, record: CaptionRecord) {
        self.records.push(record);
    }

    pub fn last_index(&self) -> Option<u32> {
        self.records.last().map(|r| r.index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CaptionRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[CaptionRecord] {
        &self.records
    }
}

impl From<Vec<CaptionRecord>> for CaptionTrack {
    fn from(records: Vec<CaptionRecord>) -> Self {
        Self { records }
    }
}

impl FromIterator<CaptionRecord> for CaptionTrack {
    fn from_iter<I: IntoIterator<Item = CaptionRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for CaptionTrack {
    type Item = CaptionRecord;
    type IntoIter = std::vec::IntoIter<CaptionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a CaptionTrack {
    type Item = &'a CaptionRecord;
    type IntoIter = std::slice::Iter<'a, CaptionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

fn parse_index(line: &str) -> Option<u32> {
    if line.is_empty() || !line.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    line.parse().ok()
}

fn split_time_range(line: &str) -> Option<(&str, &str)> {
    let (start, end) = line.split_once(" --> ")?;
    if end.contains(" --> ") {
        return None;
    }
    Some((start, end))
}
