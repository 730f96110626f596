use crate::error::CaptionError;

use super::timestamp::Timestamp;

/// One numbered caption block.
///
/// `start` and `end` hold the timestamps exactly as they were read so that
/// serialization reproduces the input; they are only re-rendered when the
/// record is shifted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionRecord {
    pub index: u32,
    pub start: String,
    pub end: String,
    pub text: String,
}

impl CaptionRecord {
    pub fn new(
        index: u32,
        start: impl Into<String>,
        end: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            index,
            start: start.into(),
            end: end.into(),
            text: text.into(),
        }
    }

    pub fn to_srt(&self) -> String {
        format!("{}\n{} --> {}\n{}\n\n", self.index, self.start, self.end, self.text)
    }

    /// Renumber and shift this record in place.
    ///
    /// Both timestamps are validated before anything is written, so a failure
    /// leaves the record untouched.
    pub fn offset_by(&mut self, index_offset: u32, minutes: u32) -> Result<(), CaptionError> {
        let index = self
            .index
            .checked_add(index_offset)
            .ok_or(CaptionError::IndexOverflow {
                index: self.index,
                offset: index_offset,
            })?;
        let start = shift(&self.start, minutes)?;
        let end = shift(&self.end, minutes)?;

        self.index = index;
        self.start = start.to_string();
        self.end = end.to_string();
        Ok(())
    }
}

fn shift(value: &str, minutes: u32) -> Result<Timestamp, CaptionError> {
    Timestamp::parse(value)?
        .add_minutes(minutes)
        .ok_or_else(|| CaptionError::TimestampOverflow {
            value: value.to_string(),
            minutes,
        })
}
