use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::CaptionError;

static TIMESTAMP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2,}):(\d{2}):(\d{2}),(\d{3})$").expect("timestamp pattern is valid")
});

/// A caption timestamp in `HH:MM:SS,mmm` form.
///
/// Hours are not bounded to a day, so long recordings keep counting up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub millis: u32,
}

impl Timestamp {
    pub fn parse(value: &str) -> Result<Self, CaptionError> {
        let malformed = || CaptionError::MalformedTimestamp {
            value: value.to_string(),
        };
        let caps = TIMESTAMP_PATTERN.captures(value).ok_or_else(malformed)?;
        let field = |i: usize| caps[i].parse::<u32>().map_err(|_| malformed());

        Ok(Self {
            hours: field(1)?,
            minutes: field(2)?,
            seconds: field(3)?,
            millis: field(4)?,
        })
    }

    /// Shift forward by whole minutes, carrying overflow into the hour field.
    ///
    /// `None` if the minute or hour field would leave `u32`.
    pub fn add_minutes(self, minutes: u32) -> Option<Self> {
        let total = self.minutes.checked_add(minutes)?;
        Some(Self {
            hours: self.hours.checked_add(total / 60)?,
            minutes: total % 60,
            ..self
        })
    }
}

impl FromStr for Timestamp {
    type Err = CaptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02},{:03}",
            self.hours, self.minutes, self.seconds, self.millis
        )
    }
}
