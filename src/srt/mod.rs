//! SubRip caption tracks: parsing, serialization and re-timing of segment
//! tracks into one continuous track.

mod merge;
mod record;
mod timestamp;
mod track;

pub use merge::merge_segments;
pub use record::CaptionRecord;
pub use timestamp::Timestamp;
pub use track::{CaptionTrack, MalformedBlock, ParseOutcome};

/// File extension used for every subtitle the pipeline reads or writes.
pub const SUBTITLE_EXTENSION: &str = "srt";
