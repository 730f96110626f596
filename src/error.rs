use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors raised while re-timing caption tracks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptionError {
    #[error("cannot parse timestamp {value:?}, expected HH:MM:SS,mmm")]
    MalformedTimestamp { value: String },
    #[error("caption index {index} + offset {offset} overflows")]
    IndexOverflow { index: u32, offset: u32 },
    #[error("timestamp {value:?} shifted by {minutes} minutes overflows")]
    TimestampOverflow { value: String, minutes: u32 },
    #[error("offset of segment {segment} at {segment_minutes} minutes per segment overflows")]
    SegmentOffsetOverflow { segment: usize, segment_minutes: u32 },
}

/// Which external collaborator failed to leave its artifact behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Split,
    Transcribe,
    Bake,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Split => "split",
            Stage::Transcribe => "transcribe",
            Stage::Bake => "bake",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{stage} step produced no output at {}", path.display())]
    MissingOutput { stage: Stage, path: PathBuf },
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with status: {status}")]
    ProcessFailed { program: String, status: ExitStatus },
    #[error("could not read duration of {}", path.display())]
    DurationUnavailable { path: PathBuf },
    #[error("outputs of {} would overwrite those of {}", path.display(), other.display())]
    OutputCollision { path: PathBuf, other: PathBuf },
    #[error("{failed} of {total} segments have no subtitle")]
    SegmentsFailed { failed: usize, total: usize },
    #[error("OpenAI request failed with {status}: {body}")]
    Api { status: u16, body: String },
    #[error(transparent)]
    Caption(#[from] CaptionError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
