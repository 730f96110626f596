//! Batch subtitle generation for video files: find or create a caption track
//! per video, optionally by splitting long videos into fixed-length parts and
//! re-timing the parts' captions onto one timeline, then bake the captions
//! into a new video with ffmpeg.

pub mod error;
pub mod ffmpeg;
pub mod pipeline;
pub mod process;
pub mod srt;
pub mod transcribe;

pub use error::{CaptionError, PipelineError, Stage};
pub use pipeline::{BatchOptions, BatchReport, Pipeline, SegmentOptions};
