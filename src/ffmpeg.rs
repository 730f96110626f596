//! ffmpeg-backed splitting, baking and audio extraction.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use crate::error::{PipelineError, Stage};
use crate::pipeline::{baked_path_for, Baker, Segmenter};
use crate::process;

static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration: (\d{2,}):(\d{2}):(\d{2})\.(\d{2})").expect("duration pattern is valid")
});

/// How captions end up in the output video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum BakeMode {
    /// Render the captions into the frames (re-encodes video).
    #[default]
    Burn,
    /// Add a soft mov_text subtitle track without re-encoding.
    Mux,
}

/// Length of a media file as reported in ffmpeg's banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDuration {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub centis: u32,
}

impl VideoDuration {
    /// Pull `Duration: HH:MM:SS.cc` out of ffmpeg's stderr.
    pub fn from_ffmpeg_output(output: &str) -> Option<Self> {
        let caps = DURATION_PATTERN.captures(output)?;
        Some(Self {
            hours: caps[1].parse().ok()?,
            minutes: caps[2].parse().ok()?,
            seconds: caps[3].parse().ok()?,
            centis: caps[4].parse().ok()?,
        })
    }

    pub fn total_seconds(&self) -> u64 {
        u64::from(self.hours) * 3600 + u64::from(self.minutes) * 60 + u64::from(self.seconds)
            + u64::from(self.centis > 0)
    }
}

/// One planned cut of the source video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSpan {
    pub part: usize,
    pub start: String,
    /// `None` for the final segment, which runs to the end of the input.
    pub end: Option<String>,
}

fn clock(total_minutes: u64) -> String {
    format!("{}:{:02}:00", total_minutes / 60, total_minutes % 60)
}

/// Contiguous cuts of `segment_minutes` that cover `total_seconds`.
///
/// Always yields at least one span, and the last span is open-ended.
pub fn plan_segments(total_seconds: u64, segment_minutes: u32) -> Vec<SegmentSpan> {
    let length = u64::from(segment_minutes);
    if length == 0 {
        return vec![SegmentSpan {
            part: 0,
            start: clock(0),
            end: None,
        }];
    }

    let mut spans = Vec::new();
    let mut start = 0;
    loop {
        let next = start + length;
        let end = (next * 60 < total_seconds).then(|| clock(next));
        let last = end.is_none();
        spans.push(SegmentSpan {
            part: spans.len(),
            start: clock(start),
            end,
        });
        if last {
            return spans;
        }
        start = next;
    }
}

/// Path of segment `part` for `video` inside `dir`.
pub fn part_path_for(video: &Path, dir: &Path, part: usize) -> PathBuf {
    let stem = video.file_stem().unwrap_or(video.as_os_str());
    let mut name = OsString::from(stem);
    name.push(format!(".part{part}.mp4"));
    dir.join(name)
}

/// Escape a path for use inside an ffmpeg filter argument.
pub fn escape_for_filter(path: &Path) -> String {
    let s = path.to_string_lossy();
    s.replace('\\', "\\\\").replace(':', "\\:").replace('=', "\\=").replace('\'', "\\'")
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Ffmpeg {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-hide_banner");
        cmd
    }

    pub async fn ensure_available(&self) -> Result<(), PipelineError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-version").stdout(std::process::Stdio::null());
        let output = process::capture(&mut cmd).await?;
        if !output.status.success() {
            return Err(PipelineError::ProcessFailed {
                program: self.program.display().to_string(),
                status: output.status,
            });
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn probe_duration(&self, video: &Path) -> Result<VideoDuration, PipelineError> {
        let mut cmd = self.command();
        cmd.arg("-i").arg(video);
        // ffmpeg exits non-zero without an output file; only the banner matters.
        let output = process::capture(&mut cmd).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        VideoDuration::from_ffmpeg_output(&stderr).ok_or_else(|| {
            PipelineError::DurationUnavailable {
                path: video.to_path_buf(),
            }
        })
    }

    /// Extract 16 kHz mono PCM WAV for speech-to-text.
    pub async fn extract_audio(&self, video: &Path, wav_out: &Path) -> Result<(), PipelineError> {
        let mut cmd = self.command();
        cmd.arg("-y")
            .arg("-i")
            .arg(video)
            .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"])
            .arg(wav_out);
        process::run_checked(&mut cmd).await
    }

    async fn cut(
        &self,
        video: &Path,
        span: &SegmentSpan,
        dest: &Path,
    ) -> Result<(), PipelineError> {
        let mut cmd = self.command();
        cmd.arg("-y").arg("-ss").arg(&span.start);
        if let Some(end) = &span.end {
            cmd.arg("-to").arg(end);
        }
        cmd.arg("-i").arg(video).args(["-c", "copy"]).arg(dest);
        process::run_checked(&mut cmd).await
    }
}

/// Splits videos into fixed-length stream-copied parts.
#[derive(Debug, Clone, Default)]
pub struct FfmpegSegmenter {
    ffmpeg: Ffmpeg,
}

impl FfmpegSegmenter {
    pub fn new(ffmpeg: Ffmpeg) -> Self {
        Self { ffmpeg }
    }
}

#[async_trait]
impl Segmenter for FfmpegSegmenter {
    #[tracing::instrument(skip(self))]
    async fn split(
        &self,
        video: &Path,
        segment_minutes: u32,
        out_dir: &Path,
        force: bool,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let duration = self.ffmpeg.probe_duration(video).await?;
        let spans = plan_segments(duration.total_seconds(), segment_minutes);
        tracing::info!(?duration, parts = spans.len(), "splitting video");

        let mut parts = Vec::with_capacity(spans.len());
        for span in &spans {
            let dest = part_path_for(video, out_dir, span.part);
            if dest.exists() && !force {
                tracing::warn!("{} exists already, skip", dest.display());
            } else {
                self.ffmpeg.cut(video, span, &dest).await?;
                if !dest.exists() {
                    return Err(PipelineError::MissingOutput {
                        stage: Stage::Split,
                        path: dest,
                    });
                }
            }
            parts.push(dest);
        }
        Ok(parts)
    }
}

/// Writes `<stem>.translated.mp4` with the captions applied.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBaker {
    ffmpeg: Ffmpeg,
    mode: BakeMode,
}

impl FfmpegBaker {
    pub fn new(ffmpeg: Ffmpeg, mode: BakeMode) -> Self {
        Self { ffmpeg, mode }
    }

    fn command_for(&self, video: &Path, subtitle: &Path, dest: &Path) -> Command {
        let mut cmd = self.ffmpeg.command();
        cmd.arg("-y").arg("-i").arg(video);
        match self.mode {
            BakeMode::Burn => {
                let filter = format!("subtitles={}", escape_for_filter(subtitle));
                cmd.arg("-vf").arg(filter).args(["-c:a", "copy"]);
            }
            BakeMode::Mux => {
                cmd.arg("-i")
                    .arg(subtitle)
                    .args(["-c", "copy", "-c:s", "mov_text"]);
            }
        }
        cmd.arg(dest);
        cmd
    }
}

#[async_trait]
impl Baker for FfmpegBaker {
    #[tracing::instrument(skip(self))]
    async fn bake(
        &self,
        video: &Path,
        subtitle: &Path,
        dest_dir: &Path,
        force: bool,
    ) -> Result<PathBuf, PipelineError> {
        let dest = baked_path_for(video, dest_dir);
        if dest.exists() && !force {
            tracing::warn!("{} exists already, skip", dest.display());
            return Ok(dest);
        }

        let mut cmd = self.command_for(video, subtitle, &dest);
        process::run_checked(&mut cmd).await?;
        if !dest.exists() {
            return Err(PipelineError::MissingOutput {
                stage: Stage::Bake,
                path: dest,
            });
        }
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BANNER: &str = "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'talk.mp4':
  Metadata:
    major_brand     : isom
  Duration: 02:55:32.63, start: 0.000000, bitrate: 1205 kb/s
  Stream #0:0(und): Video: h264";

    #[test]
    fn reads_duration_from_banner() {
        let duration = VideoDuration::from_ffmpeg_output(BANNER).unwrap();
        assert_eq!(
            duration,
            VideoDuration {
                hours: 2,
                minutes: 55,
                seconds: 32,
                centis: 63
            }
        );
        assert_eq!(duration.total_seconds(), 2 * 3600 + 55 * 60 + 33);
    }

    #[test]
    fn banner_without_duration() {
        assert_eq!(VideoDuration::from_ffmpeg_output("talk.mp4: No such file or directory"), None);
    }

    #[test]
    fn plans_contiguous_spans() {
        let spans = plan_segments(25 * 60, 10);
        assert_eq!(
            spans,
            vec![
                SegmentSpan {
                    part: 0,
                    start: "0:00:00".into(),
                    end: Some("0:10:00".into())
                },
                SegmentSpan {
                    part: 1,
                    start: "0:10:00".into(),
                    end: Some("0:20:00".into())
                },
                SegmentSpan {
                    part: 2,
                    start: "0:20:00".into(),
                    end: None
                },
            ]
        );
    }

    #[test]
    fn exact_multiple_does_not_add_empty_tail() {
        let spans = plan_segments(20 * 60, 10);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].end, None);
    }

    #[test]
    fn short_video_is_one_span() {
        assert_eq!(plan_segments(30, 10).len(), 1);
        assert_eq!(plan_segments(0, 10).len(), 1);
        assert_eq!(plan_segments(3600, 0).len(), 1);
    }

    #[test]
    fn spans_past_an_hour_use_hour_field() {
        let spans = plan_segments(2 * 3600, 45);
        let starts: Vec<_> = spans.iter().map(|s| s.start.as_str()).collect();
        assert_eq!(starts, vec!["0:00:00", "0:45:00", "1:30:00"]);
    }

    #[test]
    fn part_names_drop_only_the_last_extension() {
        assert_eq!(
            part_path_for(Path::new("/videos/ep.01.avi"), Path::new("/tmp/_parts"), 3),
            PathBuf::from("/tmp/_parts/ep.01.part3.mp4")
        );
    }

    #[test]
    fn filter_escaping() {
        assert_eq!(
            escape_for_filter(Path::new("C:\\subs\\a=b.srt")),
            "C\\:\\\\subs\\\\a\\=b.srt"
        );
    }

    #[test]
    fn burn_and_mux_commands() {
        let video = Path::new("in.mp4");
        let subtitle = Path::new("in.srt");
        let dest = Path::new("out/in.translated.mp4");

        let burn =
            FfmpegBaker::new(Ffmpeg::default(), BakeMode::Burn).command_for(video, subtitle, dest);
        let args: Vec<_> = burn
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-hide_banner", "-y", "-i", "in.mp4", "-vf", "subtitles=in.srt", "-c:a", "copy",
                "out/in.translated.mp4"
            ]
        );

        let mux =
            FfmpegBaker::new(Ffmpeg::default(), BakeMode::Mux).command_for(video, subtitle, dest);
        let args: Vec<_> = mux
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-hide_banner",
                "-y",
                "-i",
                "in.mp4",
                "-i",
                "in.srt",
                "-c",
                "copy",
                "-c:s",
                "mov_text",
                "out/in.translated.mp4"
            ]
        );
    }

    #[tokio::test]
    async fn existing_output_is_not_rebaked() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("talk.mp4");
        let existing = baked_path_for(&video, dir.path());
        std::fs::write(&existing, b"done").unwrap();

        // The program does not exist, so reaching ffmpeg would fail.
        let baker = FfmpegBaker::new(Ffmpeg::new("no-such-ffmpeg-binary"), BakeMode::Burn);
        let out = baker
            .bake(&video, &dir.path().join("talk.srt"), dir.path(), false)
            .await
            .unwrap();
        assert_eq!(out, existing);

        let forced = baker
            .bake(&video, &dir.path().join("talk.srt"), dir.path(), true)
            .await;
        assert!(matches!(forced, Err(PipelineError::Spawn { .. })));
    }
}
