//! Per-video and batch orchestration around the external collaborators.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use indicatif::ProgressBar;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;
use walkdir::{DirEntry, WalkDir};

use crate::error::PipelineError;
use crate::srt::{merge_segments, CaptionTrack};
use crate::transcribe::{find_or_create_subtitle, subtitle_path_for};

/// Default scratch directory for segment files, created under the output dir.
pub const PARTS_DIR_NAME: &str = "_parts";

const BAKED_MARKER: &str = ".translated.";

/// Cuts a video into contiguous parts `0..N` of a fixed length.
#[async_trait]
pub trait Segmenter: Send + Sync {
    async fn split(
        &self,
        video: &Path,
        segment_minutes: u32,
        out_dir: &Path,
        force: bool,
    ) -> Result<Vec<PathBuf>, PipelineError>;
}

/// Produces `subtitle_path_for(video, out_dir)` for a video.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, video: &Path, out_dir: &Path) -> Result<(), PipelineError>;
}

/// Renders a subtitle into a copy of the video, returning the new file.
///
/// Implementations must leave an existing destination alone unless `force`.
#[async_trait]
pub trait Baker: Send + Sync {
    async fn bake(
        &self,
        video: &Path,
        subtitle: &Path,
        dest_dir: &Path,
        force: bool,
    ) -> Result<PathBuf, PipelineError>;
}

/// Output path of a baked video: `<dest_dir>/<stem>.translated.mp4`.
pub fn baked_path_for(video: &Path, dest_dir: &Path) -> PathBuf {
    let stem = video.file_stem().unwrap_or(video.as_os_str());
    let mut name = OsString::from(stem);
    name.push(".translated.mp4");
    dest_dir.join(name)
}

fn parent_dir(video: &Path) -> PathBuf {
    match video.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[derive(Debug, Clone)]
pub struct SegmentOptions {
    /// Defaults to the video's directory.
    pub dest_dir: Option<PathBuf>,
    /// Defaults to `<dest_dir>/_parts`.
    pub tmp_dir: Option<PathBuf>,
    pub length: u32,
    pub force: bool,
    pub clean: bool,
    pub jobs: usize,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            dest_dir: None,
            tmp_dir: None,
            length: 10,
            force: false,
            clean: false,
            jobs: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub root: PathBuf,
    /// Where existing subtitles are looked up (unsplit runs). Defaults to
    /// `dest_dir`, then to each video's directory.
    pub subtitle_root: Option<PathBuf>,
    pub dest_dir: Option<PathBuf>,
    /// Split length in minutes; `0` transcribes whole videos.
    pub length: u32,
    pub force: bool,
    pub clean: bool,
    pub suffixes: Vec<String>,
    pub jobs: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

/// Aggregate outcome of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<FailedFile>,
    pub started_at: String,
    pub finished_at: String,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// The external tools a run talks to.
#[derive(Clone)]
pub struct Pipeline {
    segmenter: Arc<dyn Segmenter>,
    transcriber: Arc<dyn Transcriber>,
    baker: Arc<dyn Baker>,
}

impl Pipeline {
    pub fn new(
        segmenter: Arc<dyn Segmenter>,
        transcriber: Arc<dyn Transcriber>,
        baker: Arc<dyn Baker>,
    ) -> Self {
        Self {
            segmenter,
            transcriber,
            baker,
        }
    }

    pub async fn split(
        &self,
        video: &Path,
        segment_minutes: u32,
        out_dir: &Path,
        force: bool,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        tokio::fs::create_dir_all(out_dir).await?;
        self.segmenter.split(video, segment_minutes, out_dir, force).await
    }

    /// Caption a whole video without splitting and bake the result.
    #[tracing::instrument(skip(self))]
    pub async fn translate_video(
        &self,
        video: &Path,
        subtitle_root: &Path,
        dest_dir: &Path,
        force: bool,
    ) -> Result<PathBuf, PipelineError> {
        tracing::info!("start translating {}", video.display());
        let subtitle =
            find_or_create_subtitle(self.transcriber.as_ref(), video, subtitle_root).await?;
        tokio::fs::create_dir_all(dest_dir).await?;
        self.baker.bake(video, &subtitle, dest_dir, force).await
    }

    /// Split, caption every part, merge the parts' captions back onto the
    /// full timeline and bake them into the original video.
    #[tracing::instrument(skip(self, options), fields(length = options.length))]
    pub async fn split_and_translate(
        &self,
        video: &Path,
        options: &SegmentOptions,
    ) -> Result<PathBuf, PipelineError> {
        let dest_dir = options.dest_dir.clone().unwrap_or_else(|| parent_dir(video));
        let tmp_dir = options
            .tmp_dir
            .clone()
            .unwrap_or_else(|| dest_dir.join(PARTS_DIR_NAME));
        tracing::info!(
            "input: {}, dest_dir: {}, tmp_dir: {}",
            video.display(),
            dest_dir.display(),
            tmp_dir.display()
        );

        let parts = self.split(video, options.length, &tmp_dir, options.force).await?;
        tracing::info!("split complete, {} parts in {}", parts.len(), tmp_dir.display());

        let subtitles = self.transcribe_parts(&parts, &tmp_dir, options.jobs).await?;
        let tracks = subtitles
            .iter()
            .map(|path| CaptionTrack::read_from(path))
            .collect::<Result<Vec<_>, _>>()?;

        let merged = merge_segments(tracks, options.length)?;
        tokio::fs::create_dir_all(&dest_dir).await?;
        let merged_path = subtitle_path_for(video, &dest_dir);
        tracing::info!(
            "writing {} merged captions to {}",
            merged.len(),
            merged_path.display()
        );
        merged.write_to(&merged_path)?;

        let baked = self
            .baker
            .bake(video, &merged_path, &dest_dir, options.force)
            .await?;
        tracing::info!(
            "final video {} with subtitle {}",
            baked.display(),
            merged_path.display()
        );

        if options.clean {
            tokio::fs::remove_dir_all(&tmp_dir).await?;
        }
        Ok(baked)
    }

    /// Caption every part, at most `jobs` at a time, and return the subtitle
    /// paths in part order. Every part is attempted even after a failure.
    async fn transcribe_parts(
        &self,
        parts: &[PathBuf],
        dir: &Path,
        jobs: usize,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let permits = Arc::new(Semaphore::new(jobs.max(1)));
        let mut set = JoinSet::new();

        for (part, video) in parts.iter().cloned().enumerate() {
            let transcriber = Arc::clone(&self.transcriber);
            let permits = Arc::clone(&permits);
            let dir = dir.to_path_buf();
            set.spawn(
                async move {
                    let _permit = permits.acquire_owned().await;
                    let result =
                        find_or_create_subtitle(transcriber.as_ref(), &video, &dir).await;
                    (part, result)
                }
                .in_current_span(),
            );
        }

        let mut results: Vec<Option<PathBuf>> = vec![None; parts.len()];
        let mut failed = 0;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((part, Ok(path))) => results[part] = Some(path),
                Ok((part, Err(err))) => {
                    failed += 1;
                    tracing::error!(
                        part,
                        "error creating subtitle for {}: {err}",
                        parts[part].display()
                    );
                }
                // A panicked task gives no part number; its slot stays empty.
                Err(err) => {
                    failed += 1;
                    tracing::error!("subtitle task did not finish: {err}");
                }
            }
        }

        if failed > 0 {
            return Err(PipelineError::SegmentsFailed {
                failed,
                total: parts.len(),
            });
        }
        Ok(results.into_iter().flatten().collect())
    }

    /// Run the per-video pipeline on every matching file under `options.root`.
    ///
    /// A failing file is logged and counted; the batch always runs to the end.
    pub async fn translate_files(
        &self,
        options: &BatchOptions,
        progress: &ProgressBar,
    ) -> BatchReport {
        let mut report = BatchReport {
            started_at: now_rfc3339(),
            ..Default::default()
        };
        tracing::info!(
            "root: {}, subtitle_root: {:?}, dest_dir: {:?}, force: {}",
            options.root.display(),
            options.subtitle_root,
            options.dest_dir,
            options.force
        );

        let videos = find_videos(&options.root, &options.suffixes);
        progress.set_length(videos.len() as u64);
        // Output path -> the video that produces it.
        let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();

        for video in videos {
            report.total += 1;
            progress.set_message(video.display().to_string());

            let dest_dir = options.dest_dir.clone().unwrap_or_else(|| parent_dir(&video));
            let subtitle_root = match (&options.subtitle_root, options.length) {
                (Some(root), 0) => root.clone(),
                _ => dest_dir.clone(),
            };
            let outputs = [
                subtitle_path_for(&video, &subtitle_root),
                baked_path_for(&video, &dest_dir),
            ];

            let result = if let Some(owner) = outputs.iter().find_map(|o| claimed.get(o)) {
                Err(PipelineError::OutputCollision {
                    path: video.clone(),
                    other: owner.clone(),
                })
            } else if options.length > 0 {
                let segment = SegmentOptions {
                    dest_dir: options.dest_dir.clone(),
                    tmp_dir: None,
                    length: options.length,
                    force: options.force,
                    clean: options.clean,
                    jobs: options.jobs,
                };
                self.split_and_translate(&video, &segment).await
            } else {
                self.translate_video(&video, &subtitle_root, &dest_dir, options.force)
                    .await
            };

            if !matches!(result, Err(PipelineError::OutputCollision { .. })) {
                for output in outputs {
                    claimed.insert(output, video.clone());
                }
            }

            match result {
                Ok(_) => report.succeeded += 1,
                Err(err) => {
                    tracing::error!("error translating {}: {err}", video.display());
                    report.failed += 1;
                    report.failures.push(FailedFile {
                        path: video,
                        error: err.to_string(),
                    });
                }
            }
            progress.inc(1);
        }

        report.finished_at = now_rfc3339();
        tracing::info!(
            "operation complete, {} changed, {} errors, {} in total",
            report.succeeded,
            report.failed,
            report.total
        );
        report
    }
}

fn is_parts_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_type().is_dir() && entry.file_name() == PARTS_DIR_NAME
}

/// Videos under `root` whose extension is in `suffixes`, in a stable order.
///
/// Segment scratch directories and previously baked outputs are skipped.
pub fn find_videos(root: &Path, suffixes: &[String]) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_parts_dir(e))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!("skipping unreadable entry: {err}");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| !e.file_name().to_string_lossy().contains(BAKED_MARKER))
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy();
                    suffixes.iter().any(|s| s.eq_ignore_ascii_case(&ext))
                })
                .unwrap_or(false)
        })
        .map(DirEntry::into_path)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn baked_name() {
        assert_eq!(
            baked_path_for(Path::new("/in/show.ep1.avi"), Path::new("/out")),
            PathBuf::from("/out/show.ep1.translated.mp4")
        );
    }

    #[test]
    fn parent_of_bare_file_name_is_cwd() {
        assert_eq!(parent_dir(Path::new("video.mp4")), PathBuf::from("."));
        assert_eq!(parent_dir(Path::new("/a/video.mp4")), PathBuf::from("/a"));
    }

    #[test]
    fn finds_matching_videos_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a.mp4"));
        touch(&root.join("nested/b.AVI"));
        touch(&root.join("nested/notes.txt"));
        touch(&root.join("a.translated.mp4"));
        touch(&root.join("_parts/a.part0.mp4"));
        touch(&root.join("nested/_parts/b.part0.mp4"));

        let found = find_videos(root, &["mp4".to_string(), "avi".to_string()]);

        assert_eq!(found, vec![root.join("a.mp4"), root.join("nested/b.AVI")]);
    }

    #[test]
    fn report_success_flag() {
        let mut report = BatchReport::default();
        assert!(report.is_success());
        report.failed = 1;
        assert!(!report.is_success());
    }
}
