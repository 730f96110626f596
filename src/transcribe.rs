//! Speech-to-text backends that leave a `.srt` next to the requested output
//! directory.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{PipelineError, Stage};
use crate::ffmpeg::Ffmpeg;
use crate::pipeline::Transcriber;
use crate::process;
use crate::srt::SUBTITLE_EXTENSION;

/// What the speech model should produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Task {
    /// Translate speech into English captions.
    #[default]
    Translate,
    /// Caption in the spoken language.
    Transcribe,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Translate => "translate",
            Task::Transcribe => "transcribe",
        }
    }
}

/// Where a transcriber leaves the captions for `video`: `<dir>/<stem>.srt`.
pub fn subtitle_path_for(video: &Path, dir: &Path) -> PathBuf {
    let stem = video.file_stem().unwrap_or(video.as_os_str());
    let mut name = OsString::from(stem);
    name.push(".");
    name.push(SUBTITLE_EXTENSION);
    dir.join(name)
}

/// Reuse an existing subtitle for `video` in `dir`, or run `transcriber` to
/// create it.
#[tracing::instrument(skip(transcriber))]
pub async fn find_or_create_subtitle(
    transcriber: &dyn Transcriber,
    video: &Path,
    dir: &Path,
) -> Result<PathBuf, PipelineError> {
    let subtitle = subtitle_path_for(video, dir);
    if subtitle.exists() {
        tracing::info!("found existing subtitle {}", subtitle.display());
        return Ok(subtitle);
    }

    tokio::fs::create_dir_all(dir).await?;
    transcriber.transcribe(video, dir).await?;

    if !subtitle.exists() {
        return Err(PipelineError::MissingOutput {
            stage: Stage::Transcribe,
            path: subtitle,
        });
    }
    Ok(subtitle)
}

/// Runs the `whisper` command line tool.
#[derive(Debug, Clone)]
pub struct WhisperCli {
    pub program: PathBuf,
    pub model: String,
    pub language: String,
    pub task: Task,
}

impl Default for WhisperCli {
    fn default() -> Self {
        Self {
            program: PathBuf::from("whisper"),
            model: "medium".to_string(),
            language: "ja".to_string(),
            task: Task::Translate,
        }
    }
}

impl WhisperCli {
    fn command_for(&self, video: &Path, out_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(video)
            .arg("--language")
            .arg(&self.language)
            .arg("--task")
            .arg(self.task.as_str())
            .arg("--output_dir")
            .arg(out_dir)
            .arg("--model")
            .arg(&self.model)
            .args(["--output_format", SUBTITLE_EXTENSION]);
        cmd
    }
}

#[async_trait]
impl Transcriber for WhisperCli {
    async fn transcribe(&self, video: &Path, out_dir: &Path) -> Result<(), PipelineError> {
        let mut cmd = self.command_for(video, out_dir);
        process::run_checked(&mut cmd).await
    }
}

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Sends extracted audio to the OpenAI audio API and stores the SRT reply.
#[derive(Debug, Clone)]
pub struct OpenAiTranscriber {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    pub model: String,
    pub language: String,
    pub task: Task,
    ffmpeg: Ffmpeg,
}

impl OpenAiTranscriber {
    pub fn new(api_key: impl Into<String>, ffmpeg: Ffmpeg) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            model: "whisper-1".to_string(),
            language: "ja".to_string(),
            task: Task::Translate,
            ffmpeg,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        let path = match self.task {
            Task::Translate => "audio/translations",
            Task::Transcribe => "audio/transcriptions",
        };
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn request_srt(&self, wav_path: &Path) -> Result<String, PipelineError> {
        let audio = tokio::fs::read(wav_path).await?;
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", SUBTITLE_EXTENSION);
        // The translations endpoint always targets English and takes no language.
        if self.task == Task::Transcribe {
            form = form.text("language", self.language.clone());
        }

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    #[tracing::instrument(skip(self))]
    async fn transcribe(&self, video: &Path, out_dir: &Path) -> Result<(), PipelineError> {
        let tmp = tempfile::tempdir()?;
        let wav_path = tmp.path().join("audio_16k_mono.wav");
        self.ffmpeg.extract_audio(video, &wav_path).await?;

        let srt = self.request_srt(&wav_path).await?;
        let subtitle = subtitle_path_for(video, out_dir);
        tokio::fs::write(&subtitle, srt).await?;
        tracing::info!("wrote {}", subtitle.display());
        Ok(())
    }
}
