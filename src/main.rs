use anyhow::{anyhow, Context, Result};
use bulk_subtitler::ffmpeg::{BakeMode, Ffmpeg, FfmpegBaker, FfmpegSegmenter};
use bulk_subtitler::pipeline::{BatchOptions, Pipeline, SegmentOptions, Transcriber};
use bulk_subtitler::srt::{merge_segments, CaptionTrack};
use bulk_subtitler::transcribe::{OpenAiTranscriber, Task, WhisperCli};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod logging;

#[derive(Parser, Debug)]
#[command(
    name = "bulk-subtitler",
    version,
    about = "Generate subtitles for videos with Whisper and bake them in with ffmpeg"
)]
struct Cli {
    #[command(flatten)]
    tools: ToolArgs,

    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Local `whisper` command line tool
    WhisperCli,
    /// OpenAI audio API (needs OPENAI_API_KEY)
    Openai,
}

#[derive(Args, Debug)]
struct ToolArgs {
    /// Speech-to-text backend
    #[arg(long, global = true, value_enum, default_value_t = Backend::WhisperCli)]
    transcriber: Backend,

    /// Spoken language of the videos
    #[arg(long, global = true, default_value = "ja")]
    language: String,

    /// Translate to English or caption in the spoken language
    #[arg(long, global = true, value_enum, default_value_t = Task::Translate)]
    task: Task,

    /// Whisper model (default: medium for the CLI, whisper-1 for OpenAI)
    #[arg(long, global = true)]
    whisper_model: Option<String>,

    /// Burn captions into the frames or mux a soft subtitle track
    #[arg(long, global = true, value_enum, default_value_t = BakeMode::Burn)]
    bake_mode: BakeMode,

    /// Number of segments transcribed at the same time
    #[arg(short, long, global = true, default_value_t = 1)]
    jobs: usize,

    /// ffmpeg executable
    #[arg(long, global = true, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// whisper executable
    #[arg(long, global = true, default_value = "whisper")]
    whisper: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subtitle and bake every video under a directory
    Batch {
        /// Root of the directory tree to process (default: current dir)
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// Directory holding existing subtitles (default: the output dir)
        #[arg(short = 's', long)]
        subtitle_path: Option<PathBuf>,

        /// Output dir (default: alongside each video)
        #[arg(short = 'o', long)]
        dest_dir: Option<PathBuf>,

        /// Split length in minutes; 0 means no split
        #[arg(short, long, default_value_t = 0)]
        length: u32,

        /// Redo steps whose output already exists
        #[arg(short, long)]
        force: bool,

        /// Remove segment files afterwards
        #[arg(short, long)]
        clean: bool,

        /// Comma-separated video extensions to include
        #[arg(long = "suffix", value_delimiter = ',', default_value = "mp4,avi")]
        suffixes: Vec<String>,

        /// Write the batch summary as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Split one video, subtitle each part, merge and bake
    Segment {
        #[arg(short, long)]
        input: PathBuf,

        /// Output dir (default: alongside the input)
        #[arg(short = 'o', long)]
        dest_dir: Option<PathBuf>,

        /// Directory for parts (default: <dest-dir>/_parts)
        #[arg(short, long)]
        tmp_dir: Option<PathBuf>,

        /// Split length in minutes
        #[arg(short, long, default_value_t = 10)]
        length: u32,

        #[arg(short, long)]
        force: bool,

        #[arg(short, long)]
        clean: bool,
    },
    /// Only split a video into fixed-length parts
    Split {
        #[arg(short, long)]
        input: PathBuf,

        /// Output dir (default: alongside the input)
        #[arg(short = 'o', long)]
        dest_dir: Option<PathBuf>,

        #[arg(short, long, default_value_t = 10)]
        length: u32,

        #[arg(short, long)]
        force: bool,
    },
    /// Subtitle one video without splitting and bake
    Translate {
        #[arg(short, long)]
        input: PathBuf,

        /// Directory holding existing subtitles (default: the output dir)
        #[arg(short = 's', long)]
        subtitle_path: Option<PathBuf>,

        /// Output dir (default: alongside the input)
        #[arg(short = 'o', long)]
        dest_dir: Option<PathBuf>,

        #[arg(short, long)]
        force: bool,
    },
    /// Merge per-segment subtitle files (in part order) onto one timeline
    Merge {
        /// Segment length in minutes the parts were cut with
        #[arg(short, long)]
        length: u32,

        /// Merged subtitle file
        #[arg(short, long)]
        output: PathBuf,

        /// Segment subtitle files, part 0 first
        #[arg(required = true)]
        segments: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet)?;

    run(cli.command, &cli.tools).await
}

async fn connect(tools: &ToolArgs) -> Result<Pipeline> {
    let ffmpeg = Ffmpeg::new(&tools.ffmpeg);
    ffmpeg
        .ensure_available()
        .await
        .context("ffmpeg is required (install via brew/apt/choco)")?;
    build_pipeline(tools, ffmpeg)
}

fn build_pipeline(tools: &ToolArgs, ffmpeg: Ffmpeg) -> Result<Pipeline> {
    let transcriber: Arc<dyn Transcriber> = match tools.transcriber {
        Backend::WhisperCli => {
            let mut whisper = WhisperCli {
                program: tools.whisper.clone(),
                language: tools.language.clone(),
                task: tools.task,
                ..WhisperCli::default()
            };
            if let Some(model) = &tools.whisper_model {
                whisper.model = model.clone();
            }
            Arc::new(whisper)
        }
        Backend::Openai => {
            let api_key = env::var("OPENAI_API_KEY")
                .context("Set OPENAI_API_KEY environment variable for OpenAI access")?;
            let mut openai = OpenAiTranscriber::new(api_key, ffmpeg.clone());
            openai.language = tools.language.clone();
            openai.task = tools.task;
            if let Some(model) = &tools.whisper_model {
                openai.model = model.clone();
            }
            Arc::new(openai)
        }
    };

    Ok(Pipeline::new(
        Arc::new(FfmpegSegmenter::new(ffmpeg.clone())),
        transcriber,
        Arc::new(FfmpegBaker::new(ffmpeg, tools.bake_mode)),
    ))
}

fn require_input(input: &Path) -> Result<()> {
    if !input.exists() {
        return Err(anyhow!("Input file not found: {}", input.display()));
    }
    Ok(())
}

fn dir_of(input: &Path) -> PathBuf {
    match input.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn run(command: Command, tools: &ToolArgs) -> Result<()> {
    let jobs = tools.jobs;
    match command {
        Command::Batch {
            root,
            subtitle_path,
            dest_dir,
            length,
            force,
            clean,
            suffixes,
            report,
        } => {
            let options = BatchOptions {
                subtitle_root: subtitle_path.or_else(|| dest_dir.clone()),
                root,
                dest_dir,
                length,
                force,
                clean,
                suffixes,
                jobs,
            };
            let pipeline = connect(tools).await?;
            let progress = ProgressBar::new(0);
            progress.set_style(ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_msg}")?);

            let summary = pipeline.translate_files(&options, &progress).await;
            progress.finish_with_message(format!(
                "Done. {} changed, {} errors, {} in total",
                summary.succeeded, summary.failed, summary.total
            ));

            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&summary)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Write report to {}", path.display()))?;
            }
            if !summary.is_success() {
                return Err(anyhow!("{} of {} files failed", summary.failed, summary.total));
            }
            Ok(())
        }
        Command::Segment {
            input,
            dest_dir,
            tmp_dir,
            length,
            force,
            clean,
        } => {
            require_input(&input)?;
            let pipeline = connect(tools).await?;
            let options = SegmentOptions {
                dest_dir,
                tmp_dir,
                length,
                force,
                clean,
                jobs,
            };
            let baked = pipeline
                .split_and_translate(&input, &options)
                .await
                .with_context(|| format!("Subtitle {}", input.display()))?;
            println!("{}", baked.display());
            Ok(())
        }
        Command::Split {
            input,
            dest_dir,
            length,
            force,
        } => {
            require_input(&input)?;
            let pipeline = connect(tools).await?;
            let dest_dir = dest_dir.unwrap_or_else(|| dir_of(&input));
            let parts = pipeline.split(&input, length, &dest_dir, force).await?;
            tracing::info!("operation complete, {} created", parts.len());
            for part in parts {
                println!("{}", part.display());
            }
            Ok(())
        }
        Command::Translate {
            input,
            subtitle_path,
            dest_dir,
            force,
        } => {
            require_input(&input)?;
            let pipeline = connect(tools).await?;
            let dest_dir = dest_dir.unwrap_or_else(|| dir_of(&input));
            let subtitle_root = subtitle_path.unwrap_or_else(|| dest_dir.clone());
            let baked = pipeline
                .translate_video(&input, &subtitle_root, &dest_dir, force)
                .await
                .with_context(|| format!("Subtitle {}", input.display()))?;
            println!("{}", baked.display());
            Ok(())
        }
        Command::Merge {
            length,
            output,
            segments,
        } => merge_files(&segments, length, &output),
    }
}

fn merge_files(segments: &[PathBuf], length: u32, output: &Path) -> Result<()> {
    let tracks = segments
        .iter()
        .map(|path| {
            CaptionTrack::read_from(path)
                .with_context(|| format!("Read subtitle {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let merged = merge_segments(tracks, length)?;
    merged
        .write_to(output)
        .with_context(|| format!("Create SRT at {}", output.display()))?;
    tracing::info!("merged {} captions into {}", merged.len(), output.display());
    Ok(())
}
