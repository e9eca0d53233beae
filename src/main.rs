//! Command line front end for iConv
//!
//! Downloads with yt-dlp, converts with ffmpeg, and manages both tools.
//! Progress is printed as text, or as one JSON object per line with `--json`.

use clap::{Parser, Subcommand, ValueEnum};
use iconv_lib::media::{GifOptions, ToolOrigin, ToolProvisioner};
use iconv_lib::{
    collect_sources, spawn_batch, ConversionRequest, Converter, DownloadRequest, Job, MediaKind, Quality, Report,
    ReportSink, Settings, ToolType,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// iConv - convert and download media with ffmpeg and yt-dlp
#[derive(Parser, Debug)]
#[command(name = "iconv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to <install dir>/settings.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print reports as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// More diagnostics on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download media from one or more URLs
    Download {
        #[arg(required = true)]
        urls: Vec<String>,

        /// Output directory (defaults to the configured one)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep only the audio track
        #[arg(long)]
        audio_only: bool,

        /// Audio codec for --audio-only; empty keeps the source codec
        #[arg(long, default_value = "mp3")]
        audio_format: String,

        /// Resolution ceiling: best, 1080p, 720p or 480p
        #[arg(short, long, default_value = "best")]
        quality: String,
    },

    /// Convert local files or whole directories
    Convert {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Target format (extension), e.g. mp4, mp3, png, gif
        #[arg(short, long, default_value = "")]
        format: String,

        /// Only pick up this kind of file when scanning directories
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,

        /// Output root; directory structure below the scanned paths is kept
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        width: Option<u32>,

        #[arg(long)]
        height: Option<u32>,

        /// Trim start, e.g. 00:00:05
        #[arg(long)]
        start: Option<String>,

        /// Trim end, e.g. 00:00:10
        #[arg(long)]
        end: Option<String>,

        /// Produce an animated GIF
        #[arg(long)]
        gif: bool,

        /// GIF frame rate (defaults to the configured one)
        #[arg(long)]
        gif_fps: Option<u32>,

        /// GIF loop count: 0 forever, -1 once
        #[arg(long = "loop", default_value_t = 0, allow_hyphen_values = true)]
        loop_count: i32,
    },

    /// Inspect and manage the external tools
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
}

#[derive(Subcommand, Debug)]
enum ToolsAction {
    /// Show where each tool lives and its version
    List,
    /// Download a tool if it is not installed yet
    Install { tool: ToolType },
    /// Replace the managed copy with a fresh download
    Update { tool: ToolType },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum KindArg {
    Image,
    Video,
    Audio,
}

impl From<KindArg> for MediaKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Image => MediaKind::Image,
            KindArg::Video => MediaKind::Video,
            KindArg::Audio => MediaKind::Audio,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let converter = match Converter::from_settings(&settings) {
        Ok(converter) => Arc::new(converter),
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Download {
            urls,
            output,
            audio_only,
            audio_format,
            quality,
        } => {
            let output_dir = output.unwrap_or_else(|| settings.output_dir.clone());
            let quality = Quality::from_label(&quality);
            let jobs = urls
                .into_iter()
                .map(|url| {
                    Job::Download(
                        DownloadRequest::new(url, &output_dir)
                            .with_audio_only(audio_only)
                            .with_quality(quality)
                            .with_audio_format(audio_format.clone()),
                    )
                })
                .collect();
            run_jobs(converter, "Download", jobs, cli.json).await
        }

        Command::Convert {
            paths,
            format,
            kind,
            output,
            width,
            height,
            start,
            end,
            gif,
            gif_fps,
            loop_count,
        } => {
            let sources = collect_sources(&paths, kind.map(MediaKind::from));
            if sources.is_empty() {
                eprintln!("No media files found in the given paths");
                return ExitCode::FAILURE;
            }

            let output_root = output.unwrap_or_else(|| settings.output_dir.clone());
            let gif = (gif || gif_fps.is_some()).then(|| GifOptions {
                fps: gif_fps.unwrap_or(settings.gif_fps).max(1),
                loop_count,
            });
            let jobs = sources
                .iter()
                .map(|item| {
                    Job::Convert(
                        ConversionRequest::new(&item.file, item.output_dir(&output_root), format.clone())
                            .with_resize(width, height)
                            .with_trim(start.clone(), end.clone())
                            .with_gif(gif),
                    )
                })
                .collect();
            run_jobs(converter, "Conversion", jobs, cli.json).await
        }

        Command::Tools { action } => run_tools(converter.provisioner(), action, cli.json).await,
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_jobs(converter: Arc<Converter>, label: &str, jobs: Vec<Job>, json: bool) -> ExitCode {
    let (sink, rx) = ReportSink::channel();
    let printer = spawn_printer(rx, json);
    let batch = spawn_batch(converter, label, jobs, sink);

    let summary = batch.await;
    let _ = printer.await;
    match summary {
        Ok(summary) if summary.all_succeeded() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} aborted: {}", label, e);
            ExitCode::FAILURE
        }
    }
}

async fn run_tools(provisioner: &Arc<ToolProvisioner>, action: ToolsAction, json: bool) -> ExitCode {
    match action {
        ToolsAction::List => {
            let mut infos = Vec::new();
            for tool in ToolType::all() {
                infos.push(provisioner.inspect(tool.spec()).await);
            }
            if json {
                match serde_json::to_string_pretty(&infos) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        eprintln!("{}", e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                for info in infos {
                    match &info.path {
                        Some(path) => println!(
                            "{:<8} {:<12} {} ({})",
                            info.name,
                            info.version.as_deref().unwrap_or("unknown"),
                            path.display(),
                            match info.origin {
                                Some(ToolOrigin::Managed) => "managed",
                                _ => "system",
                            }
                        ),
                        None => println!("{:<8} not installed", info.name),
                    }
                }
            }
            ExitCode::SUCCESS
        }
        ToolsAction::Install { tool } | ToolsAction::Update { tool } => {
            let update = matches!(action, ToolsAction::Update { .. });
            let (sink, rx) = ReportSink::channel();
            let printer = spawn_printer(rx, json);

            let result = if update {
                provisioner.reinstall(tool.spec(), &sink).await
            } else {
                provisioner.ensure_installed(tool.spec(), &sink).await
            };
            match &result {
                Ok(installed) => sink.finished(true, format!("{} ready at {}", tool.as_str(), installed.path.display())),
                Err(e) => sink.finished(false, e.to_string()),
            }
            drop(sink);
            let _ = printer.await;

            if result.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn spawn_printer(mut rx: UnboundedReceiver<Report>, json: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(report) = rx.recv().await {
            if json {
                if let Ok(line) = serde_json::to_string(&report) {
                    println!("{}", line);
                }
                continue;
            }
            match report {
                Report::Log { message } => println!("{}", message),
                Report::Progress { percent, eta } => println!("[{:5.1}%] ETA {}", percent, eta),
                Report::State { .. } => {}
                Report::Finished { success, summary } => {
                    if success {
                        println!("{}", summary);
                    } else {
                        eprintln!("{}", summary);
                    }
                }
                Report::BatchFinished { summary, .. } => println!("{}", summary),
            }
        }
    })
}
