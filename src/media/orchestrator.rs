// Request orchestration: provision, build arguments, run, report

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use super::args::{download_args, output_path, transcode_args};
use super::errors::ConvertError;
use super::fetch::HttpFetcher;
use super::models::{ConversionOutcome, ConversionRequest, DownloadRequest, JobState, NetworkConfig, ProgressEvent};
use super::process::{ProcessRunner, RunStatus};
use super::progress::classify;
use super::tools::{InstalledTool, ToolProvisioner, ToolSpec, FFMPEG, YT_DLP};
use super::traits::ReportSink;
use crate::config::Settings;

/// Runs single download and transcode requests.
///
/// Every request moves through `Pending -> [Provisioning] -> Running ->
/// Succeeded | Failed` and ends with exactly one `Finished` report, whether
/// it fails validation, fails to provision, or runs to completion. The only
/// state shared between requests is the provisioner's tool cache.
pub struct Converter {
    provisioner: Arc<ToolProvisioner>,
    runner: ProcessRunner,
    network: NetworkConfig,
    retries: u32,
}

impl Converter {
    pub fn new(provisioner: Arc<ToolProvisioner>) -> Self {
        Self {
            provisioner,
            runner: ProcessRunner::new(),
            network: NetworkConfig::default(),
            retries: 10,
        }
    }

    /// Wire up an HTTP-backed provisioner from user settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConvertError> {
        let fetcher = Arc::new(HttpFetcher::new(&settings.network)?);
        let provisioner = ToolProvisioner::new(&settings.install_dir, fetcher)
            .with_prefer_system(settings.prefer_system_tools)
            .with_overrides(settings.tool_overrides.clone());
        Ok(Self::new(Arc::new(provisioner))
            .with_network(settings.network.clone())
            .with_retries(settings.download_retries))
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn provisioner(&self) -> &Arc<ToolProvisioner> {
        &self.provisioner
    }

    /// Download one URL with yt-dlp into `req.output_dir`.
    ///
    /// Validation and provisioning failures come back as `Err` after the
    /// failure summary was reported. A tool that runs and exits non-zero is
    /// `Ok` with `success == false`.
    pub async fn download_media(
        &self,
        req: &DownloadRequest,
        sink: &ReportSink,
    ) -> Result<ConversionOutcome, ConvertError> {
        sink.state(JobState::Pending);
        match self.run_download(req, sink).await {
            Ok((outcome, status)) => {
                let summary = match &status {
                    RunStatus::Exited(_) if outcome.success => {
                        "Download finished successfully!".to_string()
                    }
                    _ => format!("Download failed{}", failure_detail(&status)),
                };
                Ok(self.settle(outcome, summary, sink))
            }
            Err(e) => Err(self.abort(e, sink, |e| format!("Error during download: {}", e))),
        }
    }

    /// Transcode one local file with ffmpeg.
    pub async fn convert_media(
        &self,
        req: &ConversionRequest,
        sink: &ReportSink,
    ) -> Result<ConversionOutcome, ConvertError> {
        sink.state(JobState::Pending);
        let name = req.file_name();
        match self.run_conversion(req, sink).await {
            Ok((outcome, status)) => {
                let summary = if outcome.success {
                    format!("Converted {} -> {}", name, outcome.output.display())
                } else {
                    format!("Conversion of {} failed{}", name, failure_detail(&status))
                };
                Ok(self.settle(outcome, summary, sink))
            }
            Err(e) => Err(self.abort(e, sink, |e| format!("Error converting {}: {}", name, e))),
        }
    }

    async fn run_download(
        &self,
        req: &DownloadRequest,
        sink: &ReportSink,
    ) -> Result<(ConversionOutcome, RunStatus), ConvertError> {
        let url = req.url.trim();
        if url.is_empty() {
            return Err(ConvertError::invalid("URL is empty"));
        }
        if req.output_dir.as_os_str().is_empty() {
            return Err(ConvertError::invalid("output directory is empty"));
        }

        let ytdlp = self.provision(&YT_DLP, sink).await?;
        tokio::fs::create_dir_all(&req.output_dir)
            .await
            .map_err(|e| ConvertError::io("create output directory", &req.output_dir, e))?;

        let args = download_args(req, &self.network, self.retries);
        sink.log(format!("Starting download for: {}", url));
        sink.log(format!(
            "Executing command: {} {}",
            ytdlp.path.display(),
            args.join(" ")
        ));
        info!(url, "starting download");

        sink.state(JobState::Running);
        let status = self
            .runner
            .run(&ytdlp.path, &args, |line| match classify(&line) {
                ProgressEvent::Percentage { value, eta } => sink.progress(value, eta),
                ProgressEvent::RawLine(line) => sink.log(line),
            })
            .await?;

        let outcome = ConversionOutcome {
            success: status.success(),
            exit_code: status.code(),
            output: req.output_dir.clone(),
        };
        Ok((outcome, status))
    }

    async fn run_conversion(
        &self,
        req: &ConversionRequest,
        sink: &ReportSink,
    ) -> Result<(ConversionOutcome, RunStatus), ConvertError> {
        validate_source(&req.source)?;
        if req.output_dir.as_os_str().is_empty() {
            return Err(ConvertError::invalid("output directory is empty"));
        }
        let output = output_path(req);
        if same_file(&req.source, &output) {
            return Err(ConvertError::invalid(format!(
                "output {} would overwrite the source",
                output.display()
            )));
        }

        tokio::fs::create_dir_all(&req.output_dir)
            .await
            .map_err(|e| ConvertError::io("create output directory", &req.output_dir, e))?;

        let ffmpeg = self.provision(&FFMPEG, sink).await?;
        let args = transcode_args(req);
        sink.log(format!("Converting {}...", req.file_name()));
        info!(source = %req.source.display(), output = %output.display(), "starting conversion");

        sink.state(JobState::Running);
        let status = self
            .runner
            .run(&ffmpeg.path, &args, |line| sink.log(line))
            .await?;

        let outcome = ConversionOutcome {
            success: status.success(),
            exit_code: status.code(),
            output,
        };
        Ok((outcome, status))
    }

    async fn provision(&self, tool: &ToolSpec, sink: &ReportSink) -> Result<InstalledTool, ConvertError> {
        if !self.provisioner.is_ready(tool) {
            sink.state(JobState::Provisioning);
        }
        self.provisioner.ensure_installed(tool, sink).await
    }

    fn settle(&self, outcome: ConversionOutcome, summary: String, sink: &ReportSink) -> ConversionOutcome {
        if outcome.success {
            sink.state(JobState::Succeeded);
        } else {
            error!(exit_code = ?outcome.exit_code, "{}", summary);
            sink.state(JobState::Failed);
        }
        sink.finished(outcome.success, summary);
        outcome
    }

    fn abort<F>(&self, e: ConvertError, sink: &ReportSink, describe: F) -> ConvertError
    where
        F: FnOnce(&ConvertError) -> String,
    {
        let summary = describe(&e);
        error!("{}", summary);
        sink.state(JobState::Failed);
        sink.finished(false, summary);
        e
    }
}

fn failure_detail(status: &RunStatus) -> String {
    match status {
        RunStatus::Exited(_) => match status.code() {
            Some(code) => format!(" with exit code: {}", code),
            None => ": process was terminated by a signal".to_string(),
        },
        RunStatus::StreamFailed(e) => format!(": error reading tool output: {}", e),
    }
}

fn validate_source(source: &Path) -> Result<(), ConvertError> {
    if source.as_os_str().is_empty() {
        return Err(ConvertError::invalid("source path is empty"));
    }
    if !source.is_file() {
        return Err(ConvertError::invalid(format!(
            "source file not found: {}",
            source.display()
        )));
    }
    std::fs::File::open(source).map_err(|e| {
        ConvertError::invalid(format!("source file is not readable: {} ({})", source.display(), e))
    })?;
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
