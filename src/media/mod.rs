// Media module - tool provisioning, argument building and process orchestration

pub mod args;
pub mod batch;
pub mod errors;
pub mod fetch;
pub mod models;
pub mod orchestrator;
pub mod process;
pub mod progress;
pub mod tools;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use batch::{collect_sources, output_dir_for, run_batch, spawn_batch, BatchSummary, Job, SourceItem};
pub use errors::ConvertError;
pub use fetch::{ArtifactKind, HttpFetcher};
pub use models::{
    ConversionOutcome, ConversionRequest, DownloadRequest, GifOptions, JobState, MediaKind, NetworkConfig,
    ProgressEvent, Quality, Report,
};
pub use orchestrator::Converter;
pub use process::{ProcessRunner, RunStatus};
pub use tools::{InstalledTool, ToolInfo, ToolOrigin, ToolProvisioner, ToolSpec, ToolType, FFMPEG, YT_DLP};
pub use traits::{ArtifactFetcher, ReportSink};
