// Common data models for conversion and download requests

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Broad category of a source file, decided by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Image => &["png", "jpg", "jpeg", "bmp", "gif", "webp", "tiff"],
            Self::Video => &["mp4", "mkv", "mov", "avi", "flv", "wmv", "webm"],
            Self::Audio => &["mp3", "wav", "flac", "aac", "m4a", "ogg", "opus"],
        }
    }

    /// Classify a path by its (case-insensitive) extension.
    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        [Self::Image, Self::Video, Self::Audio]
            .into_iter()
            .find(|kind| kind.extensions().contains(&ext.as_str()))
    }

    pub fn matches(&self, path: &Path) -> bool {
        Self::of(path) == Some(*self)
    }
}

/// Vertical resolution ceiling for downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    P1080,
    P720,
    P480,
    /// Unconstrained best video+audio
    #[default]
    Best,
}

impl Quality {
    /// Parse a UI label such as "720p". Anything unrecognized means best.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "1080p" | "1080" => Self::P1080,
            "720p" | "720" => Self::P720,
            "480p" | "480" => Self::P480,
            _ => Self::Best,
        }
    }

    pub fn max_height(&self) -> Option<u32> {
        match self {
            Self::P1080 => Some(1080),
            Self::P720 => Some(720),
            Self::P480 => Some(480),
            Self::Best => None,
        }
    }
}

/// Network configuration passed to the download tool and the HTTP client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// SOCKS5/HTTP proxy URL (e.g., "socks5://127.0.0.1:1080")
    pub proxy: Option<String>,

    /// Timeout in seconds
    pub timeout_secs: Option<u32>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout_secs: Some(30),
        }
    }
}

/// One remote download
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    pub output_dir: PathBuf,
    pub audio_only: bool,
    pub quality: Quality,
    /// Audio codec for audio-only downloads; blank lets the tool decide
    pub audio_format: String,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output_dir: output_dir.into(),
            audio_only: false,
            quality: Quality::Best,
            audio_format: "mp3".to_string(),
        }
    }

    pub fn with_audio_only(mut self, audio_only: bool) -> Self {
        self.audio_only = audio_only;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_audio_format(mut self, format: impl Into<String>) -> Self {
        self.audio_format = format.into();
        self
    }
}

/// Target dimensions; a missing side keeps the aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Trim offsets, passed to ffmpeg verbatim
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrimWindow {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GifOptions {
    pub fps: u32,
    /// 0 loops forever, -1 plays once
    pub loop_count: i32,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            fps: 10,
            loop_count: 0,
        }
    }
}

/// One local transcode. The output directory is resolved by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    /// Target extension without the dot; blank keeps the source extension
    pub format: String,
    pub resize: Option<Resize>,
    pub trim: Option<TrimWindow>,
    pub gif: Option<GifOptions>,
}

impl ConversionRequest {
    pub fn new(
        source: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            output_dir: output_dir.into(),
            format: format.into(),
            resize: None,
            trim: None,
            gif: None,
        }
    }

    pub fn with_resize(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.resize = if width.is_some() || height.is_some() {
            Some(Resize { width, height })
        } else {
            None
        };
        self
    }

    pub fn with_trim(mut self, start: Option<String>, end: Option<String>) -> Self {
        self.trim = if start.is_some() || end.is_some() {
            Some(TrimWindow { start, end })
        } else {
            None
        };
        self
    }

    pub fn with_gif(mut self, gif: Option<GifOptions>) -> Self {
        self.gif = gif;
        self
    }

    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

/// Result of one request once its subprocess has exited
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionOutcome {
    pub success: bool,
    /// None when the process was killed by a signal or streaming failed
    pub exit_code: Option<i32>,
    /// Output file for transcodes, output directory for downloads
    pub output: PathBuf,
}

/// One classified line of subprocess output
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Percentage { value: f32, eta: String },
    RawLine(String),
}

/// Per-request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Provisioning,
    Running,
    Succeeded,
    Failed,
}

/// Message delivered from the orchestration layer to its caller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Report {
    Log { message: String },
    Progress { percent: f32, eta: String },
    State { state: JobState },
    /// Exactly one per request
    Finished { success: bool, summary: String },
    /// Exactly one per batch
    BatchFinished {
        succeeded: usize,
        total: usize,
        summary: String,
    },
}
