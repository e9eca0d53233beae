// External tool catalogue and on-demand provisioning

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::process::Command;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::errors::ConvertError;
use super::fetch::{extract_archive, ArtifactKind};
use super::traits::{ArtifactFetcher, ReportSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Linux => "linux",
            Self::Other => "this platform",
        }
    }
}

/// A published download for one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Artifact {
    pub url: &'static str,
    pub kind: ArtifactKind,
}

/// Everything needed to find, fetch and query one external tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub version_arg: &'static str,
    pub windows: Option<Artifact>,
    pub macos: Option<Artifact>,
    pub linux: Option<Artifact>,
    /// Shown when the tool can be neither downloaded nor found on PATH
    pub install_hint: &'static str,
}

impl ToolSpec {
    pub fn executable_name(&self, platform: Platform) -> String {
        match platform {
            Platform::Windows => format!("{}.exe", self.name),
            _ => self.name.to_string(),
        }
    }

    pub fn artifact(&self, platform: Platform) -> Option<Artifact> {
        match platform {
            Platform::Windows => self.windows,
            Platform::MacOs => self.macos,
            Platform::Linux => self.linux,
            Platform::Other => None,
        }
    }
}

pub const YT_DLP: ToolSpec = ToolSpec {
    name: "yt-dlp",
    version_arg: "--version",
    windows: Some(Artifact {
        url: "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp.exe",
        kind: ArtifactKind::Binary,
    }),
    macos: Some(Artifact {
        url: "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_macos",
        kind: ArtifactKind::Binary,
    }),
    linux: Some(Artifact {
        url: "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp",
        kind: ArtifactKind::Binary,
    }),
    install_hint: "Install yt-dlp and make sure it is on PATH.",
};

pub const FFMPEG: ToolSpec = ToolSpec {
    name: "ffmpeg",
    version_arg: "-version",
    windows: Some(Artifact {
        url: "https://github.com/BtbN/FFmpeg-Builds/releases/download/latest/ffmpeg-master-latest-win64-gpl.zip",
        kind: ArtifactKind::Zip,
    }),
    macos: Some(Artifact {
        url: "https://evermeet.cx/ffmpeg/getrelease/zip",
        kind: ArtifactKind::Zip,
    }),
    linux: None,
    install_hint: "Install ffmpeg with your package manager (for example `apt install ffmpeg`) \
                   or set a download URL under tool_overrides.",
};

/// The tools the converter knows how to manage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        self.spec().name
    }

    pub fn spec(&self) -> &'static ToolSpec {
        match self {
            ToolType::YtDlp => &YT_DLP,
            ToolType::Ffmpeg => &FFMPEG,
        }
    }

    pub fn all() -> [ToolType; 2] {
        [ToolType::YtDlp, ToolType::Ffmpeg]
    }
}

impl FromStr for ToolType {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yt-dlp" | "ytdlp" => Ok(ToolType::YtDlp),
            "ffmpeg" => Ok(ToolType::Ffmpeg),
            other => Err(ConvertError::invalid(format!("Unknown tool: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolOrigin {
    /// Downloaded into the install directory
    Managed,
    /// Found on PATH
    System,
}

/// A tool that was verified runnable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledTool {
    pub path: PathBuf,
    pub origin: ToolOrigin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub origin: Option<ToolOrigin>,
    pub is_available: bool,
    pub last_updated: Option<String>, // RFC 3339
}

type Slot = Arc<AsyncMutex<Option<InstalledTool>>>;

/// Makes external tools available on demand.
///
/// Each tool has its own async lock, so concurrent requests for the same
/// tool wait for a single download while different tools proceed in
/// parallel. Installs land through a rename, so a reader never sees a
/// partially written binary, and a failed attempt leaves nothing cached.
pub struct ToolProvisioner {
    install_dir: PathBuf,
    platform: Platform,
    prefer_system: bool,
    overrides: HashMap<String, String>,
    fetcher: Arc<dyn ArtifactFetcher>,
    slots: std::sync::Mutex<HashMap<&'static str, Slot>>,
}

impl ToolProvisioner {
    pub fn new(install_dir: impl Into<PathBuf>, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self {
            install_dir: install_dir.into(),
            platform: Platform::current(),
            prefer_system: false,
            overrides: HashMap::new(),
            fetcher,
            slots: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_prefer_system(mut self, prefer_system: bool) -> Self {
        self.prefer_system = prefer_system;
        self
    }

    /// Download URLs keyed by tool name, replacing the built-in ones
    pub fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn tool_dir(&self, tool: &ToolSpec) -> PathBuf {
        self.install_dir.join(tool.name)
    }

    /// Return a runnable path for `tool`, downloading it on first use.
    pub async fn ensure_installed(
        &self,
        tool: &ToolSpec,
        sink: &ReportSink,
    ) -> Result<InstalledTool, ConvertError> {
        let slot = self.slot(tool);
        let mut cached = slot.lock().await;

        if let Some(installed) = cached.as_ref() {
            if is_executable(&installed.path) {
                sink.log(format!(
                    "Using existing {} at {}",
                    tool.name,
                    installed.path.display()
                ));
                return Ok(installed.clone());
            }
            debug!(tool = tool.name, path = %installed.path.display(), "cached tool vanished");
            *cached = None;
        }

        let installed = self.provision(tool, sink).await?;
        *cached = Some(installed.clone());
        Ok(installed)
    }

    /// True when [`ensure_installed`](Self::ensure_installed) would not download.
    pub fn is_ready(&self, tool: &ToolSpec) -> bool {
        let exe = tool.executable_name(self.platform);
        if locate_binary(&self.tool_dir(tool), &exe).is_some() {
            return true;
        }
        (self.prefer_system || self.artifact_for(tool).is_none()) && which::which(tool.name).is_ok()
    }

    /// Non-downloading check: the managed copy, or the PATH copy.
    pub fn lookup(&self, tool: &ToolSpec) -> Option<InstalledTool> {
        let exe = tool.executable_name(self.platform);
        if let Some(path) = locate_binary(&self.tool_dir(tool), &exe) {
            return Some(InstalledTool {
                path,
                origin: ToolOrigin::Managed,
            });
        }
        which::which(tool.name).ok().map(|path| InstalledTool {
            path,
            origin: ToolOrigin::System,
        })
    }

    /// Drop the managed copy and provision again.
    pub async fn reinstall(
        &self,
        tool: &ToolSpec,
        sink: &ReportSink,
    ) -> Result<InstalledTool, ConvertError> {
        let slot = self.slot(tool);
        let mut cached = slot.lock().await;
        *cached = None;

        let tool_dir = self.tool_dir(tool);
        if tool_dir.exists() {
            sink.log(format!("Removing {}", tool_dir.display()));
            tokio::fs::remove_dir_all(&tool_dir)
                .await
                .map_err(|e| ConvertError::io("remove tool", &tool_dir, e))?;
        }

        let installed = self.provision(tool, sink).await?;
        *cached = Some(installed.clone());
        Ok(installed)
    }

    /// Where a tool lives and which version it reports, without installing it.
    pub async fn inspect(&self, tool: &ToolSpec) -> ToolInfo {
        let installed = self.lookup(tool);
        let (version, last_updated) = match &installed {
            Some(t) => (
                tool_version(&t.path, tool.version_arg).await,
                modified_rfc3339(&t.path),
            ),
            None => (None, None),
        };

        ToolInfo {
            name: tool.name.to_string(),
            version,
            is_available: installed.is_some(),
            path: installed.as_ref().map(|t| t.path.clone()),
            origin: installed.map(|t| t.origin),
            last_updated,
        }
    }

    fn slot(&self, tool: &ToolSpec) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(tool.name).or_default().clone()
    }

    fn artifact_for(&self, tool: &ToolSpec) -> Option<(String, ArtifactKind)> {
        if let Some(url) = self.overrides.get(tool.name) {
            return Some((url.clone(), ArtifactKind::from_url(url)));
        }
        tool.artifact(self.platform)
            .map(|a| (a.url.to_string(), a.kind))
    }

    // Caller holds the tool's slot lock.
    async fn provision(
        &self,
        tool: &ToolSpec,
        sink: &ReportSink,
    ) -> Result<InstalledTool, ConvertError> {
        let exe = tool.executable_name(self.platform);
        let tool_dir = self.tool_dir(tool);

        if let Some(path) = locate_binary(&tool_dir, &exe) {
            sink.log(format!("Using existing {} at {}", tool.name, path.display()));
            return Ok(InstalledTool {
                path,
                origin: ToolOrigin::Managed,
            });
        }

        let artifact = self.artifact_for(tool);
        if self.prefer_system || artifact.is_none() {
            if let Ok(path) = which::which(tool.name) {
                sink.log(format!("Using system {} at {}", tool.name, path.display()));
                return Ok(InstalledTool {
                    path,
                    origin: ToolOrigin::System,
                });
            }
        }

        let Some((url, kind)) = artifact else {
            return Err(ConvertError::ToolUnavailable {
                tool: tool.name.to_string(),
                hint: format!(
                    "No download is published for {}. {}",
                    self.platform.as_str(),
                    tool.install_hint
                ),
            });
        };

        tokio::fs::create_dir_all(&self.install_dir)
            .await
            .map_err(|e| ConvertError::io("create install directory", &self.install_dir, e))?;

        sink.log(format!("{} not found. Downloading from {}...", tool.name, url));
        info!(tool = tool.name, url = %url, fetcher = self.fetcher.name(), "provisioning tool");

        let download = tempfile::Builder::new()
            .prefix(&format!(".{}-", tool.name))
            .suffix(".part")
            .tempfile_in(&self.install_dir)
            .map_err(|e| ConvertError::io("create download file", &self.install_dir, e))?;

        self.fetcher.fetch(&url, download.path(), sink).await?;

        let path = if kind.is_archive() {
            self.install_archive(tool, kind, download, &exe, sink).await?
        } else {
            install_binary(download, &tool_dir, &exe)?
        };

        sink.log(format!(
            "{} installed successfully to {}",
            tool.name,
            path.display()
        ));
        info!(tool = tool.name, path = %path.display(), "tool installed");
        Ok(InstalledTool {
            path,
            origin: ToolOrigin::Managed,
        })
    }

    async fn install_archive(
        &self,
        tool: &ToolSpec,
        kind: ArtifactKind,
        download: tempfile::NamedTempFile,
        exe: &str,
        sink: &ReportSink,
    ) -> Result<PathBuf, ConvertError> {
        let archive = download.path().to_path_buf();
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}-staging-", tool.name))
            .tempdir_in(&self.install_dir)
            .map_err(|e| ConvertError::io("create staging directory", &self.install_dir, e))?;

        sink.log(format!("Extracting {}...", tool.name));
        let (from, into) = (archive.clone(), staging.path().to_path_buf());
        tokio::task::spawn_blocking(move || extract_archive(kind, &from, &into))
            .await
            .map_err(|e| ConvertError::extraction(&archive, e))??;

        let found = find_file(staging.path(), exe).ok_or_else(|| {
            ConvertError::extraction(&archive, format!("{} not found inside archive", exe))
        })?;
        set_executable(&found)?;

        let tool_dir = self.tool_dir(tool);
        promote(staging.path(), &tool_dir, exe)?;
        drop(download);

        locate_binary(&tool_dir, exe).ok_or_else(|| {
            ConvertError::extraction(&archive, format!("{} missing after install", exe))
        })
    }
}

fn install_binary(
    download: tempfile::NamedTempFile,
    tool_dir: &Path,
    exe: &str,
) -> Result<PathBuf, ConvertError> {
    std::fs::create_dir_all(tool_dir)
        .map_err(|e| ConvertError::io("create tool directory", tool_dir, e))?;
    set_executable(download.path())?;

    let target = tool_dir.join(exe);
    download
        .persist(&target)
        .map_err(|e| ConvertError::io("install tool", &target, e.error))?;
    Ok(target)
}

/// Move a finished staging directory into place.
///
/// Another process may have installed the same tool meanwhile; a complete
/// install already in place counts as success.
fn promote(staging: &Path, tool_dir: &Path, exe: &str) -> Result<(), ConvertError> {
    match std::fs::rename(staging, tool_dir) {
        Ok(()) => Ok(()),
        Err(e) if tool_dir.exists() => {
            if locate_binary(tool_dir, exe).is_some() {
                debug!(tool_dir = %tool_dir.display(), "install already completed elsewhere");
                return Ok(());
            }
            warn!(tool_dir = %tool_dir.display(), error = %e, "replacing incomplete install");
            std::fs::remove_dir_all(tool_dir)
                .map_err(|e| ConvertError::io("remove incomplete install", tool_dir, e))?;
            std::fs::rename(staging, tool_dir)
                .map_err(|e| ConvertError::io("install tool", tool_dir, e))
        }
        Err(e) => Err(ConvertError::io("install tool", tool_dir, e)),
    }
}

/// Shallowest runnable file called `exe` under `dir`.
fn locate_binary(dir: &Path, exe: &str) -> Option<PathBuf> {
    find_matching(dir, exe, is_executable)
}

/// Shallowest regular file called `exe` under `dir`, runnable or not.
fn find_file(dir: &Path, exe: &str) -> Option<PathBuf> {
    find_matching(dir, exe, Path::is_file)
}

fn find_matching(dir: &Path, exe: &str, accept: fn(&Path) -> bool) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name() == exe && accept(entry.path()))
        .min_by_key(|entry| entry.depth())
        .map(|entry| entry.into_path())
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

fn set_executable(path: &Path) -> Result<(), ConvertError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| ConvertError::io("mark executable", path, e))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

async fn tool_version(path: &Path, arg: &str) -> Option<String> {
    let output = Command::new(path)
        .arg(arg)
        .kill_on_drop(true)
        .output();
    match tokio::time::timeout(Duration::from_secs(15), output).await {
        Ok(Ok(output)) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn modified_rfc3339(path: &Path) -> Option<String> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    OffsetDateTime::from(modified).format(&Rfc3339).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::test_support::{leftovers, zip_bytes, CountingFetcher, Payload};

    const FAKE_BINARY: ToolSpec = ToolSpec {
        name: "fake-tool",
        version_arg: "--version",
        windows: Some(Artifact {
            url: "https://example.invalid/fake-tool.exe",
            kind: ArtifactKind::Binary,
        }),
        macos: Some(Artifact {
            url: "https://example.invalid/fake-tool-mac",
            kind: ArtifactKind::Binary,
        }),
        linux: Some(Artifact {
            url: "https://example.invalid/fake-tool",
            kind: ArtifactKind::Binary,
        }),
        install_hint: "",
    };

    const FAKE_ARCHIVE: ToolSpec = ToolSpec {
        name: "fake-archive",
        version_arg: "-version",
        windows: None,
        macos: None,
        linux: Some(Artifact {
            url: "https://example.invalid/fake-archive.zip",
            kind: ArtifactKind::Zip,
        }),
        install_hint: "",
    };

    const UNPUBLISHED: ToolSpec = ToolSpec {
        name: "iconv-test-no-such-tool",
        version_arg: "--version",
        windows: None,
        macos: None,
        linux: None,
        install_hint: "Install it yourself.",
    };

    fn provisioner(dir: &Path, fetcher: Arc<CountingFetcher>) -> ToolProvisioner {
        ToolProvisioner::new(dir, fetcher).with_platform(Platform::Linux)
    }

    fn archive_payload() -> Vec<u8> {
        zip_bytes(&[
            ("fake-archive-7.0/bin/fake-archive", b"#!/bin/sh\necho 7.0\n"),
            ("fake-archive-7.0/doc/LICENSE", b"license"),
        ])
    }

    #[tokio::test]
    async fn test_second_call_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(CountingFetcher::new(b"#!/bin/sh\n".to_vec()));
        let provisioner = provisioner(dir.path(), fetcher.clone());
        let (sink, _rx) = ReportSink::channel();

        let first = provisioner.ensure_installed(&FAKE_BINARY, &sink).await.unwrap();
        let second = provisioner.ensure_installed(&FAKE_BINARY, &sink).await.unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(first.origin, ToolOrigin::Managed);
        assert_eq!(first.path, dir.path().join("fake-tool").join("fake-tool"));
        assert!(is_executable(&first.path));
    }

    #[tokio::test]
    async fn test_existing_install_skips_download() {
        let dir = tempfile::tempdir().unwrap();
        let tool_dir = dir.path().join("fake-tool");
        std::fs::create_dir_all(&tool_dir).unwrap();
        std::fs::write(tool_dir.join("fake-tool"), b"bin").unwrap();
        set_executable(&tool_dir.join("fake-tool")).unwrap();

        let fetcher = Arc::new(CountingFetcher::new(b"unused".to_vec()));
        let provisioner = provisioner(dir.path(), fetcher.clone());
        let (sink, mut rx) = ReportSink::channel();

        let installed = provisioner.ensure_installed(&FAKE_BINARY, &sink).await.unwrap();
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(installed.path, tool_dir.join("fake-tool"));

        let reports = crate::media::test_support::drain(&mut rx);
        assert!(reports.iter().any(|r| matches!(
            r,
            crate::media::models::Report::Log { message } if message.starts_with("Using existing fake-tool")
        )));
    }

    #[tokio::test]
    async fn test_concurrent_requests_download_once() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(
            CountingFetcher::new(b"#!/bin/sh\n".to_vec()).with_delay(Duration::from_millis(100)),
        );
        let provisioner = Arc::new(provisioner(dir.path(), fetcher.clone()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let provisioner = provisioner.clone();
                tokio::spawn(async move {
                    let (sink, _rx) = ReportSink::channel();
                    provisioner.ensure_installed(&FAKE_BINARY, &sink).await
                })
            })
            .collect();

        let mut paths = Vec::new();
        for handle in handles {
            paths.push(handle.await.unwrap().unwrap().path);
        }

        assert_eq!(fetcher.calls(), 1);
        assert!(paths.windows(2).all(|w| w[0] == w[1]));
        assert!(is_executable(&paths[0]));
        assert!(leftovers(dir.path()).is_empty(), "{:?}", leftovers(dir.path()));
    }

    #[tokio::test]
    async fn test_independent_provisioners_share_directory() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(
            CountingFetcher::new(archive_payload()).with_delay(Duration::from_millis(50)),
        );
        let a = provisioner(dir.path(), fetcher.clone());
        let b = provisioner(dir.path(), fetcher.clone());
        let (sink, _rx) = ReportSink::channel();

        let (ra, rb) = tokio::join!(
            a.ensure_installed(&FAKE_ARCHIVE, &sink),
            b.ensure_installed(&FAKE_ARCHIVE, &sink)
        );
        let (ra, rb) = (ra.unwrap(), rb.unwrap());

        assert_eq!(ra.path, rb.path);
        assert_eq!(std::fs::read(&ra.path).unwrap(), b"#!/bin/sh\necho 7.0\n");
        assert!(leftovers(dir.path()).is_empty(), "{:?}", leftovers(dir.path()));
    }

    #[tokio::test]
    async fn test_archive_install_finds_nested_binary() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(CountingFetcher::new(archive_payload()));
        let provisioner = provisioner(dir.path(), fetcher.clone());
        let (sink, _rx) = ReportSink::channel();

        let installed = provisioner.ensure_installed(&FAKE_ARCHIVE, &sink).await.unwrap();
        let tool_dir = dir.path().join("fake-archive");
        assert_eq!(
            installed.path,
            tool_dir.join("fake-archive-7.0").join("bin").join("fake-archive")
        );
        assert!(is_executable(&installed.path));
        assert!(tool_dir.join("fake-archive-7.0/doc/LICENSE").is_file());
    }

    #[tokio::test]
    async fn test_failed_extraction_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(CountingFetcher::sequence(vec![
            Payload::Bytes(b"not a zip".to_vec()),
            Payload::Bytes(archive_payload()),
        ]));
        let provisioner = provisioner(dir.path(), fetcher.clone());
        let (sink, _rx) = ReportSink::channel();

        let err = provisioner
            .ensure_installed(&FAKE_ARCHIVE, &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Extraction { .. }));
        assert!(err.is_provisioning());
        assert!(!dir.path().join("fake-archive").exists());
        assert!(leftovers(dir.path()).is_empty(), "{:?}", leftovers(dir.path()));

        let installed = provisioner.ensure_installed(&FAKE_ARCHIVE, &sink).await.unwrap();
        assert!(is_executable(&installed.path));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_archive_without_binary() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(CountingFetcher::new(zip_bytes(&[("README", b"nothing here")])));
        let provisioner = provisioner(dir.path(), fetcher);
        let (sink, _rx) = ReportSink::channel();

        let err = provisioner
            .ensure_installed(&FAKE_ARCHIVE, &sink)
            .await
            .unwrap_err();
        match err {
            ConvertError::Extraction { message, .. } => assert!(message.contains("fake-archive")),
            other => panic!("expected extraction error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_network_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(CountingFetcher::sequence(vec![Payload::Fail(
            "HTTP status server error (503 Service Unavailable)".to_string(),
        )]));
        let provisioner = provisioner(dir.path(), fetcher);
        let (sink, _rx) = ReportSink::channel();

        let err = provisioner
            .ensure_installed(&FAKE_BINARY, &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Network { .. }));
        assert!(leftovers(dir.path()).is_empty());
        assert!(!dir.path().join("fake-tool").exists());
    }

    #[tokio::test]
    async fn test_unpublished_tool_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(CountingFetcher::new(b"unused".to_vec()));
        let provisioner = provisioner(dir.path(), fetcher.clone());
        let (sink, _rx) = ReportSink::channel();

        let err = provisioner
            .ensure_installed(&UNPUBLISHED, &sink)
            .await
            .unwrap_err();
        match err {
            ConvertError::ToolUnavailable { tool, hint } => {
                assert_eq!(tool, "iconv-test-no-such-tool");
                assert!(hint.contains("Install it yourself."));
            }
            other => panic!("expected unavailable, got {:?}", other),
        }
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_override_url_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(CountingFetcher::new(b"#!/bin/sh\n".to_vec()));
        let overrides = HashMap::from([(
            "iconv-test-no-such-tool".to_string(),
            "https://mirror.invalid/tool".to_string(),
        )]);
        let provisioner = provisioner(dir.path(), fetcher.clone()).with_overrides(overrides);
        let (sink, _rx) = ReportSink::channel();

        let installed = provisioner.ensure_installed(&UNPUBLISHED, &sink).await.unwrap();
        assert_eq!(fetcher.calls(), 1);
        assert!(installed.path.ends_with("iconv-test-no-such-tool/iconv-test-no-such-tool"));
    }

    #[tokio::test]
    async fn test_removed_install_is_provisioned_again() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(CountingFetcher::new(b"#!/bin/sh\n".to_vec()));
        let provisioner = provisioner(dir.path(), fetcher.clone());
        let (sink, _rx) = ReportSink::channel();

        let first = provisioner.ensure_installed(&FAKE_BINARY, &sink).await.unwrap();
        std::fs::remove_file(&first.path).unwrap();

        let second = provisioner.ensure_installed(&FAKE_BINARY, &sink).await.unwrap();
        assert_eq!(fetcher.calls(), 2);
        assert!(is_executable(&second.path));
    }

    #[tokio::test]
    async fn test_reinstall_downloads_again() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(CountingFetcher::new(b"#!/bin/sh\n".to_vec()));
        let provisioner = provisioner(dir.path(), fetcher.clone());
        let (sink, _rx) = ReportSink::channel();

        provisioner.ensure_installed(&FAKE_BINARY, &sink).await.unwrap();
        let again = provisioner.reinstall(&FAKE_BINARY, &sink).await.unwrap();
        assert_eq!(fetcher.calls(), 2);
        assert!(is_executable(&again.path));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_inspect_reports_version() {
        let dir = tempfile::tempdir().unwrap();
        crate::media::test_support::write_script(
            &dir.path().join("fake-tool").join("fake-tool"),
            "echo 2024.08.06",
        );
        let fetcher = Arc::new(CountingFetcher::new(b"unused".to_vec()));
        let provisioner = provisioner(dir.path(), fetcher.clone());

        let info = provisioner.inspect(&FAKE_BINARY).await;
        assert!(info.is_available);
        assert_eq!(info.origin, Some(ToolOrigin::Managed));
        assert_eq!(info.version.as_deref(), Some("2024.08.06"));
        assert!(info.last_updated.is_some());
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_inspect_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = provisioner(dir.path(), Arc::new(CountingFetcher::new(Vec::new())));
        let info = provisioner.inspect(&UNPUBLISHED).await;
        assert!(!info.is_available);
        assert!(info.path.is_none());
        assert!(info.version.is_none());
    }

    #[test]
    fn test_tool_type_parsing() {
        assert_eq!("yt-dlp".parse::<ToolType>().unwrap(), ToolType::YtDlp);
        assert_eq!(" FFmpeg ".parse::<ToolType>().unwrap(), ToolType::Ffmpeg);
        assert!("lux".parse::<ToolType>().is_err());
        assert_eq!(ToolType::Ffmpeg.as_str(), "ffmpeg");
    }

    #[test]
    fn test_catalogue_per_platform() {
        assert_eq!(YT_DLP.executable_name(Platform::Windows), "yt-dlp.exe");
        assert_eq!(FFMPEG.executable_name(Platform::Linux), "ffmpeg");
        assert!(FFMPEG.artifact(Platform::Linux).is_none());
        assert_eq!(
            FFMPEG.artifact(Platform::Windows).map(|a| a.kind),
            Some(ArtifactKind::Zip)
        );
        assert!(YT_DLP.artifact(Platform::Other).is_none());
    }
}
