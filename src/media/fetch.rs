// HTTP artifact download and archive extraction

use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tar::Archive;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::errors::ConvertError;
use super::models::NetworkConfig;
use super::traits::{ArtifactFetcher, ReportSink};

/// How a downloaded artifact becomes an installed tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The download is the executable itself
    Binary,
    Zip,
    TarGz,
}

impl ArtifactKind {
    /// Guess from a URL's suffix; anything unrecognized is a bare binary.
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
        if path.ends_with(".zip") {
            Self::Zip
        } else if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Self::TarGz
        } else {
            Self::Binary
        }
    }

    pub fn is_archive(&self) -> bool {
        !matches!(self, Self::Binary)
    }
}

/// Streams artifacts over HTTP(S) with reqwest
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(network: &NetworkConfig) -> Result<Self, ConvertError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("iconv/", env!("CARGO_PKG_VERSION")));

        if let Some(timeout) = network.timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(u64::from(timeout)));
        }

        if let Some(proxy_url) = network.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| ConvertError::Config {
                path: "network.proxy".into(),
                message: format!("invalid proxy URL {}: {}", proxy_url, e),
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| ConvertError::Network {
            url: String::new(),
            message: format!("failed to build HTTP client: {}", e),
        })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, url: &str, dest: &Path, sink: &ReportSink) -> Result<u64, ConvertError> {
        let network = |message: String| ConvertError::Network {
            url: url.to_string(),
            message,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| network(e.to_string()))?;

        let total = response.content_length();
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| ConvertError::io("create download file", dest, e))?;

        let mut downloaded = 0u64;
        let mut last_decile = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| network(e.to_string()))? {
            file.write_all(&chunk)
                .await
                .map_err(|e| ConvertError::io("write download file", dest, e))?;
            downloaded += chunk.len() as u64;

            if let Some(total) = total.filter(|t| *t > 0) {
                let decile = downloaded * 10 / total;
                if decile > last_decile && decile < 10 {
                    last_decile = decile;
                    sink.log(format!(
                        "Downloaded {}% ({:.1}/{:.1} MB)",
                        decile * 10,
                        downloaded as f64 / 1_048_576.0,
                        total as f64 / 1_048_576.0
                    ));
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| ConvertError::io("flush download file", dest, e))?;
        file.sync_all()
            .await
            .map_err(|e| ConvertError::io("sync download file", dest, e))?;

        if let Some(total) = total {
            if downloaded != total {
                return Err(network(format!(
                    "truncated download: got {} of {} bytes",
                    downloaded, total
                )));
            }
        }

        info!(url, bytes = downloaded, "artifact downloaded");
        Ok(downloaded)
    }
}

/// Unpack `archive` into `dest`, keeping the archive's directory layout.
pub fn extract_archive(kind: ArtifactKind, archive: &Path, dest: &Path) -> Result<(), ConvertError> {
    debug!(archive = %archive.display(), dest = %dest.display(), ?kind, "extracting");
    std::fs::create_dir_all(dest).map_err(|e| ConvertError::extraction(archive, e))?;
    match kind {
        ArtifactKind::Zip => extract_zip(archive, dest),
        ArtifactKind::TarGz => extract_tar_gz(archive, dest),
        ArtifactKind::Binary => Err(ConvertError::extraction(archive, "not an archive")),
    }
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<(), ConvertError> {
    let fail = |e: &dyn std::fmt::Display| ConvertError::extraction(archive_path, e);

    let file = File::open(archive_path).map_err(|e| fail(&e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| fail(&e))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| fail(&e))?;
        // entries escaping the destination are skipped
        let out_path = match entry.enclosed_name() {
            Some(path) => dest.join(path),
            None => continue,
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| fail(&e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| fail(&e))?;
        }
        let mut out = File::create(&out_path).map_err(|e| fail(&e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| fail(&e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))
                    .map_err(|e| fail(&e))?;
            }
        }
    }

    Ok(())
}

fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<(), ConvertError> {
    let file = File::open(archive_path).map_err(|e| ConvertError::extraction(archive_path, e))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive
        .unpack(dest)
        .map_err(|e| ConvertError::extraction(archive_path, e))
}
