// Test doubles shared by the media tests

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::errors::ConvertError;
use super::models::Report;
use super::traits::{ArtifactFetcher, ReportSink};

#[derive(Debug, Clone)]
pub enum Payload {
    Bytes(Vec<u8>),
    Fail(String),
}

/// Fetcher that serves canned payloads and counts calls.
/// Payloads are served in order; the last one repeats.
pub struct CountingFetcher {
    calls: AtomicUsize,
    payloads: Mutex<Vec<Payload>>,
    delay: Duration,
}

impl CountingFetcher {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self::sequence(vec![Payload::Bytes(bytes.into())])
    }

    pub fn sequence(payloads: Vec<Payload>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            payloads: Mutex::new(payloads),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_payload(&self) -> Payload {
        let mut payloads = self.payloads.lock().unwrap();
        if payloads.len() > 1 {
            payloads.remove(0)
        } else {
            payloads[0].clone()
        }
    }
}

#[async_trait]
impl ArtifactFetcher for CountingFetcher {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn fetch(&self, url: &str, dest: &Path, _sink: &ReportSink) -> Result<u64, ConvertError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let payload = self.next_payload();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match payload {
            Payload::Bytes(bytes) => {
                tokio::fs::write(dest, &bytes)
                    .await
                    .map_err(|e| ConvertError::io("write fake download", dest, e))?;
                Ok(bytes.len() as u64)
            }
            Payload::Fail(message) => Err(ConvertError::Network {
                url: url.to_string(),
                message,
            }),
        }
    }
}

/// Zip archive held in memory, one file per entry.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .unix_permissions(0o644);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

/// Write an executable shell script at `path`, creating parents.
#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

/// Everything sent so far, without waiting.
pub fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Report>) -> Vec<Report> {
    let mut reports = Vec::new();
    while let Ok(report) = rx.try_recv() {
        reports.push(report);
    }
    reports
}

/// Names of leftover temp files or staging directories.
pub fn leftovers(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with('.'))
                .collect()
        })
        .unwrap_or_default()
}
