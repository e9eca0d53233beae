// Subprocess execution with line streaming

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command as TokioCommand;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::errors::ConvertError;

/// Splits a byte stream into lines on `\n`, `\r` or `\r\n`.
///
/// ffmpeg and yt-dlp redraw their status with bare carriage returns, so a
/// `\r` has to end a line too or progress would only surface at the end.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
    after_cr: bool,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            match byte {
                b'\n' if self.after_cr => {
                    // second half of \r\n, the line was already emitted
                    self.after_cr = false;
                }
                b'\n' | b'\r' => {
                    lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                    self.pending.clear();
                    self.after_cr = byte == b'\r';
                }
                _ => {
                    self.after_cr = false;
                    self.pending.push(byte);
                }
            }
        }
        lines
    }

    /// Trailing text without a terminator, if any.
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}

/// How a run ended once output was drained
#[derive(Debug)]
pub enum RunStatus {
    Exited(ExitStatus),
    /// Reading output failed; the child was killed
    StreamFailed(io::Error),
}

impl RunStatus {
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(status) if status.success())
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited(status) => status.code(),
            Self::StreamFailed(_) => None,
        }
    }
}

/// Runs external tools and hands every output line to a callback
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Launch `program` and deliver stdout and stderr lines, in arrival order,
    /// to `on_line` while the process runs. Returns once both streams are
    /// drained and the process has exited.
    ///
    /// A process that cannot be started fails with [`ConvertError::Launch`]
    /// before any line is delivered. A non-zero exit is not an error.
    pub async fn run<F>(&self, program: &Path, args: &[String], mut on_line: F) -> Result<RunStatus, ConvertError>
    where
        F: FnMut(String),
    {
        debug!(program = %program.display(), ?args, "spawning process");

        let mut child = TokioCommand::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConvertError::Launch {
                program: program.to_path_buf(),
                source,
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel::<io::Result<String>>();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, tx.clone()));
        }
        drop(tx);

        while let Some(item) = rx.recv().await {
            match item {
                Ok(line) => on_line(line),
                Err(e) => {
                    warn!(program = %program.display(), error = %e, "output stream failed, killing process");
                    let _ = child.kill().await;
                    return Ok(RunStatus::StreamFailed(e));
                }
            }
        }

        let status = child.wait().await.map_err(|source| ConvertError::Io {
            operation: "wait for process",
            path: program.to_path_buf(),
            source,
        })?;
        debug!(program = %program.display(), code = ?status.code(), "process exited");
        Ok(RunStatus::Exited(status))
    }
}

async fn pump_lines<R>(mut reader: R, tx: mpsc::UnboundedSender<io::Result<String>>)
where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::new();
    let mut buf = vec![0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in splitter.push(&buf[..n]) {
                    if tx.send(Ok(line)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }
    }
    if let Some(rest) = splitter.finish() {
        let _ = tx.send(Ok(rest));
    }
}
