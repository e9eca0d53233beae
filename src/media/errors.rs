// Error types for provisioning, argument building and process execution

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop a request before it reaches a terminal outcome.
///
/// A subprocess that runs and exits non-zero is not an error: it is reported
/// as a failed [`ConversionOutcome`](super::models::ConversionOutcome).
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Empty URL, empty output directory, missing or unreadable source file
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No managed artifact for this platform and nothing usable on PATH
    #[error("Tool not available: {tool}. {hint}")]
    ToolUnavailable { tool: String, hint: String },

    /// Downloading a tool artifact failed
    #[error("Network error while fetching {url}: {message}")]
    Network { url: String, message: String },

    /// Archive was corrupt, an entry could not be written, or the binary was missing
    #[error("Failed to extract {}: {message}", archive.display())]
    Extraction { archive: PathBuf, message: String },

    /// The subprocess could not be started at all
    #[error("Failed to start {}: {source}", program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Filesystem failure outside of extraction
    #[error("I/O error during {operation} ({}): {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Settings file could not be read or parsed
    #[error("Invalid settings in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
}

impl ConvertError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub fn extraction(archive: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Extraction {
            archive: archive.into(),
            message: message.to_string(),
        }
    }

    /// True for failures raised while making a tool available.
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            Self::ToolUnavailable { .. } | Self::Network { .. } | Self::Extraction { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisioning_classification() {
        let unavailable = ConvertError::ToolUnavailable {
            tool: "ffmpeg".to_string(),
            hint: "install it".to_string(),
        };
        assert!(unavailable.is_provisioning());
        assert!(ConvertError::extraction("/tmp/a.zip", "bad header").is_provisioning());
        assert!(!ConvertError::invalid("empty URL").is_provisioning());
    }

    #[test]
    fn test_display_includes_context() {
        let err = ConvertError::Network {
            url: "https://example.com/tool".to_string(),
            message: "HTTP 404".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("https://example.com/tool"));
        assert!(text.contains("HTTP 404"));
    }
}
