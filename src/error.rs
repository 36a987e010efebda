use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("invalid source id: {0}")]
    InvalidSourceId(String),

    #[error("invalid station id: {0}")]
    InvalidStationId(String),

    #[error("missing config file hydrocat.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error("station {station} not found in source {source_id}")]
    StationNotFound { source_id: String, station: String },

    #[error("station {0} not found in any source")]
    StationNotFoundAnywhere(String),

    #[error("raw station file not found: {0}")]
    RawFileNotFound(PathBuf),

    #[error("catalog not built yet for source {0}")]
    CatalogNotFound(String),

    #[error("failed to parse {path}{}: {message}", .line.map(|l| format!(" (line {l})")).unwrap_or_default())]
    #[diagnostic(help("the station is skipped; the rest of the batch continues"))]
    Parse {
        path: PathBuf,
        line: Option<usize>,
        message: String,
    },

    #[error("invalid coordinates for station {station}: lon={lon}, lat={lat}")]
    InvalidCoordinate { station: String, lon: f64, lat: f64 },

    #[error("request failed: {message}")]
    Http { message: String, transient: bool },

    #[error("remote returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("invalid station inventory: {0}")]
    Inventory(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl CatalogError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Http { transient, .. } => *transient,
            CatalogError::HttpStatus { status, .. } => crate::retry::is_retryable_status(*status),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatalogError::SourceNotFound(_)
                | CatalogError::StationNotFound { .. }
                | CatalogError::StationNotFoundAnywhere(_)
                | CatalogError::RawFileNotFound(_)
                | CatalogError::CatalogNotFound(_)
        )
    }

    pub(crate) fn parse(
        path: impl AsRef<Path>,
        line: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        CatalogError::Parse {
            path: path.as_ref().to_path_buf(),
            line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_errors() {
        assert!(
            CatalogError::HttpStatus {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !CatalogError::HttpStatus {
                status: 404,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            CatalogError::Http {
                message: "timeout".to_string(),
                transient: true
            }
            .is_transient()
        );
        assert!(!CatalogError::Filesystem("disk".to_string()).is_transient());
    }

    #[test]
    fn parse_error_mentions_line() {
        let err = CatalogError::parse("/tmp/a.txt", Some(3), "bad height");
        assert_eq!(err.to_string(), "failed to parse /tmp/a.txt (line 3): bad height");
        let err = CatalogError::parse("/tmp/a.txt", None, "empty file");
        assert_eq!(err.to_string(), "failed to parse /tmp/a.txt: empty file");
    }
}
