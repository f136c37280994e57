use std::path::{Path, PathBuf};

use thiserror::Error;

// ---------------------------------------------------------------------------
// RecordError – failures while reading one per-gene input
// ---------------------------------------------------------------------------

/// Error raised while reading a single input file.
///
/// `NotFound`, `Format` and `Io` are recoverable at the gene boundary: the
/// aggregator records the gene as skipped and moves on. `Fatal` aborts the run.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("missing file {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("{}: {message}", .path.display())]
    Format { path: PathBuf, message: String },

    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Fatal(String),
}

pub type RecordResult<T> = Result<T, RecordError>;

impl RecordError {
    pub fn format(path: &Path, message: impl Into<String>) -> Self {
        RecordError::Format {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Classify an I/O error on `path`, turning "no such file" into `NotFound`.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            RecordError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            RecordError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// Short machine-readable name used in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::NotFound { .. } => "not_found",
            RecordError::Format { .. } => "format",
            RecordError::Io { .. } => "io",
            RecordError::Fatal(_) => "fatal",
        }
    }

    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RecordError::Fatal(_))
    }
}

/// Open `path` for reading, mapping a missing file to [`RecordError::NotFound`].
pub fn open_file(path: &Path) -> RecordResult<std::fs::File> {
    std::fs::File::open(path).map_err(|e| RecordError::io(path, e))
}

/// Read `path` to a string, mapping a missing file to [`RecordError::NotFound`].
pub fn read_text(path: &Path) -> RecordResult<String> {
    std::fs::read_to_string(path).map_err(|e| RecordError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_found() {
        let err = read_text(Path::new("/definitely/not/here.cov")).unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("here.cov"));
    }

    #[test]
    fn fatal_is_not_recoverable() {
        assert!(!RecordError::Fatal("empty gene list".into()).is_recoverable());
    }
}
