//! Storage-domain errors

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Linux `ENOSPC`
const ENOSPC: i32 = 28;
/// Linux `EDQUOT`
const EDQUOT: i32 = 122;

/// Structured storage error domain
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{operation} failed on {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt data in {} at byte {position}: {reason}", path.display())]
    Corrupt {
        path: PathBuf,
        position: u64,
        reason: String,
    },
}

impl StorageError {
    pub fn io(operation: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn corrupt(path: &Path, position: u64, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.to_path_buf(),
            position,
            reason: reason.into(),
        }
    }

    /// The device or quota is full. Never retried.
    pub fn is_exhausted(&self) -> bool {
        match self {
            Self::Io { source, .. } => {
                matches!(source.raw_os_error(), Some(ENOSPC) | Some(EDQUOT))
            }
            Self::Corrupt { .. } => false,
        }
    }

    /// Worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io { source, .. } => {
                !self.is_exhausted()
                    && !matches!(
                        source.kind(),
                        io::ErrorKind::InvalidInput
                            | io::ErrorKind::InvalidData
                            | io::ErrorKind::PermissionDenied
                            | io::ErrorKind::Unsupported
                    )
            }
            Self::Corrupt { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enospc_is_exhausted() {
        let err = StorageError::io(
            "append",
            Path::new("/data/p0/00000000000000000000.segment"),
            io::Error::from_raw_os_error(ENOSPC),
        );
        assert!(err.is_exhausted());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_interrupted_is_transient() {
        let err = StorageError::io(
            "append",
            Path::new("/data/p0"),
            io::Error::new(io::ErrorKind::Interrupted, "signal"),
        );
        assert!(!err.is_exhausted());
        assert!(err.is_transient());
        assert!(err.to_string().starts_with("append failed on /data/p0"));
    }

    #[test]
    fn test_corrupt_is_neither() {
        let err = StorageError::corrupt(Path::new("/data/seg"), 42, "crc mismatch");
        assert!(!err.is_exhausted());
        assert!(!err.is_transient());
        assert!(err.to_string().contains("at byte 42"));
    }
}
