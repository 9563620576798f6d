use std::{fmt, io, time::SystemTime};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FsError>;

/// Metadata for a path, either a stored object or a synthesized directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub modified_time: Option<SystemTime>,
    pub is_dir: bool,
}

impl FileInfo {
    /// Synthetic record for a directory implied by a key prefix.
    pub fn directory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            size: 0,
            modified_time: None,
            is_dir: true,
        }
    }
}

#[derive(Clone, Debug, Error)]
pub enum FsError {
    #[error("no such file or directory: {path}")]
    NotFound { path: String },

    #[error("{message}")]
    Store { message: String },

    #[error("buffer error: {message}")]
    Buffer { message: String },

    #[error("operation not supported: {op}")]
    Unsupported { op: &'static str },

    #[error("deadline exceeded during {op}")]
    DeadlineExceeded { op: String },

    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl FsError {
    pub fn not_found(path: &str) -> Self {
        FsError::NotFound {
            path: path.to_string(),
        }
    }

    pub fn store(message: impl fmt::Display) -> Self {
        FsError::Store {
            message: message.to_string(),
        }
    }

    pub fn buffer(message: impl fmt::Display) -> Self {
        FsError::Buffer {
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound { .. })
    }
}

impl From<FsError> for io::Error {
    fn from(err: FsError) -> Self {
        let kind = match &err {
            FsError::NotFound { .. } => io::ErrorKind::NotFound,
            FsError::Unsupported { .. } => io::ErrorKind::Unsupported,
            FsError::DeadlineExceeded { .. } => io::ErrorKind::TimedOut,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<FsError>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(fs_err) = inner.downcast::<FsError>() {
                    return *fs_err;
                }
            }
            return FsError::buffer("unrecoverable wrapped error");
        }

        FsError::buffer(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_info() {
        let info = FileInfo::directory("folder");

        assert_eq!(info.name, "folder");
        assert_eq!(info.size, 0);
        assert_eq!(info.modified_time, None);
        assert!(info.is_dir);
    }

    #[test]
    fn test_io_error_kind() {
        let cases = vec![
            (FsError::not_found("key"), io::ErrorKind::NotFound),
            (FsError::Unsupported { op: "rename" }, io::ErrorKind::Unsupported),
            (
                FsError::DeadlineExceeded {
                    op: "list".to_string(),
                },
                io::ErrorKind::TimedOut,
            ),
            (FsError::store("boom"), io::ErrorKind::Other),
        ];

        for (err, expected) in cases {
            let description = err.to_string();
            let io_err: io::Error = err.into();
            assert_eq!(io_err.kind(), expected, "failed for case: {}", description);
        }
    }

    #[test]
    fn test_io_error_round_trip_keeps_variant() {
        let io_err: io::Error = FsError::not_found("folder/file").into();
        let err: FsError = io_err.into();

        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "no such file or directory: folder/file");
    }

    #[test]
    fn test_plain_io_error_becomes_buffer() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        let err: FsError = io_err.into();

        assert!(matches!(err, FsError::Buffer { .. }));
    }
}
