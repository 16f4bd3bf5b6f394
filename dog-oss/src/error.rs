use thiserror::Error;

use crate::PartResult;

/// Result type for object storage operations
pub type OssResult<T> = Result<T, OssError>;

/// Errors that can occur during object storage operations
#[derive(Error, Debug)]
pub enum OssError {
    /// Planning-time: the object size cannot be split into parts
    #[error("Invalid object size: {message}")]
    InvalidSize { message: String },

    /// Planning-time: the requested part size violates backend limits
    #[error("Invalid part size {part_size}: {message}")]
    InvalidPartSize { part_size: u64, message: String },

    /// Retryable with backoff
    #[error("Transient network error: {message}")]
    TransientNetwork { message: String },

    /// The backend rejected a part checksum; the source bytes must be re-read
    #[error("Integrity check failed for part {part_number}: {message}")]
    IntegrityMismatch { part_number: u32, message: String },

    #[error("Upload is missing parts: {missing:?}")]
    IncompleteParts { missing: Vec<u32> },

    /// A multipart upload stopped with parts outstanding; the session is
    /// still open on the backend and can be resumed with `upload_id`
    #[error("Upload {upload_id} left open with parts {missing:?} outstanding (cancelled: {cancelled})")]
    UploadIncomplete {
        upload_id: String,
        completed: Vec<PartResult>,
        missing: Vec<u32>,
        cancelled: bool,
    },

    #[error("Storage backend unavailable: {message}")]
    BackendUnavailable { message: String },

    /// `complete` failed on the wire and the follow-up existence check could
    /// not tell whether the object was finalized
    #[error("Completion of upload {upload_id} is ambiguous: {message}")]
    AmbiguousCompletion { upload_id: String, message: String },

    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Invalid upload state: {message}")]
    InvalidState { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl OssError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn invalid_size<S: Into<String>>(message: S) -> Self {
        Self::InvalidSize {
            message: message.into(),
        }
    }

    pub fn invalid_part_size<S: Into<String>>(part_size: u64, message: S) -> Self {
        Self::InvalidPartSize {
            part_size,
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(key: S) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::TransientNetwork {
            message: message.into(),
        }
    }

    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
        }
    }

    pub fn integrity<S: Into<String>>(part_number: u32, message: S) -> Self {
        Self::IntegrityMismatch {
            part_number,
            message: message.into(),
        }
    }

    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Whether the same request may be sent again after a backoff.
    ///
    /// Integrity mismatches are not included; the part uploader re-reads the
    /// source range for those instead of resending the same bytes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork { .. } | Self::BackendUnavailable { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Upload id of a multipart upload the error left open, if any
    pub fn open_upload_id(&self) -> Option<&str> {
        match self {
            Self::UploadIncomplete { upload_id, .. } | Self::AmbiguousCompletion { upload_id, .. } => {
                Some(upload_id)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(OssError::transient("reset by peer").is_retryable());
        assert!(OssError::unavailable("503").is_retryable());
        assert!(!OssError::integrity(3, "bad digest").is_retryable());
        assert!(!OssError::IncompleteParts { missing: vec![2] }.is_retryable());
        assert!(!OssError::invalid("nope").is_retryable());
    }

    #[test]
    fn test_io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: OssError = io.into();
        assert!(matches!(err, OssError::Io { .. }));
        assert!(err.to_string().contains("short read"));
    }
}
