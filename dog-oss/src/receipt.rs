use serde::{Deserialize, Serialize};

use crate::types::now_timestamp;
use crate::{OssError, UploadId};

/// Receipt returned after an object has been stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub bucket: String,
    pub key: String,
    pub size_bytes: u64,
    pub etag: Option<String>,
    pub created_at: i64,
    pub method: UploadMethod,
}

/// How the object was uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadMethod {
    /// Single put request
    Single,
    Multipart {
        upload_id: UploadId,
        part_size: u64,
        parts: u32,
    },
    /// `complete` failed on the wire but the object was found afterwards
    MultipartRecovered {
        upload_id: UploadId,
        parts: u32,
    },
}

impl UploadReceipt {
    /// Create a new receipt for a single-put upload
    pub fn new<B: Into<String>, K: Into<String>>(bucket: B, key: K, size_bytes: u64) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            size_bytes,
            etag: None,
            created_at: now_timestamp(),
            method: UploadMethod::Single,
        }
    }

    /// Set etag if the backend returned one
    pub fn with_optional_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }

    /// Set upload method
    pub fn with_method(mut self, method: UploadMethod) -> Self {
        self.method = method;
        self
    }

    pub fn is_multipart(&self) -> bool {
        !matches!(self.method, UploadMethod::Single)
    }

    pub fn upload_id(&self) -> Option<&UploadId> {
        match &self.method {
            UploadMethod::Single => None,
            UploadMethod::Multipart { upload_id, .. }
            | UploadMethod::MultipartRecovered { upload_id, .. } => Some(upload_id),
        }
    }
}

/// Outcome of [`crate::OssClient::upload_dir`]
#[derive(Debug, Default)]
pub struct DirUploadReport {
    pub succeeded: Vec<UploadReceipt>,
    /// Object key and the error that stopped it
    pub failed: Vec<(String, OssError)>,
    /// Cancellation stopped the walk before every file was tried
    pub cancelled: bool,
}

impl DirUploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}
