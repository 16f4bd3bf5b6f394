use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upload identifier issued by the storage backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(pub String);

impl UploadId {
    /// Create from existing string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UploadId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Where a multipart upload's parts are sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub bucket: String,
    pub key: String,
    pub upload_id: UploadId,
}

impl UploadTarget {
    pub fn new<B: Into<String>, K: Into<String>>(bucket: B, key: K, upload_id: UploadId) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id,
        }
    }
}

/// One part of a multipart upload: a contiguous byte range of the object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartSpec {
    /// 1-based
    pub part_number: u32,
    pub offset: u64,
    pub length: u64,
}

impl PartSpec {
    pub fn new(part_number: u32, offset: u64, length: u64) -> Self {
        Self {
            part_number,
            offset,
            length,
        }
    }

    /// Offset one past the last byte of this part
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Ordered, contiguous parts covering an object exactly once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPlan {
    pub total_size: u64,
    pub part_size: u64,
    pub parts: Vec<PartSpec>,
}

impl UploadPlan {
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn part(&self, part_number: u32) -> Option<&PartSpec> {
        part_number
            .checked_sub(1)
            .and_then(|idx| self.parts.get(idx as usize))
    }

    pub fn part_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.parts.iter().map(|p| p.part_number)
    }
}

/// Recorded outcome of a successfully uploaded part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartResult {
    pub part_number: u32,
    /// ETag returned by the backend
    pub etag: String,
    pub size_bytes: u64,
    /// Base64 Content-MD5 sent with the part, when checksums are enabled
    pub content_md5: Option<String>,
    pub uploaded_at: i64,
}

/// Lifecycle of an upload session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadState {
    Initiated,
    InProgress,
    Completed { completed_at: i64 },
    Aborted { aborted_at: i64 },
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Aborted { .. })
    }
}

/// Metadata sent along with a new object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    pub user_metadata: BTreeMap<String, String>,
}

impl ObjectMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_user_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.user_metadata.insert(key.into(), value.into());
        self
    }
}

/// Byte range for partial content requests (inclusive end)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>, // None means "to end of object"
}

impl ByteRange {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    pub fn from_start(start: u64) -> Self {
        Self { start, end: None }
    }

    pub fn length(&self, total_size: u64) -> u64 {
        match self.end {
            Some(end) => end.saturating_sub(self.start) + 1,
            None => total_size.saturating_sub(self.start),
        }
    }

    pub fn is_valid(&self, total_size: u64) -> bool {
        if self.start >= total_size {
            return false;
        }
        if let Some(end) = self.end {
            end >= self.start && end < total_size
        } else {
            true
        }
    }

    /// Header value in `bytes=a-b` form
    pub fn to_header(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// One object entry in a listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size_bytes: u64,
    pub etag: Option<String>,
    pub last_modified: Option<i64>,
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingPage {
    pub objects: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    /// Marker to pass back for the next page; empty on the last page
    pub continuation_marker: String,
    pub is_last: bool,
}

impl ListingPage {
    /// Object keys in listing order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|o| o.key.as_str())
    }
}

/// Request for one listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub prefix: String,
    pub delimiter: Option<String>,
    /// Empty for the first page
    pub marker: String,
    pub max_keys: u32,
}

/// An in-progress multipart upload known to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartUploadInfo {
    pub key: String,
    pub upload_id: UploadId,
    pub initiated_at: Option<i64>,
}

/// A bucket owned by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    /// Unknown for buckets a backend created implicitly
    pub created_at: Option<i64>,
}

pub(crate) fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
