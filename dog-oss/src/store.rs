use async_trait::async_trait;
use bytes::Bytes;

use crate::{BucketInfo, ByteRange, ListRequest, ListingPage, MultipartUploadInfo, ObjectMetadata, OssResult, UploadId};

/// Core object storage operations - must be implemented by all storage backends
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object in a single request
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        metadata: &ObjectMetadata,
    ) -> OssResult<PutResult>;

    /// Get an object, optionally a byte range of it
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> OssResult<GetResult>;

    /// Get object metadata without content
    async fn head_object(&self, bucket: &str, key: &str) -> OssResult<ObjectHead>;

    async fn object_exists(&self, bucket: &str, key: &str) -> OssResult<bool> {
        match self.head_object(bucket, key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> OssResult<()>;

    /// Delete several objects, returning the keys the backend reported deleted
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> OssResult<Vec<String>>;

    /// Server-side copy. `metadata` replaces the source's metadata when
    /// given; otherwise the copy keeps it.
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        metadata: Option<&ObjectMetadata>,
    ) -> OssResult<PutResult>;

    /// Fetch one page of a listing
    async fn list_objects_page(&self, bucket: &str, request: &ListRequest) -> OssResult<ListingPage>;

    /// Create a bucket; creating one that already exists succeeds
    async fn create_bucket(&self, bucket: &str) -> OssResult<()>;

    async fn bucket_exists(&self, bucket: &str) -> OssResult<bool>;

    /// Delete an empty bucket
    async fn delete_bucket(&self, bucket: &str) -> OssResult<()>;

    async fn list_buckets(&self) -> OssResult<Vec<BucketInfo>>;

    /// Get store capabilities
    fn capabilities(&self) -> StoreCapabilities;
}

/// Multipart upload support
#[async_trait]
pub trait MultipartObjectStore: ObjectStore {
    /// Start a multipart upload and return the backend's upload id
    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> OssResult<UploadId>;

    /// Upload one part; re-sending a part number replaces the earlier bytes
    async fn upload_part(&self, request: UploadPartRequest) -> OssResult<PartETag>;

    /// Finalize the object; `parts` must be sorted by part number
    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        parts: Vec<CompletedPart>,
    ) -> OssResult<PutResult>;

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &UploadId) -> OssResult<()>;

    /// Multipart uploads that were started but neither completed nor aborted
    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        max_uploads: u32,
    ) -> OssResult<Vec<MultipartUploadInfo>>;
}

/// Body and identity of a single part upload
#[derive(Debug, Clone)]
pub struct UploadPartRequest {
    pub bucket: String,
    pub key: String,
    pub upload_id: UploadId,
    pub part_number: u32,
    pub body: Bytes,
    /// Base64 MD5 of `body`, verified by the backend when present
    pub content_md5: Option<String>,
}

/// Result of a successful put operation
#[derive(Debug, Clone)]
pub struct PutResult {
    pub etag: Option<String>,
    pub size_bytes: u64,
}

/// Result of a get operation
#[derive(Debug, Clone)]
pub struct GetResult {
    pub body: Bytes,
    /// Full object size, independent of any range
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// Metadata about an object
#[derive(Debug, Clone)]
pub struct ObjectHead {
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<i64>,
    pub user_metadata: std::collections::BTreeMap<String, String>,
}

/// ETag for a multipart part
#[derive(Debug, Clone)]
pub struct PartETag {
    pub part_number: u32,
    pub etag: String,
}

/// Completed part for multipart upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Store capabilities
#[derive(Debug, Clone)]
pub struct StoreCapabilities {
    pub supports_range: bool,
    pub min_part_size: u64,
    pub max_part_size: u64,
    pub max_parts: u32,
}

impl Default for StoreCapabilities {
    fn default() -> Self {
        Self::s3_limits()
    }
}

impl StoreCapabilities {
    /// The limits S3 and OSS publish for multipart uploads
    pub fn s3_limits() -> Self {
        Self {
            supports_range: true,
            min_part_size: 5 * 1024 * 1024,
            max_part_size: 5 * 1024 * 1024 * 1024,
            max_parts: 10_000,
        }
    }

    pub fn with_part_limits(mut self, min_size: u64, max_size: u64, max_parts: u32) -> Self {
        self.min_part_size = min_size;
        self.max_part_size = max_size;
        self.max_parts = max_parts;
        self
    }

    pub fn without_range(mut self) -> Self {
        self.supports_range = false;
        self
    }
}
