use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::store::{
    CompletedPart, GetResult, MultipartObjectStore, ObjectHead, ObjectStore, PartETag, PutResult,
    StoreCapabilities, UploadPartRequest,
};
use crate::types::now_timestamp;
use crate::uploader::content_md5;
use crate::{
    BucketInfo, ByteRange, ListRequest, ListingPage, MultipartUploadInfo, ObjectMetadata, ObjectSummary,
    OssError, OssResult, UploadId,
};

const DEFAULT_MAX_KEYS: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    metadata: ObjectMetadata,
    last_modified: i64,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    metadata: ObjectMetadata,
    parts: BTreeMap<u32, (Bytes, String)>,
    initiated_at: i64,
}

#[derive(Debug, Default)]
struct MemoryState {
    buckets: BTreeMap<String, BTreeMap<String, StoredObject>>,
    bucket_created: HashMap<String, i64>,
    uploads: HashMap<String, PendingUpload>,
}

/// In-memory object store with S3-like multipart and listing semantics.
///
/// Writing to a bucket that was never created creates it implicitly.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    state: Arc<Mutex<MemoryState>>,
    capabilities: StoreCapabilities,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the multipart limits, e.g. to exercise multipart with small objects
    pub fn with_capabilities(mut self, capabilities: StoreCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Part numbers currently held for an unfinished upload
    pub fn pending_parts(&self, upload_id: &UploadId) -> Option<Vec<u32>> {
        let state = self.state.lock();
        state
            .uploads
            .get(upload_id.as_str())
            .map(|u| u.parts.keys().copied().collect())
    }

    /// Number of objects stored in a bucket
    pub fn object_count(&self, bucket: &str) -> usize {
        self.state.lock().buckets.get(bucket).map_or(0, |b| b.len())
    }

    fn hex_md5(data: &[u8]) -> String {
        format!("{:x}", md5::compute(data))
    }

    fn not_found(bucket: &str, key: &str) -> OssError {
        OssError::not_found(format!("{}/{}", bucket, key))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        metadata: &ObjectMetadata,
    ) -> OssResult<PutResult> {
        let etag = Self::hex_md5(&body);
        let size_bytes = body.len() as u64;
        let object = StoredObject {
            data: body,
            etag: etag.clone(),
            metadata: metadata.clone(),
            last_modified: now_timestamp(),
        };

        self.state
            .lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), object);

        Ok(PutResult {
            etag: Some(etag),
            size_bytes,
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> OssResult<GetResult> {
        let object = self
            .state
            .lock()
            .buckets
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned()
            .ok_or_else(|| Self::not_found(bucket, key))?;

        let size_bytes = object.data.len() as u64;
        let body = match range {
            Some(range) => {
                if !range.is_valid(size_bytes) {
                    return Err(OssError::invalid(format!(
                        "range {} not satisfiable for {} bytes",
                        range.to_header(),
                        size_bytes
                    )));
                }
                let start = range.start as usize;
                let end = start + range.length(size_bytes) as usize;
                object.data.slice(start..end)
            }
            None => object.data,
        };

        Ok(GetResult {
            body,
            size_bytes,
            content_type: object.metadata.content_type,
            etag: Some(object.etag),
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> OssResult<ObjectHead> {
        let state = self.state.lock();
        let object = state
            .buckets
            .get(bucket)
            .and_then(|b| b.get(key))
            .ok_or_else(|| Self::not_found(bucket, key))?;

        Ok(ObjectHead {
            size_bytes: object.data.len() as u64,
            content_type: object.metadata.content_type.clone(),
            etag: Some(object.etag.clone()),
            last_modified: Some(object.last_modified),
            user_metadata: object.metadata.user_metadata.clone(),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> OssResult<()> {
        if let Some(objects) = self.state.lock().buckets.get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> OssResult<Vec<String>> {
        let mut state = self.state.lock();
        if let Some(objects) = state.buckets.get_mut(bucket) {
            for key in keys {
                objects.remove(key);
            }
        }
        // S3 reports missing keys as deleted too
        Ok(keys.to_vec())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        metadata: Option<&ObjectMetadata>,
    ) -> OssResult<PutResult> {
        let mut state = self.state.lock();
        let mut object = state
            .buckets
            .get(src_bucket)
            .and_then(|b| b.get(src_key))
            .cloned()
            .ok_or_else(|| Self::not_found(src_bucket, src_key))?;

        object.last_modified = now_timestamp();
        if let Some(metadata) = metadata {
            object.metadata = metadata.clone();
        }
        let result = PutResult {
            etag: Some(object.etag.clone()),
            size_bytes: object.data.len() as u64,
        };
        state
            .buckets
            .entry(dst_bucket.to_string())
            .or_default()
            .insert(dst_key.to_string(), object);

        Ok(result)
    }

    async fn list_objects_page(&self, bucket: &str, request: &ListRequest) -> OssResult<ListingPage> {
        let state = self.state.lock();
        let max_keys = match request.max_keys {
            0 => DEFAULT_MAX_KEYS,
            n => n as usize,
        };
        let delimiter = request.delimiter.as_deref().filter(|d| !d.is_empty());
        let marker = request.marker.as_str();

        let lower = if marker.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(marker)
        };

        let mut objects = Vec::new();
        let mut common_prefixes: Vec<String> = Vec::new();
        let mut last_entry: Option<String> = None;
        let mut truncated = false;

        let empty = BTreeMap::new();
        let bucket_objects = state.buckets.get(bucket).unwrap_or(&empty);

        for (key, object) in bucket_objects.range::<str, _>((lower, Bound::Unbounded)) {
            if !key.starts_with(&request.prefix) {
                continue;
            }

            let rolled_up = delimiter.and_then(|d| {
                key[request.prefix.len()..]
                    .find(d)
                    .map(|idx| key[..request.prefix.len() + idx + d.len()].to_string())
            });

            if let Some(prefix) = &rolled_up {
                if last_entry.as_deref() == Some(prefix.as_str()) || marker.starts_with(prefix.as_str()) {
                    continue;
                }
            }

            if objects.len() + common_prefixes.len() == max_keys {
                truncated = true;
                break;
            }

            match rolled_up {
                Some(prefix) => {
                    last_entry = Some(prefix.clone());
                    common_prefixes.push(prefix);
                }
                None => {
                    last_entry = Some(key.clone());
                    objects.push(ObjectSummary {
                        key: key.clone(),
                        size_bytes: object.data.len() as u64,
                        etag: Some(object.etag.clone()),
                        last_modified: Some(object.last_modified),
                    });
                }
            }
        }

        Ok(ListingPage {
            objects,
            common_prefixes,
            continuation_marker: if truncated {
                last_entry.unwrap_or_default()
            } else {
                String::new()
            },
            is_last: !truncated,
        })
    }

    async fn create_bucket(&self, bucket: &str) -> OssResult<()> {
        let mut state = self.state.lock();
        state.buckets.entry(bucket.to_string()).or_default();
        state
            .bucket_created
            .entry(bucket.to_string())
            .or_insert_with(now_timestamp);
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> OssResult<bool> {
        Ok(self.state.lock().buckets.contains_key(bucket))
    }

    async fn delete_bucket(&self, bucket: &str) -> OssResult<()> {
        let mut state = self.state.lock();
        let objects = state
            .buckets
            .get(bucket)
            .ok_or_else(|| OssError::not_found(bucket))?;

        // Unfinished multipart uploads block deletion like objects do
        if !objects.is_empty() || state.uploads.values().any(|u| u.bucket == bucket) {
            return Err(OssError::invalid(format!("bucket {} is not empty", bucket)));
        }

        state.buckets.remove(bucket);
        state.bucket_created.remove(bucket);
        Ok(())
    }

    async fn list_buckets(&self) -> OssResult<Vec<BucketInfo>> {
        let state = self.state.lock();
        Ok(state
            .buckets
            .keys()
            .map(|name| BucketInfo {
                name: name.clone(),
                created_at: state.bucket_created.get(name).copied(),
            })
            .collect())
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities.clone()
    }
}

#[async_trait]
impl MultipartObjectStore for MemoryObjectStore {
    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> OssResult<UploadId> {
        let upload_id = UploadId(format!("mem_{}", Uuid::new_v4().simple()));
        let upload = PendingUpload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            metadata: metadata.clone(),
            parts: BTreeMap::new(),
            initiated_at: now_timestamp(),
        };
        self.state.lock().uploads.insert(upload_id.0.clone(), upload);
        Ok(upload_id)
    }

    async fn upload_part(&self, request: UploadPartRequest) -> OssResult<PartETag> {
        if request.part_number == 0 || request.part_number > self.capabilities.max_parts {
            return Err(OssError::invalid(format!(
                "Invalid part number: {} (must be 1-{})",
                request.part_number, self.capabilities.max_parts
            )));
        }

        if let Some(expected) = &request.content_md5 {
            let actual = content_md5(&request.body);
            if &actual != expected {
                return Err(OssError::integrity(
                    request.part_number,
                    format!("Content-MD5 {} does not match body digest {}", expected, actual),
                ));
            }
        }

        let mut state = self.state.lock();
        let upload = state
            .uploads
            .get_mut(request.upload_id.as_str())
            .filter(|u| u.bucket == request.bucket && u.key == request.key)
            .ok_or_else(|| OssError::not_found(format!("upload {}", request.upload_id)))?;

        let etag = Self::hex_md5(&request.body);
        upload
            .parts
            .insert(request.part_number, (request.body, etag.clone()));

        Ok(PartETag {
            part_number: request.part_number,
            etag,
        })
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        parts: Vec<CompletedPart>,
    ) -> OssResult<PutResult> {
        let mut state = self.state.lock();
        let upload = state
            .uploads
            .get(upload_id.as_str())
            .filter(|u| u.bucket == bucket && u.key == key)
            .ok_or_else(|| OssError::not_found(format!("upload {}", upload_id)))?;

        if parts.is_empty() {
            return Err(OssError::invalid("complete requires at least one part"));
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(OssError::invalid("parts must be in ascending part-number order"));
        }

        let mut data = BytesMut::new();
        let mut digests = Vec::with_capacity(parts.len() * 16);
        for (idx, part) in parts.iter().enumerate() {
            let (body, etag) = upload
                .parts
                .get(&part.part_number)
                .ok_or_else(|| OssError::invalid(format!("part {} was never uploaded", part.part_number)))?;
            if etag != &part.etag {
                return Err(OssError::invalid(format!(
                    "ETag mismatch for part {}",
                    part.part_number
                )));
            }
            if idx + 1 < parts.len() && (body.len() as u64) < self.capabilities.min_part_size {
                return Err(OssError::invalid(format!(
                    "part {} is {} bytes, below the minimum of {}",
                    part.part_number,
                    body.len(),
                    self.capabilities.min_part_size
                )));
            }
            data.extend_from_slice(body);
            digests.extend_from_slice(&md5::compute(body).0);
        }

        let etag = format!("{}-{}", Self::hex_md5(&digests), parts.len());
        let size_bytes = data.len() as u64;
        let metadata = upload.metadata.clone();

        state.uploads.remove(upload_id.as_str());
        state.buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                data: data.freeze(),
                etag: etag.clone(),
                metadata,
                last_modified: now_timestamp(),
            },
        );

        Ok(PutResult {
            etag: Some(etag),
            size_bytes,
        })
    }

    async fn abort_multipart(&self, _bucket: &str, _key: &str, upload_id: &UploadId) -> OssResult<()> {
        self.state.lock().uploads.remove(upload_id.as_str());
        Ok(())
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        max_uploads: u32,
    ) -> OssResult<Vec<MultipartUploadInfo>> {
        let state = self.state.lock();
        let mut uploads: Vec<MultipartUploadInfo> = state
            .uploads
            .iter()
            .filter(|(_, u)| u.bucket == bucket && prefix.map_or(true, |p| u.key.starts_with(p)))
            .map(|(id, u)| MultipartUploadInfo {
                key: u.key.clone(),
                upload_id: UploadId(id.clone()),
                initiated_at: Some(u.initiated_at),
            })
            .collect();

        uploads.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.upload_id.0.cmp(&b.upload_id.0)));
        uploads.truncate(max_uploads as usize);
        Ok(uploads)
    }
}
