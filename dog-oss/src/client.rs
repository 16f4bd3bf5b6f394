use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::retry::with_retries;
use crate::store::{GetResult, MultipartObjectStore, ObjectHead, ObjectStore, PutResult};
use crate::{
    BucketInfo, ByteRange, DataSource, DirUploadReport, FileSource, MultipartUploadInfo, ObjectLister, ObjectMetadata, OssError,
    OssResult, PartPlanner, PartResult, UploadCheckpoint, UploadConfig, UploadId, UploadMethod, UploadReceipt,
    UploadPlan, UploadSession, UploadTarget,
};

/// Upper bound for `list_multipart_uploads` when the caller passes 0
const DEFAULT_MAX_UPLOADS: u32 = 100;

/// Directory names `upload_dir` never descends into or uploads
const EXCLUDED_DIRS: &[&str] = &[".git", ".svn"];

/// Entry point for object operations against one storage backend.
///
/// Small objects are stored with a single put; objects at or above
/// `multipart_threshold_bytes` are split by the [`PartPlanner`] and sent
/// through an [`UploadSession`].
#[derive(Clone)]
pub struct OssClient {
    store: Arc<dyn MultipartObjectStore>,
    objects: Arc<dyn ObjectStore>,
    planner: PartPlanner,
    config: UploadConfig,
}

impl OssClient {
    /// Create a client, rejecting inconsistent configuration
    pub fn new<S: MultipartObjectStore + 'static>(store: S, config: UploadConfig) -> OssResult<Self> {
        Self::from_shared(Arc::new(store), config)
    }

    /// Create a client over a store the caller keeps a handle to
    pub fn from_shared<S: MultipartObjectStore + 'static>(store: Arc<S>, config: UploadConfig) -> OssResult<Self> {
        config.validate()?;
        let planner = PartPlanner::from_config(&config).with_capabilities(&store.capabilities());
        Ok(Self {
            objects: store.clone(),
            store,
            planner,
            config,
        })
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn planner(&self) -> &PartPlanner {
        &self.planner
    }

    pub fn store(&self) -> Arc<dyn MultipartObjectStore> {
        self.store.clone()
    }

    /// Store the whole of `source` under `bucket/key`.
    ///
    /// A multipart upload that ends with parts outstanding is left open and
    /// reported as [`OssError::UploadIncomplete`]; pass its upload id and completed parts to
    /// [`OssClient::resume_upload`] to finish it, or abort it.
    #[instrument(skip(self, source, metadata, cancel), fields(size_bytes = source.len()))]
    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        source: Arc<dyn DataSource>,
        metadata: &ObjectMetadata,
        cancel: &CancellationToken,
    ) -> OssResult<UploadReceipt> {
        if cancel.is_cancelled() {
            return Err(OssError::Cancelled);
        }

        let total_size = source.len();
        if total_size < self.config.multipart_threshold_bytes || total_size == 0 {
            let body = source.read_range(0, total_size).await?;
            let result = self.put_object(bucket, key, body, metadata).await?;
            return Ok(UploadReceipt::new(bucket, key, result.size_bytes)
                .with_optional_etag(result.etag)
                .with_method(UploadMethod::Single));
        }

        let plan = self.plan_for(total_size)?;
        debug!(parts = plan.len(), part_size = plan.part_size, "multipart plan ready");

        let session = self.begin_upload(bucket, key, metadata).await?;
        let report = session.upload_all(&plan, source, cancel).await?;

        if !report.is_complete() {
            for failure in &report.failed {
                warn!(part_number = failure.part_number, error = %failure.error, "part not uploaded");
            }
            return Err(OssError::UploadIncomplete {
                upload_id: session.upload_id().to_string(),
                completed: session.completed_parts(),
                missing: session.missing_parts(),
                cancelled: report.cancelled,
            });
        }

        session.complete().await
    }

    /// Parts `upload` uses for an object of `total_size` bytes: the configured
    /// part size, grown if needed to stay within the part count limit
    pub fn plan_for(&self, total_size: u64) -> OssResult<UploadPlan> {
        let part_size = self.planner.fit_part_size(total_size, self.config.part_size);
        self.planner.plan(total_size, part_size)
    }

    /// Upload a local file; see [`OssClient::upload`]
    pub async fn upload_file<P: AsRef<Path>>(
        &self,
        bucket: &str,
        key: &str,
        path: P,
        metadata: &ObjectMetadata,
        cancel: &CancellationToken,
    ) -> OssResult<UploadReceipt> {
        let source = FileSource::open(path).await?;
        self.upload(bucket, key, Arc::new(source), metadata, cancel).await
    }

    /// Start a caller-driven multipart upload
    pub async fn begin_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> OssResult<UploadSession> {
        UploadSession::initiate(self.store.clone(), self.config.clone(), bucket, key, metadata).await
    }

    /// Pick up an upload started earlier, from its upload id and the parts
    /// already recorded for it
    pub fn resume_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: UploadId,
        completed_parts: Vec<PartResult>,
    ) -> UploadSession {
        let target = UploadTarget::new(bucket, key, upload_id);
        UploadSession::resume(self.store.clone(), self.config.clone(), target, completed_parts)
    }

    /// Pick up an upload from a checkpoint saved with [`UploadSession::checkpoint`]
    pub fn resume_from_checkpoint(&self, checkpoint: UploadCheckpoint) -> UploadSession {
        UploadSession::from_checkpoint(self.store.clone(), self.config.clone(), checkpoint)
    }

    #[instrument(skip(self, body, metadata), fields(size_bytes = body.len()))]
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        metadata: &ObjectMetadata,
    ) -> OssResult<PutResult> {
        let store = &self.store;
        let result = with_retries(&self.config, "put_object", || {
            store.put_object(bucket, key, body.clone(), metadata)
        })
        .await?;
        info!(size_bytes = result.size_bytes, "object stored");
        Ok(result)
    }

    pub async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> OssResult<GetResult> {
        let store = &self.store;
        with_retries(&self.config, "get_object", || {
            store.get_object(bucket, key, range.clone())
        })
        .await
    }

    /// Download an object into a local file, replacing its contents
    pub async fn get_object_to_file<P: AsRef<Path>>(
        &self,
        bucket: &str,
        key: &str,
        path: P,
    ) -> OssResult<u64> {
        let result = self.get_object(bucket, key, None).await?;
        tokio::fs::write(path.as_ref(), &result.body).await?;
        Ok(result.body.len() as u64)
    }

    pub async fn head_object(&self, bucket: &str, key: &str) -> OssResult<ObjectHead> {
        let store = &self.store;
        with_retries(&self.config, "head_object", || store.head_object(bucket, key)).await
    }

    pub async fn object_exists(&self, bucket: &str, key: &str) -> OssResult<bool> {
        let store = &self.store;
        with_retries(&self.config, "object_exists", || store.object_exists(bucket, key)).await
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> OssResult<()> {
        let store = &self.store;
        with_retries(&self.config, "delete_object", || store.delete_object(bucket, key)).await
    }

    /// Delete several keys at once; returns the keys the backend reports as deleted
    pub async fn delete_objects(&self, bucket: &str, keys: &[String]) -> OssResult<Vec<String>> {
        let store = &self.store;
        with_retries(&self.config, "delete_objects", || store.delete_objects(bucket, keys)).await
    }

    pub async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> OssResult<PutResult> {
        let store = &self.store;
        with_retries(&self.config, "copy_object", || {
            store.copy_object(src_bucket, src_key, dst_bucket, dst_key, None)
        })
        .await
    }

    /// Copy an object and replace its metadata on the way. Passing the same
    /// bucket and key on both sides changes the metadata in place.
    pub async fn modify_object_metadata(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        metadata: &ObjectMetadata,
    ) -> OssResult<PutResult> {
        let store = &self.store;
        with_retries(&self.config, "modify_object_metadata", || {
            store.copy_object(src_bucket, src_key, dst_bucket, dst_key, Some(metadata))
        })
        .await
    }

    /// Create a "directory": a zero-byte object whose key ends in `/`
    pub async fn create_object_dir(&self, bucket: &str, dir: &str) -> OssResult<PutResult> {
        let dir = dir.trim_end_matches('/');
        if dir.is_empty() {
            return Err(OssError::invalid("directory name must not be empty"));
        }
        let key = format!("{}/", dir);
        self.put_object(bucket, &key, Bytes::new(), &ObjectMetadata::new()).await
    }

    /// Upload the files of a local directory under `prefix/`.
    ///
    /// Subdirectories are only walked when `recursive` is set, and `.git` and
    /// `.svn` are always skipped. Keys are `prefix/` followed by the file's path
    /// relative to `local_dir`, with `/` separators. A failed file does not
    /// stop the others; it is listed in the report.
    #[instrument(skip(self, local_dir, metadata, cancel), fields(dir = %local_dir.as_ref().display()))]
    pub async fn upload_dir<P: AsRef<Path>>(
        &self,
        bucket: &str,
        prefix: &str,
        local_dir: P,
        recursive: bool,
        metadata: &ObjectMetadata,
        cancel: &CancellationToken,
    ) -> OssResult<DirUploadReport> {
        let prefix = prefix.trim_end_matches('/');
        let files = collect_files(local_dir.as_ref(), recursive).await?;
        debug!(files = files.len(), "directory scanned");

        let mut report = DirUploadReport::default();
        for (relative, path) in files {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let key = if prefix.is_empty() {
                relative
            } else {
                format!("{}/{}", prefix, relative)
            };
            match self.upload_file(bucket, &key, &path, metadata, cancel).await {
                Ok(receipt) => report.succeeded.push(receipt),
                Err(err) => {
                    warn!(key = %key, error = %err, "file not uploaded");
                    report.failed.push((key, err));
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "directory upload finished"
        );
        Ok(report)
    }

    /// Create a bucket; creating one that already exists succeeds
    pub async fn create_bucket(&self, bucket: &str) -> OssResult<()> {
        let store = &self.store;
        with_retries(&self.config, "create_bucket", || store.create_bucket(bucket)).await
    }

    pub async fn bucket_exists(&self, bucket: &str) -> OssResult<bool> {
        let store = &self.store;
        with_retries(&self.config, "bucket_exists", || store.bucket_exists(bucket)).await
    }

    /// Delete a bucket. It must hold no objects and no unfinished uploads.
    pub async fn delete_bucket(&self, bucket: &str) -> OssResult<()> {
        let store = &self.store;
        with_retries(&self.config, "delete_bucket", || store.delete_bucket(bucket)).await
    }

    pub async fn list_buckets(&self) -> OssResult<Vec<BucketInfo>> {
        let store = &self.store;
        with_retries(&self.config, "list_buckets", || store.list_buckets()).await
    }

    /// Paginated listing under `prefix`; nothing is fetched until the first page is requested
    pub fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        page_size: u32,
    ) -> ObjectLister {
        ObjectLister::new(
            self.objects.clone(),
            self.config.clone(),
            bucket,
            prefix,
            delimiter.map(str::to_string),
            page_size,
        )
    }

    /// Every key and common prefix under `prefix`
    pub async fn list_all_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> OssResult<(Vec<String>, Vec<String>)> {
        self.list_objects(bucket, prefix, delimiter, 0).collect_all().await
    }

    /// Unfinished multipart uploads in a bucket, for cleanup or resumption
    pub async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        max_uploads: u32,
    ) -> OssResult<Vec<MultipartUploadInfo>> {
        let max_uploads = if max_uploads == 0 { DEFAULT_MAX_UPLOADS } else { max_uploads };
        let store = &self.store;
        with_retries(&self.config, "list_multipart_uploads", || {
            store.list_multipart_uploads(bucket, prefix, max_uploads)
        })
        .await
    }
}

/// Files under `root` as (relative key, path) pairs, sorted by key
async fn collect_files(root: &Path, recursive: bool) -> OssResult<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let mut pending = vec![(String::new(), root.to_path_buf())];

    while let Some((relative_dir, dir)) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!(path = %entry.path().display(), "skipping file name that is not UTF-8");
                continue;
            };
            if EXCLUDED_DIRS.contains(&name) {
                continue;
            }

            let relative = format!("{}{}", relative_dir, name);
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                if recursive {
                    pending.push((format!("{}/", relative), entry.path()));
                }
            } else if file_type.is_file()
                || (file_type.is_symlink() && tokio::fs::metadata(entry.path()).await?.is_file())
            {
                files.push((relative, entry.path()));
            }
        }
    }

    files.sort();
    Ok(files)
}
