use std::collections::{BTreeMap, HashMap};
use std::env;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CreateBucketConfiguration, Delete,
    MetadataDirective, ObjectIdentifier,
};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;

use crate::store::{
    CompletedPart, GetResult, MultipartObjectStore, ObjectHead, ObjectStore, PartETag, PutResult,
    StoreCapabilities, UploadPartRequest,
};
use crate::{
    BucketInfo, ByteRange, ListRequest, ListingPage, MultipartUploadInfo, ObjectMetadata, ObjectSummary,
    OssError, OssResult, UploadId,
};

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`
    pub force_path_style: bool,
}

impl S3Config {
    /// Load from `OSS_ENDPOINT_URL`, `OSS_REGION`, `OSS_ACCESS_KEY_ID`,
    /// `OSS_SECRET_ACCESS_KEY` and the optional `OSS_FORCE_PATH_STYLE`
    pub fn from_env() -> OssResult<Self> {
        fn get_env(key: &str) -> OssResult<String> {
            env::var(key).map_err(|_| OssError::invalid(format!("{} environment variable required", key)))
        }

        let force_path_style = match env::var("OSS_FORCE_PATH_STYLE") {
            Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
            Err(_) => false,
        };

        Ok(Self {
            endpoint_url: get_env("OSS_ENDPOINT_URL")?,
            region: get_env("OSS_REGION")?,
            access_key_id: get_env("OSS_ACCESS_KEY_ID")?,
            secret_access_key: get_env("OSS_SECRET_ACCESS_KEY")?,
            force_path_style,
        })
    }
}

/// Object store backed by any S3-compatible API (AWS, Aliyun OSS, MinIO, RustFS)
#[derive(Clone)]
pub struct S3CompatibleStore {
    client: Client,
}

impl S3CompatibleStore {
    pub async fn new(config: S3Config) -> Self {
        let client = Self::create_client(config).await;
        Self { client }
    }

    pub async fn from_env() -> OssResult<Self> {
        Ok(Self::new(S3Config::from_env()?).await)
    }

    /// Wrap an already configured SDK client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn create_client(config: S3Config) -> Client {
        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "dog-oss",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .endpoint_url(config.endpoint_url)
            .load()
            .await;

        Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(config.force_path_style)
                .build(),
        )
    }

    fn user_metadata(metadata: &ObjectMetadata) -> Option<HashMap<String, String>> {
        if metadata.user_metadata.is_empty() {
            None
        } else {
            Some(
                metadata
                    .user_metadata
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )
        }
    }
}

/// `x-amz-copy-source` value; the key is percent-encoded
fn copy_source(bucket: &str, key: &str) -> String {
    let encoded_key = urlencoding::encode(key);
    format!("{}/{}", bucket, encoded_key)
}

/// Sort an SDK failure into the crate's error taxonomy
fn map_sdk_error<E>(err: SdkError<E, HttpResponse>) -> OssError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            return OssError::transient(err.to_string());
        }
        SdkError::ServiceError(_) => {}
        _ => return OssError::backend(err),
    }

    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().unwrap_or_default().to_string();
    let message = err.message().unwrap_or(&code).to_string();

    match (code.as_str(), status) {
        ("BadDigest" | "InvalidDigest", _) => OssError::integrity(0, message),
        ("BucketNotEmpty", _) => OssError::invalid(message),
        ("NoSuchKey" | "NotFound" | "NoSuchUpload" | "NoSuchBucket", _) | (_, Some(404)) => {
            OssError::not_found(message)
        }
        ("SlowDown" | "Throttling" | "RequestTimeout" | "ServiceUnavailable", _) => {
            OssError::unavailable(message)
        }
        (_, Some(status)) if status >= 500 => OssError::unavailable(format!("{} ({})", message, status)),
        _ => OssError::backend(err),
    }
}

#[async_trait]
impl ObjectStore for S3CompatibleStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        metadata: &ObjectMetadata,
    ) -> OssResult<PutResult> {
        let size_bytes = body.len() as u64;
        let result = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_content_type(metadata.content_type.clone())
            .set_metadata(Self::user_metadata(metadata))
            .body(AwsByteStream::from(body))
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(PutResult {
            etag: result.e_tag,
            size_bytes,
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> OssResult<GetResult> {
        let mut request = self.client.get_object().bucket(bucket).key(key);
        if let Some(range) = &range {
            request = request.range(range.to_header());
        }

        let result = request.send().await.map_err(map_sdk_error)?;

        // Content-Range is `bytes a-b/total`; without a range the length is the total
        let size_bytes = result
            .content_range()
            .and_then(|r| r.rsplit('/').next())
            .and_then(|total| total.parse::<u64>().ok())
            .unwrap_or_else(|| result.content_length().unwrap_or(0).max(0) as u64);
        let content_type = result.content_type.clone();
        let etag = result.e_tag.clone();

        let body = result
            .body
            .collect()
            .await
            .map_err(|e| OssError::transient(format!("reading object body: {}", e)))?
            .into_bytes();

        Ok(GetResult {
            body,
            size_bytes,
            content_type,
            etag,
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> OssResult<ObjectHead> {
        let result = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let user_metadata: BTreeMap<String, String> = result
            .metadata()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Ok(ObjectHead {
            size_bytes: result.content_length().unwrap_or(0).max(0) as u64,
            content_type: result.content_type.clone(),
            etag: result.e_tag.clone(),
            last_modified: result.last_modified.map(|dt| dt.secs()),
            user_metadata,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> OssResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> OssResult<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let identifiers = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build().map_err(OssError::backend))
            .collect::<OssResult<Vec<_>>>()?;
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .build()
            .map_err(OssError::backend)?;

        let result = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(map_sdk_error)?;

        for failed in result.errors() {
            debug!(key = ?failed.key(), code = ?failed.code(), "object not deleted");
        }

        Ok(result
            .deleted()
            .iter()
            .filter_map(|d| d.key().map(str::to_string))
            .collect())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        metadata: Option<&ObjectMetadata>,
    ) -> OssResult<PutResult> {
        let mut call = self
            .client
            .copy_object()
            .copy_source(copy_source(src_bucket, src_key))
            .bucket(dst_bucket)
            .key(dst_key);
        if let Some(metadata) = metadata {
            call = call
                .metadata_directive(MetadataDirective::Replace)
                .set_content_type(metadata.content_type.clone())
                .set_metadata(Self::user_metadata(metadata));
        }

        let result = call.send().await.map_err(map_sdk_error)?;

        let head = self.head_object(dst_bucket, dst_key).await?;
        Ok(PutResult {
            etag: result
                .copy_object_result()
                .and_then(|r| r.e_tag().map(str::to_string))
                .or(head.etag),
            size_bytes: head.size_bytes,
        })
    }

    async fn list_objects_page(&self, bucket: &str, request: &ListRequest) -> OssResult<ListingPage> {
        let mut call = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(&request.prefix)
            .set_delimiter(request.delimiter.clone());
        if request.max_keys > 0 {
            call = call.max_keys(request.max_keys as i32);
        }
        if !request.marker.is_empty() {
            call = call.continuation_token(&request.marker);
        }

        let result = call.send().await.map_err(map_sdk_error)?;

        let objects = result
            .contents()
            .iter()
            .filter_map(|object| {
                object.key().map(|key| ObjectSummary {
                    key: key.to_string(),
                    size_bytes: object.size().unwrap_or(0).max(0) as u64,
                    etag: object.e_tag().map(str::to_string),
                    last_modified: object.last_modified().map(|dt| dt.secs()),
                })
            })
            .collect();
        let common_prefixes = result
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        let next = result.next_continuation_token().unwrap_or_default().to_string();
        let is_last = !result.is_truncated().unwrap_or(false) || next.is_empty();

        Ok(ListingPage {
            objects,
            common_prefixes,
            continuation_marker: if is_last { String::new() } else { next },
            is_last,
        })
    }

    async fn create_bucket(&self, bucket: &str) -> OssResult<()> {
        let mut call = self.client.create_bucket().bucket(bucket);
        // us-east-1 rejects an explicit location constraint
        if let Some(region) = self.client.config().region().map(|r| r.as_ref().to_string()) {
            if region != "us-east-1" {
                call = call.create_bucket_configuration(
                    CreateBucketConfiguration::builder()
                        .location_constraint(BucketLocationConstraint::from(region.as_str()))
                        .build(),
                );
            }
        }

        match call.send().await {
            Ok(_) => Ok(()),
            Err(err) if matches!(err.code(), Some("BucketAlreadyOwnedByYou" | "BucketAlreadyExists")) => {
                debug!(bucket, "bucket already exists");
                Ok(())
            }
            Err(err) => Err(map_sdk_error(err)),
        }
    }

    async fn bucket_exists(&self, bucket: &str) -> OssResult<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => match map_sdk_error(err) {
                e if e.is_not_found() => Ok(false),
                e => Err(e),
            },
        }
    }

    async fn delete_bucket(&self, bucket: &str) -> OssResult<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn list_buckets(&self) -> OssResult<Vec<BucketInfo>> {
        let result = self.client.list_buckets().send().await.map_err(map_sdk_error)?;
        Ok(result
            .buckets()
            .iter()
            .filter_map(|b| {
                b.name().map(|name| BucketInfo {
                    name: name.to_string(),
                    created_at: b.creation_date().map(|d| d.secs()),
                })
            })
            .collect())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::s3_limits()
    }
}

#[async_trait]
impl MultipartObjectStore for S3CompatibleStore {
    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> OssResult<UploadId> {
        let result = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_content_type(metadata.content_type.clone())
            .set_metadata(Self::user_metadata(metadata))
            .send()
            .await
            .map_err(map_sdk_error)?;

        result
            .upload_id()
            .map(|id| UploadId(id.to_string()))
            .ok_or_else(|| OssError::unavailable("backend returned no upload id"))
    }

    async fn upload_part(&self, request: UploadPartRequest) -> OssResult<PartETag> {
        let part_number = request.part_number;
        let result = self
            .client
            .upload_part()
            .bucket(request.bucket)
            .key(request.key)
            .upload_id(request.upload_id.0)
            .part_number(part_number as i32)
            .set_content_md5(request.content_md5)
            .body(AwsByteStream::from(request.body))
            .send()
            .await
            .map_err(|e| match map_sdk_error(e) {
                OssError::IntegrityMismatch { message, .. } => OssError::integrity(part_number, message),
                other => other,
            })?;

        let etag = result
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| OssError::transient(format!("no ETag returned for part {}", part_number)))?;

        Ok(PartETag { part_number, etag })
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        parts: Vec<CompletedPart>,
    ) -> OssResult<PutResult> {
        let completed = parts
            .into_iter()
            .map(|p| {
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(p.part_number as i32)
                    .e_tag(p.etag)
                    .build()
            })
            .collect::<Vec<_>>();

        let result = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id.as_str())
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(map_sdk_error)?;

        let head = self.head_object(bucket, key).await?;
        Ok(PutResult {
            etag: result.e_tag().map(str::to_string).or(head.etag),
            size_bytes: head.size_bytes,
        })
    }

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &UploadId) -> OssResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id.as_str())
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        max_uploads: u32,
    ) -> OssResult<Vec<MultipartUploadInfo>> {
        let result = self
            .client
            .list_multipart_uploads()
            .bucket(bucket)
            .set_prefix(prefix.map(str::to_string))
            .max_uploads(max_uploads as i32)
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(result
            .uploads()
            .iter()
            .filter_map(|u| {
                Some(MultipartUploadInfo {
                    key: u.key()?.to_string(),
                    upload_id: UploadId(u.upload_id()?.to_string()),
                    initiated_at: u.initiated().map(|dt| dt.secs()),
                })
            })
            .collect())
    }
}
