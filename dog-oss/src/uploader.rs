use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use tracing::{debug, instrument, warn};

use crate::store::{MultipartObjectStore, UploadPartRequest};
use crate::types::now_timestamp;
use crate::{DataSource, OssError, OssResult, PartResult, PartSpec, UploadConfig, UploadTarget};

/// Base64-encoded MD5 digest, the format of the `Content-MD5` header
pub fn content_md5(data: &[u8]) -> String {
    STANDARD.encode(md5::compute(data).0)
}

/// Uploads single parts with retry, per-attempt timeout and integrity checks
#[derive(Clone)]
pub struct PartUploader {
    store: Arc<dyn MultipartObjectStore>,
    config: UploadConfig,
}

impl PartUploader {
    pub fn new(store: Arc<dyn MultipartObjectStore>, config: UploadConfig) -> Self {
        Self { store, config }
    }

    /// Upload the byte range `spec` of `source` as one part.
    ///
    /// Transient failures and timeouts are retried with exponential backoff
    /// reusing the bytes already read. An integrity mismatch discards those
    /// bytes and reads the range again before the next attempt. Once the
    /// attempts run out, a retryable failure is reported as
    /// `BackendUnavailable`; an integrity failure stays `IntegrityMismatch`.
    #[instrument(skip(self, target, source), fields(upload_id = %target.upload_id, part = spec.part_number))]
    pub async fn upload_part(
        &self,
        target: &UploadTarget,
        spec: PartSpec,
        source: &dyn DataSource,
    ) -> OssResult<PartResult> {
        let mut cached: Option<Bytes> = None;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let body = match cached.take() {
                Some(body) => body,
                None => self.read_part(spec, source).await?,
            };
            let checksum = self.config.verify_checksums.then(|| content_md5(&body));

            let request = UploadPartRequest {
                bucket: target.bucket.clone(),
                key: target.key.clone(),
                upload_id: target.upload_id.clone(),
                part_number: spec.part_number,
                body: body.clone(),
                content_md5: checksum.clone(),
            };

            let outcome = match tokio::time::timeout(self.config.part_timeout, self.store.upload_part(request)).await {
                Ok(result) => result,
                Err(_) => Err(OssError::transient(format!(
                    "part {} timed out after {:?}",
                    spec.part_number, self.config.part_timeout
                ))),
            };

            let err = match outcome {
                Ok(etag) => {
                    debug!(attempt, etag = %etag.etag, "part uploaded");
                    return Ok(PartResult {
                        part_number: spec.part_number,
                        etag: etag.etag,
                        size_bytes: spec.length,
                        content_md5: checksum,
                        uploaded_at: now_timestamp(),
                    });
                }
                Err(err) => err,
            };

            let integrity = matches!(err, OssError::IntegrityMismatch { .. });
            if !(integrity || err.is_retryable()) {
                warn!(attempt, error = %err, "part upload failed");
                return Err(err);
            }
            if attempt >= self.config.max_part_attempts {
                warn!(attempt, error = %err, "part upload failed after all attempts");
                if integrity {
                    return Err(err);
                }
                return Err(OssError::unavailable(format!(
                    "part {} failed after {} attempts: {}",
                    spec.part_number, attempt, err
                )));
            }

            if !integrity {
                cached = Some(body);
            }
            let backoff = self.config.retry_backoff(attempt);
            warn!(attempt, error = %err, ?backoff, "retrying part upload");
            tokio::time::sleep(backoff).await;
        }
    }

    async fn read_part(&self, spec: PartSpec, source: &dyn DataSource) -> OssResult<Bytes> {
        let body = source.read_range(spec.offset, spec.length).await?;
        if body.len() as u64 != spec.length {
            return Err(OssError::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "part {} expected {} bytes, source returned {}",
                        spec.part_number,
                        spec.length,
                        body.len()
                    ),
                ),
            });
        }
        Ok(body)
    }
}
