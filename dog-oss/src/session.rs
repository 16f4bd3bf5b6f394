use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::receipt::UploadMethod;
use crate::retry::with_retries;
use crate::store::{CompletedPart, MultipartObjectStore, PutResult};
use crate::types::now_timestamp;
use crate::{
    DataSource, ObjectMetadata, OssError, OssResult, PartResult, PartSpec, PartUploader,
    UploadConfig, UploadId, UploadPlan, UploadReceipt, UploadState, UploadTarget,
};

#[derive(Debug)]
struct SessionState {
    state: UploadState,
    plan: Option<UploadPlan>,
    parts: BTreeMap<u32, PartResult>,
    updated_at: i64,
}

impl SessionState {
    fn new(state: UploadState) -> Self {
        Self {
            state,
            plan: None,
            parts: BTreeMap::new(),
            updated_at: now_timestamp(),
        }
    }

    fn ensure_active(&self) -> OssResult<()> {
        match &self.state {
            UploadState::Initiated | UploadState::InProgress => Ok(()),
            other => Err(OssError::invalid_state(format!(
                "upload session is {:?}",
                other
            ))),
        }
    }

    fn mark_in_progress(&mut self) {
        if self.state == UploadState::Initiated {
            self.state = UploadState::InProgress;
        }
        self.updated_at = now_timestamp();
    }

    fn record(&mut self, part: PartResult) {
        if self.state.is_terminal() {
            return;
        }
        self.parts.insert(part.part_number, part);
        self.updated_at = now_timestamp();
    }

    /// Part numbers that `complete` needs: the plan's, or 1..=highest recorded
    fn required_parts(&self) -> Vec<u32> {
        match &self.plan {
            Some(plan) => plan.part_numbers().collect(),
            None => {
                let highest = self.parts.keys().next_back().copied().unwrap_or(1);
                (1..=highest).collect()
            }
        }
    }

    /// Required parts that are absent, or recorded with a length the plan disagrees with
    fn missing_parts(&self) -> Vec<u32> {
        let planned_len = |n: u32| self.plan.as_ref().and_then(|p| p.part(n)).map(|s| s.length);
        self.required_parts()
            .into_iter()
            .filter(|n| match self.parts.get(n) {
                None => true,
                Some(part) => planned_len(*n).is_some_and(|len| len != part.size_bytes),
            })
            .collect()
    }
}

/// A failed part in an `upload_all` run
#[derive(Debug)]
pub struct PartFailure {
    pub part_number: u32,
    pub error: OssError,
}

/// Outcome of `UploadSession::upload_all`
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Parts uploaded by this run, ascending
    pub uploaded: Vec<u32>,
    /// Parts already recorded before this run and left untouched
    pub skipped: Vec<u32>,
    pub failed: Vec<PartFailure>,
    /// Cancellation stopped dispatch before every part was submitted
    pub cancelled: bool,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    pub fn failed_parts(&self) -> Vec<u32> {
        self.failed.iter().map(|f| f.part_number).collect()
    }
}

/// Serializable snapshot of a session, for resuming after a restart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCheckpoint {
    pub target: UploadTarget,
    pub plan: Option<UploadPlan>,
    pub parts: Vec<PartResult>,
    pub updated_at: i64,
}

impl UploadCheckpoint {
    pub fn to_json(&self) -> OssResult<String> {
        serde_json::to_string(self).map_err(|e| OssError::invalid(format!("checkpoint not serializable: {}", e)))
    }

    pub fn from_json(json: &str) -> OssResult<Self> {
        serde_json::from_str(json).map_err(|e| OssError::invalid(format!("malformed checkpoint: {}", e)))
    }
}

/// One multipart upload: initiate → upload parts → complete or abort.
///
/// Failed or cancelled part uploads never abort the session; the caller
/// decides whether to retry the missing parts or call `abort`.
pub struct UploadSession {
    target: UploadTarget,
    store: Arc<dyn MultipartObjectStore>,
    uploader: PartUploader,
    config: UploadConfig,
    inner: Arc<Mutex<SessionState>>,
}

impl UploadSession {
    /// Ask the backend for a new upload id
    #[instrument(skip(store, config, metadata))]
    pub async fn initiate(
        store: Arc<dyn MultipartObjectStore>,
        config: UploadConfig,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> OssResult<Self> {
        let upload_id = with_retries(&config, "initiate_multipart", || {
            store.initiate_multipart(bucket, key, metadata)
        })
        .await?;

        info!(%upload_id, "multipart upload initiated");
        let target = UploadTarget::new(bucket, key, upload_id);
        Ok(Self::build(store, config, target, SessionState::new(UploadState::Initiated)))
    }

    /// Rebuild a session from a persisted upload id and the parts recorded so far
    pub fn resume(
        store: Arc<dyn MultipartObjectStore>,
        config: UploadConfig,
        target: UploadTarget,
        parts: Vec<PartResult>,
    ) -> Self {
        let mut state = SessionState::new(UploadState::InProgress);
        for part in parts {
            state.record(part);
        }
        debug!(upload_id = %target.upload_id, parts = state.parts.len(), "multipart upload resumed");
        Self::build(store, config, target, state)
    }

    /// Rebuild a session, plan included, from a saved checkpoint
    pub fn from_checkpoint(
        store: Arc<dyn MultipartObjectStore>,
        config: UploadConfig,
        checkpoint: UploadCheckpoint,
    ) -> Self {
        let session = Self::resume(store, config, checkpoint.target, checkpoint.parts);
        session.inner.lock().plan = checkpoint.plan;
        session
    }

    fn build(
        store: Arc<dyn MultipartObjectStore>,
        config: UploadConfig,
        target: UploadTarget,
        state: SessionState,
    ) -> Self {
        Self {
            uploader: PartUploader::new(store.clone(), config.clone()),
            target,
            store,
            config,
            inner: Arc::new(Mutex::new(state)),
        }
    }

    pub fn upload_id(&self) -> &UploadId {
        &self.target.upload_id
    }

    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    pub fn state(&self) -> UploadState {
        self.inner.lock().state.clone()
    }

    pub fn plan(&self) -> Option<UploadPlan> {
        self.inner.lock().plan.clone()
    }

    /// Register the plan `complete` checks against
    pub fn set_plan(&self, plan: UploadPlan) -> OssResult<()> {
        let mut inner = self.inner.lock();
        inner.ensure_active()?;
        inner.plan = Some(plan);
        Ok(())
    }

    /// Recorded parts in part-number order
    pub fn completed_parts(&self) -> Vec<PartResult> {
        self.inner.lock().parts.values().cloned().collect()
    }

    pub fn missing_parts(&self) -> Vec<u32> {
        self.inner.lock().missing_parts()
    }

    /// Snapshot of the upload id, plan and recorded parts
    pub fn checkpoint(&self) -> UploadCheckpoint {
        let inner = self.inner.lock();
        UploadCheckpoint {
            target: self.target.clone(),
            plan: inner.plan.clone(),
            parts: inner.parts.values().cloned().collect(),
            updated_at: inner.updated_at,
        }
    }

    /// Upload (or re-upload) a single part and record it
    pub async fn upload_part(&self, spec: PartSpec, source: &dyn DataSource) -> OssResult<PartResult> {
        {
            let mut inner = self.inner.lock();
            inner.ensure_active()?;
            inner.mark_in_progress();
        }

        let part = self.uploader.upload_part(&self.target, spec, source).await?;
        self.inner.lock().record(part.clone());
        Ok(part)
    }

    /// Upload every planned part that is not yet recorded, at most
    /// `max_concurrent_parts` at a time.
    ///
    /// Cancelling `cancel` stops dispatching new parts; parts already in
    /// flight run to completion (or their timeout) and are recorded.
    #[instrument(skip_all, fields(upload_id = %self.target.upload_id, parts = plan.len()))]
    pub async fn upload_all(
        &self,
        plan: &UploadPlan,
        source: Arc<dyn DataSource>,
        cancel: &CancellationToken,
    ) -> OssResult<UploadReport> {
        if source.len() != plan.total_size {
            return Err(OssError::invalid(format!(
                "source is {} bytes but the plan covers {}",
                source.len(),
                plan.total_size
            )));
        }

        let mut report = UploadReport::default();
        let pending: Vec<PartSpec> = {
            let mut inner = self.inner.lock();
            inner.ensure_active()?;
            inner.plan = Some(plan.clone());
            inner.mark_in_progress();

            plan.parts
                .iter()
                .filter(|spec| match inner.parts.get(&spec.part_number) {
                    Some(done) if done.size_bytes == spec.length => {
                        report.skipped.push(spec.part_number);
                        false
                    }
                    _ => true,
                })
                .copied()
                .collect()
        };

        info!(pending = pending.len(), skipped = report.skipped.len(), "uploading parts");

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_parts.max(1)));
        let mut tasks = JoinSet::new();

        for spec in pending {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = permits.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                report.cancelled = true;
                break;
            };

            let uploader = self.uploader.clone();
            let target = self.target.clone();
            let source = source.clone();
            let inner = self.inner.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let result = uploader.upload_part(&target, spec, source.as_ref()).await;
                if let Ok(part) = &result {
                    inner.lock().record(part.clone());
                }
                (spec.part_number, result)
            });
        }

        let mut join_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((part_number, Ok(_))) => report.uploaded.push(part_number),
                Ok((part_number, Err(error))) => report.failed.push(PartFailure { part_number, error }),
                Err(err) => {
                    warn!(error = %err, "part upload task did not finish");
                    join_error.get_or_insert(err);
                }
            }
        }

        if let Some(err) = join_error {
            return Err(OssError::backend(err));
        }

        report.uploaded.sort_unstable();
        report.failed.sort_by_key(|f| f.part_number);

        if report.cancelled {
            info!(uploaded = report.uploaded.len(), "part dispatch cancelled");
        } else if !report.failed.is_empty() {
            warn!(failed = ?report.failed_parts(), "some parts failed; session left in progress");
        } else {
            info!(uploaded = report.uploaded.len(), "all parts uploaded");
        }

        Ok(report)
    }

    /// Finalize the object from the recorded parts, in part-number order.
    ///
    /// A network failure during the backend call is never retried blindly;
    /// the object is looked up instead, and only if it is present with the
    /// expected size is the upload treated as completed.
    #[instrument(skip(self), fields(upload_id = %self.target.upload_id))]
    pub async fn complete(&self) -> OssResult<UploadReceipt> {
        let (parts, part_size, total_size) = {
            let inner = self.inner.lock();
            inner.ensure_active()?;

            let missing = inner.missing_parts();
            if !missing.is_empty() {
                return Err(OssError::IncompleteParts { missing });
            }

            let required = inner.required_parts();
            let parts: Vec<PartResult> = required
                .iter()
                .filter_map(|n| inner.parts.get(n).cloned())
                .collect();
            let part_size = match &inner.plan {
                Some(plan) => plan.part_size,
                None => parts.iter().map(|p| p.size_bytes).max().unwrap_or(0),
            };
            let total_size: u64 = parts.iter().map(|p| p.size_bytes).sum();
            (parts, part_size, total_size)
        };

        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|p| CompletedPart {
                part_number: p.part_number,
                etag: p.etag.clone(),
            })
            .collect();
        let count = completed.len() as u32;

        let result = self
            .store
            .complete_multipart(&self.target.bucket, &self.target.key, &self.target.upload_id, completed)
            .await;

        let (result, method) = match result {
            Ok(result) => (
                result,
                UploadMethod::Multipart {
                    upload_id: self.target.upload_id.clone(),
                    part_size,
                    parts: count,
                },
            ),
            Err(err) if err.is_retryable() || err.is_not_found() => {
                warn!(error = %err, "complete failed; checking whether the object was finalized");
                let result = self.confirm_finalized(err, &parts, total_size).await?;
                (
                    result,
                    UploadMethod::MultipartRecovered {
                        upload_id: self.target.upload_id.clone(),
                        parts: count,
                    },
                )
            }
            Err(err) => return Err(err),
        };

        {
            let mut inner = self.inner.lock();
            inner.state = UploadState::Completed {
                completed_at: now_timestamp(),
            };
            inner.updated_at = now_timestamp();
        }
        info!(size_bytes = result.size_bytes, parts = count, "multipart upload completed");

        Ok(UploadReceipt::new(&self.target.bucket, &self.target.key, result.size_bytes)
            .with_optional_etag(result.etag)
            .with_method(method))
    }

    /// Decide whether a `complete` that failed on the wire took effect. The
    /// object under the key must have the upload's size and its multipart ETag;
    /// an object that matches on size alone may be an older one.
    async fn confirm_finalized(
        &self,
        cause: OssError,
        parts: &[PartResult],
        total_size: u64,
    ) -> OssResult<PutResult> {
        let head = match self.store.head_object(&self.target.bucket, &self.target.key).await {
            Ok(head) => head,
            Err(err) if err.is_not_found() => return Err(cause),
            Err(err) => {
                return Err(self.ambiguous(&cause, format!("the follow-up check failed with `{}`", err)))
            }
        };
        if head.size_bytes != total_size {
            return Err(cause);
        }

        match (expected_multipart_etag(parts), head.etag.as_deref().map(trim_etag)) {
            (Some(expected), Some(actual)) if expected.eq_ignore_ascii_case(actual) => Ok(PutResult {
                etag: head.etag.clone(),
                size_bytes: head.size_bytes,
            }),
            (Some(expected), Some(actual)) => {
                debug!(expected = %expected, actual = %actual, "object under the key is not this upload");
                Err(cause)
            }
            _ => Err(self.ambiguous(
                &cause,
                "the object found under the key cannot be matched to this upload".to_string(),
            )),
        }
    }

    fn ambiguous(&self, cause: &OssError, detail: String) -> OssError {
        OssError::AmbiguousCompletion {
            upload_id: self.target.upload_id.to_string(),
            message: format!("complete failed with `{}` and {}", cause, detail),
        }
    }

    /// Release the parts held by the backend. Aborting twice is a no-op.
    #[instrument(skip(self), fields(upload_id = %self.target.upload_id))]
    pub async fn abort(&self) -> OssResult<()> {
        {
            let inner = self.inner.lock();
            match inner.state {
                UploadState::Aborted { .. } => return Ok(()),
                UploadState::Completed { .. } => {
                    return Err(OssError::invalid_state("cannot abort a completed upload"))
                }
                _ => {}
            }
        }

        let target = &self.target;
        let outcome = with_retries(&self.config, "abort_multipart", || {
            self.store
                .abort_multipart(&target.bucket, &target.key, &target.upload_id)
        })
        .await;

        match outcome {
            Ok(()) => {}
            Err(err) if err.is_not_found() => debug!("backend no longer knows the upload"),
            Err(err) => return Err(err),
        }

        let mut inner = self.inner.lock();
        inner.state = UploadState::Aborted {
            aborted_at: now_timestamp(),
        };
        inner.updated_at = now_timestamp();
        info!("multipart upload aborted");
        Ok(())
    }
}

fn trim_etag(etag: &str) -> &str {
    etag.trim_matches('"')
}

/// ETag S3 assigns to a completed multipart object: the hex MD5 of the
/// concatenated binary part digests, then `-` and the part count. `None` when
/// a part ETag is not a plain MD5 (encrypted or non-S3 backends).
fn expected_multipart_etag(parts: &[PartResult]) -> Option<String> {
    let mut digests = Vec::with_capacity(parts.len() * 16);
    for part in parts {
        let hex = trim_etag(&part.etag);
        if hex.len() != 32 || !hex.is_ascii() {
            return None;
        }
        for i in (0..32).step_by(2) {
            digests.push(u8::from_str_radix(&hex[i..i + 2], 16).ok()?);
        }
    }
    Some(format!("{:x}-{}", md5::compute(&digests), parts.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BytesSource, MemoryObjectStore, PartPlanner, StoreCapabilities};
    use crate::store::ObjectStore;

    fn store() -> Arc<MemoryObjectStore> {
        Arc::new(
            MemoryObjectStore::new()
                .with_capabilities(StoreCapabilities::s3_limits().with_part_limits(4, 1024, 100)),
        )
    }

    fn config() -> UploadConfig {
        UploadConfig::new()
            .with_min_part_size(4)
            .with_part_size(4)
            .with_max_concurrent_parts(2)
    }

    async fn session(store: &Arc<MemoryObjectStore>) -> UploadSession {
        UploadSession::initiate(store.clone(), config(), "b", "obj", &ObjectMetadata::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initiate_starts_in_initiated_state() {
        let store = store();
        let session = session(&store).await;
        assert_eq!(session.state(), UploadState::Initiated);
        assert!(session.completed_parts().is_empty());
        assert_eq!(store.pending_parts(session.upload_id()), Some(vec![]));
    }

    #[tokio::test]
    async fn test_upload_all_then_complete() {
        let store = store();
        let session = session(&store).await;
        let data = b"abcdefghij".to_vec();
        let plan = PartPlanner::new(4, 1024, 100).plan(10, 4).unwrap();

        let report = session
            .upload_all(&plan, Arc::new(BytesSource::new(data.clone())), &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.uploaded, vec![1, 2, 3]);
        assert_eq!(session.state(), UploadState::InProgress);

        let receipt = session.complete().await.unwrap();
        assert_eq!(receipt.size_bytes, 10);
        assert!(matches!(receipt.method, UploadMethod::Multipart { parts: 3, part_size: 4, .. }));
        assert!(matches!(session.state(), UploadState::Completed { .. }));

        let stored = store.get_object("b", "obj", None).await.unwrap();
        assert_eq!(stored.body.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn test_complete_reports_missing_parts() {
        let store = store();
        let session = session(&store).await;
        let source = BytesSource::new(&b"abcdefghij"[..]);
        let plan = PartPlanner::new(4, 1024, 100).plan(10, 4).unwrap();
        session.set_plan(plan.clone()).unwrap();

        session.upload_part(plan.parts[0], &source).await.unwrap();
        session.upload_part(plan.parts[0], &source).await.unwrap();

        match session.complete().await {
            Err(OssError::IncompleteParts { missing }) => assert_eq!(missing, vec![2, 3]),
            other => panic!("expected IncompleteParts, got {:?}", other),
        }
        assert_eq!(session.state(), UploadState::InProgress);
    }

    #[tokio::test]
    async fn test_abort_twice_is_noop() {
        let store = store();
        let session = session(&store).await;
        session.abort().await.unwrap();
        session.abort().await.unwrap();
        assert!(matches!(session.state(), UploadState::Aborted { .. }));
        assert!(store.pending_parts(session.upload_id()).is_none());

        let source = BytesSource::new(&b"abcd"[..]);
        let err = session.upload_part(PartSpec::new(1, 0, 4), &source).await.unwrap_err();
        assert!(matches!(err, OssError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_abort_after_complete_is_rejected() {
        let store = store();
        let session = session(&store).await;
        let source = BytesSource::new(&b"abcd"[..]);
        session.upload_part(PartSpec::new(1, 0, 4), &source).await.unwrap();
        session.complete().await.unwrap();

        assert!(matches!(session.abort().await, Err(OssError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_complete_without_plan_requires_contiguous_parts() {
        let store = store();
        let session = session(&store).await;
        let source = BytesSource::new(&b"abcdefghijkl"[..]);
        session.upload_part(PartSpec::new(3, 8, 4), &source).await.unwrap();

        match session.complete().await {
            Err(OssError::IncompleteParts { missing }) => assert_eq!(missing, vec![1, 2]),
            other => panic!("expected IncompleteParts, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_source_size_must_match_plan() {
        let store = store();
        let session = session(&store).await;
        let plan = PartPlanner::new(4, 1024, 100).plan(10, 4).unwrap();
        let result = session
            .upload_all(&plan, Arc::new(BytesSource::new(&b"short"[..])), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(OssError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_checkpoint_survives_json() {
        let store = store();
        let data = b"abcdefghij".to_vec();
        let plan = PartPlanner::new(4, 1024, 100).plan(10, 4).unwrap();
        let source = BytesSource::new(data.clone());

        let saved = {
            let session = session(&store).await;
            session.set_plan(plan.clone()).unwrap();
            session.upload_part(plan.parts[1], &source).await.unwrap();
            session.checkpoint().to_json().unwrap()
        };

        let checkpoint = UploadCheckpoint::from_json(&saved).unwrap();
        assert_eq!(checkpoint.plan.as_ref(), Some(&plan));
        let session = UploadSession::from_checkpoint(store.clone(), config(), checkpoint);
        assert_eq!(session.missing_parts(), vec![1, 3]);

        let report = session
            .upload_all(&plan, Arc::new(source), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.skipped, vec![2]);
        session.complete().await.unwrap();

        let stored = store.get_object("b", "obj", None).await.unwrap();
        assert_eq!(stored.body.as_ref(), data.as_slice());
    }

    #[test]
    fn test_malformed_checkpoint_is_invalid() {
        assert!(matches!(
            UploadCheckpoint::from_json("{\"target\": 1}"),
            Err(OssError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn test_reuploaded_part_replaces_its_etag() {
        let store = store();
        let session = session(&store).await;
        let spec = PartSpec::new(1, 0, 4);

        session.upload_part(spec, &BytesSource::new(&b"aaaa"[..])).await.unwrap();
        assert_eq!(session.completed_parts()[0].etag, format!("{:x}", md5::compute(b"aaaa")));

        session.upload_part(spec, &BytesSource::new(&b"bbbb"[..])).await.unwrap();
        let parts = session.completed_parts();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].etag, format!("{:x}", md5::compute(b"bbbb")));

        session.complete().await.unwrap();
        let stored = store.get_object("b", "obj", None).await.unwrap();
        assert_eq!(stored.body.as_ref(), b"bbbb");
    }

    #[tokio::test]
    async fn test_expected_multipart_etag_matches_backend() {
        let store = store();
        let session = session(&store).await;
        let plan = PartPlanner::new(4, 1024, 100).plan(10, 4).unwrap();
        session
            .upload_all(&plan, Arc::new(BytesSource::new(&b"abcdefghij"[..])), &CancellationToken::new())
            .await
            .unwrap();
        let parts = session.completed_parts();

        let receipt = session.complete().await.unwrap();
        assert_eq!(expected_multipart_etag(&parts), receipt.etag);
    }

    #[test]
    fn test_expected_multipart_etag_accepts_quoted_part_etags() {
        let part = |n: u32, etag: String| PartResult {
            part_number: n,
            etag,
            size_bytes: 4,
            content_md5: None,
            uploaded_at: 0,
        };
        let plain = vec![
            part(1, format!("{:x}", md5::compute(b"abcd"))),
            part(2, format!("{:x}", md5::compute(b"efgh"))),
        ];
        let quoted: Vec<PartResult> = plain
            .iter()
            .map(|p| part(p.part_number, format!("\"{}\"", p.etag)))
            .collect();

        let expected = expected_multipart_etag(&plain).unwrap();
        assert!(expected.ends_with("-2"));
        assert_eq!(expected_multipart_etag(&quoted), Some(expected));
    }

    #[test]
    fn test_expected_multipart_etag_needs_md5_part_etags() {
        let part = PartResult {
            part_number: 1,
            etag: "kms-encrypted-etag".to_string(),
            size_bytes: 4,
            content_md5: None,
            uploaded_at: 0,
        };
        assert!(expected_multipart_etag(&[part]).is_none());
    }
}
