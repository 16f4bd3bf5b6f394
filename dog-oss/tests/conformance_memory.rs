use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use dog_oss::{
    BucketInfo, ByteRange, BytesSource, CompletedPart, DataSource, GetResult, ListRequest, ListingPage,
    MemoryObjectStore, MultipartObjectStore, MultipartUploadInfo, ObjectHead, ObjectMetadata,
    ObjectStore, OssClient, OssError, OssResult, PartETag, PutResult, StoreCapabilities,
    UploadConfig, UploadId, UploadMethod, UploadPartRequest, UploadSession, UploadState,
};

/// How `complete_multipart` misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CompleteFault {
    #[default]
    None,
    /// The object is finalized but the response is lost
    LostResponse,
    /// The request fails before reaching the backend
    FailBefore,
}

#[derive(Default)]
struct Faults {
    transient: HashMap<u32, u32>,
    integrity: HashMap<u32, u32>,
    part_delay: Option<Duration>,
    /// Delay for the first attempt at a part only
    slow_once: HashMap<u32, Duration>,
    complete: CompleteFault,
    head_fails: bool,
    cancel_after: Option<(usize, CancellationToken)>,
    list_down: bool,
}

/// Memory store with injectable failures and call recording
#[derive(Default)]
struct FaultyStore {
    inner: MemoryObjectStore,
    faults: Mutex<Faults>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    parts_stored: AtomicUsize,
    completed_order: Mutex<Vec<u32>>,
}

impl FaultyStore {
    fn new() -> Self {
        Self {
            inner: MemoryObjectStore::new().with_capabilities(test_capabilities()),
            ..Default::default()
        }
    }

    fn with_faults(self, configure: impl FnOnce(&mut Faults)) -> Self {
        configure(&mut self.faults.lock());
        self
    }

    fn take_fault(map: &mut HashMap<u32, u32>, part_number: u32) -> bool {
        match map.get_mut(&part_number) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes, metadata: &ObjectMetadata) -> OssResult<PutResult> {
        self.inner.put_object(bucket, key, body, metadata).await
    }

    async fn get_object(&self, bucket: &str, key: &str, range: Option<ByteRange>) -> OssResult<GetResult> {
        self.inner.get_object(bucket, key, range).await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> OssResult<ObjectHead> {
        if self.faults.lock().head_fails {
            return Err(OssError::transient("head timed out"));
        }
        self.inner.head_object(bucket, key).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> OssResult<()> {
        self.inner.delete_object(bucket, key).await
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> OssResult<Vec<String>> {
        self.inner.delete_objects(bucket, keys).await
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        metadata: Option<&ObjectMetadata>,
    ) -> OssResult<PutResult> {
        self.inner.copy_object(src_bucket, src_key, dst_bucket, dst_key, metadata).await
    }

    async fn list_objects_page(&self, bucket: &str, request: &ListRequest) -> OssResult<ListingPage> {
        if self.faults.lock().list_down {
            return Err(OssError::transient("listing connection reset"));
        }
        self.inner.list_objects_page(bucket, request).await
    }

    async fn create_bucket(&self, bucket: &str) -> OssResult<()> {
        self.inner.create_bucket(bucket).await
    }

    async fn bucket_exists(&self, bucket: &str) -> OssResult<bool> {
        self.inner.bucket_exists(bucket).await
    }

    async fn delete_bucket(&self, bucket: &str) -> OssResult<()> {
        self.inner.delete_bucket(bucket).await
    }

    async fn list_buckets(&self) -> OssResult<Vec<BucketInfo>> {
        self.inner.list_buckets().await
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.inner.capabilities()
    }
}

#[async_trait]
impl MultipartObjectStore for FaultyStore {
    async fn initiate_multipart(&self, bucket: &str, key: &str, metadata: &ObjectMetadata) -> OssResult<UploadId> {
        self.inner.initiate_multipart(bucket, key, metadata).await
    }

    async fn upload_part(&self, request: UploadPartRequest) -> OssResult<PartETag> {
        let part_number = request.part_number;
        let (delay, slow) = {
            let mut faults = self.faults.lock();
            if Self::take_fault(&mut faults.transient, part_number) {
                return Err(OssError::transient(format!("connection reset on part {}", part_number)));
            }
            if Self::take_fault(&mut faults.integrity, part_number) {
                return Err(OssError::integrity(part_number, "BadDigest"));
            }
            (faults.part_delay, faults.slow_once.remove(&part_number))
        };
        if let Some(slow) = slow {
            tokio::time::sleep(slow).await;
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.inner.upload_part(request).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let stored = self.parts_stored.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, token)) = &self.faults.lock().cancel_after {
            if stored >= *after {
                token.cancel();
            }
        }
        result
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        parts: Vec<CompletedPart>,
    ) -> OssResult<PutResult> {
        *self.completed_order.lock() = parts.iter().map(|p| p.part_number).collect();

        let fault = self.faults.lock().complete;
        match fault {
            CompleteFault::None => self.inner.complete_multipart(bucket, key, upload_id, parts).await,
            CompleteFault::LostResponse => {
                self.inner.complete_multipart(bucket, key, upload_id, parts).await?;
                Err(OssError::transient("connection closed before response"))
            }
            CompleteFault::FailBefore => Err(OssError::transient("connection refused")),
        }
    }

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &UploadId) -> OssResult<()> {
        self.inner.abort_multipart(bucket, key, upload_id).await
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        max_uploads: u32,
    ) -> OssResult<Vec<MultipartUploadInfo>> {
        self.inner.list_multipart_uploads(bucket, prefix, max_uploads).await
    }
}

/// Counts reads per offset
struct CountingSource {
    inner: BytesSource,
    reads: Mutex<HashMap<u64, u32>>,
}

impl CountingSource {
    fn new(data: Vec<u8>) -> Self {
        Self {
            inner: BytesSource::new(data),
            reads: Mutex::new(HashMap::new()),
        }
    }

    fn reads_at(&self, offset: u64) -> u32 {
        self.reads.lock().get(&offset).copied().unwrap_or(0)
    }
}

#[async_trait]
impl DataSource for CountingSource {
    fn len(&self) -> u64 {
        self.inner.len()
    }

    async fn read_range(&self, offset: u64, length: u64) -> OssResult<Bytes> {
        *self.reads.lock().entry(offset).or_default() += 1;
        self.inner.read_range(offset, length).await
    }
}

fn test_capabilities() -> StoreCapabilities {
    StoreCapabilities::s3_limits().with_part_limits(4, 1024, 10_000)
}

fn test_config() -> UploadConfig {
    UploadConfig::new()
        .with_min_part_size(4)
        .with_part_size(4)
        .with_multipart_threshold(8)
        .with_max_concurrent_parts(4)
        .with_retry(3, Duration::from_millis(1), Duration::from_millis(4))
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// L1. Listing 250 keys in pages of 100
#[tokio::test]
async fn test_listing_pages_of_one_hundred() {
    let store = Arc::new(FaultyStore::new());
    for i in 0..250 {
        store
            .put_object("bucket", &format!("data/{:03}", i), Bytes::from_static(b"x"), &ObjectMetadata::new())
            .await
            .unwrap();
    }
    let client = OssClient::from_shared(store, test_config()).unwrap();

    let mut lister = client.list_objects("bucket", "data/", None, 100);
    let mut sizes = Vec::new();
    let mut keys = Vec::new();
    while let Some(page) = lister.next_page().await.unwrap() {
        sizes.push(page.objects.len());
        keys.extend(page.keys().map(str::to_string));
    }

    assert_eq!(sizes, vec![100, 100, 50]);
    let expected: Vec<String> = (0..250).map(|i| format!("data/{:03}", i)).collect();
    assert_eq!(keys, expected);
}

/// L2. A saved marker resumes right after the last key seen
#[tokio::test]
async fn test_listing_resumes_from_marker() {
    let store = Arc::new(FaultyStore::new());
    for i in 0..250 {
        store
            .put_object("bucket", &format!("data/{:03}", i), Bytes::from_static(b"x"), &ObjectMetadata::new())
            .await
            .unwrap();
    }
    let client = OssClient::from_shared(store, test_config()).unwrap();

    let mut first = client.list_objects("bucket", "data/", None, 100);
    first.next_page().await.unwrap().unwrap();
    let marker = first.marker().to_string();
    assert!(!marker.is_empty());

    let (rest, _) = client
        .list_objects("bucket", "data/", None, 100)
        .resume_from(marker)
        .collect_all()
        .await
        .unwrap();
    assert_eq!(rest.len(), 150);
    assert_eq!(rest[0], "data/100");
}

/// L3. A delimiter rolls keys up into common prefixes
#[tokio::test]
async fn test_listing_with_delimiter() {
    let store = Arc::new(FaultyStore::new());
    for key in ["a/1", "a/2", "b", "c/x/y"] {
        store.put_object("bucket", key, Bytes::from_static(b"x"), &ObjectMetadata::new()).await.unwrap();
    }
    let client = OssClient::from_shared(store, test_config()).unwrap();

    let (keys, prefixes) = client.list_all_objects("bucket", "", Some("/")).await.unwrap();
    assert_eq!(keys, vec!["b".to_string()]);
    assert_eq!(prefixes, vec!["a/".to_string(), "c/".to_string()]);
}

/// L4. A failed page leaves the marker where it was
#[tokio::test]
async fn test_failed_page_keeps_marker() {
    let store = Arc::new(FaultyStore::new());
    for i in 0..250 {
        store
            .put_object("bucket", &format!("data/{:03}", i), Bytes::from_static(b"x"), &ObjectMetadata::new())
            .await
            .unwrap();
    }
    let client = OssClient::from_shared(store.clone(), test_config()).unwrap();

    let mut lister = client.list_objects("bucket", "data/", None, 100);
    lister.next_page().await.unwrap().unwrap();
    let marker = lister.marker().to_string();

    store.faults.lock().list_down = true;
    let err = lister.next_page().await.unwrap_err();
    assert!(matches!(err, OssError::BackendUnavailable { .. }));
    assert_eq!(lister.marker(), marker);
    assert!(!lister.is_exhausted());

    store.faults.lock().list_down = false;
    let (rest, _) = client
        .list_objects("bucket", "data/", None, 100)
        .resume_from(marker)
        .collect_all()
        .await
        .unwrap();
    assert_eq!(rest.len(), 150);
    assert_eq!(rest[0], "data/100");
    assert_eq!(rest[149], "data/249");
}

/// U1. Ten parts at concurrency four complete in ascending order
#[tokio::test]
async fn test_concurrent_parts_complete_in_order() {
    let store = Arc::new(FaultyStore::new().with_faults(|f| f.part_delay = Some(Duration::from_millis(20))));
    let client = OssClient::from_shared(store.clone(), test_config()).unwrap();
    let data = payload(40);

    let receipt = client
        .upload("bucket", "ten", Arc::new(BytesSource::new(data.clone())), &ObjectMetadata::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(receipt.method, UploadMethod::Multipart { parts: 10, part_size: 4, .. }));
    assert_eq!(*store.completed_order.lock(), (1..=10).collect::<Vec<u32>>());
    let peak = store.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 4, "peak concurrency {} exceeds the limit", peak);
    assert!(peak > 1, "parts never overlapped");

    let stored = client.get_object("bucket", "ten", None).await.unwrap();
    assert_eq!(stored.body.as_ref(), data.as_slice());
}

/// U2. Transient part failures are retried
#[tokio::test]
async fn test_transient_part_failure_is_retried() {
    let store = Arc::new(FaultyStore::new().with_faults(|f| {
        f.transient.insert(3, 2);
    }));
    let client = OssClient::from_shared(store.clone(), test_config()).unwrap();

    let receipt = client
        .upload("bucket", "retry", Arc::new(BytesSource::new(payload(20))), &ObjectMetadata::new(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(receipt.size_bytes, 20);
    assert_eq!(store.faults.lock().transient.get(&3), Some(&0));
}

/// U3. A checksum rejection re-reads the part from the source
#[tokio::test]
async fn test_integrity_mismatch_rereads_source() {
    let store = Arc::new(FaultyStore::new().with_faults(|f| {
        f.integrity.insert(2, 1);
    }));
    let client = OssClient::from_shared(store.clone(), test_config()).unwrap();
    let source = Arc::new(CountingSource::new(payload(12)));

    client
        .upload("bucket", "digest", source.clone(), &ObjectMetadata::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(source.reads_at(0), 1);
    assert_eq!(source.reads_at(4), 2);
    assert_eq!(source.reads_at(8), 1);
}

/// U4. Exhausted retries leave the upload open and resumable
#[tokio::test]
async fn test_failed_part_leaves_upload_resumable() {
    let store = Arc::new(FaultyStore::new().with_faults(|f| {
        f.transient.insert(2, 10);
    }));
    let client = OssClient::from_shared(store.clone(), test_config()).unwrap();
    let data = payload(16);

    let err = client
        .upload("bucket", "partial", Arc::new(BytesSource::new(data.clone())), &ObjectMetadata::new(), &CancellationToken::new())
        .await
        .unwrap_err();

    let (upload_id, completed) = match err {
        OssError::UploadIncomplete { upload_id, completed, missing, cancelled } => {
            assert_eq!(missing, vec![2]);
            assert!(!cancelled);
            (upload_id, completed)
        }
        other => panic!("expected UploadIncomplete, got {:?}", other),
    };
    assert_eq!(completed.len(), 3);
    assert_eq!(
        store.inner.pending_parts(&UploadId::from(upload_id.as_str())),
        Some(vec![1, 3, 4])
    );

    store.faults.lock().transient.clear();
    let session = client.resume_upload("bucket", "partial", UploadId::from(upload_id.as_str()), completed);
    assert_eq!(session.state(), UploadState::InProgress);

    let plan = client.plan_for(data.len() as u64).unwrap();
    let report = session
        .upload_all(&plan, Arc::new(BytesSource::new(data.clone())), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.uploaded, vec![2]);
    assert_eq!(report.skipped, vec![1, 3, 4]);

    session.complete().await.unwrap();
    let stored = client.get_object("bucket", "partial", None).await.unwrap();
    assert_eq!(stored.body.as_ref(), data.as_slice());
}

/// U5. Cancellation stops dispatch without aborting the upload
#[tokio::test]
async fn test_cancellation_keeps_uploaded_parts() {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let store = Arc::new(FaultyStore::new().with_faults(|f| f.cancel_after = Some((2, token))));
    let config = test_config().with_max_concurrent_parts(1);
    let client = OssClient::from_shared(store.clone(), config).unwrap();
    let data = payload(24);

    let err = client
        .upload("bucket", "cancelled", Arc::new(BytesSource::new(data.clone())), &ObjectMetadata::new(), &cancel)
        .await
        .unwrap_err();

    let (upload_id, completed) = match err {
        OssError::UploadIncomplete { upload_id, completed, missing, cancelled } => {
            assert!(cancelled);
            assert_eq!(missing, vec![3, 4, 5, 6]);
            (upload_id, completed)
        }
        other => panic!("expected UploadIncomplete, got {:?}", other),
    };

    let upload_id = UploadId::from(upload_id.as_str());
    assert_eq!(store.inner.pending_parts(&upload_id), Some(vec![1, 2]));
    assert!(!client.object_exists("bucket", "cancelled").await.unwrap());

    store.faults.lock().cancel_after = None;
    let session = client.resume_upload("bucket", "cancelled", upload_id, completed);
    let plan = client.plan_for(data.len() as u64).unwrap();
    let report = session
        .upload_all(&plan, Arc::new(BytesSource::new(data)), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.uploaded, vec![3, 4, 5, 6]);
    assert_eq!(session.complete().await.unwrap().size_bytes, 24);
}

/// U6. A part that outlives its timeout is retried
#[tokio::test]
async fn test_timed_out_part_is_retried() {
    let store = Arc::new(FaultyStore::new().with_faults(|f| {
        f.slow_once.insert(2, Duration::from_secs(5));
    }));
    let config = test_config().with_part_timeout(Duration::from_millis(50));
    let client = OssClient::from_shared(store.clone(), config).unwrap();
    let data = payload(12);

    let receipt = client
        .upload("bucket", "slow", Arc::new(BytesSource::new(data.clone())), &ObjectMetadata::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(receipt.method, UploadMethod::Multipart { parts: 3, .. }));
    assert!(store.faults.lock().slow_once.is_empty());
    let stored = client.get_object("bucket", "slow", None).await.unwrap();
    assert_eq!(stored.body.as_ref(), data.as_slice());
}

/// U7. A part that keeps failing is reported as an unavailable backend
#[tokio::test]
async fn test_exhausted_part_retries_report_unavailable() {
    let store = Arc::new(FaultyStore::new().with_faults(|f| {
        f.transient.insert(1, 10);
        f.integrity.insert(2, 10);
    }));
    let client = OssClient::from_shared(store.clone(), test_config()).unwrap();
    let session = client.begin_upload("bucket", "down", &ObjectMetadata::new()).await.unwrap();
    let source = BytesSource::new(payload(8));

    let err = session.upload_part(dog_oss::PartSpec::new(1, 0, 4), &source).await.unwrap_err();
    assert!(matches!(err, OssError::BackendUnavailable { .. }));
    assert_eq!(store.faults.lock().transient.get(&1), Some(&7));

    let err = session.upload_part(dog_oss::PartSpec::new(2, 4, 4), &source).await.unwrap_err();
    assert!(matches!(err, OssError::IntegrityMismatch { part_number: 2, .. }));
    assert!(session.completed_parts().is_empty());
}

async fn uploaded_session(store: &Arc<FaultyStore>) -> UploadSession {
    let client = OssClient::from_shared(store.clone(), test_config()).unwrap();
    let session = client.begin_upload("bucket", "final", &ObjectMetadata::new()).await.unwrap();
    let plan = client.plan_for(10).unwrap();
    let report = session
        .upload_all(&plan, Arc::new(BytesSource::new(payload(10))), &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.is_complete());
    session
}

/// C1. A lost completion response is recovered by checking the object
#[tokio::test]
async fn test_lost_completion_response_is_recovered() {
    let store = Arc::new(FaultyStore::new().with_faults(|f| f.complete = CompleteFault::LostResponse));
    let session = uploaded_session(&store).await;

    let receipt = session.complete().await.unwrap();
    assert!(matches!(receipt.method, UploadMethod::MultipartRecovered { parts: 3, .. }));
    assert_eq!(receipt.size_bytes, 10);
    assert!(matches!(session.state(), UploadState::Completed { .. }));
}

/// C2. A completion that never reached the backend keeps the session open
#[tokio::test]
async fn test_failed_completion_keeps_session_open() {
    let store = Arc::new(FaultyStore::new().with_faults(|f| f.complete = CompleteFault::FailBefore));
    let session = uploaded_session(&store).await;

    let err = session.complete().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(session.state(), UploadState::InProgress);

    store.faults.lock().complete = CompleteFault::None;
    assert_eq!(session.complete().await.unwrap().size_bytes, 10);
}

/// C3. When the follow-up check fails too, the outcome is reported as ambiguous
#[tokio::test]
async fn test_unverifiable_completion_is_ambiguous() {
    let store = Arc::new(FaultyStore::new().with_faults(|f| {
        f.complete = CompleteFault::LostResponse;
        f.head_fails = true;
    }));
    let session = uploaded_session(&store).await;

    let err = session.complete().await.unwrap_err();
    assert!(matches!(err, OssError::AmbiguousCompletion { .. }));
    assert_eq!(err.open_upload_id(), Some(session.upload_id().as_str()));
}

/// C4. An older object of the same size is not taken for the finished upload
#[tokio::test]
async fn test_older_object_of_same_size_is_not_recovery() {
    let store = Arc::new(FaultyStore::new());
    store
        .put_object("bucket", "final", Bytes::from(vec![0xAA; 10]), &ObjectMetadata::new())
        .await
        .unwrap();
    let session = uploaded_session(&store).await;
    store.faults.lock().complete = CompleteFault::FailBefore;

    let err = session.complete().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(session.state(), UploadState::InProgress);
    assert_eq!(store.inner.pending_parts(session.upload_id()), Some(vec![1, 2, 3]));

    store.faults.lock().complete = CompleteFault::None;
    let receipt = session.complete().await.unwrap();
    assert!(matches!(receipt.method, UploadMethod::Multipart { parts: 3, .. }));
    let stored = store.get_object("bucket", "final", None).await.unwrap();
    assert_eq!(stored.body.as_ref(), payload(10).as_slice());
}

/// F1. Objects under the threshold are stored with one put
#[tokio::test]
async fn test_threshold_selects_upload_method() {
    let store = Arc::new(FaultyStore::new());
    let client = OssClient::from_shared(store.clone(), test_config()).unwrap();

    let small = client
        .upload("bucket", "small", Arc::new(BytesSource::new(payload(7))), &ObjectMetadata::new(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(small.method, UploadMethod::Single);

    let large = client
        .upload("bucket", "large", Arc::new(BytesSource::new(payload(8))), &ObjectMetadata::new(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(large.method, UploadMethod::Multipart { parts: 2, .. }));
    assert!(store.completed_order.lock().len() == 2);
}

/// F2. Object operations pass through to the backend
#[tokio::test]
async fn test_object_operations_round_trip() {
    let store = Arc::new(FaultyStore::new());
    let client = OssClient::from_shared(store, test_config()).unwrap();
    let meta = ObjectMetadata::new()
        .with_content_type("text/plain")
        .with_user_metadata("owner", "ops");

    client.put_object("bucket", "a.txt", Bytes::from_static(b"hello world"), &meta).await.unwrap();

    let head = client.head_object("bucket", "a.txt").await.unwrap();
    assert_eq!(head.size_bytes, 11);
    assert_eq!(head.content_type.as_deref(), Some("text/plain"));
    assert_eq!(head.user_metadata.get("owner").map(String::as_str), Some("ops"));

    let ranged = client.get_object("bucket", "a.txt", Some(ByteRange::new(6, Some(10)))).await.unwrap();
    assert_eq!(ranged.body.as_ref(), b"world");

    client.copy_object("bucket", "a.txt", "bucket", "b.txt").await.unwrap();
    assert!(client.object_exists("bucket", "b.txt").await.unwrap());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("b.txt");
    assert_eq!(client.get_object_to_file("bucket", "b.txt", &path).await.unwrap(), 11);
    assert_eq!(std::fs::read(&path).unwrap(), b"hello world");

    let deleted = client
        .delete_objects("bucket", &["a.txt".to_string(), "b.txt".to_string()])
        .await
        .unwrap();
    assert_eq!(deleted.len(), 2);
    assert!(!client.object_exists("bucket", "a.txt").await.unwrap());
    assert!(matches!(
        client.get_object("bucket", "a.txt", None).await,
        Err(OssError::NotFound { .. })
    ));
}

/// F3. Aborting releases the parts held by the backend
#[tokio::test]
async fn test_abort_releases_parts() {
    let store = Arc::new(FaultyStore::new());
    let session = uploaded_session(&store).await;
    let upload_id = session.upload_id().clone();
    assert_eq!(store.inner.pending_parts(&upload_id), Some(vec![1, 2, 3]));

    session.abort().await.unwrap();
    assert!(store.inner.pending_parts(&upload_id).is_none());
    assert!(matches!(session.complete().await, Err(OssError::InvalidState { .. })));
}

/// F4. Files are uploaded through the same size policy
#[tokio::test]
async fn test_upload_file() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&payload(18)).unwrap();
    file.flush().unwrap();

    let store = Arc::new(FaultyStore::new());
    let client = OssClient::from_shared(store, test_config()).unwrap();
    let receipt = client
        .upload_file("bucket", "file", file.path(), &ObjectMetadata::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(receipt.is_multipart());
    let stored = client.get_object("bucket", "file", None).await.unwrap();
    assert_eq!(stored.body.as_ref(), payload(18).as_slice());
}

/// F5. A directory is uploaded under a prefix, skipping VCS folders
#[tokio::test]
async fn test_upload_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
    std::fs::write(dir.path().join("big.bin"), payload(18)).unwrap();
    std::fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
    std::fs::write(dir.path().join("nested/deeper/c.txt"), b"gamma").unwrap();
    std::fs::create_dir(dir.path().join(".git")).unwrap();
    std::fs::write(dir.path().join(".git/HEAD"), b"ref").unwrap();

    let store = Arc::new(FaultyStore::new());
    let client = OssClient::from_shared(store, test_config()).unwrap();
    let cancel = CancellationToken::new();

    let flat = client
        .upload_dir("bucket", "site/", dir.path(), false, &ObjectMetadata::new(), &cancel)
        .await
        .unwrap();
    assert!(flat.is_complete());
    let keys: Vec<&str> = flat.succeeded.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["site/a.txt", "site/big.bin"]);
    assert!(flat.succeeded[1].is_multipart());

    let deep = client
        .upload_dir("bucket", "tree", dir.path(), true, &ObjectMetadata::new(), &cancel)
        .await
        .unwrap();
    let keys: Vec<&str> = deep.succeeded.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["tree/a.txt", "tree/big.bin", "tree/nested/deeper/c.txt"]);

    let stored = client.get_object("bucket", "tree/nested/deeper/c.txt", None).await.unwrap();
    assert_eq!(stored.body.as_ref(), b"gamma");
    assert!(!client.object_exists("bucket", "tree/.git/HEAD").await.unwrap());
}

/// F6. One failing file does not stop the rest of the directory
#[tokio::test]
async fn test_upload_dir_reports_failed_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
    std::fs::write(dir.path().join("b.bin"), payload(12)).unwrap();

    // Only b.bin is large enough to upload part 2
    let store = Arc::new(FaultyStore::new().with_faults(|f| {
        f.integrity.insert(2, 10);
    }));
    let client = OssClient::from_shared(store, test_config()).unwrap();

    let report = client
        .upload_dir("bucket", "", dir.path(), false, &ObjectMetadata::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].key, "a.txt");
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "b.bin");
    assert!(matches!(report.failed[0].1, OssError::UploadIncomplete { .. }));
}
