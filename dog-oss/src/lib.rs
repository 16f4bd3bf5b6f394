//! # dog-oss: Multipart uploads and paginated listing for object storage
//!
//! `dog-oss` sits in front of an S3-compatible object store (Aliyun OSS,
//! AWS S3, MinIO, RustFS) and takes care of the parts of object handling
//! that are easy to get wrong: splitting large objects into parts, uploading
//! them concurrently with retries and checksums, finalizing or abandoning the
//! upload, and walking large listings page by page.
//!
//! ## Key Features
//!
//! - **Planned multipart uploads**: contiguous, gap-free parts within backend limits
//! - **Bounded concurrency**: at most `max_concurrent_parts` parts in flight
//! - **Retries with backoff**: transient failures are retried, checksum mismatches re-read the source
//! - **Resumable**: sessions record their parts and can be rebuilt from an upload id
//! - **Cancellable**: cancellation stops new parts and leaves the upload open
//! - **Resumable listings**: marker-based pagination as pages or a stream
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dog_oss::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> OssResult<()> {
//! let store = S3CompatibleStore::from_env().await?;
//! let client = OssClient::new(store, UploadConfig::default())?;
//!
//! let source = FileSource::open("backup.tar").await?;
//! let receipt = client
//!     .upload("archive", "2024/backup.tar", Arc::new(source), &ObjectMetadata::new(), &CancellationToken::new())
//!     .await?;
//! println!("stored {} bytes as {}", receipt.size_bytes, receipt.key);
//!
//! let (keys, _) = client.list_all_objects("archive", "2024/", None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────┐
//! │         OssClient          │  ← size policy, object operations
//! ├──────────────┬─────────────┤
//! │ UploadSession│ ObjectLister│  ← multipart lifecycle / pagination
//! ├──────────────┤             │
//! │ PartUploader │             │  ← one part: read, checksum, retry
//! ├──────────────┴─────────────┤
//! │    MultipartObjectStore    │  ← backend primitives (S3, memory)
//! └────────────────────────────┘
//! ```

mod client;
mod config;
mod error;
mod lister;
mod memory;
mod planner;
mod receipt;
mod retry;
mod s3_store;
mod session;
mod source;
pub mod store;
mod types;
mod uploader;

// Re-export main types for clean API
pub use client::OssClient;
pub use config::UploadConfig;
pub use error::{OssError, OssResult};
pub use lister::ObjectLister;
pub use memory::MemoryObjectStore;
pub use planner::PartPlanner;
pub use receipt::{DirUploadReport, UploadMethod, UploadReceipt};
pub use s3_store::{S3CompatibleStore, S3Config};
pub use session::{PartFailure, UploadCheckpoint, UploadReport, UploadSession};
pub use source::{BytesSource, DataSource, FileSource};
pub use store::{
    CompletedPart, GetResult, MultipartObjectStore, ObjectHead, ObjectStore, PartETag, PutResult,
    StoreCapabilities, UploadPartRequest,
};
pub use types::{
    BucketInfo, ByteRange, ListRequest, ListingPage, MultipartUploadInfo, ObjectMetadata, ObjectSummary,
    PartResult, PartSpec, UploadId, UploadPlan, UploadState, UploadTarget,
};
pub use uploader::{content_md5, PartUploader};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BytesSource, DataSource, FileSource, MultipartObjectStore, ObjectLister, ObjectMetadata,
        ObjectStore, OssClient, OssError, OssResult, S3CompatibleStore, UploadConfig,
        UploadCheckpoint, UploadReceipt, UploadSession,
    };
}
