use std::time::Duration;

use crate::{OssError, OssResult};

const MIB: u64 = 1024 * 1024;

/// Configuration for uploads
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Standard part size (bytes) used when planning multipart uploads
    pub part_size: u64,

    /// Smallest part the backend accepts for all but the final part
    pub min_part_size: u64,

    /// Largest part the backend accepts
    pub max_part_size: u64,

    /// Upper bound on the number of parts in one upload
    pub max_parts: u32,

    /// Objects smaller than this are uploaded with a single put
    pub multipart_threshold_bytes: u64,

    /// Parts uploaded in parallel by `UploadSession::upload_all`
    pub max_concurrent_parts: usize,

    /// Attempts per part before the failure is surfaced (1 = no retry)
    pub max_part_attempts: u32,

    pub base_retry_backoff: Duration,
    pub max_retry_backoff: Duration,

    /// Independent timeout for each part attempt
    pub part_timeout: Duration,

    /// Send a Content-MD5 with every part for server-side verification
    pub verify_checksums: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size: 10 * MIB,
            min_part_size: 5 * MIB,
            max_part_size: 5 * 1024 * MIB, // 5GB
            max_parts: 10_000,
            multipart_threshold_bytes: 100 * MIB,
            max_concurrent_parts: 4,
            max_part_attempts: 3,
            base_retry_backoff: Duration::from_millis(200),
            max_retry_backoff: Duration::from_secs(10),
            part_timeout: Duration::from_secs(120),
            verify_checksums: true,
        }
    }
}

impl UploadConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_part_size(mut self, bytes: u64) -> Self {
        self.part_size = bytes;
        self
    }

    /// Set the backend's minimum part size
    pub fn with_min_part_size(mut self, bytes: u64) -> Self {
        self.min_part_size = bytes;
        self
    }

    pub fn with_max_part_size(mut self, bytes: u64) -> Self {
        self.max_part_size = bytes;
        self
    }

    pub fn with_max_parts(mut self, max: u32) -> Self {
        self.max_parts = max;
        self
    }

    /// Set multipart threshold
    pub fn with_multipart_threshold(mut self, bytes: u64) -> Self {
        self.multipart_threshold_bytes = bytes;
        self
    }

    pub fn with_max_concurrent_parts(mut self, parts: usize) -> Self {
        self.max_concurrent_parts = parts;
        self
    }

    /// Set retry policy for individual parts
    pub fn with_retry(mut self, max_attempts: u32, base_backoff: Duration, max_backoff: Duration) -> Self {
        self.max_part_attempts = max_attempts;
        self.base_retry_backoff = base_backoff;
        self.max_retry_backoff = max_backoff;
        self
    }

    pub fn with_part_timeout(mut self, timeout: Duration) -> Self {
        self.part_timeout = timeout;
        self
    }

    /// Disable Content-MD5 on parts
    pub fn without_checksums(mut self) -> Self {
        self.verify_checksums = false;
        self
    }

    /// Check the limits against each other
    pub fn validate(&self) -> OssResult<()> {
        if self.min_part_size == 0 || self.min_part_size > self.max_part_size {
            return Err(OssError::invalid(format!(
                "min_part_size {} must be in 1..={}",
                self.min_part_size, self.max_part_size
            )));
        }
        if self.part_size < self.min_part_size || self.part_size > self.max_part_size {
            return Err(OssError::invalid_part_size(
                self.part_size,
                format!("must be in {}..={}", self.min_part_size, self.max_part_size),
            ));
        }
        if self.max_parts == 0 {
            return Err(OssError::invalid("max_parts must be at least 1"));
        }
        if self.max_concurrent_parts == 0 {
            return Err(OssError::invalid("max_concurrent_parts must be at least 1"));
        }
        if self.max_part_attempts == 0 {
            return Err(OssError::invalid("max_part_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Backoff before retry number `attempt` (1-based), capped at `max_retry_backoff`
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(
            self.base_retry_backoff.saturating_mul(factor),
            self.max_retry_backoff,
        )
    }
}
