use std::future::Future;

use tracing::warn;

use crate::{OssError, OssResult, UploadConfig};

/// Run a backend call, retrying retryable failures with exponential backoff.
///
/// Once `max_part_attempts` is used up a retryable failure is reported as
/// `BackendUnavailable`; other errors are returned unchanged.
pub(crate) async fn with_retries<T, F, Fut>(config: &UploadConfig, operation: &str, mut call: F) -> OssResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = OssResult<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call().await {
            Err(err) if err.is_retryable() && attempt < config.max_part_attempts => {
                let backoff = config.retry_backoff(attempt);
                warn!(operation, attempt, error = %err, ?backoff, "retrying backend call");
                tokio::time::sleep(backoff).await;
            }
            Err(err) if err.is_retryable() => {
                return Err(OssError::unavailable(format!(
                    "{} failed after {} attempts: {}",
                    operation, attempt, err
                )));
            }
            other => return other,
        }
    }
}
