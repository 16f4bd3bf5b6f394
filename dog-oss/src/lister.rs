use std::sync::Arc;

use futures::Stream;
use tracing::{debug, instrument};

use crate::retry::with_retries;
use crate::store::ObjectStore;
use crate::{ListRequest, ListingPage, OssResult, UploadConfig};

/// Lazy, resumable walk over the pages of an object listing.
///
/// The lister only advances its marker after a page was fetched
/// successfully, so after an error `marker()` still points at the last good
/// position and listing can be resumed from it.
pub struct ObjectLister {
    store: Arc<dyn ObjectStore>,
    config: UploadConfig,
    bucket: String,
    prefix: String,
    delimiter: Option<String>,
    page_size: u32,
    marker: String,
    exhausted: bool,
}

impl ObjectLister {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        config: UploadConfig,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        delimiter: Option<String>,
        page_size: u32,
    ) -> Self {
        Self {
            store,
            config,
            bucket: bucket.into(),
            prefix: prefix.into(),
            delimiter,
            page_size,
            marker: String::new(),
            exhausted: false,
        }
    }

    /// Continue from a marker saved from an earlier listing
    pub fn resume_from(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self.exhausted = false;
        self
    }

    /// Marker of the next page to fetch; empty before the first page
    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch the next page, or `None` once the last page has been returned
    #[instrument(skip(self), fields(bucket = %self.bucket, prefix = %self.prefix, marker = %self.marker))]
    pub async fn next_page(&mut self) -> OssResult<Option<ListingPage>> {
        if self.exhausted {
            return Ok(None);
        }

        let request = ListRequest {
            prefix: self.prefix.clone(),
            delimiter: self.delimiter.clone(),
            marker: self.marker.clone(),
            max_keys: self.page_size,
        };
        let store = &self.store;
        let bucket = &self.bucket;
        let page = with_retries(&self.config, "list_objects", || {
            store.list_objects_page(bucket, &request)
        })
        .await?;

        // An empty marker on a non-final page would restart the listing
        if page.is_last || page.continuation_marker.is_empty() {
            self.exhausted = true;
        } else {
            self.marker = page.continuation_marker.clone();
        }

        debug!(
            objects = page.objects.len(),
            prefixes = page.common_prefixes.len(),
            last = self.exhausted,
            "listing page fetched"
        );
        Ok(Some(page))
    }

    /// Drain the remaining pages into one list of object keys and one of common prefixes
    pub async fn collect_all(mut self) -> OssResult<(Vec<String>, Vec<String>)> {
        let mut keys = Vec::new();
        let mut prefixes = Vec::new();
        while let Some(page) = self.next_page().await? {
            keys.extend(page.objects.into_iter().map(|o| o.key));
            prefixes.extend(page.common_prefixes);
        }
        Ok((keys, prefixes))
    }

    /// Pages as a stream; ends after the last page or the first error
    pub fn into_stream(self) -> impl Stream<Item = OssResult<ListingPage>> {
        let mut lister = self;
        async_stream::stream! {
            loop {
                match lister.next_page().await {
                    Ok(Some(page)) => yield Ok(page),
                    Ok(None) => break,
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        }
    }
}
