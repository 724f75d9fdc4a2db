/*
 * Object Listing
 *
 * Paginated enumeration of a table's objects. The `ObjectLister` trait is
 * the seam to the object store; `list_table_objects` drives it page by page
 * with retries and cancellation.
 */

use async_trait::async_trait;
use futures::TryStreamExt;
use lakeaudit_common::{
    AuditError, AuditMetrics, OperatorRegistry, Result, RetryBuilder, RetryConfig,
    StorageObject, TableDescriptor,
};
use opendal::{Capability, Entry, Operator};
use std::sync::Arc;
use tracing::debug;

use crate::cancel::CancelSignal;

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub objects: Vec<StorageObject>,
    /// Key to resume after; `None` on the last page
    pub next_start_after: Option<String>,
}

/// Lists objects under a prefix, one page per call.
#[async_trait]
pub trait ObjectLister: Send + Sync {
    /// Returns the page of objects under `prefix` whose keys sort after `start_after`.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        start_after: Option<&str>,
    ) -> Result<ListPage>;
}

/// Object lister backed by opendal operators.
///
/// Backends that support start-after listing (S3 and compatibles) are paged;
/// others are returned as a single page.
pub struct OpendalLister {
    operators: Arc<OperatorRegistry>,
    page_size: usize,
}

impl OpendalLister {
    pub fn new(operators: Arc<OperatorRegistry>, page_size: usize) -> Self {
        Self {
            operators,
            page_size: page_size.max(1),
        }
    }

    async fn to_object(op: &Operator, capability: &Capability, entry: Entry) -> Result<StorageObject> {
        let (path, metadata) = entry.into_parts();
        let metadata = if capability.list_has_content_length {
            metadata
        } else {
            op.stat(&path).await?
        };

        let mut object = StorageObject::new(path, metadata.content_length());
        if let Some(last_modified) = metadata.last_modified() {
            object = object.with_last_modified(last_modified);
        }
        Ok(object)
    }
}

#[async_trait]
impl ObjectLister for OpendalLister {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        start_after: Option<&str>,
    ) -> Result<ListPage> {
        let op = self.operators.operator(bucket)?;
        let capability = op.info().full_capability();
        let paged = capability.list_with_start_after;

        let mut request = op.lister_with(prefix).recursive(true);
        if let (true, Some(key)) = (paged, start_after) {
            request = request.start_after(key);
        }
        let mut lister = request.await?;

        let mut objects = Vec::new();
        while let Some(entry) = lister.try_next().await? {
            if !entry.metadata().is_file() {
                continue;
            }
            objects.push(Self::to_object(&op, &capability, entry).await?);
            if paged && objects.len() >= self.page_size {
                break;
            }
        }

        let next_start_after = if paged && objects.len() >= self.page_size {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_start_after,
        })
    }
}

/// Lists every object under a table's prefix.
///
/// Each page is retried on transient failures. Cancellation is checked
/// between pages and raced against the page in flight.
pub async fn list_table_objects(
    lister: &dyn ObjectLister,
    table: &TableDescriptor,
    retry: &RetryConfig,
    metrics: &AuditMetrics,
    cancel: &CancelSignal,
) -> Result<Vec<StorageObject>> {
    let prefix = table.listing_prefix();
    let mut objects = Vec::new();
    let mut start_after: Option<String> = None;

    loop {
        if cancel.is_cancelled() {
            return Err(AuditError::Cancelled);
        }

        let fetch = RetryBuilder::new(retry)
            .operation(format!("list {}", table))
            .observe(metrics)
            .run(|| lister.list_page(table.bucket(), &prefix, start_after.as_deref()));

        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuditError::Cancelled),
            page = fetch => page?,
        };

        metrics.record_page(page.objects.len());
        debug!(
            table = %table,
            objects = page.objects.len(),
            more = page.next_start_after.is_some(),
            "Fetched listing page"
        );
        objects.extend(page.objects);

        match page.next_start_after {
            Some(next) if start_after.as_deref() == Some(next.as_str()) => {
                return Err(AuditError::Listing(format!(
                    "Listing for {} did not advance past '{}'",
                    table, next
                )));
            }
            Some(next) => start_after = Some(next),
            None => break,
        }
    }

    Ok(objects)
}
