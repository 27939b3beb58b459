//! Size-adaptive offset paging.
//!
//! Index nodes enforce a response-size limit that depends on load and is not
//! published. Pages are requested at the configured ceiling; when a page
//! request fails with a retryable error the page size is halved and the rest
//! of the sequence continues at the smaller size. The error is surfaced only
//! once the page size would drop below one record.

use std::future::Future;

use tracing::{debug, warn};

use esgf_core::{Record, Result};

/// Fetch records `[start, end)` in pages of at most `ceiling` records.
///
/// `fetch(offset, limit)` performs one page request.
pub async fn collect_pages<F, Fut>(
    start: u64,
    end: u64,
    ceiling: u64,
    mut fetch: F,
) -> Result<Vec<Record>>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = Result<Vec<Record>>>,
{
    let mut records = Vec::new();
    let mut page_size = ceiling.max(1);
    let mut offset = start;

    while offset < end {
        let limit = page_size.min(end - offset);
        match fetch(offset, limit).await {
            Ok(page) => {
                let received = page.len() as u64;
                debug!(offset, limit, received, "page fetched");
                records.extend(page);
                if received == 0 {
                    // The index shrank since it was counted.
                    break;
                }
                offset += received;
            }
            Err(err) if err.is_retryable() && page_size > 1 => {
                page_size /= 2;
                warn!(offset, page_size, error = %err, "page request failed, shrinking page size");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(records)
}

/// Number of page requests needed for `total` records at `ceiling` per page.
pub fn page_count(total: u64, ceiling: u64) -> u64 {
    total.div_ceil(ceiling.max(1))
}
