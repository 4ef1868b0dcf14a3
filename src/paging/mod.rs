//! Multi-page retrieval built on the request coordinator.

mod infinite;
mod pagination;

use serde::{Deserialize, Serialize};

pub use infinite::{InfiniteScrollAccumulator, InfiniteScrollState};
pub use pagination::PaginationAccumulator;

/// One page of an upstream listing, or several pages merged.
///
/// `total` is the size of the whole listing, not of `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
  pub data: Vec<T>,
  pub total: u64,
}

#[cfg(test)]
pub(crate) mod fixtures {
  use serde_json::json;
  use std::time::Duration;
  use url::Url;

  use crate::client::testing::{query_param, MockReply};

  /// Answer `page`/`limit` queries from a listing of `total` numbered items.
  ///
  /// Later pages answer faster, so completion order is the reverse of page order.
  pub(crate) fn listing(total: u64) -> impl Fn(&Url) -> MockReply + Send + Sync + 'static {
    move |url: &Url| {
      let page: u64 = query_param(url, "page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(1);
      let limit: u64 = query_param(url, "limit")
        .and_then(|l| l.parse().ok())
        .unwrap_or(20);

      let start = (page - 1) * limit;
      let end = (start + limit).min(total);
      let data: Vec<u64> = (start..end.max(start)).collect();

      let delay = Duration::from_millis(40u64.saturating_sub(page * 10));
      MockReply::json(json!({ "data": data, "total": total })).after(delay)
    }
  }
}
