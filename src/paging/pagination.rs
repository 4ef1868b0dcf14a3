//! Page-at-a-time and all-pages loading.

use futures::future::join_all;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::PageResult;
use crate::client::{RequestConfig, RequestCoordinator};
use crate::error::FetchError;

/// Most pages `load_all_pages` will request for one listing.
const MAX_PAGES: u32 = 10_000;

/// Loads pages of a listing through the coordinator.
///
/// Pages are also kept per `(resource, page)` for the lifetime of the
/// accumulator, independent of the coordinator's TTL.
pub struct PaginationAccumulator<T> {
  coordinator: RequestCoordinator,
  page_size: u32,
  pages: Mutex<HashMap<(String, u32), PageResult<T>>>,
}

impl<T> PaginationAccumulator<T>
where
  T: DeserializeOwned + Clone,
{
  pub fn new(coordinator: RequestCoordinator, page_size: u32) -> Self {
    Self {
      coordinator,
      page_size: page_size.max(1),
      pages: Mutex::new(HashMap::new()),
    }
  }

  pub fn page_size(&self) -> u32 {
    self.page_size
  }

  fn pages(&self) -> MutexGuard<'_, HashMap<(String, u32), PageResult<T>>> {
    self.pages.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Load one page (1-based), adding `page` and `limit` to the query.
  pub async fn load_page(
    &self,
    resource: &str,
    page: u32,
    config: &RequestConfig,
  ) -> Result<PageResult<T>, FetchError> {
    let cache_key = (resource.to_string(), page);
    let cached = self.pages().get(&cache_key).cloned();
    if let Some(hit) = cached {
      return Ok(hit);
    }

    let config = config
      .clone()
      .param("page", page)
      .param("limit", self.page_size);
    let result: PageResult<T> = self.coordinator.load_as(resource, &config).await?;

    self.pages().insert(cache_key, result.clone());
    Ok(result)
  }

  /// Load every page and concatenate them in page order.
  ///
  /// Page 1 determines the page count; the remaining pages are fetched
  /// concurrently. All of them run to completion even if one fails, and
  /// the first failure in page order is returned.
  pub async fn load_all_pages(
    &self,
    resource: &str,
    config: &RequestConfig,
  ) -> Result<PageResult<T>, FetchError> {
    let first = self.load_page(resource, 1, config).await?;
    let page_count = u32::try_from(first.total.div_ceil(u64::from(self.page_size)))
      .ok()
      .filter(|&count| count <= MAX_PAGES)
      .ok_or_else(|| {
        FetchError::Decode(format!(
          "listing total {} needs more than {} pages of {}",
          first.total, MAX_PAGES, self.page_size
        ))
      })?;

    if page_count <= 1 {
      return Ok(first);
    }

    debug!(resource, page_count, "Loading remaining pages");
    let remaining =
      join_all((2..=page_count).map(|page| self.load_page(resource, page, config))).await;

    let total = first.total;
    let mut data = first.data;
    for page in remaining {
      data.extend(page?.data);
    }

    Ok(PageResult { data, total })
  }

  /// Forget every page loaded so far.
  pub fn clear_cache(&self) {
    self.pages().clear();
  }
}
