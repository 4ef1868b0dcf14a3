//! Incremental, UI-driven page accumulation.

use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::pagination::PaginationAccumulator;
use crate::client::RequestConfig;
use crate::error::FetchError;

/// Progress of an infinite-scroll listing.
#[derive(Debug, Clone, PartialEq)]
pub struct InfiniteScrollState<T> {
  pub accumulated: Vec<T>,
  /// Last page successfully requested (0 before the first load)
  pub current_page: u32,
  pub has_more: bool,
  pub loading: bool,
}

impl<T> Default for InfiniteScrollState<T> {
  fn default() -> Self {
    Self {
      accumulated: Vec::new(),
      current_page: 0,
      has_more: true,
      loading: false,
    }
  }
}

struct Tracker<T> {
  state: InfiniteScrollState<T>,
  /// Bumped by `reset`, so loads started before it are dropped on arrival
  epoch: u64,
}

/// Puts the tracker back to idle if `load_more` is dropped mid-fetch.
struct PendingLoad<'a, T> {
  tracker: &'a Mutex<Tracker<T>>,
  epoch: u64,
  settled: bool,
}

impl<T> Drop for PendingLoad<'_, T> {
  fn drop(&mut self) {
    if self.settled {
      return;
    }
    let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
    if tracker.epoch == self.epoch {
      tracker.state.loading = false;
      tracker.state.current_page -= 1;
    }
  }
}

/// Appends one page per [`load_more`](Self::load_more) call until a short
/// page signals the end of the listing.
pub struct InfiniteScrollAccumulator<T> {
  pages: Arc<PaginationAccumulator<T>>,
  resource: String,
  config: RequestConfig,
  tracker: Mutex<Tracker<T>>,
}

impl<T> InfiniteScrollAccumulator<T>
where
  T: DeserializeOwned + Clone,
{
  pub fn new(
    pages: Arc<PaginationAccumulator<T>>,
    resource: impl Into<String>,
    config: RequestConfig,
  ) -> Self {
    Self {
      pages,
      resource: resource.into(),
      config,
      tracker: Mutex::new(Tracker {
        state: InfiniteScrollState::default(),
        epoch: 0,
      }),
    }
  }

  fn tracker(&self) -> MutexGuard<'_, Tracker<T>> {
    self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Copy of the current state.
  pub fn state(&self) -> InfiniteScrollState<T> {
    self.tracker().state.clone()
  }

  /// Fetch the next page and append it.
  ///
  /// While a load is running, or once the listing is exhausted, this returns
  /// the accumulated items unchanged without fetching. A failed or dropped
  /// load leaves the page counter where it was so the next call retries the
  /// same page.
  pub async fn load_more(&self) -> Result<Vec<T>, FetchError> {
    let (page, epoch) = {
      let mut tracker = self.tracker();
      if tracker.state.loading || !tracker.state.has_more {
        return Ok(tracker.state.accumulated.clone());
      }
      tracker.state.loading = true;
      tracker.state.current_page += 1;
      (tracker.state.current_page, tracker.epoch)
    };
    let mut pending = PendingLoad {
      tracker: &self.tracker,
      epoch,
      settled: false,
    };

    let result = self
      .pages
      .load_page(&self.resource, page, &self.config)
      .await;
    pending.settled = true;

    let mut tracker = self.tracker();
    if tracker.epoch != epoch {
      debug!(resource = %self.resource, page, "Dropping page loaded before reset");
      return Ok(tracker.state.accumulated.clone());
    }

    let state = &mut tracker.state;
    state.loading = false;
    match result {
      Ok(loaded) => {
        state.has_more = loaded.data.len() == self.pages.page_size() as usize;
        state.accumulated.extend(loaded.data);
        Ok(state.accumulated.clone())
      }
      Err(e) => {
        state.current_page -= 1;
        Err(e)
      }
    }
  }

  /// Return to the initial state. Safe while a load is running.
  pub fn reset(&self) {
    let mut tracker = self.tracker();
    tracker.state = InfiniteScrollState::default();
    tracker.epoch += 1;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::client::testing::{coordinator, query_param, MockReply, MockTransport};
  use crate::paging::fixtures::listing;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::time::Duration;

  fn scroller(mock: Arc<MockTransport>, page_size: u32) -> InfiniteScrollAccumulator<u64> {
    let pages = Arc::new(PaginationAccumulator::new(coordinator(mock), page_size));
    InfiniteScrollAccumulator::new(pages, "/jobs", RequestConfig::new())
  }

  #[tokio::test]
  async fn test_initial_state() {
    let scroll = scroller(MockTransport::new(listing(45)), 20);
    assert_eq!(scroll.state(), InfiniteScrollState::default());
    assert!(scroll.state().has_more);
  }

  #[tokio::test]
  async fn test_load_more_appends_pages_until_short_page() {
    let mock = MockTransport::new(listing(45));
    let scroll = scroller(mock.clone(), 20);

    assert_eq!(scroll.load_more().await.unwrap().len(), 20);
    assert_eq!(scroll.load_more().await.unwrap().len(), 40);
    assert!(scroll.state().has_more);

    let items = scroll.load_more().await.unwrap();
    assert_eq!(items, (0..45).collect::<Vec<_>>());

    let state = scroll.state();
    assert_eq!(state.current_page, 3);
    assert!(!state.has_more);
    assert!(!state.loading);

    // Exhausted: no more fetches, same items back
    let again = scroll.load_more().await.unwrap();
    assert_eq!(again, items);
    assert_eq!(scroll.state().current_page, 3);
    assert_eq!(mock.call_count(), 3);
  }

  #[tokio::test]
  async fn test_concurrent_load_more_fetches_once() {
    let mock = MockTransport::new(|url| {
      let reply = listing(45)(url);
      reply.after(Duration::from_millis(30))
    });
    let scroll = scroller(mock.clone(), 20);

    let (first, second) = tokio::join!(scroll.load_more(), scroll.load_more());

    assert_eq!(first.unwrap().len(), 20);
    // Second call saw the load in progress and returned what was there
    assert!(second.unwrap().is_empty());
    assert_eq!(mock.call_count(), 1);
    assert_eq!(scroll.state().current_page, 1);
  }

  #[tokio::test]
  async fn test_failed_load_returns_to_idle_and_retries_same_page() {
    let fail_next = Arc::new(AtomicBool::new(true));
    let flag = fail_next.clone();
    let healthy = listing(45);
    let mock = MockTransport::new(move |url| {
      if flag.swap(false, Ordering::SeqCst) {
        MockReply::status(500, "Internal Server Error")
      } else {
        healthy(url)
      }
    });
    let scroll = scroller(mock.clone(), 20);

    let err = scroll.load_more().await.unwrap_err();
    assert_eq!(err.status(), Some(500));

    let state = scroll.state();
    assert!(!state.loading);
    assert_eq!(state.current_page, 0);
    assert!(state.accumulated.is_empty());

    assert_eq!(scroll.load_more().await.unwrap().len(), 20);
    let calls = mock.calls();
    assert_eq!(query_param(&calls[1], "page").as_deref(), Some("1"));
  }

  #[tokio::test]
  async fn test_dropped_load_more_returns_to_idle() {
    let mock = MockTransport::new(|url| listing(45)(url).after(Duration::from_millis(30)));
    let scroll = scroller(mock.clone(), 20);

    let abandoned = tokio::time::timeout(Duration::from_millis(10), scroll.load_more()).await;
    assert!(abandoned.is_err());

    let state = scroll.state();
    assert!(!state.loading);
    assert_eq!(state.current_page, 0);
    assert!(state.accumulated.is_empty());

    assert_eq!(scroll.load_more().await.unwrap().len(), 20);
    assert_eq!(scroll.state().current_page, 1);
    // The abandoned fetch was joined, not repeated
    assert_eq!(mock.call_count(), 1);
  }

  #[tokio::test]
  async fn test_reset_restores_initial_state() {
    let scroll = scroller(MockTransport::new(listing(45)), 20);
    scroll.load_more().await.unwrap();
    scroll.load_more().await.unwrap();

    scroll.reset();

    assert_eq!(scroll.state(), InfiniteScrollState::default());
    assert_eq!(scroll.load_more().await.unwrap().len(), 20);
    assert_eq!(scroll.state().current_page, 1);
  }

  #[tokio::test]
  async fn test_reset_during_load_discards_late_page() {
    let mock = MockTransport::new(|url| listing(45)(url).after(Duration::from_millis(30)));
    let scroll = scroller(mock, 20);

    let load = async { scroll.load_more().await };
    let interrupt = async {
      tokio::time::sleep(Duration::from_millis(10)).await;
      scroll.reset();
    };
    let (loaded, ()) = tokio::join!(load, interrupt);

    assert!(loaded.unwrap().is_empty());
    assert_eq!(scroll.state(), InfiniteScrollState::default());
  }
}
