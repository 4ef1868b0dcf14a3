//! Request coordinator: response caching, in-flight deduplication and a
//! concurrency ceiling on outbound calls.

use chrono::Duration as CacheDuration;
use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use super::key::{QueryParams, RequestKey};
use super::transport::{Request, Transport};
use crate::cache::ResponseCache;
use crate::error::FetchError;

/// Limits and defaults for a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
  /// How long a cached response is served
  pub cache_ttl: CacheDuration,
  /// Maximum number of cached responses
  pub max_cache_size: usize,
  /// Maximum number of simultaneously outstanding network calls
  pub concurrent_limit: usize,
  /// Timeout applied to each network call unless the request overrides it
  pub request_timeout: Duration,
  /// Base that relative resources are joined onto
  pub base_url: Option<Url>,
  /// Headers sent with every request
  pub default_headers: Vec<(String, String)>,
}

impl Default for CoordinatorConfig {
  fn default() -> Self {
    Self {
      cache_ttl: CacheDuration::minutes(5),
      max_cache_size: 100,
      concurrent_limit: 3,
      request_timeout: Duration::from_secs(10),
      base_url: None,
      default_headers: Vec::new(),
    }
  }
}

/// Per-call options for [`RequestCoordinator::load`].
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
  pub params: QueryParams,
  pub method: Method,
  pub headers: Vec<(String, String)>,
  pub body: Option<Value>,
  /// Overrides the coordinator's request timeout
  pub timeout: Option<Duration>,
}

impl RequestConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
    self.params.insert(name.into(), value.to_string());
    self
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  pub fn body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorStats {
  pub cached_entries: usize,
  pub in_flight: usize,
  pub active_requests: usize,
}

type SharedLoad = Shared<BoxFuture<'static, Result<Value, FetchError>>>;

struct State {
  cache: ResponseCache<Value>,
  in_flight: HashMap<String, SharedLoad>,
  /// Bumped by `invalidate`; results from older generations are not kept
  generation: u64,
}

struct Inner {
  transport: Arc<dyn Transport>,
  state: Mutex<State>,
  limiter: Semaphore,
  active: AtomicUsize,
  config: CoordinatorConfig,
}

/// Cached, deduplicating, concurrency-limited loader.
///
/// Cloning is cheap and every clone shares the same caches and limits.
#[derive(Clone)]
pub struct RequestCoordinator {
  inner: Arc<Inner>,
}

impl RequestCoordinator {
  pub fn new(transport: Arc<dyn Transport>, config: CoordinatorConfig) -> Self {
    let concurrent_limit = config.concurrent_limit.max(1);
    let state = State {
      cache: ResponseCache::new(config.cache_ttl, config.max_cache_size),
      in_flight: HashMap::new(),
      generation: 0,
    };

    Self {
      inner: Arc::new(Inner {
        transport,
        state: Mutex::new(state),
        limiter: Semaphore::new(concurrent_limit),
        active: AtomicUsize::new(0),
        config,
      }),
    }
  }

  pub fn config(&self) -> &CoordinatorConfig {
    &self.inner.config
  }

  /// Load a resource as JSON.
  ///
  /// 1. Fresh cached response: returned without touching the network
  /// 2. Expired cached response: evicted
  /// 3. Identical request already in flight: its result is shared
  /// 4. Otherwise: dispatched under the concurrency ceiling and cached on success
  pub async fn load(&self, resource: &str, config: &RequestConfig) -> Result<Value, FetchError> {
    let key = RequestKey::new(resource, &config.params);

    let pending = {
      let mut state = self.inner.state();

      if let Some(value) = state.cache.get(key.cache_hash()) {
        debug!(key = %key, "Response cache hit");
        return Ok(value);
      }

      if let Some(pending) = state.in_flight.get(key.cache_hash()) {
        debug!(key = %key, "Joining in-flight request");
        pending.clone()
      } else {
        let request = self.inner.build_request(resource, config)?;
        debug!(key = %key, "Response cache miss");
        let task = tokio::spawn(Arc::clone(&self.inner).settle(
          key.clone(),
          request,
          state.generation,
        ));
        let pending = async move {
          task.await.unwrap_or_else(|e| {
            Err(FetchError::Transport(format!("request task failed: {}", e)))
          })
        }
        .boxed()
        .shared();
        state
          .in_flight
          .insert(key.cache_hash().to_string(), pending.clone());
        pending
      }
    };

    pending.await
  }

  /// Load a resource and deserialize it.
  pub async fn load_as<T: DeserializeOwned>(
    &self,
    resource: &str,
    config: &RequestConfig,
  ) -> Result<T, FetchError> {
    let value = self.load(resource, config).await?;
    serde_json::from_value(value).map_err(|e| FetchError::Decode(e.to_string()))
  }

  /// Load several resources concurrently.
  ///
  /// Every resource gets its own outcome, in input order; one failure does
  /// not affect the others.
  pub async fn preload<I, R>(
    &self,
    resources: I,
    config: &RequestConfig,
  ) -> Vec<(String, Result<Value, FetchError>)>
  where
    I: IntoIterator<Item = R>,
    R: Into<String>,
  {
    let loads = resources.into_iter().map(|resource| {
      let resource: String = resource.into();
      async move {
        let result = self.load(&resource, config).await;
        (resource, result)
      }
    });

    join_all(loads).await
  }

  /// Drop every cached response and forget in-flight requests.
  ///
  /// Calls already on the wire still complete and reach their waiters, but
  /// their results are not cached.
  pub fn invalidate(&self) {
    let mut state = self.inner.state();
    let cached = state.cache.len();
    let in_flight = state.in_flight.len();

    state.cache.clear();
    state.in_flight.clear();
    state.generation += 1;

    info!(cached, in_flight, "Response cache invalidated");
  }

  /// Remove expired responses. Returns how many were dropped.
  pub fn cleanup(&self) -> usize {
    let removed = self.inner.state().cache.sweep_expired();
    if removed > 0 {
      debug!(removed, "Swept expired responses");
    }
    removed
  }

  pub fn stats(&self) -> CoordinatorStats {
    let state = self.inner.state();
    CoordinatorStats {
      cached_entries: state.cache.len(),
      in_flight: state.in_flight.len(),
      active_requests: self.inner.active.load(Ordering::SeqCst),
    }
  }
}

impl Inner {
  fn state(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn build_request(&self, resource: &str, config: &RequestConfig) -> Result<Request, FetchError> {
    let invalid = |reason: String| FetchError::InvalidUrl {
      resource: resource.to_string(),
      reason,
    };

    let mut url = match &self.config.base_url {
      Some(base) => base.join(resource),
      None => Url::parse(resource),
    }
    .map_err(|e| invalid(e.to_string()))?;

    if !config.params.is_empty() {
      url.query_pairs_mut().extend_pairs(config.params.iter());
    }

    let headers = self
      .config
      .default_headers
      .iter()
      .chain(config.headers.iter())
      .cloned()
      .collect();

    Ok(Request {
      url,
      method: config.method.clone(),
      headers,
      body: config.body.clone(),
      timeout: config.timeout.unwrap_or(self.config.request_timeout),
    })
  }

  /// Run the request, then record the outcome if no invalidation happened
  /// in the meantime.
  ///
  /// Spawned once per in-flight entry, so it finishes and gives back its
  /// permit even when every waiter has been dropped.
  async fn settle(
    self: Arc<Self>,
    key: RequestKey,
    request: Request,
    generation: u64,
  ) -> Result<Value, FetchError> {
    let result = self.dispatch(&request).await;

    if let Err(e) = &result {
      warn!(key = %key, error = %e, "Request failed");
    }

    let mut state = self.state();
    if state.generation == generation {
      state.in_flight.remove(key.cache_hash());
      if let Ok(value) = &result {
        state
          .cache
          .insert(key.cache_hash().to_string(), value.clone());
      }
    } else {
      debug!(key = %key, "Discarding result of request issued before invalidation");
    }

    result
  }

  /// Perform one network call under the concurrency ceiling and timeout.
  async fn dispatch(&self, request: &Request) -> Result<Value, FetchError> {
    let _permit = self
      .limiter
      .acquire()
      .await
      .map_err(|_| FetchError::Transport("request limiter closed".to_string()))?;
    let _active = ActiveRequest::enter(&self.active);

    debug!(method = %request.method, url = %request.url, "Dispatching request");

    let response = tokio::time::timeout(request.timeout, self.transport.fetch(request))
      .await
      .map_err(|_| FetchError::Timeout(request.timeout))??;

    if !response.ok() {
      return Err(FetchError::Status {
        status: response.status,
        status_text: response.status_text,
      });
    }

    response.json()
  }
}

/// Counts a network call as active until dropped.
struct ActiveRequest<'a>(&'a AtomicUsize);

impl<'a> ActiveRequest<'a> {
  fn enter(counter: &'a AtomicUsize) -> Self {
    counter.fetch_add(1, Ordering::SeqCst);
    Self(counter)
  }
}

impl Drop for ActiveRequest<'_> {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}
