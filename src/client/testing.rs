//! Scripted transport for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use url::Url;

use super::coordinator::{CoordinatorConfig, RequestCoordinator};
use super::transport::{Request, Response, Transport};
use crate::error::FetchError;

/// What the mock answers for one request.
pub(crate) struct MockReply {
  outcome: Result<(u16, String, Value), FetchError>,
  delay: Duration,
}

impl MockReply {
  pub(crate) fn json(body: Value) -> Self {
    Self {
      outcome: Ok((200, "OK".to_string(), body)),
      delay: Duration::ZERO,
    }
  }

  pub(crate) fn status(status: u16, status_text: &str) -> Self {
    Self {
      outcome: Ok((status, status_text.to_string(), Value::Null)),
      delay: Duration::ZERO,
    }
  }

  pub(crate) fn transport_error(message: &str) -> Self {
    Self {
      outcome: Err(FetchError::Transport(message.to_string())),
      delay: Duration::ZERO,
    }
  }

  pub(crate) fn after(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }
}

type Responder = Box<dyn Fn(&Url) -> MockReply + Send + Sync>;

/// Transport that answers from a closure and records what it saw.
pub(crate) struct MockTransport {
  responder: Responder,
  calls: Mutex<Vec<Url>>,
  active: AtomicUsize,
  peak: AtomicUsize,
}

impl MockTransport {
  pub(crate) fn new<F>(responder: F) -> Arc<Self>
  where
    F: Fn(&Url) -> MockReply + Send + Sync + 'static,
  {
    Arc::new(Self {
      responder: Box::new(responder),
      calls: Mutex::new(Vec::new()),
      active: AtomicUsize::new(0),
      peak: AtomicUsize::new(0),
    })
  }

  /// Number of network calls started
  pub(crate) fn call_count(&self) -> usize {
    self.calls().len()
  }

  pub(crate) fn calls(&self) -> Vec<Url> {
    self
      .calls
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Calls currently between start and finish
  pub(crate) fn active(&self) -> usize {
    self.active.load(Ordering::SeqCst)
  }

  /// Highest number of simultaneously outstanding calls observed
  pub(crate) fn peak(&self) -> usize {
    self.peak.load(Ordering::SeqCst)
  }
}

struct ActiveCall<'a>(&'a AtomicUsize);

impl Drop for ActiveCall<'_> {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}

#[async_trait]
impl Transport for MockTransport {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    let reply = (self.responder)(&request.url);
    self
      .calls
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(request.url.clone());

    let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
    let _call = ActiveCall(&self.active);

    if !reply.delay.is_zero() {
      tokio::time::sleep(reply.delay).await;
    }

    let (status, status_text, body) = reply.outcome?;
    Ok(Response {
      status,
      status_text,
      body: serde_json::to_vec(&body).unwrap_or_default(),
    })
  }
}

/// Coordinator against `https://api.test/` with default limits.
pub(crate) fn coordinator(transport: Arc<MockTransport>) -> RequestCoordinator {
  coordinator_with(transport, CoordinatorConfig::default())
}

pub(crate) fn coordinator_with(
  transport: Arc<MockTransport>,
  mut config: CoordinatorConfig,
) -> RequestCoordinator {
  if config.base_url.is_none() {
    config.base_url = Url::parse("https://api.test/").ok();
  }
  RequestCoordinator::new(transport, config)
}

/// Value of a query parameter, if present.
pub(crate) fn query_param(url: &Url, name: &str) -> Option<String> {
  url
    .query_pairs()
    .find(|(k, _)| k == name)
    .map(|(_, v)| v.into_owned())
}
