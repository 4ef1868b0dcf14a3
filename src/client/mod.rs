//! Network-facing side of the data layer.
//!
//! `RequestCoordinator` owns the response cache and the in-flight map and is
//! the only component that talks to a `Transport`.

mod coordinator;
mod key;
mod sweeper;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{CoordinatorConfig, CoordinatorStats, RequestConfig, RequestCoordinator};
pub use key::{QueryParams, RequestKey};
pub use sweeper::CleanupHandle;
pub use reqwest::Method;
pub use transport::{HttpTransport, Request, Response, Transport};
