//! Data access layer for JSON APIs: deduplicated, cached and
//! concurrency-limited requests, page accumulation, and a durable snapshot
//! cache for the last good dataset.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod paging;

pub use cache::{PersistentCache, SqliteStorage};
pub use client::{RequestConfig, RequestCoordinator};
pub use error::{FetchError, StorageError};
pub use paging::{InfiniteScrollAccumulator, PageResult, PaginationAccumulator};
