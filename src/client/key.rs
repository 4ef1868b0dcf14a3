//! Canonical cache keys for outbound requests.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use url::form_urlencoded;

/// Query parameters, kept sorted by name so equivalent sets serialize identically.
pub type QueryParams = BTreeMap<String, String>;

/// Identity of a request for caching and deduplication.
///
/// Derived from the resource and its query parameters only; method, headers
/// and body do not participate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  canonical: String,
  hash: String,
}

impl RequestKey {
  pub fn new(resource: &str, params: &QueryParams) -> Self {
    let query = form_urlencoded::Serializer::new(String::new())
      .extend_pairs(params.iter())
      .finish();

    let resource = resource.trim();
    let canonical = if query.is_empty() {
      resource.to_string()
    } else {
      format!("{}?{}", resource, query)
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Self { canonical, hash }
  }

  /// Fixed-length key used in the cache and in-flight maps.
  pub fn cache_hash(&self) -> &str {
    &self.hash
  }

  /// Human-readable `resource?sorted-query` form.
  pub fn canonical(&self) -> &str {
    &self.canonical
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.canonical)
  }
}
