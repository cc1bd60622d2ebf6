//! Core traits and types for the caching system.

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::ApiError;

/// Invalidation label attached to cached reads.
///
/// A read provides one or more tags; a write names the tags it invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(&'static str);

impl Tag {
  pub const fn new(name: &'static str) -> Self {
    Self(name)
  }

  pub fn name(&self) -> &'static str {
    self.0
  }
}

impl fmt::Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.0)
  }
}

/// Identity of a cached read: the operation plus its argument.
pub trait QueryKey: Send + Sync {
  /// Canonical, unhashed form of the key (e.g. "book:42").
  fn canonical(&self) -> String;

  /// Human readable description for logs.
  fn description(&self) -> String;

  /// Tags this read provides.
  fn tags(&self) -> Vec<Tag>;

  /// Stable, fixed-length key used in the cache map.
  fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.canonical().as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Payloads that can be held in the cache.
///
/// Entries are stored as JSON so one map can hold every payload type.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Cacheable for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Status of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
  /// Known key, never fetched
  Idle,
  /// A request for this key is in flight
  Loading,
  /// Last request succeeded
  Success,
  /// Last request failed
  Error(ApiError),
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
}

impl<T> CacheResult<T> {
  pub fn new(data: T, source: CacheSource) -> Self {
    Self { data, source }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// This call issued the network request
  Network,
  /// Served from cache, still considered fresh
  CacheFresh,
  /// Joined a request another caller already had in flight
  Shared,
}
