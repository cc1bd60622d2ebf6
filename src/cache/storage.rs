//! In-memory cache entries and the tag index.

use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use super::traits::{QueryStatus, Tag};
use crate::error::ApiError;

/// A single cached read.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  /// Human readable key, for logs
  pub description: String,
  /// Last successful response, serialized
  pub data: Option<Value>,
  pub status: QueryStatus,
  /// Tags this entry is indexed under
  pub tags: BTreeSet<Tag>,
  /// When `data` was last written
  pub fetched_at: Option<Instant>,
  /// Bumped on every invalidation
  pub generation: u64,
  /// Generation of the newest request that has settled
  pub settled_generation: Option<u64>,
  /// Set by invalidation, cleared by a fetch started after it
  pub invalidated: bool,
}

impl CacheEntry {
  fn new(description: String) -> Self {
    Self {
      description,
      data: None,
      status: QueryStatus::Idle,
      tags: BTreeSet::new(),
      fetched_at: None,
      generation: 0,
      settled_generation: None,
      invalidated: false,
    }
  }

  /// Whether `data` can be served without going to the network.
  pub fn is_fresh(&self, stale_time: Duration, now: Instant) -> bool {
    if self.invalidated || self.status != QueryStatus::Success {
      return false;
    }
    self
      .fetched_at
      .map(|t| now.saturating_duration_since(t) <= stale_time)
      .unwrap_or(false)
  }
}

/// Explicit mapping from tag to the cache keys that provide it.
#[derive(Debug, Default)]
pub struct TagIndex {
  by_tag: HashMap<Tag, BTreeSet<String>>,
}

impl TagIndex {
  pub fn insert(&mut self, key: &str, tags: &[Tag]) {
    for tag in tags {
      self.by_tag.entry(*tag).or_default().insert(key.to_string());
    }
  }

  pub fn keys_for(&self, tag: Tag) -> Vec<String> {
    self
      .by_tag
      .get(&tag)
      .map(|keys| keys.iter().cloned().collect())
      .unwrap_or_default()
  }

  /// Every key indexed under any of `tags`, without duplicates.
  pub fn resolve(&self, tags: &[Tag]) -> BTreeSet<String> {
    tags
      .iter()
      .filter_map(|tag| self.by_tag.get(tag))
      .flatten()
      .cloned()
      .collect()
  }

  /// Drop `key` from every tag in `tags`; tags left empty are removed.
  pub fn remove(&mut self, key: &str, tags: &BTreeSet<Tag>) {
    for tag in tags {
      if let Some(keys) = self.by_tag.get_mut(tag) {
        keys.remove(key);
        if keys.is_empty() {
          self.by_tag.remove(tag);
        }
      }
    }
  }

  pub fn clear(&mut self) {
    self.by_tag.clear();
  }
}

/// Storage for every cache entry plus the tag index.
///
/// Plain data: callers serialize access.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  entries: HashMap<String, CacheEntry>,
  tags: TagIndex,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make sure an entry exists for `key` and is indexed under `tags`.
  pub fn register(&mut self, key: &str, description: String, tags: &[Tag]) -> &mut CacheEntry {
    self.tags.insert(key, tags);
    let entry = self
      .entries
      .entry(key.to_string())
      .or_insert_with(|| CacheEntry::new(description));
    entry.tags.extend(tags.iter().copied());
    entry
  }

  pub fn get(&self, key: &str) -> Option<&CacheEntry> {
    self.entries.get(key)
  }

  pub fn get_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
    self.entries.get_mut(key)
  }

  /// Forget `key` and unindex it.
  pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
    let entry = self.entries.remove(key)?;
    self.tags.remove(key, &entry.tags);
    Some(entry)
  }

  /// Data that is still fresh for `key`, if any.
  pub fn fresh_data(&self, key: &str, stale_time: Duration, now: Instant) -> Option<&Value> {
    self
      .entries
      .get(key)
      .filter(|e| e.is_fresh(stale_time, now))
      .and_then(|e| e.data.as_ref())
  }

  /// Mark `key` as loading and return the generation the request belongs to.
  pub fn begin_fetch(&mut self, key: &str) -> u64 {
    match self.entries.get_mut(key) {
      Some(entry) => {
        entry.status = QueryStatus::Loading;
        entry.invalidated = false;
        entry.generation
      }
      None => 0,
    }
  }

  /// Record the outcome of a request started at `generation`.
  ///
  /// Returns false when a newer request already settled and this result
  /// was dropped.
  pub fn complete(
    &mut self,
    key: &str,
    generation: u64,
    result: &Result<Value, ApiError>,
    now: Instant,
  ) -> bool {
    let Some(entry) = self.entries.get_mut(key) else {
      return false;
    };
    if entry.settled_generation.is_some_and(|g| g > generation) {
      return false;
    }
    entry.settled_generation = Some(generation);

    match result {
      Ok(value) => {
        entry.data = Some(value.clone());
        entry.status = QueryStatus::Success;
        entry.fetched_at = Some(now);
      }
      Err(e) => {
        entry.status = QueryStatus::Error(e.clone());
      }
    }

    // Invalidated while in flight: keep the data but force the next read out.
    entry.invalidated = entry.generation != generation;
    true
  }

  /// Mark every entry under `tags` stale. Returns the affected keys.
  pub fn invalidate(&mut self, tags: &[Tag]) -> Vec<String> {
    let keys = self.tags.resolve(tags);
    let mut affected = Vec::with_capacity(keys.len());
    for key in keys {
      if let Some(entry) = self.entries.get_mut(&key) {
        entry.invalidated = true;
        entry.generation += 1;
        affected.push(key);
      }
    }
    affected
  }

  pub fn keys_for(&self, tag: Tag) -> Vec<String> {
    self.tags.keys_for(tag)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn clear(&mut self) {
    self.entries.clear();
    self.tags.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  const BOOKS: Tag = Tag::new("Books");
  const BORROW: Tag = Tag::new("Borrow");

  fn settle_ok(storage: &mut MemoryStorage, key: &str, value: Value) {
    let generation = storage.begin_fetch(key);
    assert!(storage.complete(key, generation, &Ok(value), Instant::now()));
  }

  #[test]
  fn test_register_indexes_tags() {
    let mut storage = MemoryStorage::new();
    storage.register("list", "books".into(), &[BOOKS]);
    storage.register("detail", "book 1".into(), &[BOOKS]);
    storage.register("summary", "borrow summary".into(), &[BORROW]);

    assert_eq!(storage.keys_for(BOOKS), vec!["detail", "list"]);
    assert_eq!(storage.keys_for(BORROW), vec!["summary"]);
    assert_eq!(storage.len(), 3);
  }

  #[test]
  fn test_fresh_until_invalidated() {
    let mut storage = MemoryStorage::new();
    storage.register("list", "books".into(), &[BOOKS]);
    settle_ok(&mut storage, "list", json!([1, 2]));

    let stale_time = Duration::from_secs(60);
    assert!(storage.fresh_data("list", stale_time, Instant::now()).is_some());

    let affected = storage.invalidate(&[BOOKS]);
    assert_eq!(affected, vec!["list"]);
    assert!(storage.fresh_data("list", stale_time, Instant::now()).is_none());
    // Last known data survives invalidation.
    assert_eq!(storage.get("list").unwrap().data, Some(json!([1, 2])));
  }

  #[test]
  fn test_invalidate_only_touches_matching_tags() {
    let mut storage = MemoryStorage::new();
    storage.register("list", "books".into(), &[BOOKS]);
    storage.register("summary", "borrow summary".into(), &[BORROW]);
    settle_ok(&mut storage, "list", json!([]));
    settle_ok(&mut storage, "summary", json!([]));

    storage.invalidate(&[BORROW]);
    assert!(!storage.get("list").unwrap().invalidated);
    assert!(storage.get("summary").unwrap().invalidated);
  }

  #[test]
  fn test_zero_stale_time_is_fresh_only_at_fetch_instant() {
    let mut storage = MemoryStorage::new();
    storage.register("list", "books".into(), &[BOOKS]);
    settle_ok(&mut storage, "list", json!([]));

    let later = Instant::now() + Duration::from_millis(5);
    assert!(storage.fresh_data("list", Duration::ZERO, later).is_none());
  }

  #[test]
  fn test_invalidated_while_in_flight_stays_stale() {
    let mut storage = MemoryStorage::new();
    storage.register("list", "books".into(), &[BOOKS]);
    let generation = storage.begin_fetch("list");

    storage.invalidate(&[BOOKS]);
    storage.complete("list", generation, &Ok(json!(["old"])), Instant::now());

    let entry = storage.get("list").unwrap();
    assert!(entry.invalidated);
    assert_eq!(entry.status, QueryStatus::Success);
  }

  #[test]
  fn test_older_result_does_not_overwrite_newer() {
    let mut storage = MemoryStorage::new();
    storage.register("list", "books".into(), &[BOOKS]);
    let old = storage.begin_fetch("list");
    storage.invalidate(&[BOOKS]);
    let new = storage.begin_fetch("list");

    assert!(storage.complete("list", new, &Ok(json!(["new"])), Instant::now()));
    assert!(!storage.complete("list", old, &Ok(json!(["old"])), Instant::now()));
    assert_eq!(storage.get("list").unwrap().data, Some(json!(["new"])));
    assert!(!storage.get("list").unwrap().invalidated);
  }

  #[test]
  fn test_error_keeps_previous_data() {
    let mut storage = MemoryStorage::new();
    storage.register("list", "books".into(), &[BOOKS]);
    settle_ok(&mut storage, "list", json!([1]));

    let generation = storage.begin_fetch("list");
    let err = ApiError::Transport("offline".into());
    storage.complete("list", generation, &Err(err.clone()), Instant::now());

    let entry = storage.get("list").unwrap();
    assert_eq!(entry.status, QueryStatus::Error(err));
    assert_eq!(entry.data, Some(json!([1])));
  }

  #[test]
  fn test_remove_unindexes_entry() {
    let mut storage = MemoryStorage::new();
    storage.register("list", "books".into(), &[BOOKS]);
    storage.register("detail", "book 1".into(), &[BOOKS, BORROW]);

    assert!(storage.remove("detail").is_some());
    assert!(storage.get("detail").is_none());
    assert_eq!(storage.keys_for(BOOKS), vec!["list"]);
    assert!(storage.keys_for(BORROW).is_empty());
    assert!(storage.remove("detail").is_none());
    assert!(storage.invalidate(&[BORROW]).is_empty());
  }

  #[test]
  fn test_clear() {
    let mut storage = MemoryStorage::new();
    storage.register("list", "books".into(), &[BOOKS]);
    storage.clear();
    assert!(storage.is_empty());
    assert!(storage.keys_for(BOOKS).is_empty());
  }
}
