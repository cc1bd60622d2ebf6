//! Cache layer that orchestrates caching logic with network fetching.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::storage::MemoryStorage;
use super::traits::{CacheResult, CacheSource, Cacheable, QueryKey, QueryStatus, Tag};
use crate::config::CacheConfig;
use crate::error::{ApiError, ApiResult};

/// Something that happened to a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
  /// The entry was marked stale by a mutation
  Invalidated { key: String },
  /// A request for the entry settled
  Settled { key: String },
}

type SharedFetch = Shared<BoxFuture<'static, ApiResult<Value>>>;

struct InFlight {
  generation: u64,
  fetch: SharedFetch,
}

#[derive(Default)]
struct State {
  storage: MemoryStorage,
  inflight: HashMap<String, InFlight>,
}

/// Request-keyed cache with tag-based invalidation.
///
/// Cloning is cheap and every clone shares the same entries. Create one per
/// application (or per test) and hand it to the resource clients.
#[derive(Clone)]
pub struct QueryCache {
  state: Arc<Mutex<State>>,
  events: broadcast::Sender<CacheEvent>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl QueryCache {
  pub fn new(config: &CacheConfig) -> Self {
    let (events, _) = broadcast::channel(64);
    Self {
      state: Arc::new(Mutex::new(State::default())),
      events,
      stale_time: Duration::from_secs(config.stale_time_secs),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn stale_time(&self) -> Duration {
    self.stale_time
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    // Nothing in here panics while holding the lock; recover instead of propagating.
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Read through the cache.
  ///
  /// 1. Fresh cached data is returned immediately
  /// 2. A request already in flight for the same key is joined
  /// 3. Otherwise the fetcher is spawned and awaited
  pub async fn fetch<K, T, F, Fut>(&self, key: &K, fetcher: F) -> ApiResult<CacheResult<T>>
  where
    K: QueryKey + ?Sized,
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    self.read(key, fetcher, false).await
  }

  /// Explicit refresh: skip fresh data, but still share an in-flight request.
  pub async fn refetch<K, T, F, Fut>(&self, key: &K, fetcher: F) -> ApiResult<CacheResult<T>>
  where
    K: QueryKey + ?Sized,
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    self.read(key, fetcher, true).await
  }

  async fn read<K, T, F, Fut>(&self, key: &K, fetcher: F, force: bool) -> ApiResult<CacheResult<T>>
  where
    K: QueryKey + ?Sized,
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    let hash = key.cache_hash();

    let (fetch, source) = {
      let mut state = self.lock();
      let generation = state
        .storage
        .register(&hash, key.description(), &key.tags())
        .generation;

      if !force {
        if let Some(value) = state.storage.fresh_data(&hash, self.stale_time, Instant::now()) {
          debug!(key = %key.description(), "cache hit");
          let data: T = serde_json::from_value(value.clone())?;
          return Ok(CacheResult::new(data, CacheSource::CacheFresh));
        }
      }

      match state.inflight.get(&hash) {
        Some(inflight) if inflight.generation == generation => {
          debug!(key = %key.description(), "joining in-flight request");
          (inflight.fetch.clone(), CacheSource::Shared)
        }
        _ => {
          debug!(key = %key.description(), "fetching from network");
          let fetch = self.spawn_fetch(&mut state, &hash, fetcher());
          (fetch, CacheSource::Network)
        }
      }
    };

    let value = fetch.await?;
    let data: T = serde_json::from_value(value)?;
    Ok(CacheResult::new(data, source))
  }

  /// Spawn the request so it settles into the cache even if every caller
  /// awaiting it goes away.
  fn spawn_fetch<T, Fut>(&self, state: &mut State, hash: &str, request: Fut) -> SharedFetch
  where
    T: Cacheable,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    let generation = state.storage.begin_fetch(hash);
    let cache = self.clone();
    let key = hash.to_string();

    let handle = tokio::spawn(async move {
      let result = match request.await {
        Ok(data) => serde_json::to_value(data).map_err(ApiError::from),
        Err(e) => Err(e),
      };
      cache.settle(&key, generation, &result);
      result
    });

    let fetch = async move {
      handle
        .await
        .unwrap_or_else(|e| Err(ApiError::Transport(format!("request task failed: {}", e))))
    }
    .boxed()
    .shared();

    state.inflight.insert(
      hash.to_string(),
      InFlight {
        generation,
        fetch: fetch.clone(),
      },
    );
    fetch
  }

  fn settle(&self, key: &str, generation: u64, result: &ApiResult<Value>) {
    let mut state = self.lock();

    if state
      .inflight
      .get(key)
      .is_some_and(|f| f.generation == generation)
    {
      state.inflight.remove(key);
    }

    let stored = state
      .storage
      .complete(key, generation, result, Instant::now());
    let newer_in_flight = state.inflight.contains_key(key);

    if let Some(entry) = state.storage.get_mut(key) {
      if newer_in_flight {
        entry.status = QueryStatus::Loading;
      }
      if let Err(e) = result {
        warn!(key = %entry.description, error = %e, "request failed");
      }
    }

    // Nothing left to serve for a resource that is gone.
    let gone = matches!(result, Err(e) if e.is_not_found());
    if stored && gone && !newer_in_flight {
      if let Some(entry) = state.storage.remove(key) {
        debug!(key = %entry.description, "evicted missing resource");
      }
    }
    drop(state);

    if stored {
      let _ = self.events.send(CacheEvent::Settled {
        key: key.to_string(),
      });
    }
  }

  /// Run a write and, once it succeeds, invalidate `tags`.
  ///
  /// The write is spawned: a caller that stops waiting does not cancel it,
  /// and the invalidation still happens.
  pub async fn mutate<T, Fut>(&self, tags: &[Tag], request: Fut) -> ApiResult<T>
  where
    T: Send + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    let cache = self.clone();
    let tags = tags.to_vec();

    let handle = tokio::spawn(async move {
      let data = request.await?;
      cache.invalidate(&tags);
      Ok::<_, ApiError>(data)
    });

    handle
      .await
      .unwrap_or_else(|e| Err(ApiError::Transport(format!("request task failed: {}", e))))
  }

  /// Mark every entry carrying any of `tags` stale. Returns the affected keys.
  pub fn invalidate(&self, tags: &[Tag]) -> Vec<String> {
    let affected = self.lock().storage.invalidate(tags);
    info!(
      tags = ?tags.iter().map(Tag::name).collect::<Vec<_>>(),
      entries = affected.len(),
      "invalidated cache"
    );
    for key in &affected {
      let _ = self
        .events
        .send(CacheEvent::Invalidated { key: key.clone() });
    }
    affected
  }

  /// Receive entry events; used by mounted queries to re-fetch on invalidation.
  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.events.subscribe()
  }

  /// Current status of `key`; `None` if it has never been read or was evicted
  /// after a not-found.
  pub fn status<K: QueryKey + ?Sized>(&self, key: &K) -> Option<QueryStatus> {
    self
      .lock()
      .storage
      .get(&key.cache_hash())
      .map(|e| e.status.clone())
  }

  /// Whether the next `fetch` of `key` would go to the network.
  pub fn is_stale<K: QueryKey + ?Sized>(&self, key: &K) -> bool {
    self
      .lock()
      .storage
      .fresh_data(&key.cache_hash(), self.stale_time, Instant::now())
      .is_none()
  }

  /// Last known data for `key`, fresh or not.
  pub fn peek<K, T>(&self, key: &K) -> Option<T>
  where
    K: QueryKey + ?Sized,
    T: Cacheable,
  {
    let state = self.lock();
    let value = state.storage.get(&key.cache_hash())?.data.clone()?;
    drop(state);
    serde_json::from_value(value).ok()
  }

  /// Cache keys currently indexed under `tag`.
  pub fn keys_for(&self, tag: Tag) -> Vec<String> {
    self.lock().storage.keys_for(tag)
  }

  pub fn len(&self) -> usize {
    self.lock().storage.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().storage.is_empty()
  }

  /// Drop every entry. Requests still in flight settle into nothing.
  pub fn clear(&self) {
    let mut state = self.lock();
    state.storage.clear();
    state.inflight.clear();
  }
}
