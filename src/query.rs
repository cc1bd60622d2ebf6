//! Mounted queries: a consumer-side view of one cache key.
//!
//! A `Query<T>` is what a view holds while it is on screen. It tracks the
//! loading/success/error state of its key and, while mounted, re-fetches
//! on its own when a mutation invalidates the key. Dropping it unmounts it;
//! a request still in flight then settles into the cache and nowhere else.
//!
//! # Example
//!
//! ```ignore
//! let mut query = books.watch_books();
//!
//! // Start fetching
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match query.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(books) => render_books(books),
//!     QueryState::Error(e) => render_error(&e.user_message()),
//!     QueryState::Idle => {}
//! }
//! ```

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::cache::{CacheEvent, Cacheable, QueryCache, QueryKey};
use crate::error::{ApiError, ApiResult};

/// The state of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(ApiError),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&ApiError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// A factory function that creates futures for fetching data
type FetcherFn<T> = Arc<dyn Fn() -> BoxFuture<'static, ApiResult<T>> + Send + Sync>;

/// A consumer mounted on one cache key.
pub struct Query<T> {
  state: QueryState<T>,
  cache: QueryCache,
  key: Arc<dyn QueryKey>,
  hash: String,
  fetcher: FetcherFn<T>,
  receiver: Option<mpsc::UnboundedReceiver<ApiResult<T>>>,
  events: broadcast::Receiver<CacheEvent>,
  /// Invalidated while a request was in flight; re-fetch once it settles
  pending_invalidation: bool,
}

impl<T: Cacheable> Query<T> {
  /// Mount a query on `key`.
  ///
  /// The fetcher is called each time a request has to go to the network;
  /// reads still go through the cache, so several queries on the same key
  /// share one request.
  pub fn new<K, F, Fut>(cache: QueryCache, key: K, fetcher: F) -> Self
  where
    K: QueryKey + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    let hash = key.cache_hash();
    let events = cache.subscribe();
    Self {
      state: QueryState::Idle,
      cache,
      key: Arc::new(key),
      hash,
      fetcher: Arc::new(move || fetcher().boxed()),
      receiver: None,
      events,
      pending_invalidation: false,
    }
  }

  /// Get the current state of the query.
  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  /// Get the data if the query succeeded.
  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  /// Check if the query is currently loading.
  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  /// Check if the query succeeded.
  pub fn is_success(&self) -> bool {
    self.state.is_success()
  }

  /// Check if the query failed.
  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  /// Get the error if the query failed.
  pub fn error(&self) -> Option<&ApiError> {
    self.state.error()
  }

  /// Whether the cached data behind this query would be re-fetched on read.
  pub fn is_stale(&self) -> bool {
    self.cache.is_stale(self.key.as_ref())
  }

  /// Start fetching data if not already loading.
  ///
  /// Fresh cached data is served without a request. This is a no-op if the
  /// query is already loading.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch(false);
  }

  /// Force a refetch, even if already loading or data exists.
  pub fn refetch(&mut self) {
    // Stop listening to the pending fetch by dropping the receiver
    self.receiver = None;
    self.start_fetch(true);
  }

  /// Poll for results and invalidations.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick
  /// handler.
  pub fn poll(&mut self) -> bool {
    let mut changed = self.poll_result();

    // Only re-fetch what has been fetched before
    if self.take_invalidation() && !matches!(self.state, QueryState::Idle) {
      self.pending_invalidation = true;
    }

    // A request still in flight may predate the invalidation; wait for it.
    if self.pending_invalidation && !self.state.is_loading() {
      self.pending_invalidation = false;
      self.start_fetch(false);
      changed = true;
    }

    changed
  }

  fn poll_result(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    // Try to receive without blocking
    match receiver.try_recv() {
      Ok(Ok(data)) => {
        self.state = QueryState::Success(data);
        self.receiver = None;
        true
      }
      Ok(Err(error)) => {
        self.state = QueryState::Error(error);
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        // Sender dropped without sending - treat as error
        self.state = QueryState::Error(ApiError::Transport("query was cancelled".to_string()));
        self.receiver = None;
        true
      }
    }
  }

  /// Drain pending cache events; true if any of them invalidated our key.
  fn take_invalidation(&mut self) -> bool {
    let mut invalidated = false;
    loop {
      match self.events.try_recv() {
        Ok(CacheEvent::Invalidated { key }) if key == self.hash => invalidated = true,
        Ok(_) => {}
        Err(broadcast::error::TryRecvError::Lagged(_)) => {
          // Missed events; fall back to asking the cache directly.
          invalidated |= self.cache.is_stale(self.key.as_ref());
        }
        Err(_) => break,
      }
    }
    invalidated
  }

  /// Internal: start the fetch operation
  fn start_fetch(&mut self, force: bool) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = QueryState::Loading;

    let cache = self.cache.clone();
    let key = Arc::clone(&self.key);
    let fetcher = Arc::clone(&self.fetcher);
    tokio::spawn(async move {
      let result = if force {
        cache.refetch(key.as_ref(), || fetcher()).await
      } else {
        cache.fetch(key.as_ref(), || fetcher()).await
      };
      // Ignore send errors - the query may have been unmounted
      let _ = tx.send(result.map(|r| r.data));
    });
  }
}

// Query is not Clone because the receiver is owned.
// Mount a second query on the same key instead; they share requests.

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key.description())
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}
