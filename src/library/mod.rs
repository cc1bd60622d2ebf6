pub mod api_types;
pub mod books;
pub mod borrow;
pub mod cache;
pub mod client;
pub mod types;

use color_eyre::Result;

use crate::cache::QueryCache;
use crate::config::Config;

pub use books::BookClient;
pub use borrow::BorrowClient;
pub use client::LibraryClient;

/// Both resource clients over one transport and one shared cache.
#[derive(Clone)]
pub struct Library {
  pub books: BookClient,
  pub borrows: BorrowClient,
  cache: QueryCache,
}

impl Library {
  pub fn new(config: &Config) -> Result<Self> {
    let client = LibraryClient::new(&config.api)?;
    let cache = QueryCache::new(&config.cache);
    Ok(Self::with_parts(client, cache))
  }

  /// Build from an existing transport and cache, e.g. an isolated cache per test.
  pub fn with_parts(client: LibraryClient, cache: QueryCache) -> Self {
    Self {
      books: BookClient::new(client.clone(), cache.clone()),
      borrows: BorrowClient::new(client, cache.clone()),
      cache,
    }
  }

  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  /// Drop every cached entry.
  pub fn shutdown(&self) {
    self.cache.clear();
  }
}
