//! Book resource client: cached reads and invalidating writes for books.

use crate::cache::{CacheResult, QueryCache};
use crate::error::ApiResult;
use crate::query::Query;

use super::cache::{LibraryQueryKey, BOOKS};
use super::client::LibraryClient;
use super::types::{Book, BookInput};

/// Book client with transparent caching support.
///
/// Reads are tagged `Books`; every successful write invalidates `Books`, so
/// the list and any open detail view re-fetch. Writes are never applied to
/// the cache optimistically.
#[derive(Clone)]
pub struct BookClient {
  inner: LibraryClient,
  cache: QueryCache,
}

impl BookClient {
  pub fn new(inner: LibraryClient, cache: QueryCache) -> Self {
    Self { inner, cache }
  }

  /// Get all books with caching.
  pub async fn list_books(&self) -> ApiResult<Vec<Book>> {
    Ok(self.list_books_with_source().await?.data)
  }

  /// Same as `list_books`, also reporting where the data came from.
  pub async fn list_books_with_source(&self) -> ApiResult<CacheResult<Vec<Book>>> {
    self
      .cache
      .fetch(&LibraryQueryKey::Books, || {
        let inner = self.inner.clone();
        async move { inner.get_books().await }
      })
      .await
  }

  /// Get a single book by id with caching.
  pub async fn get_book(&self, id: &str) -> ApiResult<Book> {
    let key = LibraryQueryKey::Book { id: id.to_string() };
    let result = self
      .cache
      .fetch(&key, || {
        let inner = self.inner.clone();
        let id = id.to_string();
        async move { inner.get_book(&id).await }
      })
      .await?;

    Ok(result.data)
  }

  /// Create a book. The input is sent as given; validate it first.
  pub async fn create_book(&self, input: &BookInput) -> ApiResult<Book> {
    let inner = self.inner.clone();
    let input = input.clone();
    self
      .cache
      .mutate(&[BOOKS], async move { inner.create_book(&input).await })
      .await
  }

  /// Replace a book's fields.
  pub async fn update_book(&self, id: &str, input: &BookInput) -> ApiResult<Book> {
    let inner = self.inner.clone();
    let id = id.to_string();
    let input = input.clone();
    self
      .cache
      .mutate(&[BOOKS], async move { inner.update_book(&id, &input).await })
      .await
  }

  pub async fn delete_book(&self, id: &str) -> ApiResult<()> {
    let inner = self.inner.clone();
    let id = id.to_string();
    self
      .cache
      .mutate(&[BOOKS], async move { inner.delete_book(&id).await })
      .await
  }

  /// Re-read the book list from the server regardless of freshness.
  pub async fn refresh_books(&self) -> ApiResult<Vec<Book>> {
    let result = self
      .cache
      .refetch(&LibraryQueryKey::Books, || {
        let inner = self.inner.clone();
        async move { inner.get_books().await }
      })
      .await?;

    Ok(result.data)
  }

  pub async fn refresh_book(&self, id: &str) -> ApiResult<Book> {
    let key = LibraryQueryKey::Book { id: id.to_string() };
    let result = self
      .cache
      .refetch(&key, || {
        let inner = self.inner.clone();
        let id = id.to_string();
        async move { inner.get_book(&id).await }
      })
      .await?;

    Ok(result.data)
  }

  /// Mount a query on the book list.
  pub fn watch_books(&self) -> Query<Vec<Book>> {
    let inner = self.inner.clone();
    Query::new(self.cache.clone(), LibraryQueryKey::Books, move || {
      let inner = inner.clone();
      async move { inner.get_books().await }
    })
  }

  /// Mount a query on one book.
  pub fn watch_book(&self, id: &str) -> Query<Book> {
    let inner = self.inner.clone();
    let key = LibraryQueryKey::Book { id: id.to_string() };
    let id = id.to_string();
    Query::new(self.cache.clone(), key, move || {
      let inner = inner.clone();
      let id = id.clone();
      async move { inner.get_book(&id).await }
    })
  }
}
