//! Borrow resource client: the borrow summary and new borrows.

use chrono::{DateTime, Utc};

use crate::cache::QueryCache;
use crate::error::{ApiError, ApiResult};
use crate::query::Query;

use super::cache::{LibraryQueryKey, BOOKS, BORROW};
use super::client::LibraryClient;
use super::types::{Book, BorrowInput, BorrowRecord, BorrowSummary};

/// Borrow client with transparent caching support.
#[derive(Clone)]
pub struct BorrowClient {
  inner: LibraryClient,
  cache: QueryCache,
}

impl BorrowClient {
  pub fn new(inner: LibraryClient, cache: QueryCache) -> Self {
    Self { inner, cache }
  }

  /// Get the per-book borrow totals with caching.
  pub async fn list_borrow_summary(&self) -> ApiResult<BorrowSummary> {
    let result = self
      .cache
      .fetch(&LibraryQueryKey::BorrowSummary, || {
        let inner = self.inner.clone();
        async move { inner.get_borrow_summary().await }
      })
      .await?;

    Ok(result.data)
  }

  /// Record a borrow.
  ///
  /// Invalidates `Borrow`, and `Books` too: the server takes the borrowed
  /// copies off the book.
  pub async fn create_borrow(&self, input: &BorrowInput) -> ApiResult<BorrowRecord> {
    let inner = self.inner.clone();
    let input = input.clone();
    self
      .cache
      .mutate(&[BORROW, BOOKS], async move {
        inner.create_borrow(&input).await
      })
      .await
  }

  /// Pre-check `input` against `book` as last seen, then `create_borrow`.
  ///
  /// A failed pre-check sends nothing.
  pub async fn borrow_book(
    &self,
    book: &Book,
    input: &BorrowInput,
    now: DateTime<Utc>,
  ) -> ApiResult<BorrowRecord> {
    input
      .check_against(book, now)
      .map_err(ApiError::Rejected)?;
    self.create_borrow(input).await
  }

  pub async fn refresh_borrow_summary(&self) -> ApiResult<BorrowSummary> {
    let result = self
      .cache
      .refetch(&LibraryQueryKey::BorrowSummary, || {
        let inner = self.inner.clone();
        async move { inner.get_borrow_summary().await }
      })
      .await?;

    Ok(result.data)
  }

  /// Mount a query on the borrow summary.
  pub fn watch_borrow_summary(&self) -> Query<BorrowSummary> {
    let inner = self.inner.clone();
    Query::new(self.cache.clone(), LibraryQueryKey::BorrowSummary, move || {
      let inner = inner.clone();
      async move { inner.get_borrow_summary().await }
    })
  }
}
