//! Query keys and tags for library API reads.

use crate::cache::{QueryKey, Tag};

/// Provided by every book read; invalidated by every book write.
pub const BOOKS: Tag = Tag::new("Books");
/// Provided by the borrow summary; invalidated by every borrow.
pub const BORROW: Tag = Tag::new("Borrow");

/// Query key types for library API calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LibraryQueryKey {
  /// List every book
  Books,
  /// Get a single book by id
  Book { id: String },
  /// Per-book borrow totals
  BorrowSummary,
}

impl QueryKey for LibraryQueryKey {
  fn canonical(&self) -> String {
    match self {
      Self::Books => "books".to_string(),
      Self::Book { id } => format!("book:{}", id),
      Self::BorrowSummary => "borrow_summary".to_string(),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::Books => "all books".to_string(),
      Self::Book { id } => format!("book {}", id),
      Self::BorrowSummary => "borrow summary".to_string(),
    }
  }

  fn tags(&self) -> Vec<Tag> {
    match self {
      Self::Books | Self::Book { .. } => vec![BOOKS],
      Self::BorrowSummary => vec![BORROW],
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_keys_are_distinct_per_argument() {
    let a = LibraryQueryKey::Book { id: "1".into() };
    let b = LibraryQueryKey::Book { id: "2".into() };
    assert_ne!(a.cache_hash(), b.cache_hash());
    assert_ne!(a.cache_hash(), LibraryQueryKey::Books.cache_hash());
  }

  #[test]
  fn test_book_detail_shares_list_tag() {
    assert_eq!(LibraryQueryKey::Books.tags(), vec![BOOKS]);
    assert_eq!(LibraryQueryKey::Book { id: "1".into() }.tags(), vec![BOOKS]);
    assert_eq!(LibraryQueryKey::BorrowSummary.tags(), vec![BORROW]);
  }
}
