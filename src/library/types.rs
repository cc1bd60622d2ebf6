//! Domain types for books and borrows.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Book genre
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Genre {
  Fiction,
  NonFiction,
  Science,
  History,
  Biography,
  Fantasy,
}

impl Genre {
  pub const ALL: [Genre; 6] = [
    Genre::Fiction,
    Genre::NonFiction,
    Genre::Science,
    Genre::History,
    Genre::Biography,
    Genre::Fantasy,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Genre::Fiction => "FICTION",
      Genre::NonFiction => "NON_FICTION",
      Genre::Science => "SCIENCE",
      Genre::History => "HISTORY",
      Genre::Biography => "BIOGRAPHY",
      Genre::Fantasy => "FANTASY",
    }
  }
}

impl fmt::Display for Genre {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Genre {
  type Err = String;

  /// Case-insensitive; accepts `-` or space in place of `_`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
    Genre::ALL
      .into_iter()
      .find(|g| g.as_str() == normalized)
      .ok_or_else(|| {
        format!(
          "unknown genre '{}', expected one of: {}",
          s,
          Genre::ALL.map(|g| g.as_str()).join(", ")
        )
      })
  }
}

/// A book as the server reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
  #[serde(rename = "_id")]
  pub id: String,
  pub title: String,
  pub author: String,
  pub genre: Genre,
  pub isbn: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub copies: u32,
  #[serde(default)]
  pub available: bool,
  #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
}

impl Book {
  /// Derived availability; the server's `available` flag can lag behind `copies`.
  pub fn is_available(&self) -> bool {
    self.copies > 0
  }

  /// The writable fields of this book, e.g. as the starting point of an edit.
  pub fn to_input(&self) -> BookInput {
    BookInput {
      title: self.title.clone(),
      author: self.author.clone(),
      genre: self.genre,
      isbn: self.isbn.clone(),
      description: self.description.clone(),
      copies: self.copies,
    }
  }
}

/// Fields sent when creating or replacing a book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct BookInput {
  #[validate(length(min = 3, max = 100, message = "Title must be 3-100 characters"))]
  pub title: String,
  #[validate(length(min = 3, max = 100, message = "Author must be 3-100 characters"))]
  pub author: String,
  pub genre: Genre,
  #[validate(length(min = 1, message = "ISBN is required"))]
  pub isbn: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  #[validate(length(max = 500, message = "Description must be under 500 characters"))]
  pub description: Option<String>,
  pub copies: u32,
}

impl BookInput {
  /// Trim text fields; a blank description is dropped.
  pub fn normalized(self) -> Self {
    let description = self
      .description
      .map(|d| d.trim().to_string())
      .filter(|d| !d.is_empty());
    Self {
      title: self.title.trim().to_string(),
      author: self.author.trim().to_string(),
      isbn: self.isbn.trim().to_string(),
      description,
      ..self
    }
  }
}

/// Request to borrow copies of a book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowInput {
  /// Book identifier
  pub book: String,
  pub quantity: u32,
  #[serde(rename = "dueDate")]
  pub due_date: DateTime<Utc>,
}

/// Earliest allowed due date, in days after submission
pub const MIN_DUE_DAYS: i64 = 1;
/// Latest allowed due date, in days after submission
pub const MAX_DUE_DAYS: i64 = 30;
/// Due date offered when the caller doesn't pick one
pub const DEFAULT_DUE_DAYS: i64 = 7;

impl BorrowInput {
  /// One copy, due a week from `now`.
  pub fn new(book: impl Into<String>, now: DateTime<Utc>) -> Self {
    Self {
      book: book.into(),
      quantity: 1,
      due_date: now + Duration::days(DEFAULT_DUE_DAYS),
    }
  }

  pub fn with_quantity(mut self, quantity: u32) -> Self {
    self.quantity = quantity;
    self
  }

  /// Due `days` after `now`. Fails on offsets too large to represent.
  pub fn due_in_days(mut self, now: DateTime<Utc>, days: i64) -> Result<Self, String> {
    self.due_date = Duration::try_days(days)
      .and_then(|offset| now.checked_add_signed(offset))
      .ok_or_else(due_window_error)?;
    Ok(self)
  }

  /// Best-effort check against the book as last seen. The server has the
  /// final word.
  pub fn check_against(&self, book: &Book, now: DateTime<Utc>) -> Result<(), String> {
    if self.book != book.id {
      return Err(format!(
        "Borrow is for book {} but was checked against {}",
        self.book, book.id
      ));
    }
    if !book.is_available() {
      return Err("Book is not available to borrow".to_string());
    }
    if self.quantity < 1 {
      return Err("Minimum 1 book required".to_string());
    }
    if self.quantity > book.copies {
      return Err(format!("Cannot borrow more than {} copies", book.copies));
    }

    let days = (self.due_date.date_naive() - now.date_naive()).num_days();
    if !(MIN_DUE_DAYS..=MAX_DUE_DAYS).contains(&days) {
      return Err(due_window_error());
    }
    Ok(())
  }
}

fn due_window_error() -> String {
  format!(
    "Due date must be between {} and {} days from today",
    MIN_DUE_DAYS, MAX_DUE_DAYS
  )
}

/// A created borrow, as the server reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorrowRecord {
  #[serde(rename = "_id")]
  pub id: String,
  pub book: String,
  pub quantity: u32,
  #[serde(rename = "dueDate")]
  pub due_date: DateTime<Utc>,
  #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
}

/// Book fields carried in the borrow summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryBook {
  pub title: String,
  pub isbn: String,
}

/// Total borrowed quantity for one book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowSummaryEntry {
  pub book: SummaryBook,
  #[serde(rename = "totalQuantity")]
  pub total_quantity: u32,
}

/// Server-side aggregate of all borrows, one entry per book
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BorrowSummary {
  pub entries: Vec<BorrowSummaryEntry>,
}

impl BorrowSummary {
  /// Sum over every book.
  pub fn total_quantity(&self) -> u32 {
    self.entries.iter().map(|e| e.total_quantity).sum()
  }

  pub fn for_isbn(&self, isbn: &str) -> Option<&BorrowSummaryEntry> {
    self.entries.iter().find(|e| e.book.isbn == isbn)
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn dune(copies: u32) -> Book {
    Book {
      id: "b1".into(),
      title: "Dune".into(),
      author: "Herbert".into(),
      genre: Genre::Fiction,
      isbn: "123".into(),
      description: None,
      copies,
      available: copies > 0,
      created_at: None,
      updated_at: None,
    }
  }

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
  }

  #[test]
  fn test_genre_parse() {
    assert_eq!("fiction".parse::<Genre>(), Ok(Genre::Fiction));
    assert_eq!("non-fiction".parse::<Genre>(), Ok(Genre::NonFiction));
    assert_eq!("NON_FICTION".parse::<Genre>(), Ok(Genre::NonFiction));
    assert!("poetry".parse::<Genre>().is_err());
  }

  #[test]
  fn test_book_wire_format() {
    let book: Book = serde_json::from_value(serde_json::json!({
      "_id": "abc",
      "title": "Dune",
      "author": "Herbert",
      "genre": "NON_FICTION",
      "isbn": "123",
      "copies": 0,
      "available": true,
      "createdAt": "2025-01-01T00:00:00.000Z"
    }))
    .unwrap();
    assert_eq!(book.id, "abc");
    assert_eq!(book.genre, Genre::NonFiction);
    assert!(!book.is_available());
    assert!(book.created_at.is_some());
  }

  #[test]
  fn test_book_input_validation() {
    let mut input = dune(2).to_input();
    assert!(input.validate().is_ok());

    input.title = "Du".into();
    let errors = input.validate().unwrap_err();
    assert!(errors.field_errors().contains_key("title"));

    let mut input = dune(2).to_input();
    input.isbn = String::new();
    input.description = Some("x".repeat(501));
    let errors = input.validate().unwrap_err();
    let fields = errors.field_errors();
    assert!(fields.contains_key("isbn"));
    assert!(fields.contains_key("description"));
  }

  #[test]
  fn test_book_input_normalized() {
    let input = BookInput {
      title: "  Dune ".into(),
      author: " Herbert".into(),
      genre: Genre::Fiction,
      isbn: " 123 ".into(),
      description: Some("   ".into()),
      copies: 2,
    }
    .normalized();
    assert_eq!(input.title, "Dune");
    assert_eq!(input.author, "Herbert");
    assert_eq!(input.isbn, "123");
    assert_eq!(input.description, None);
  }

  #[test]
  fn test_book_input_omits_missing_description() {
    let value = serde_json::to_value(dune(1).to_input()).unwrap();
    assert!(value.get("description").is_none());
    assert_eq!(value["genre"], "FICTION");
  }

  #[test]
  fn test_borrow_defaults() {
    let input = BorrowInput::new("b1", now());
    assert_eq!(input.quantity, 1);
    assert_eq!(input.due_date, now() + Duration::days(7));
    assert!(input.check_against(&dune(2), now()).is_ok());

    let value = serde_json::to_value(&input).unwrap();
    assert!(value.get("dueDate").is_some());
  }

  #[test]
  fn test_borrow_quantity_checks() {
    let book = dune(2);
    let too_many = BorrowInput::new("b1", now()).with_quantity(3);
    assert_eq!(
      too_many.check_against(&book, now()),
      Err("Cannot borrow more than 2 copies".to_string())
    );

    let none = BorrowInput::new("b1", now()).with_quantity(0);
    assert!(none.check_against(&book, now()).is_err());

    let all = BorrowInput::new("b1", now()).with_quantity(2);
    assert!(all.check_against(&book, now()).is_ok());

    assert!(BorrowInput::new("b1", now())
      .check_against(&dune(0), now())
      .is_err());
  }

  #[test]
  fn test_borrow_due_date_window() {
    let book = dune(5);
    for (days, ok) in [(0, false), (1, true), (30, true), (31, false)] {
      let input = BorrowInput::new("b1", now()).due_in_days(now(), days).unwrap();
      assert_eq!(input.check_against(&book, now()).is_ok(), ok, "{} days", days);
    }
  }

  #[test]
  fn test_borrow_due_offset_out_of_range() {
    for days in [100_000_000, i64::MAX, i64::MIN] {
      let result = BorrowInput::new("b1", now()).due_in_days(now(), days);
      assert_eq!(result, Err(due_window_error()), "{} days", days);
    }
  }

  #[test]
  fn test_borrow_for_other_book_rejected() {
    let input = BorrowInput::new("other", now());
    assert!(input.check_against(&dune(2), now()).is_err());
  }

  #[test]
  fn test_summary_totals() {
    let summary: BorrowSummary = serde_json::from_value(serde_json::json!([
      { "book": { "title": "Dune", "isbn": "123" }, "totalQuantity": 2 },
      { "book": { "title": "Emma", "isbn": "456" }, "totalQuantity": 3 }
    ]))
    .unwrap();
    assert_eq!(summary.total_quantity(), 5);
    assert_eq!(summary.for_isbn("456").map(|e| e.total_quantity), Some(3));
    assert!(summary.for_isbn("789").is_none());
  }
}
