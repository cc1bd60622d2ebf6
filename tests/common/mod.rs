//! In-process stand-in for the library API, built on wiremock.

#![allow(dead_code)]

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use stacks::cache::QueryCache;
use stacks::config::{ApiConfig, CacheConfig};
use stacks::library::types::{Book, BookInput, BorrowInput};
use stacks::library::LibraryClient;
use stacks::Library;

#[derive(Default)]
struct State {
  books: BTreeMap<String, Book>,
  /// (book id, quantity)
  borrows: Vec<(String, u32)>,
  next_id: u32,
}

/// Stateful fake of the books and borrow endpoints.
#[derive(Clone, Default)]
pub struct FakeLibrary {
  state: Arc<Mutex<State>>,
  delay: Duration,
}

impl FakeLibrary {
  pub fn with_delay(delay: Duration) -> Self {
    Self {
      delay,
      ..Self::default()
    }
  }

  /// Insert a book directly, bypassing the API.
  pub fn seed(&self, input: BookInput) -> Book {
    let mut state = self.state.lock().unwrap();
    insert_book(&mut state, input)
  }

  pub fn copies_of(&self, id: &str) -> Option<u32> {
    self.state.lock().unwrap().books.get(id).map(|b| b.copies)
  }

  fn handle(&self, request: &Request) -> ResponseTemplate {
    let mut state = self.state.lock().unwrap();
    let segments: Vec<&str> = request
      .url
      .path_segments()
      .map(|s| s.filter(|p| !p.is_empty()).collect())
      .unwrap_or_default();

    match (request.method.as_str(), segments.as_slice()) {
      ("GET", ["api", "books"]) => {
        let books: Vec<&Book> = state.books.values().collect();
        ok(200, json!(books))
      }
      ("GET", ["api", "books", id]) => match state.books.get(*id) {
        Some(book) => ok(200, json!(book)),
        None => fail(404, "Book not found"),
      },
      ("POST", ["api", "books"]) => {
        let Ok(input) = serde_json::from_slice::<BookInput>(&request.body) else {
          return fail(400, "Validation failed");
        };
        if state.books.values().any(|b| b.isbn == input.isbn) {
          return fail(409, "ISBN already exists");
        }
        let book = insert_book(&mut state, input);
        ok(201, json!(book))
      }
      ("PUT", ["api", "books", id]) => {
        let Ok(input) = serde_json::from_slice::<BookInput>(&request.body) else {
          return fail(400, "Validation failed");
        };
        if !state.books.contains_key(*id) {
          return fail(404, "Book not found");
        }
        if state
          .books
          .values()
          .any(|b| b.isbn == input.isbn && b.id != *id)
        {
          return fail(409, "ISBN already exists");
        }
        let book = state.books.get_mut(*id).unwrap();
        book.title = input.title;
        book.author = input.author;
        book.genre = input.genre;
        book.isbn = input.isbn;
        book.description = input.description;
        book.copies = input.copies;
        book.available = input.copies > 0;
        ok(200, json!(book))
      }
      ("DELETE", ["api", "books", id]) => match state.books.remove(*id) {
        Some(_) => ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": null })),
        None => fail(404, "Book not found"),
      },
      ("GET", ["api", "borrow"]) => {
        let mut totals: BTreeMap<String, u32> = BTreeMap::new();
        for (book, quantity) in &state.borrows {
          *totals.entry(book.clone()).or_default() += quantity;
        }
        let summary: Vec<_> = totals
          .iter()
          .filter_map(|(id, total)| {
            state.books.get(id).map(|b| {
              json!({
                "book": { "title": b.title, "isbn": b.isbn },
                "totalQuantity": total
              })
            })
          })
          .collect();
        ok(200, json!(summary))
      }
      ("POST", ["api", "borrow"]) => {
        let Ok(input) = serde_json::from_slice::<BorrowInput>(&request.body) else {
          return fail(400, "Validation failed");
        };
        let Some(book) = state.books.get_mut(&input.book) else {
          return fail(404, "Book not found");
        };
        if input.quantity > book.copies {
          return fail(409, "Not enough copies available");
        }
        book.copies -= input.quantity;
        book.available = book.copies > 0;
        state.borrows.push((input.book.clone(), input.quantity));
        let id = format!("borrow-{}", state.borrows.len());
        ok(
          201,
          json!({
            "_id": id,
            "book": input.book,
            "quantity": input.quantity,
            "dueDate": input.due_date
          }),
        )
      }
      _ => fail(404, "Route not found"),
    }
  }
}

impl Respond for FakeLibrary {
  fn respond(&self, request: &Request) -> ResponseTemplate {
    self.handle(request).set_delay(self.delay)
  }
}

fn insert_book(state: &mut State, input: BookInput) -> Book {
  state.next_id += 1;
  let book = Book {
    id: format!("book-{}", state.next_id),
    title: input.title,
    author: input.author,
    genre: input.genre,
    isbn: input.isbn,
    description: input.description,
    copies: input.copies,
    available: input.copies > 0,
    created_at: None,
    updated_at: None,
  };
  state.books.insert(book.id.clone(), book.clone());
  book
}

fn ok(status: u16, data: serde_json::Value) -> ResponseTemplate {
  ResponseTemplate::new(status).set_body_json(json!({ "success": true, "data": data }))
}

fn fail(status: u16, message: &str) -> ResponseTemplate {
  ResponseTemplate::new(status).set_body_json(json!({ "success": false, "message": message }))
}

/// A running fake API plus a library wired to it with its own cache.
pub struct Harness {
  pub server: MockServer,
  pub fake: FakeLibrary,
  pub library: Library,
}

impl Harness {
  pub async fn start() -> Self {
    Self::start_with(FakeLibrary::default()).await
  }

  pub async fn start_with(fake: FakeLibrary) -> Self {
    let server = MockServer::start().await;
    Mock::given(any())
      .respond_with(fake.clone())
      .mount(&server)
      .await;

    let client = LibraryClient::new(&ApiConfig {
      base_url: format!("{}/api", server.uri()),
      timeout_secs: Some(5),
    })
    .unwrap();
    let cache = QueryCache::new(&CacheConfig::default());
    let library = Library::with_parts(client, cache);

    Self {
      server,
      fake,
      library,
    }
  }

  /// How many requests hit `method path` so far.
  pub async fn requests(&self, method: &str, path: &str) -> usize {
    self
      .server
      .received_requests()
      .await
      .unwrap_or_default()
      .iter()
      .filter(|r| r.method.as_str() == method && r.url.path() == path)
      .count()
  }
}
