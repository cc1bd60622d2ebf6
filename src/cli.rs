//! Command-line front end over the resource clients.

use chrono::Utc;
use clap::{Args, Subcommand};
use color_eyre::{eyre::eyre, Result};
use validator::Validate;

use stacks::library::types::{Book, BookInput, BorrowInput, BorrowSummary, Genre};
use stacks::{ApiError, Library};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Browse and manage books
  #[command(subcommand)]
  Books(BookCommand),

  /// Borrow copies of a book
  Borrow {
    /// Book id
    book_id: String,

    #[arg(short, long, default_value_t = 1)]
    quantity: u32,

    /// Due date, in days from today (1-30)
    #[arg(short, long, default_value_t = stacks::library::types::DEFAULT_DUE_DAYS)]
    due_in: i64,
  },

  /// Show total borrowed copies per book
  Summary,
}

#[derive(Subcommand, Debug)]
pub enum BookCommand {
  /// List all books
  #[command(alias = "ls")]
  List,

  /// Show one book
  Show { id: String },

  /// Add a book
  Add(NewBook),

  /// Change fields of a book
  Edit {
    id: String,
    #[command(flatten)]
    changes: BookChanges,
  },

  /// Delete a book
  #[command(alias = "rm")]
  Delete { id: String },
}

#[derive(Args, Debug)]
pub struct NewBook {
  #[arg(long)]
  title: String,
  #[arg(long)]
  author: String,
  /// FICTION, NON_FICTION, SCIENCE, HISTORY, BIOGRAPHY or FANTASY
  #[arg(long)]
  genre: Genre,
  #[arg(long)]
  isbn: String,
  #[arg(long)]
  description: Option<String>,
  #[arg(long, default_value_t = 0)]
  copies: u32,
}

#[derive(Args, Debug, Default)]
pub struct BookChanges {
  #[arg(long)]
  title: Option<String>,
  #[arg(long)]
  author: Option<String>,
  #[arg(long)]
  genre: Option<Genre>,
  #[arg(long)]
  isbn: Option<String>,
  /// Pass an empty string to clear
  #[arg(long)]
  description: Option<String>,
  #[arg(long)]
  copies: Option<u32>,
}

impl From<NewBook> for BookInput {
  fn from(b: NewBook) -> Self {
    BookInput {
      title: b.title,
      author: b.author,
      genre: b.genre,
      isbn: b.isbn,
      description: b.description,
      copies: b.copies,
    }
  }
}

impl BookChanges {
  /// Overlay the given fields on an existing book.
  fn apply(self, book: &Book) -> BookInput {
    let base = book.to_input();
    BookInput {
      title: self.title.unwrap_or(base.title),
      author: self.author.unwrap_or(base.author),
      genre: self.genre.unwrap_or(base.genre),
      isbn: self.isbn.unwrap_or(base.isbn),
      // An empty --description clears it.
      description: match self.description {
        Some(d) if d.trim().is_empty() => None,
        Some(d) => Some(d),
        None => base.description,
      },
      copies: self.copies.unwrap_or(base.copies),
    }
  }
}

pub async fn run(library: &Library, command: Command) -> Result<()> {
  match command {
    Command::Books(BookCommand::List) => {
      let books = library.books.list_books().await.map_err(report)?;
      print_books(&books);
    }
    Command::Books(BookCommand::Show { id }) => {
      let book = library.books.get_book(&id).await.map_err(report)?;
      print_book(&book);
    }
    Command::Books(BookCommand::Add(new_book)) => {
      let input = checked(BookInput::from(new_book))?;
      let book = library.books.create_book(&input).await.map_err(|e| {
        if e.is_conflict() {
          eyre!("{}. Try with another ISBN", e.user_message())
        } else {
          report(e)
        }
      })?;
      println!("Book added: {} ({})", book.title, book.id);
    }
    Command::Books(BookCommand::Edit { id, changes }) => {
      let book = library.books.get_book(&id).await.map_err(report)?;
      let input = checked(changes.apply(&book))?;
      let updated = library
        .books
        .update_book(&id, &input)
        .await
        .map_err(report)?;
      println!("Book updated: {} ({})", updated.title, updated.id);
    }
    Command::Books(BookCommand::Delete { id }) => {
      library.books.delete_book(&id).await.map_err(report)?;
      println!("Book deleted: {}", id);
    }
    Command::Borrow {
      book_id,
      quantity,
      due_in,
    } => {
      let now = Utc::now();
      let input = BorrowInput::new(&book_id, now)
        .with_quantity(quantity)
        .due_in_days(now, due_in)
        .map_err(|e| report(ApiError::Rejected(e)))?;
      let book = library.books.get_book(&book_id).await.map_err(report)?;
      library
        .borrows
        .borrow_book(&book, &input, now)
        .await
        .map_err(report)?;
      println!(
        "Borrowed {} x {}, due {}",
        input.quantity,
        book.title,
        input.due_date.format("%Y-%m-%d")
      );
    }
    Command::Summary => {
      let summary = library
        .borrows
        .list_borrow_summary()
        .await
        .map_err(report)?;
      print_summary(&summary);
    }
  }
  Ok(())
}

fn report(e: ApiError) -> color_eyre::Report {
  tracing::debug!(error = ?e, "command failed");
  eyre!(e.user_message())
}

/// Trim and validate form input before it is sent.
fn checked(input: BookInput) -> Result<BookInput> {
  let input = input.normalized();
  if let Err(errors) = input.validate() {
    let mut messages: Vec<String> = errors
      .field_errors()
      .into_iter()
      .flat_map(|(field, errs)| {
        errs.iter().map(move |e| match &e.message {
          Some(m) => m.to_string(),
          None => format!("{} is invalid", field),
        })
      })
      .collect();
    messages.sort();
    return Err(eyre!("Invalid book:\n  {}", messages.join("\n  ")));
  }
  Ok(input)
}

fn print_books(books: &[Book]) {
  if books.is_empty() {
    println!("No books.");
    return;
  }
  println!(
    "{:<26} {:<30} {:<20} {:<12} {:<15} {:>6}  {}",
    "ID", "TITLE", "AUTHOR", "GENRE", "ISBN", "COPIES", "AVAILABLE"
  );
  for book in books {
    println!(
      "{:<26} {:<30} {:<20} {:<12} {:<15} {:>6}  {}",
      book.id,
      truncate(&book.title, 30),
      truncate(&book.author, 20),
      book.genre,
      truncate(&book.isbn, 15),
      book.copies,
      if book.is_available() { "Yes" } else { "No" }
    );
  }
}

fn print_book(book: &Book) {
  println!("{}", book.title);
  println!("  by {}", book.author);
  println!("  Genre:            {}", book.genre);
  println!("  ISBN:             {}", book.isbn);
  println!("  Available copies: {}", book.copies);
  println!(
    "  Available:        {}",
    if book.is_available() { "Yes" } else { "No" }
  );
  if let Some(description) = &book.description {
    println!();
    println!("  {}", description);
  }
}

fn print_summary(summary: &BorrowSummary) {
  if summary.is_empty() {
    println!("Nothing borrowed.");
    return;
  }
  println!("{:<30} {:<15} {:>8}", "TITLE", "ISBN", "QUANTITY");
  for entry in &summary.entries {
    println!(
      "{:<30} {:<15} {:>8}",
      truncate(&entry.book.title, 30),
      truncate(&entry.book.isbn, 15),
      entry.total_quantity
    );
  }
  println!("{:<30} {:<15} {:>8}", "Total", "", summary.total_quantity());
}

fn truncate(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
  }
}
