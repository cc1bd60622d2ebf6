//! Error taxonomy for calls against the library API.
//!
//! Every failure is per-operation and recoverable by retrying. The resource
//! clients never recover on their own; they hand the error to the caller,
//! which decides how to present it.

use thiserror::Error;

/// Fallback shown when neither the transport nor the server said anything useful.
pub const GENERIC_FAILURE: &str = "Something went wrong. Try again";

/// A failed request against the library API.
///
/// `Clone` so a single in-flight result can be handed to every caller that
/// joined it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
  /// Network unreachable, DNS failure, timeout, connection reset.
  #[error("transport error: {0}")]
  Transport(String),

  /// The response body could not be decoded.
  #[error("failed to parse response: {0}")]
  Parsing(String),

  /// The server has no record with the requested identifier (HTTP 404).
  #[error("not found{}", fmt_message(.message))]
  NotFound { message: Option<String> },

  /// The write collides with existing state, e.g. a duplicate isbn or a
  /// borrow larger than the remaining copies (HTTP 409).
  #[error("conflict{}", fmt_message(.message))]
  Conflict { message: Option<String> },

  /// Any other non-2xx status, or `success: false` in a well-formed body.
  #[error("request failed with status {status}{}", fmt_message(.message))]
  Application { status: u16, message: Option<String> },

  /// A client-side pre-check refused the request before anything was sent.
  #[error("rejected: {0}")]
  Rejected(String),
}

fn fmt_message(message: &Option<String>) -> String {
  match message {
    Some(m) => format!(": {}", m),
    None => String::new(),
  }
}

impl ApiError {
  /// Map an HTTP status and optional server message onto the taxonomy.
  pub fn from_status(status: u16, message: Option<String>) -> Self {
    match status {
      404 => ApiError::NotFound { message },
      409 => ApiError::Conflict { message },
      _ => ApiError::Application { status, message },
    }
  }

  /// HTTP-like status, if the failure came from a server response.
  pub fn status(&self) -> Option<u16> {
    match self {
      ApiError::NotFound { .. } => Some(404),
      ApiError::Conflict { .. } => Some(409),
      ApiError::Application { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// Message supplied by the server, if any.
  pub fn server_message(&self) -> Option<&str> {
    match self {
      ApiError::NotFound { message }
      | ApiError::Conflict { message }
      | ApiError::Application { message, .. } => message.as_deref(),
      _ => None,
    }
  }

  /// Transport-level error string, if the request never got a response.
  pub fn transport_error(&self) -> Option<&str> {
    match self {
      ApiError::Transport(e) => Some(e),
      _ => None,
    }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, ApiError::NotFound { .. })
  }

  pub fn is_conflict(&self) -> bool {
    matches!(self, ApiError::Conflict { .. })
  }

  /// Whether repeating the same request could plausibly succeed.
  pub fn is_retryable(&self) -> bool {
    match self {
      ApiError::Transport(_) => true,
      ApiError::Application { status, .. } => *status >= 500,
      _ => false,
    }
  }

  /// Collapse the taxonomy into a single line for the user.
  ///
  /// Transport errors are shown verbatim, then any server message, then a
  /// generic fallback.
  pub fn user_message(&self) -> String {
    if let Some(e) = self.transport_error() {
      return e.to_string();
    }
    if let ApiError::Rejected(reason) = self {
      return reason.clone();
    }
    self
      .server_message()
      .map(String::from)
      .unwrap_or_else(|| GENERIC_FAILURE.to_string())
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      ApiError::Parsing(e.to_string())
    } else {
      ApiError::Transport(e.to_string())
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(e: serde_json::Error) -> Self {
    ApiError::Parsing(e.to_string())
  }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
