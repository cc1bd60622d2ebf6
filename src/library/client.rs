use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::library::api_types::{decode, ApiEnvelope, ApiErrorBody};
use crate::library::types::{Book, BookInput, BorrowInput, BorrowRecord, BorrowSummary};

/// Library API client wrapper. Uncached; every call is one request.
#[derive(Clone)]
pub struct LibraryClient {
  client: reqwest::Client,
  base_url: Url,
}

impl LibraryClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let base_url = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("Invalid API base URL {}", config.base_url));
    }

    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }
    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Get all books
  pub async fn get_books(&self) -> ApiResult<Vec<Book>> {
    let request = self.request(Method::GET, &["books"])?;
    let (status, envelope) = self.execute(request).await?;
    envelope.into_data(status)
  }

  /// Get a single book by id
  pub async fn get_book(&self, id: &str) -> ApiResult<Book> {
    let request = self.request(Method::GET, &["books", id])?;
    let (status, envelope) = self.execute(request).await?;
    envelope.into_data(status)
  }

  pub async fn create_book(&self, input: &BookInput) -> ApiResult<Book> {
    let request = self.request(Method::POST, &["books"])?.json(input);
    let (status, envelope) = self.execute(request).await?;
    envelope.into_data(status)
  }

  /// Replace every writable field of a book
  pub async fn update_book(&self, id: &str, input: &BookInput) -> ApiResult<Book> {
    let request = self.request(Method::PUT, &["books", id])?.json(input);
    let (status, envelope) = self.execute(request).await?;
    envelope.into_data(status)
  }

  pub async fn delete_book(&self, id: &str) -> ApiResult<()> {
    let request = self.request(Method::DELETE, &["books", id])?;
    let (status, envelope) = self.execute::<serde_json::Value>(request).await?;
    envelope.into_unit(status)
  }

  /// Get the per-book borrow totals
  pub async fn get_borrow_summary(&self) -> ApiResult<BorrowSummary> {
    let request = self.request(Method::GET, &["borrow"])?;
    let (status, envelope) = self.execute(request).await?;
    envelope.into_data(status)
  }

  pub async fn create_borrow(&self, input: &BorrowInput) -> ApiResult<BorrowRecord> {
    let request = self.request(Method::POST, &["borrow"])?.json(input);
    let (status, envelope) = self.execute(request).await?;
    envelope.into_data(status)
  }

  /// Build a request for `base_url/segments...`, escaping each segment.
  fn request(&self, method: Method, segments: &[&str]) -> ApiResult<RequestBuilder> {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| ApiError::Transport(format!("invalid base URL {}", self.base_url)))?
      .pop_if_empty()
      .extend(segments);

    debug!(%method, path = url.path(), "request");
    Ok(self.client.request(method, url))
  }

  async fn execute<T: DeserializeOwned>(
    &self,
    request: RequestBuilder,
  ) -> ApiResult<(u16, ApiEnvelope<T>)> {
    let response = request.send().await?;

    let status = response.status();
    let path = response.url().path().to_string();
    let bytes = response.bytes().await?;

    if !status.is_success() {
      let message = ApiErrorBody::parse(&bytes).into_message();
      warn!(status = status.as_u16(), %path, message = ?message, "request rejected");
      return Err(ApiError::from_status(status.as_u16(), message));
    }

    Ok((status.as_u16(), decode(&bytes)?))
  }
}
