//! Serde types for the response envelope the library API wraps everything in.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};

/// `{ success, message?, error?, data? }`
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
  #[serde(default)]
  pub success: bool,
  pub message: Option<String>,
  /// Error detail; shape varies by endpoint, so it is kept raw
  pub error: Option<serde_json::Value>,
  pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
  /// Unwrap a body that arrived with a 2xx status.
  pub fn into_data(self, status: u16) -> ApiResult<T> {
    if !self.success {
      return Err(ApiError::Application {
        status,
        message: self.message.or_else(|| error_message(self.error.as_ref())),
      });
    }
    self
      .data
      .ok_or_else(|| ApiError::Parsing("response is missing 'data'".to_string()))
  }

  /// Same as `into_data` for endpoints that answer with no payload.
  pub fn into_unit(self, status: u16) -> ApiResult<()> {
    if !self.success {
      return Err(ApiError::Application {
        status,
        message: self.message.or_else(|| error_message(self.error.as_ref())),
      });
    }
    Ok(())
  }
}

/// Error body of a non-2xx response. Anything unparseable just yields no message.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
  pub message: Option<String>,
  pub error: Option<serde_json::Value>,
}

impl ApiErrorBody {
  pub fn parse(bytes: &[u8]) -> Self {
    serde_json::from_slice(bytes).unwrap_or_default()
  }

  pub fn into_message(self) -> Option<String> {
    self.message.or_else(|| error_message(self.error.as_ref()))
  }
}

/// Pull a readable message out of the free-form `error` field.
fn error_message(error: Option<&serde_json::Value>) -> Option<String> {
  match error? {
    serde_json::Value::String(s) => Some(s.clone()),
    serde_json::Value::Object(map) => map
      .get("message")
      .and_then(|m| m.as_str())
      .map(String::from),
    _ => None,
  }
}

/// Decode a 2xx body into an envelope.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ApiResult<ApiEnvelope<T>> {
  serde_json::from_slice(bytes).map_err(ApiError::from)
}
