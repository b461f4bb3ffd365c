use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::error::ApiFailure;
use crate::transport::RawResponse;

/// Successful response body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

/// Outcome of one API call
pub type ApiResult<T = Payload> = Result<T, ApiFailure>;

impl Payload {
    pub fn null() -> Self {
        Payload::Json(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Payload::Json(Value::Null))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Json(_) => None,
        }
    }

    /// Deserialize a JSON payload into a caller type
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, PayloadError> {
        match self {
            Payload::Json(value) => Ok(serde_json::from_value(value)?),
            Payload::Text(_) => Err(PayloadError::NotJson),
        }
    }
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Expected a JSON response body")]
    NotJson,

    #[error("Unexpected response shape: {0}")]
    Shape(#[from] serde_json::Error),
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Json(value) => write!(f, "{}", value),
            Payload::Text(text) => f.write_str(text),
        }
    }
}

/// Map a raw response onto success or a typed failure.
///
/// Never fails on a malformed body: a success status with unparseable JSON
/// degrades to `Payload::Text`, and an error status with unparseable JSON
/// uses the raw text as the failure message.
pub fn normalize(response: RawResponse) -> ApiResult {
    let status = response.status;

    if status >= 400 {
        return Err(failure_from(status, &response));
    }

    let text = String::from_utf8_lossy(&response.body).into_owned();

    if text.trim().is_empty() && (status == 204 || response.is_json()) {
        return Ok(Payload::null());
    }

    if response.is_json() {
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => return Ok(Payload::Json(value)),
            Err(e) => {
                tracing::debug!("Malformed JSON body on status {}: {}", status, e);
            }
        }
    }

    Ok(Payload::Text(text))
}

fn failure_from(status: u16, response: &RawResponse) -> ApiFailure {
    let text = String::from_utf8_lossy(&response.body).trim().to_string();

    if text.is_empty() {
        return ApiFailure::from_status(status);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(body)) => {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .or_else(|| body.get("message").and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| text.clone());

            let details = body
                .get("details")
                .or_else(|| body.get("field_errors"))
                .filter(|value| !value.is_null())
                .cloned();

            ApiFailure::new(status, message, details)
        }
        _ => ApiFailure::new(status, text, None),
    }
}
