use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{Fetch, RemoteApi};
use crate::error::{Result, SyncError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for the remote API
#[derive(Clone)]
pub struct HttpApi {
  client: reqwest::Client,
  base_url: String,
}

impl HttpApi {
  pub fn new(base_url: &str) -> Result<Self> {
    let base_url = normalize_base_url(base_url)?;
    let client = reqwest::Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .user_agent(concat!("fitsync/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self { client, base_url })
  }
}

/// Validate the base URL and strip trailing slashes so catalog paths append cleanly.
fn normalize_base_url(base_url: &str) -> Result<String> {
  let parsed = Url::parse(base_url)
    .map_err(|e| SyncError::Catalog(format!("invalid API base URL {}: {}", base_url, e)))?;
  if !matches!(parsed.scheme(), "http" | "https") {
    return Err(SyncError::Catalog(format!(
      "API base URL {} must be http or https",
      base_url
    )));
  }
  Ok(base_url.trim_end_matches('/').to_string())
}

#[async_trait]
impl RemoteApi for HttpApi {
  fn url_for(&self, path: &str) -> String {
    format!("{}{}", self.base_url, path)
  }

  async fn get_json(&self, url: &str, access_token: &str) -> Result<Fetch> {
    debug!(url, "GET");

    let response = self.client.get(url).bearer_auth(access_token).send().await?;
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
      let retry_after = retry_after(response.headers());
      warn!(url, ?retry_after, "Remote rate limit hit");
      return Ok(Fetch::Limited { retry_after });
    }

    let body = response.bytes().await?;
    interpret_response(url, status, &body).map(Fetch::Fetched)
  }
}

/// Turn a non-429 response into a payload or a fatal error.
pub(crate) fn interpret_response(url: &str, status: StatusCode, body: &[u8]) -> Result<Value> {
  let parsed: std::result::Result<Value, _> = serde_json::from_slice(body);

  if !status.is_success() {
    let message = match &parsed {
      Ok(value) => error_message(value).unwrap_or_else(|| value.to_string()),
      Err(_) => String::from_utf8_lossy(body).into_owned(),
    };
    return Err(SyncError::Remote {
      url: url.to_string(),
      status: status.as_u16(),
      message,
    });
  }

  let value = parsed.map_err(|e| SyncError::MalformedResponse {
    url: url.to_string(),
    reason: e.to_string(),
  })?;

  if let Some(message) = error_message(&value) {
    return Err(SyncError::Remote {
      url: url.to_string(),
      status: status.as_u16(),
      message,
    });
  }

  Ok(value)
}

/// Error text from a Fitbit-style `{"errors": [{"errorType", "message"}]}` body.
fn error_message(value: &Value) -> Option<String> {
  let errors = value.get("errors")?.as_array()?;
  if errors.is_empty() {
    return None;
  }

  let messages: Vec<String> = errors
    .iter()
    .map(|e| {
      let kind = e.get("errorType").and_then(Value::as_str).unwrap_or("error");
      let message = e.get("message").and_then(Value::as_str).unwrap_or("");
      format!("{}: {}", kind, message)
    })
    .collect();
  Some(messages.join("; "))
}

/// Seconds until the quota resets, from `Retry-After` or Fitbit's own header.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
  ["retry-after", "fitbit-rate-limit-reset"]
    .iter()
    .filter_map(|name| headers.get(*name))
    .filter_map(|v| v.to_str().ok())
    .filter_map(|v| v.trim().parse::<u64>().ok())
    .map(Duration::from_secs)
    .next()
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::header::HeaderValue;
  use serde_json::json;

  #[test]
  fn test_success_body_is_returned() {
    let value = interpret_response("u", StatusCode::OK, br#"{"user":{"encodedId":"X"}}"#).unwrap();
    assert_eq!(value, json!({"user": {"encodedId": "X"}}));
  }

  #[test]
  fn test_error_payload_on_success_status_is_fatal() {
    let body = br#"{"errors":[{"errorType":"invalid_token","message":"expired"}],"success":false}"#;
    let err = interpret_response("u", StatusCode::OK, body).unwrap_err();
    match err {
      SyncError::Remote { status, message, .. } => {
        assert_eq!(status, 200);
        assert_eq!(message, "invalid_token: expired");
      }
      other => panic!("unexpected error {other:?}"),
    }
  }

  #[test]
  fn test_error_status_is_fatal() {
    let err = interpret_response("u", StatusCode::UNAUTHORIZED, b"nope").unwrap_err();
    assert!(matches!(err, SyncError::Remote { status: 401, .. }));
  }

  #[test]
  fn test_malformed_body() {
    let err = interpret_response("u", StatusCode::OK, b"<html>").unwrap_err();
    assert!(matches!(err, SyncError::MalformedResponse { .. }));
  }

  #[test]
  fn test_retry_after_headers() {
    let mut headers = HeaderMap::new();
    assert_eq!(retry_after(&headers), None);

    headers.insert("fitbit-rate-limit-reset", HeaderValue::from_static("1200"));
    assert_eq!(retry_after(&headers), Some(Duration::from_secs(1200)));

    headers.insert("retry-after", HeaderValue::from_static("30"));
    assert_eq!(retry_after(&headers), Some(Duration::from_secs(30)));
  }

  #[test]
  fn test_base_url_normalization() {
    assert_eq!(
      normalize_base_url("https://api.fitbit.com/1/user/").unwrap(),
      "https://api.fitbit.com/1/user"
    );
    assert!(normalize_base_url("ftp://example.com").is_err());
    assert!(normalize_base_url("not a url").is_err());
  }
}
