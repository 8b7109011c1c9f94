//! Low-level JSON clients for the two AWS wire protocols in use.
//!
//! - **AWS JSON** (`states`, `events`): every call is a `POST /` with the
//!   operation named in the `X-Amz-Target` header.
//! - **REST-JSON** (`scheduler`): resources are addressed by path and verb.
//!
//! Requests are not signed. The clients target an explicit endpoint, such as
//! a local emulator or a signing proxy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RemoteError, Result};

/// Build the shared HTTP client used by all adapters.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .map_err(RemoteError::from)
}

/// Client for the AWS JSON protocol.
#[derive(Debug, Clone)]
pub struct AwsJsonClient {
    client: reqwest::Client,
    endpoint: String,
    target_prefix: &'static str,
    content_type: &'static str,
}

impl AwsJsonClient {
    /// Create a new client.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        target_prefix: &'static str,
        content_type: &'static str,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            target_prefix,
            content_type,
        }
    }

    /// Get the endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Invoke an operation and decode its output.
    ///
    /// # Errors
    ///
    /// Returns the classified service error, a transport error, or
    /// `InvalidResponse` if the body cannot be decoded.
    pub async fn call<I, O>(&self, operation: &str, input: &I) -> Result<O>
    where
        I: Serialize + ?Sized + Sync,
        O: DeserializeOwned,
    {
        let body = serde_json::to_vec(input)
            .map_err(|e| RemoteError::InvalidRequest(format!("{operation}: {e}")))?;

        debug!(target_prefix = self.target_prefix, operation, "Calling remote API");

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Amz-Target", format!("{}.{operation}", self.target_prefix))
            .header(CONTENT_TYPE, self.content_type)
            .body(body)
            .send()
            .await?;

        decode(response).await
    }
}

/// Client for the REST-JSON protocol.
#[derive(Debug, Clone)]
pub struct RestJsonClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RestJsonClient {
    /// Create a new client.
    #[must_use]
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Send a request to the resource at `segments` and decode the output.
    ///
    /// Each path segment is percent-encoded, so ARNs may be passed as-is.
    ///
    /// # Errors
    ///
    /// Returns the classified service error, a transport error, or
    /// `InvalidResponse` if the body cannot be decoded.
    pub async fn request<I, O>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<&I>,
    ) -> Result<O>
    where
        I: Serialize + ?Sized + Sync,
        O: DeserializeOwned,
    {
        let url = self.url(segments, query)?;
        debug!(method = %method, url = %url, "Calling remote API");

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| RemoteError::InvalidRequest(e.to_string()))?;
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(bytes);
        }

        decode(request.send().await?).await
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| RemoteError::InvalidRequest(format!("endpoint {}: {e}", self.endpoint)))?;
        url.path_segments_mut()
            .map_err(|()| {
                RemoteError::InvalidRequest(format!("endpoint {} cannot be a base", self.endpoint))
            })?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

/// An output with no fields of interest.
#[derive(Debug, Default, Deserialize)]
pub struct Empty {}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", alias = "Code", alias = "code", default)]
    error_type: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

async fn decode<O: DeserializeOwned>(response: Response) -> Result<O> {
    let status = response.status();
    let header_type = response
        .headers()
        .get("x-amzn-ErrorType")
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let bytes = response.bytes().await?;

    if !status.is_success() {
        return Err(error_from_body(status.as_u16(), header_type, &bytes));
    }

    let bytes: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
    serde_json::from_slice(bytes).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
}

fn error_from_body(status: u16, header_type: Option<String>, body: &[u8]) -> RemoteError {
    let parsed: Option<ErrorBody> = serde_json::from_slice(body).ok();
    let (body_type, message) = parsed.map_or((None, None), |b| (b.error_type, b.message));

    let raw = header_type
        .or(body_type)
        .unwrap_or_else(|| "UnknownError".to_string());
    // `com.amazonaws.states#StateMachineDoesNotExist` or `Code:extra` forms
    let code = raw
        .rsplit('#')
        .next()
        .unwrap_or(&raw)
        .split(':')
        .next()
        .unwrap_or(&raw);

    let message = message.unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
    RemoteError::from_code(code, message, status)
}

/// Convert epoch seconds (as sent by the JSON protocols) into a timestamp.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_type_strips_namespace() {
        let err = error_from_body(
            400,
            None,
            br#"{"__type":"com.amazonaws.states#StateMachineDoesNotExist","message":"gone"}"#,
        );
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: gone");
    }

    #[test]
    fn header_error_type_wins() {
        let err = error_from_body(
            409,
            Some("ConflictException:http://internal".to_string()),
            br#"{"Message":"in use"}"#,
        );
        assert!(matches!(err, RemoteError::Conflict(ref m) if m == "in use"));
    }

    #[test]
    fn unparseable_body_is_api_error() {
        let err = error_from_body(502, None, b"bad gateway");
        match err {
            RemoteError::Api {
                code,
                message,
                status,
            } => {
                assert_eq!(code, "UnknownError");
                assert_eq!(message, "bad gateway");
                assert_eq!(status, 502);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn epoch_conversion() {
        let ts = epoch_seconds(1_700_000_000.5).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn rest_url_encodes_segments() {
        let client = RestJsonClient::new(reqwest::Client::new(), "http://localhost:4566/");
        let url = client
            .url(
                &["tags", "arn:aws:scheduler:us-east-1:1:schedule/default/nightly"],
                &[],
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:4566/tags/arn:aws:scheduler:us-east-1:1:schedule%2Fdefault%2Fnightly"
        );
    }
}
