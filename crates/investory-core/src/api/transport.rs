//! Raw HTTP exchange with the authority: URL building, bearer attachment,
//! status checking and response envelope decoding. No refresh logic lives here.

use std::time::Duration;

use reqwest::{header, Client, Response};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use super::{ApiError, ApiRequest};
use crate::models::Ack;

/// Success envelope wrapping every authority response
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

/// HTTP transport.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    base_url: String,
}

impl Transport {
    /// Create a transport whose every call is bounded by `timeout`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send `request`, attaching `token` as a bearer credential when given.
    /// Non-success statuses come back as `Err`.
    pub async fn execute(&self, request: &ApiRequest, token: Option<&str>) -> Result<Response, ApiError> {
        let url = self.url(&request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(header::ACCEPT, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, url = %url, authenticated = token.is_some(), "Sending request");

        let response = builder.send().await?;
        Self::check_response(response).await
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "Request rejected");
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Decode the `data` member of a success envelope
    pub async fn decode_data<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let text = response.text().await?;
        let envelope: Envelope<T> = serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response envelope: {}", e)))?;
        envelope
            .data
            .ok_or_else(|| ApiError::InvalidResponse("Response envelope has no data".to_string()))
    }

    /// Read the message of a success envelope. Empty bodies are accepted.
    pub async fn decode_ack(response: Response) -> Result<Ack, ApiError> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Ack::default());
        }
        let envelope: Envelope<serde_json::Value> = serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response envelope: {}", e)))?;
        Ok(Ack {
            message: envelope.message,
        })
    }
}
