//! Session start over the chat Web API.

use crate::traits::TransportError;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    ok: bool,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the session-start endpoint (`rtm.connect`).
#[derive(Debug, Clone)]
pub struct SessionClient {
    http: reqwest::Client,
    api_base: String,
}

impl SessionClient {
    /// Create a client for the Web API rooted at `api_base`.
    #[must_use]
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Start a realtime session, returning the websocket URL to dial.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Handshake`] if the request fails, the API
    /// answers with a non-success status or `ok: false`, or no URL is given.
    pub async fn start(&self, token: &str) -> Result<String, TransportError> {
        let endpoint = format!("{}/rtm.connect", self.api_base);

        let res = self
            .http
            .post(&endpoint)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        if !res.status().is_success() {
            return Err(TransportError::Handshake(format!(
                "{} returned {}",
                endpoint,
                res.status()
            )));
        }

        let body = res
            .json::<ConnectResponse>()
            .await
            .map_err(|e| TransportError::Handshake(format!("Invalid response: {}", e)))?;

        if !body.ok {
            return Err(TransportError::Handshake(
                body.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        let url = body
            .url
            .ok_or_else(|| TransportError::Handshake("response has no url".to_string()))?;

        debug!(endpoint = %endpoint, "Session started");
        Ok(url)
    }
}
