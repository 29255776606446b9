//! Channel directory: resolves channel names to ids through the Web API.

use async_trait::async_trait;
use chanrelay_core::ChannelId;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Channels requested per page.
const PAGE_SIZE: &str = "200";

/// Directory lookup errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The HTTP request failed or returned a non-JSON body.
    #[error("Directory request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API answered with `ok: false`.
    #[error("Directory lookup rejected: {0}")]
    Rejected(String),
}

/// Looks up channels by name.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// Id of the channel called `name`, if any. A leading `#` is ignored.
    async fn find_by_name(&self, name: &str) -> Result<Option<ChannelId>, DirectoryError>;
}

/// Directory backed by `conversations.list`.
#[derive(Clone)]
pub struct SlackDirectory {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ConversationsPage {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channels: Vec<Conversation>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct Conversation {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

impl SlackDirectory {
    /// Create a directory for the Web API rooted at `api_base`.
    #[must_use]
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<ConversationsPage, DirectoryError> {
        let mut query = vec![
            ("limit", PAGE_SIZE),
            ("exclude_archived", "true"),
            ("types", "public_channel,private_channel"),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }

        let page: ConversationsPage = self
            .http
            .get(format!("{}/conversations.list", self.api_base))
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !page.ok {
            return Err(DirectoryError::Rejected(
                page.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }
        Ok(page)
    }
}

impl std::fmt::Debug for SlackDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackDirectory")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChannelDirectory for SlackDirectory {
    async fn find_by_name(&self, name: &str) -> Result<Option<ChannelId>, DirectoryError> {
        let name = name.trim_start_matches('#');
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let page = self.fetch_page(cursor.as_deref()).await?;
            pages += 1;

            if let Some(channel) = page.channels.into_iter().find(|c| c.name == name) {
                debug!(name = %name, id = %channel.id, pages, "Resolved channel");
                return Ok(Some(channel.id));
            }

            match page.response_metadata.map(|m| m.next_cursor) {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => {
                    debug!(name = %name, pages, "Channel not found");
                    return Ok(None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(channels: &[(&str, &str)], next_cursor: &str) -> serde_json::Value {
        let channels: Vec<_> = channels
            .iter()
            .map(|(id, name)| json!({ "id": id, "name": name, "is_channel": true }))
            .collect();
        json!({
            "ok": true,
            "channels": channels,
            "response_metadata": { "next_cursor": next_cursor },
        })
    }

    #[tokio::test]
    async fn test_resolves_name_on_first_page() {
        let api = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .and(header("authorization", "Bearer xoxb-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(page(&[("C1", "general"), ("C2", "alerts")], "")),
            )
            .mount(&api)
            .await;

        let directory = SlackDirectory::new(api.uri(), "xoxb-test");
        assert_eq!(
            directory.find_by_name("alerts").await.unwrap(),
            Some("C2".to_string())
        );
        assert_eq!(
            directory.find_by_name("#general").await.unwrap(),
            Some("C1".to_string())
        );
    }

    #[tokio::test]
    async fn test_follows_cursor_pagination() {
        let api = MockServer::start().await;
        // Mounted first so it takes precedence for the cursor request.
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .and(query_param("cursor", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[("C9", "ops")], "")))
            .expect(1)
            .mount(&api)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page(&[("C1", "general")], "page2")),
            )
            .mount(&api)
            .await;

        let directory = SlackDirectory::new(api.uri(), "xoxb-test");
        assert_eq!(
            directory.find_by_name("ops").await.unwrap(),
            Some("C9".to_string())
        );
    }

    #[tokio::test]
    async fn test_unknown_channel() {
        let api = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[("C1", "general")], "")))
            .mount(&api)
            .await;

        let directory = SlackDirectory::new(api.uri(), "xoxb-test");
        assert_eq!(directory.find_by_name("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejected_lookup() {
        let api = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "error": "invalid_auth" })),
            )
            .mount(&api)
            .await;

        let directory = SlackDirectory::new(api.uri(), "bad");
        match directory.find_by_name("general").await {
            Err(DirectoryError::Rejected(reason)) => assert_eq!(reason, "invalid_auth"),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_error_is_request_failure() {
        let api = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&api)
            .await;

        let directory = SlackDirectory::new(api.uri(), "xoxb-test");
        assert!(matches!(
            directory.find_by_name("general").await,
            Err(DirectoryError::Request(_))
        ));
    }
}
