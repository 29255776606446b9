//! HTTP handlers for the relay.
//!
//! `POST /register` stores a forwarding rule; `GET /health` reports router
//! counters.

use crate::directory::{ChannelDirectory, DirectoryError};
use crate::metrics;
use anyhow::Result;
use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chanrelay_core::{Router as RelayRouter, Rule, RuleStore, StoreError};
use regex::Regex;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Shared server state.
pub struct AppState {
    /// The message router, for its counters.
    pub router: Arc<RelayRouter>,
    /// Where registered rules are written.
    pub store: Arc<dyn RuleStore>,
    /// Resolves source channel names.
    pub directory: Arc<dyn ChannelDirectory>,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(
        router: Arc<RelayRouter>,
        store: Arc<dyn RuleStore>,
        directory: Arc<dyn ChannelDirectory>,
    ) -> Self {
        Self {
            router,
            store,
            directory,
        }
    }
}

/// Slash-command style registration form.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    /// Destination channel id.
    #[serde(default)]
    pub channel_id: String,
    /// Destination channel name.
    #[serde(default)]
    pub channel_name: String,
    /// `"<source channel name> <pattern>"`.
    #[serde(default)]
    pub text: String,
}

/// Registration failures, each mapped to an HTTP status.
#[derive(Debug, Error)]
pub enum RegisterError {
    /// A required form field is empty.
    #[error("missing {0}")]
    MissingField(&'static str),

    /// `text` has no pattern after the source name.
    #[error("usage: <source channel> <pattern>")]
    MissingPattern,

    /// The pattern does not compile.
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// No channel has the given name.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// The channel directory could not be queried.
    #[error("channel lookup failed: {0}")]
    Directory(#[from] DirectoryError),

    /// The rule could not be written.
    #[error("failed to store rule: {0}")]
    Store(#[from] StoreError),
}

impl RegisterError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingField(_) | Self::MissingPattern | Self::InvalidPattern(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::UnknownChannel(_) => StatusCode::NOT_FOUND,
            Self::Directory(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RegisterError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Build the HTTP routes.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/register", post(register_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP server on `addr`.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_server(addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;

    info!("Registration endpoint: http://{}/register", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// Validate a registration form and store the rule it describes.
///
/// Returns the confirmation line sent back to the caller.
///
/// # Errors
///
/// See [`RegisterError`].
pub async fn register_rule(state: &AppState, form: RegisterForm) -> Result<String, RegisterError> {
    let destination = form.channel_id.trim();
    if destination.is_empty() {
        return Err(RegisterError::MissingField("channel_id"));
    }
    let destination_name = form.channel_name.trim();
    if destination_name.is_empty() {
        return Err(RegisterError::MissingField("channel_name"));
    }

    // Trailing whitespace belongs to the pattern.
    let text = form.text.trim_start();
    if text.is_empty() {
        return Err(RegisterError::MissingField("text"));
    }
    let (source_name, pattern) = text.split_once(' ').ok_or(RegisterError::MissingPattern)?;
    if pattern.is_empty() {
        return Err(RegisterError::MissingPattern);
    }

    Regex::new(pattern)?;

    let source = state
        .directory
        .find_by_name(source_name)
        .await?
        .ok_or_else(|| RegisterError::UnknownChannel(source_name.to_string()))?;

    state
        .store
        .register(&Rule::new(source, pattern, destination))
        .await?;

    metrics::record_registration();
    info!(
        from = %source_name,
        to = %destination_name,
        query = %pattern,
        "Registered rule"
    );

    Ok(format!(
        "from={} to={} query={}",
        source_name, destination_name, pattern
    ))
}

async fn register_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<RegisterForm>,
) -> Response {
    match register_rule(&state, form).await {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            warn!(error = %e, "Registration failed");
            metrics::record_error("register");
            e.into_response()
        }
    }
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.router.stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.store.name(),
        "router": {
            "received": stats.received,
            "ignored": stats.ignored,
            "unroutable": stats.unroutable,
            "store_errors": stats.store_errors,
            "pattern_errors": stats.pattern_errors,
            "unmatched": stats.unmatched,
            "forwarded": stats.forwarded,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chanrelay_core::{ChannelId, MemoryRuleStore, Message, Outcome, RuleSet};
    use std::collections::HashMap;

    /// Directory with a fixed name table.
    struct StaticDirectory(HashMap<&'static str, &'static str>);

    #[async_trait]
    impl ChannelDirectory for StaticDirectory {
        async fn find_by_name(&self, name: &str) -> Result<Option<ChannelId>, DirectoryError> {
            let name = name.trim_start_matches('#');
            Ok(self.0.get(name).map(|id| id.to_string()))
        }
    }

    /// Store rejecting every write.
    struct ReadOnlyStore;

    #[async_trait]
    impl RuleStore for ReadOnlyStore {
        async fn is_routable(&self, _channel: &str) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn rules_for(&self, _channel: &str) -> Result<RuleSet, StoreError> {
            Ok(RuleSet::new())
        }

        async fn register(&self, _rule: &Rule) -> Result<(), StoreError> {
            Err(StoreError::Command("READONLY".into()))
        }

        fn name(&self) -> &'static str {
            "read-only"
        }
    }

    fn state_with(store: Arc<dyn RuleStore>) -> AppState {
        let directory = StaticDirectory(HashMap::from([("general", "C1"), ("ops", "C3")]));
        AppState::new(
            Arc::new(RelayRouter::new(store.clone())),
            store,
            Arc::new(directory),
        )
    }

    fn form(channel_id: &str, channel_name: &str, text: &str) -> RegisterForm {
        RegisterForm {
            channel_id: channel_id.into(),
            channel_name: channel_name.into(),
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn test_register_stores_rule() {
        let store = Arc::new(MemoryRuleStore::new());
        let state = state_with(store.clone());

        let body = register_rule(&state, form("C2", "alerts", "general urgent"))
            .await
            .unwrap();
        assert_eq!(body, "from=general to=alerts query=urgent");

        assert!(store.is_routable("C1").await.unwrap());
        let rules = store.rules_for("C1").await.unwrap();
        assert_eq!(rules.get("urgent").map(String::as_str), Some("C2"));
    }

    #[tokio::test]
    async fn test_registered_rule_is_used_by_router() {
        let store = Arc::new(MemoryRuleStore::new());
        let state = state_with(store.clone());

        register_rule(&state, form("C2", "alerts", "general (?i)deploy failed"))
            .await
            .unwrap();

        let dispatch = state
            .router
            .dispatch(Message::new("C1", "Deploy FAILED on prod"))
            .await;
        assert_eq!(dispatch.outcome, Outcome::Forwarded);
        assert_eq!(dispatch.messages[0].channel, "C2");
    }

    #[tokio::test]
    async fn test_pattern_keeps_inner_spaces() {
        let store = Arc::new(MemoryRuleStore::new());
        let state = state_with(store.clone());

        let body = register_rule(&state, form("C2", "alerts", "#ops disk  full"))
            .await
            .unwrap();
        assert_eq!(body, "from=#ops to=alerts query=disk  full");
        let rules = store.rules_for("C3").await.unwrap();
        assert!(rules.contains_key("disk  full"));
    }

    #[tokio::test]
    async fn test_pattern_keeps_trailing_space() {
        let store = Arc::new(MemoryRuleStore::new());
        let state = state_with(store.clone());

        let body = register_rule(&state, form("C2", "alerts", "  general urgent "))
            .await
            .unwrap();
        assert_eq!(body, "from=general to=alerts query=urgent ");

        let rules = store.rules_for("C1").await.unwrap();
        assert!(rules.contains_key("urgent "));
        assert!(!rules.contains_key("urgent"));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let state = state_with(Arc::new(MemoryRuleStore::new()));

        let cases = [
            (("", "alerts", "general urgent"), StatusCode::BAD_REQUEST),
            (("C2", "", "general urgent"), StatusCode::BAD_REQUEST),
            (("C2", "alerts", ""), StatusCode::BAD_REQUEST),
            (("C2", "alerts", "general"), StatusCode::BAD_REQUEST),
            (("C2", "alerts", "general (oops"), StatusCode::BAD_REQUEST),
            (("C2", "alerts", "random urgent"), StatusCode::NOT_FOUND),
        ];

        for ((id, name, text), status) in cases {
            let err = register_rule(&state, form(id, name, text))
                .await
                .unwrap_err();
            assert_eq!(err.status(), status, "text {:?}: {}", text, err);
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_server_error() {
        let state = state_with(Arc::new(ReadOnlyStore));

        let err = register_rule(&state, form("C2", "alerts", "general urgent"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegisterError::Store(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_http_endpoints() {
        let store = Arc::new(MemoryRuleStore::new());
        let state = Arc::new(state_with(store.clone()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move { axum::serve(listener, app(state)).await });

        let http = reqwest::Client::new();
        let res = http
            .post(format!("http://{}/register", addr))
            .form(&[
                ("channel_id", "C2"),
                ("channel_name", "alerts"),
                ("text", "general urgent"),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
        assert_eq!(
            res.text().await.unwrap(),
            "from=general to=alerts query=urgent"
        );

        let res = http
            .post(format!("http://{}/register", addr))
            .form(&[
                ("channel_id", "C2"),
                ("channel_name", "alerts"),
                ("text", "nowhere x"),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);

        let health: serde_json::Value = http
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["store"], "memory");
        assert_eq!(health["router"]["forwarded"], 0);

        assert!(store.is_routable("C1").await.unwrap());
        server.abort();
    }
}
