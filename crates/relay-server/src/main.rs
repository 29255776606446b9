//! # chanrelay
//!
//! Relays chat messages from one channel to another when their text matches
//! a registered regular expression.
//!
//! ## Usage
//!
//! ```bash
//! # Token from the environment, rules in a local Redis
//! SLACK_BOT_TOKEN=xoxb-... chanrelay
//!
//! # Custom config
//! CHANRELAY_CONFIG=/path/to/chanrelay.toml chanrelay
//! ```

mod config;
mod directory;
mod handlers;
mod metrics;

use anyhow::{anyhow, Context, Result};
use chanrelay_core::{MemoryRuleStore, Router, RuleStore};
use chanrelay_store::RedisRuleStore;
use chanrelay_transport::{ConnectionManager, RealtimeConnection};
use config::{Config, StoreBackend};
use directory::SlackDirectory;
use handlers::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const STATS_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "chanrelay=info,chanrelay_core=info,chanrelay_store=info,chanrelay_transport=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    let token = config.bot_token()?;
    let bind_addr = config.bind_addr()?;

    info!("Starting chanrelay on {}", bind_addr);

    // Initialize metrics
    metrics::init_metrics();
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let store = open_store(&config).await?;
    let router = Arc::new(Router::new(store.clone()));

    // No retry: a failed handshake ends the process.
    let RealtimeConnection {
        incoming,
        outgoing,
        tasks,
    } = ConnectionManager::new(&config.slack.api_base)
        .connect(&token)
        .await
        .context("Failed to connect to the chat service")?;

    let relay = {
        let router = router.clone();
        tokio::spawn(async move { router.run(incoming, outgoing).await })
    };
    let reporter = metrics::spawn_stats_reporter(router.clone(), STATS_INTERVAL);

    let directory = Arc::new(SlackDirectory::new(&config.slack.api_base, token));
    let state = Arc::new(AppState::new(router, store, directory));

    let outcome: Result<()> = tokio::select! {
        res = handlers::run_server(bind_addr, state) => match res {
            Ok(()) => Err(anyhow!("HTTP server stopped")),
            Err(e) => Err(e.context("HTTP server failed")),
        },
        _ = relay => Err(anyhow!("Realtime connection closed")),
    };

    tasks.abort();
    reporter.abort();
    outcome
}

/// Open the configured rule store.
///
/// An unreachable Redis server is only logged: the pool keeps dialing and
/// each lookup reports its own failure.
async fn open_store(config: &Config) -> Result<Arc<dyn RuleStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory rule store; rules are lost on exit");
            Ok(Arc::new(MemoryRuleStore::new()))
        }
        StoreBackend::Redis => {
            let store = RedisRuleStore::connect(config.redis_config()?)
                .await
                .context("Failed to create rule store pool")?;

            match store.ping().await {
                Ok(()) => info!("Rule store reachable"),
                Err(e) => warn!(error = %e, "Rule store not reachable yet"),
            }

            let store = Arc::new(store);
            spawn_pool_reporter(store.clone());
            Ok(store)
        }
    }
}

fn spawn_pool_reporter(store: Arc<RedisRuleStore>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATS_INTERVAL);
        loop {
            ticker.tick().await;
            let (total, idle) = store.pool_state();
            metrics::set_store_connections(total, idle);
        }
    });
}
