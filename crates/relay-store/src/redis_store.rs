//! Redis rule store backed by a bb8 connection pool.

use async_trait::async_trait;
use bb8_redis::bb8::{Pool, PooledConnection};
use bb8_redis::redis::{self, RedisError};
use bb8_redis::RedisConnectionManager;
use chanrelay_core::{Rule, RuleSet, RuleStore, StoreError};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Default key of the routable-channel set.
pub const DEFAULT_ROUTABLE_SET_KEY: &str = "channels";

/// Redis store configuration.
#[derive(Clone)]
pub struct RedisStoreConfig {
    /// Connection URL, `redis://[:password@]host:port`.
    pub url: String,
    /// Maximum pooled connections; also bounds the idle count.
    pub max_connections: u32,
    /// Idle connections older than this are closed.
    pub idle_timeout: Duration,
    /// How long a checkout may wait for a connection.
    pub connect_timeout: Duration,
    /// Key of the routable-channel set.
    pub routable_set_key: String,
    /// Write rule and set membership in one `MULTI/EXEC` transaction.
    pub atomic_registration: bool,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            max_connections: 3,
            idle_timeout: Duration::from_secs(240),
            connect_timeout: Duration::from_secs(5),
            routable_set_key: DEFAULT_ROUTABLE_SET_KEY.to_string(),
            atomic_registration: false,
        }
    }
}

impl RedisStoreConfig {
    /// Build a connection URL from its parts.
    ///
    /// An empty password is treated as no password.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not a valid host name or address.
    pub fn url_for(host: &str, port: u16, password: Option<&str>) -> Result<String, StoreError> {
        let mut url = Url::parse(&format!("redis://{}:{}", host, port))
            .map_err(|e| StoreError::Config(format!("invalid address {}:{}: {}", host, port, e)))?;

        if let Some(password) = password.filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|()| StoreError::Config("cannot set password on store URL".into()))?;
        }

        Ok(url.to_string())
    }
}

// Hand-written so the password in `url` never reaches the logs.
impl std::fmt::Debug for RedisStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStoreConfig")
            .field("max_connections", &self.max_connections)
            .field("idle_timeout", &self.idle_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("routable_set_key", &self.routable_set_key)
            .field("atomic_registration", &self.atomic_registration)
            .finish_non_exhaustive()
    }
}

/// Rule store on a Redis server.
///
/// Every operation checks out one pooled connection, which goes back to the
/// pool when the operation returns, whether it succeeded or not. Checked-out
/// connections are `PING`ed before use.
pub struct RedisRuleStore {
    pool: Pool<RedisConnectionManager>,
    routable_set_key: String,
    atomic_registration: bool,
}

impl RedisRuleStore {
    /// Create the store and its connection pool.
    ///
    /// Connections are dialed lazily, so an unreachable server surfaces on
    /// the first operation rather than here.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub async fn connect(config: RedisStoreConfig) -> Result<Self, StoreError> {
        let manager = RedisConnectionManager::new(config.url.as_str())
            .map_err(|e| StoreError::Config(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .idle_timeout(Some(config.idle_timeout))
            .connection_timeout(config.connect_timeout)
            .test_on_check_out(true)
            .build(manager)
            .await
            .map_err(unavailable)?;

        info!(
            max_connections = config.max_connections,
            set_key = %config.routable_set_key,
            atomic_registration = config.atomic_registration,
            "Redis rule store ready"
        );

        Ok(Self {
            pool,
            routable_set_key: config.routable_set_key,
            atomic_registration: config.atomic_registration,
        })
    }

    /// Check that the server answers.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be obtained or `PING` fails.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.checkout().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(command_failed)?;
        Ok(())
    }

    /// Number of open and idle pooled connections.
    #[must_use]
    pub fn pool_state(&self) -> (u32, u32) {
        let state = self.pool.state();
        (state.connections, state.idle_connections)
    }

    async fn checkout(&self) -> Result<PooledConnection<'_, RedisConnectionManager>, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl RuleStore for RedisRuleStore {
    async fn is_routable(&self, channel: &str) -> Result<bool, StoreError> {
        let mut conn = self.checkout().await?;
        redis::cmd("SISMEMBER")
            .arg(&self.routable_set_key)
            .arg(channel)
            .query_async(&mut *conn)
            .await
            .map_err(command_failed)
    }

    async fn rules_for(&self, channel: &str) -> Result<RuleSet, StoreError> {
        let mut conn = self.checkout().await?;
        redis::cmd("HGETALL")
            .arg(channel)
            .query_async(&mut *conn)
            .await
            .map_err(command_failed)
    }

    async fn register(&self, rule: &Rule) -> Result<(), StoreError> {
        let mut conn = self.checkout().await?;

        let mut pipe = redis::pipe();
        if self.atomic_registration {
            pipe.atomic();
        }
        pipe.cmd("HSET")
            .arg(&rule.source)
            .arg(&rule.pattern)
            .arg(&rule.destination)
            .ignore()
            .cmd("SADD")
            .arg(&self.routable_set_key)
            .arg(&rule.source)
            .ignore();

        let _: () = pipe.query_async(&mut *conn).await.map_err(command_failed)?;

        debug!(
            source = %rule.source,
            destination = %rule.destination,
            pattern = %rule.pattern,
            atomic = self.atomic_registration,
            "Rule stored"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

fn unavailable(e: RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn command_failed(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Command(e.to_string())
    }
}
