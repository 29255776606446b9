//! Forwarding rule storage.
//!
//! Rules live in a key-value store shared between the router (reads) and the
//! registration service (writes). Two structures are kept per deployment:
//!
//! - a set of *routable* source channels, checked first as a cheap filter;
//! - per source channel, a map of `pattern -> destination channel`.
//!
//! Both are written by [`RuleStore::register`] and nothing else.

use crate::message::ChannelId;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Rules of one source channel, `pattern -> destination channel`.
pub type RuleSet = BTreeMap<String, ChannelId>;

/// A forwarding rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Channel whose messages are matched.
    pub source: ChannelId,
    /// Regular expression searched for in the message text.
    pub pattern: String,
    /// Channel matched messages are forwarded to.
    pub destination: ChannelId,
}

impl Rule {
    /// Create a new rule.
    #[must_use]
    pub fn new(
        source: impl Into<ChannelId>,
        pattern: impl Into<String>,
        destination: impl Into<ChannelId>,
    ) -> Self {
        Self {
            source: source.into(),
            pattern: pattern.into(),
            destination: destination.into(),
        }
    }
}

/// Rule store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No connection to the store could be obtained.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected or failed a command.
    #[error("Store command failed: {0}")]
    Command(String),

    /// The store client could not be configured.
    #[error("Invalid store configuration: {0}")]
    Config(String),
}

/// Query interface over the rule store.
///
/// Implementations must not cache: every call reflects the store's current
/// contents.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Whether `channel` has at least one rule.
    async fn is_routable(&self, channel: &str) -> Result<bool, StoreError>;

    /// All rules of `channel`. Empty when there are none.
    async fn rules_for(&self, channel: &str) -> Result<RuleSet, StoreError>;

    /// Store a rule and mark its source channel routable.
    ///
    /// An existing rule with the same source and pattern is overwritten.
    async fn register(&self, rule: &Rule) -> Result<(), StoreError>;

    /// Backend name for logging (e.g. "redis", "memory").
    fn name(&self) -> &'static str;
}

/// In-process rule store.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    routable: DashSet<ChannelId>,
    rules: DashMap<ChannelId, RuleSet>,
}

impl MemoryRuleStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `channel` routable without writing any rule.
    ///
    /// This is the state a concurrent reader can observe between the two
    /// writes of a registration.
    pub fn mark_routable(&self, channel: impl Into<ChannelId>) {
        self.routable.insert(channel.into());
    }

    /// Number of routable channels.
    #[must_use]
    pub fn routable_count(&self) -> usize {
        self.routable.len()
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn is_routable(&self, channel: &str) -> Result<bool, StoreError> {
        Ok(self.routable.contains(channel))
    }

    async fn rules_for(&self, channel: &str) -> Result<RuleSet, StoreError> {
        Ok(self
            .rules
            .get(channel)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    async fn register(&self, rule: &Rule) -> Result<(), StoreError> {
        self.rules
            .entry(rule.source.clone())
            .or_default()
            .insert(rule.pattern.clone(), rule.destination.clone());
        self.routable.insert(rule.source.clone());

        debug!(
            source = %rule.source,
            destination = %rule.destination,
            pattern = %rule.pattern,
            "Rule stored"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
