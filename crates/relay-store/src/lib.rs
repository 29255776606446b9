//! # chanrelay-store
//!
//! Redis implementation of [`chanrelay_core::RuleStore`].
//!
//! Layout in Redis:
//!
//! - `channels` (set) - IDs of source channels with at least one rule
//! - `<source channel ID>` (hash) - `pattern -> destination channel ID`
//!
//! The set key is configurable; the per-channel hash keys are the bare
//! channel IDs.

pub mod redis_store;

pub use redis_store::{RedisRuleStore, RedisStoreConfig, DEFAULT_ROUTABLE_SET_KEY};
