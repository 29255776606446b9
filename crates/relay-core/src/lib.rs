//! # chanrelay-core
//!
//! Core types and the rule-matching router of chanrelay.
//!
//! This crate provides the building blocks of the relay pipeline:
//!
//! - **Message** - The chat message as seen by the router
//! - **Conduit** - Unbuffered rendezvous handoff between pipeline stages
//! - **RuleStore** - Contract of the store holding forwarding rules
//! - **Router** - Per-message rule matching and fan-out
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  receive   ┌─────────────┐   send     ┌─────────────┐
//! │  Connection │──conduit──▶│   Router    │──conduit──▶│  Connection │
//! │ (recv loop) │            └─────────────┘            │ (send loop) │
//! └─────────────┘                   │                   └─────────────┘
//!                                   ▼
//!                            ┌─────────────┐
//!                            │  RuleStore  │◀── registration
//!                            └─────────────┘
//! ```

pub mod conduit;
pub mod message;
pub mod router;
pub mod store;

pub use conduit::{ConduitClosed, ConduitReceiver, ConduitSender};
pub use message::{ChannelId, Message};
pub use router::{Dispatch, Outcome, Router, RouterStats};
pub use store::{MemoryRuleStore, Rule, RuleSet, RuleStore, StoreError};
