//! Rule-matching message router.
//!
//! The router drains the receive conduit, looks up the forwarding rules of
//! each chat message's channel and pushes one copy per matching rule onto the
//! send conduit. Every failure is confined to the message (or rule) it
//! happened on; nothing is retried.

use crate::conduit::{ConduitReceiver, ConduitSender};
use crate::message::Message;
use crate::store::RuleStore;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// What happened to a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not a chat message.
    Ignored,
    /// Source channel has no rules.
    Unroutable,
    /// A store lookup failed; the message was dropped.
    StoreFailed,
    /// Rules were evaluated but none matched.
    NoMatch,
    /// At least one rule matched.
    Forwarded,
}

/// Result of dispatching one message.
#[derive(Debug, Clone)]
pub struct Dispatch {
    /// Decision taken for the message.
    pub outcome: Outcome,
    /// Copies to transmit, one per matching rule.
    pub messages: Vec<Message>,
    /// Rules skipped because their pattern does not compile.
    pub pattern_errors: usize,
}

impl Dispatch {
    fn dropped(outcome: Outcome) -> Self {
        Self {
            outcome,
            messages: Vec::new(),
            pattern_errors: 0,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    ignored: AtomicU64,
    unroutable: AtomicU64,
    store_errors: AtomicU64,
    pattern_errors: AtomicU64,
    unmatched: AtomicU64,
    forwarded: AtomicU64,
}

/// The message router.
pub struct Router {
    store: Arc<dyn RuleStore>,
    counters: Counters,
}

impl Router {
    /// Create a router reading rules from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        info!(store = store.name(), "Creating router");
        Self {
            store,
            counters: Counters::default(),
        }
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        let c = &self.counters;
        RouterStats {
            received: c.received.load(Ordering::Relaxed),
            ignored: c.ignored.load(Ordering::Relaxed),
            unroutable: c.unroutable.load(Ordering::Relaxed),
            store_errors: c.store_errors.load(Ordering::Relaxed),
            pattern_errors: c.pattern_errors.load(Ordering::Relaxed),
            unmatched: c.unmatched.load(Ordering::Relaxed),
            forwarded: c.forwarded.load(Ordering::Relaxed),
        }
    }

    /// Drain `incoming`, forwarding matched copies to `outgoing`.
    ///
    /// Runs until `incoming` is closed or `outgoing` loses its receiver.
    pub async fn run(
        &self,
        mut incoming: ConduitReceiver<Message>,
        outgoing: ConduitSender<Message>,
    ) {
        info!("Router started");

        while let Some(message) = incoming.recv().await {
            let dispatch = self.dispatch(message).await;

            for forwarded in dispatch.messages {
                if outgoing.send(forwarded).await.is_err() {
                    warn!("Send conduit closed, stopping router");
                    return;
                }
            }
        }

        info!("Receive conduit closed, router stopped");
    }

    /// Decide what to do with one received message.
    ///
    /// Rules are loaded fresh from the store on every call.
    pub async fn dispatch(&self, message: Message) -> Dispatch {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        if !message.is_chat() {
            trace!(kind = %message.kind, "Ignoring non-chat event");
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            return Dispatch::dropped(Outcome::Ignored);
        }

        match self.store.is_routable(&message.channel).await {
            Ok(true) => {}
            Ok(false) => {
                trace!(channel = %message.channel, "Channel has no rules");
                self.counters.unroutable.fetch_add(1, Ordering::Relaxed);
                return Dispatch::dropped(Outcome::Unroutable);
            }
            Err(e) => {
                warn!(
                    channel = %message.channel,
                    error = %e,
                    "Routability check failed, dropping message"
                );
                self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
                return Dispatch::dropped(Outcome::StoreFailed);
            }
        }

        let rules = match self.store.rules_for(&message.channel).await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(
                    channel = %message.channel,
                    error = %e,
                    "Rule lookup failed, dropping message"
                );
                self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
                return Dispatch::dropped(Outcome::StoreFailed);
            }
        };

        let mut messages = Vec::new();
        let mut pattern_errors = 0;

        for (pattern, destination) in &rules {
            let matcher = match Regex::new(pattern) {
                Ok(re) => re,
                Err(e) => {
                    warn!(
                        channel = %message.channel,
                        pattern = %pattern,
                        error = %e,
                        "Skipping rule with malformed pattern"
                    );
                    pattern_errors += 1;
                    continue;
                }
            };

            if matcher.is_match(&message.text) {
                debug!(
                    from = %message.channel,
                    to = %destination,
                    pattern = %pattern,
                    "Rule matched"
                );
                messages.push(message.routed_to(destination));
            }
        }

        self.counters
            .pattern_errors
            .fetch_add(pattern_errors as u64, Ordering::Relaxed);

        let outcome = if messages.is_empty() {
            self.counters.unmatched.fetch_add(1, Ordering::Relaxed);
            Outcome::NoMatch
        } else {
            self.counters
                .forwarded
                .fetch_add(messages.len() as u64, Ordering::Relaxed);
            Outcome::Forwarded
        };

        Dispatch {
            outcome,
            messages,
            pattern_errors,
        }
    }
}

/// Router statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Messages taken from the receive conduit.
    pub received: u64,
    /// Non-chat events discarded.
    pub ignored: u64,
    /// Chat messages from channels without rules.
    pub unroutable: u64,
    /// Messages dropped because a store lookup failed.
    pub store_errors: u64,
    /// Rules skipped because their pattern does not compile.
    pub pattern_errors: u64,
    /// Chat messages whose rules all failed to match.
    pub unmatched: u64,
    /// Copies produced for the send conduit.
    pub forwarded: u64,
}
