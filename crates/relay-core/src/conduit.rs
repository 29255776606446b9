//! Rendezvous conduits between pipeline stages.
//!
//! A conduit hands one item at a time from producer to consumer. `send`
//! resolves only once the consumer has taken the item, so a slow consumer
//! holds the producer back instead of letting items queue up.

use std::fmt;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// The other end of the conduit is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Conduit closed")]
pub struct ConduitClosed;

/// An item in flight together with its acceptance signal.
struct Handoff<T> {
    item: T,
    taken: oneshot::Sender<()>,
}

/// Create a new rendezvous conduit.
#[must_use]
pub fn channel<T>() -> (ConduitSender<T>, ConduitReceiver<T>) {
    // One slot for the handoff in flight; the acceptance signal provides the
    // rendezvous.
    let (tx, rx) = mpsc::channel(1);
    (ConduitSender { inner: tx }, ConduitReceiver { inner: rx })
}

/// Producer side of a conduit.
pub struct ConduitSender<T> {
    inner: mpsc::Sender<Handoff<T>>,
}

impl<T> ConduitSender<T> {
    /// Hand an item to the consumer, waiting until it has been taken.
    ///
    /// Dropping the returned future after the item entered the conduit does
    /// not withdraw it.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitClosed`] if the receiver was dropped before taking
    /// the item.
    pub async fn send(&self, item: T) -> Result<(), ConduitClosed> {
        let (taken, accepted) = oneshot::channel();
        self.inner
            .send(Handoff { item, taken })
            .await
            .map_err(|_| ConduitClosed)?;
        accepted.await.map_err(|_| ConduitClosed)
    }

    /// Whether the receiver has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl<T> Clone for ConduitSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for ConduitSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConduitSender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Consumer side of a conduit.
pub struct ConduitReceiver<T> {
    inner: mpsc::Receiver<Handoff<T>>,
}

impl<T> ConduitReceiver<T> {
    /// Take the next item, releasing its producer.
    ///
    /// Returns `None` once every sender has been dropped.
    pub async fn recv(&mut self) -> Option<T> {
        let handoff = self.inner.recv().await?;
        // The producer may have given up waiting; the item is still delivered.
        let _ = handoff.taken.send(());
        Some(handoff.item)
    }
}

impl<T> fmt::Debug for ConduitReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConduitReceiver").finish_non_exhaustive()
    }
}
