//! Fan-out of broadcast events to every live subscriber.
//!
//! Each subscriber is a bounded mpsc sender keyed by username. Publishing never
//! blocks: a subscriber whose channel is closed or full is evicted and its
//! stream ends once the receiver drains what was already queued.

pub mod event;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};

pub use event::{BroadcastEvent, HubMessage};

struct Subscriber {
    /// Generation of this registration, used by `Subscription::drop`
    id: u64,
    sender: mpsc::Sender<HubMessage>,
}

#[derive(Default)]
pub struct BroadcastHub {
    subscribers: DashMap<String, Subscriber>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `sender` as the stream for `username`, replacing any previous
    /// registration, and queue the `Subscribed` ack on it.
    pub fn subscribe(
        self: &Arc<Self>,
        username: &str,
        sender: mpsc::Sender<HubMessage>,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // A fresh channel always has room for the ack; a closed one is
        // removed again by the next publish.
        let _ = sender.try_send(HubMessage::Subscribed);

        let previous = self
            .subscribers
            .insert(username.to_string(), Subscriber { id, sender });
        if previous.is_some() {
            tracing::debug!(username = %username, "Replaced existing subscriber");
        }
        tracing::info!(username = %username, "Subscriber registered");

        Subscription {
            hub: Arc::downgrade(self),
            username: username.to_string(),
            id,
        }
    }

    /// Deliver `event` to every subscriber without waiting.
    ///
    /// Returns the number of subscribers it was queued for. Subscribers that
    /// could not take it are dropped.
    pub fn publish(&self, event: BroadcastEvent) -> usize {
        let message = HubMessage::Event(Arc::new(event));
        let mut delivered = 0;
        let mut evicted = Vec::new();

        for entry in self.subscribers.iter() {
            match entry.sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(username = %entry.key(), "Subscriber lagging, evicting");
                    evicted.push((entry.key().clone(), entry.id));
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(username = %entry.key(), "Subscriber gone, evicting");
                    evicted.push((entry.key().clone(), entry.id));
                }
            }
        }

        // Removal happens after iteration; DashMap shards are read-locked above.
        for (username, id) in evicted {
            self.remove_generation(&username, id);
        }

        delivered
    }

    /// Drop the registration for `username`, ending its stream.
    /// Returns whether one existed.
    pub fn unsubscribe(&self, username: &str) -> bool {
        let removed = self.subscribers.remove(username).is_some();
        if removed {
            tracing::info!(username = %username, "Subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_subscribed(&self, username: &str) -> bool {
        self.subscribers.contains_key(username)
    }

    fn remove_generation(&self, username: &str, id: u64) -> bool {
        self.subscribers
            .remove_if(username, |_, subscriber| subscriber.id == id)
            .is_some()
    }
}

/// Registration handle returned by [`BroadcastHub::subscribe`].
///
/// Dropping it removes the registration, unless the username has since been
/// re-subscribed by a newer stream.
#[derive(Debug)]
#[must_use = "dropping a Subscription unregisters it"]
pub struct Subscription {
    hub: Weak<BroadcastHub>,
    username: String,
    id: u64,
}

impl Subscription {
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Whether this handle is still the hub's current registration.
    pub fn is_current(&self) -> bool {
        self.hub
            .upgrade()
            .and_then(|hub| hub.subscribers.get(&self.username).map(|s| s.id == self.id))
            .unwrap_or(false)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        if hub.remove_generation(&self.username, self.id) {
            tracing::debug!(username = %self.username, "Subscription closed");
        }
    }
}
