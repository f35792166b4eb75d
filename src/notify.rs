//! Cross-handle change notification.
//!
//! A process-wide [`ChangeRegistry`] maps a store identifier to the handles
//! subscribed to it. Every mutating operation posts a timestamp; each
//! subscriber raises its own `last_modified` to it, and async observers can
//! listen on a broadcast channel. Notifications carry nothing but the
//! timestamp and are advisory: re-read the store instead of trusting them
//! for correctness.
//!
//! # Example
//!
//! ```rust
//! use keyshelf::notify::ChangeRegistry;
//! use keyshelf::Timestamp;
//!
//! let registry = ChangeRegistry::new();
//! let a = registry.subscribe("users");
//! let b = registry.subscribe("users");
//!
//! registry.post("users", Timestamp::from_micros(42));
//! assert_eq!(a.last_modified(), Timestamp::from_micros(42));
//! assert_eq!(b.last_modified(), Timestamp::from_micros(42));
//! ```

use crate::constants::CHANGE_CHANNEL_CAPACITY;
use crate::types::Timestamp;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use tokio::sync::broadcast;

static GLOBAL: LazyLock<ChangeRegistry> = LazyLock::new(ChangeRegistry::new);

/// Channel shared by every handle on one identifier
struct Channel {
    sender: broadcast::Sender<Timestamp>,
    subscribers: HashMap<u64, Arc<AtomicU64>>,
}

/// Registry of change channels keyed by store identifier.
pub struct ChangeRegistry {
    channels: RwLock<HashMap<String, Channel>>,
    next_id: AtomicU64,
}

impl Default for ChangeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeRegistry {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The registry used by every store handle in this process.
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Subscribes a new handle to `identifier`.
    ///
    /// The subscription is removed when the returned value is dropped.
    pub fn subscribe(&self, identifier: &str) -> Subscription<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let last_modified = Arc::new(AtomicU64::new(0));
        let mut channels = self.channels.write();
        let channel = channels
            .entry(identifier.to_string())
            .or_insert_with(|| Channel {
                sender: broadcast::channel(CHANGE_CHANNEL_CAPACITY).0,
                subscribers: HashMap::new(),
            });
        channel.subscribers.insert(id, Arc::clone(&last_modified));
        Subscription {
            registry: self,
            identifier: identifier.to_string(),
            id,
            last_modified,
        }
    }

    /// Posts a change on `identifier` and returns how many handles saw it.
    pub fn post(&self, identifier: &str, at: Timestamp) -> usize {
        let channels = self.channels.read();
        let Some(channel) = channels.get(identifier) else {
            return 0;
        };
        for last_modified in channel.subscribers.values() {
            last_modified.fetch_max(at.as_micros(), Ordering::SeqCst);
        }
        // No receivers is fine: listeners are optional
        let _ = channel.sender.send(at);
        channel.subscribers.len()
    }

    /// Number of handles subscribed to `identifier`.
    pub fn subscriber_count(&self, identifier: &str) -> usize {
        self.channels
            .read()
            .get(identifier)
            .map_or(0, |channel| channel.subscribers.len())
    }

    fn receiver(&self, identifier: &str) -> Option<broadcast::Receiver<Timestamp>> {
        self.channels
            .read()
            .get(identifier)
            .map(|channel| channel.sender.subscribe())
    }

    fn unsubscribe(&self, identifier: &str, id: u64) {
        let mut channels = self.channels.write();
        if let Some(channel) = channels.get_mut(identifier) {
            channel.subscribers.remove(&id);
            if channel.subscribers.is_empty() {
                channels.remove(identifier);
            }
        }
    }
}

/// One handle's membership in a change channel.
pub struct Subscription<'r> {
    registry: &'r ChangeRegistry,
    identifier: String,
    id: u64,
    last_modified: Arc<AtomicU64>,
}

impl Subscription<'_> {
    /// Latest change timestamp this subscription has observed.
    pub fn last_modified(&self) -> Timestamp {
        Timestamp::from_micros(self.last_modified.load(Ordering::SeqCst))
    }

    /// Shared cell updated on every post; outlives the subscription.
    pub(crate) fn last_modified_cell(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.last_modified)
    }

    /// Broadcast receiver for async observers.
    pub fn changes(&self) -> broadcast::Receiver<Timestamp> {
        self.registry
            .receiver(&self.identifier)
            .unwrap_or_else(|| broadcast::channel(1).1)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        self.registry.unsubscribe(&self.identifier, self.id);
    }
}
