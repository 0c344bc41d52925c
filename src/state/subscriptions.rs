use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::errors::PersistenceError;
use crate::persistence::{MemorySnapshot, Snapshot, SnapshotStore};

/// One verified relationship between a topic and a subscriber callback.
///
/// The topic is the key the record is stored under, so it is not repeated
/// here. `created_at` is the Unix timestamp (seconds) of the successful
/// verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub callback: String,
    pub lease_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub created_at: i64,
}

impl Subscription {
    /// Build a record stamped with the current time. An empty secret is
    /// treated as no secret.
    pub fn new(callback: impl Into<String>, lease_seconds: u64, secret: Option<String>) -> Self {
        Self {
            callback: callback.into(),
            lease_seconds,
            secret: secret.filter(|s| !s.is_empty()),
            created_at: Utc::now().timestamp(),
        }
    }
}

/// Result of an [`SubscriptionStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Inserted,
    Replaced,
}

/// Registry of verified subscriptions, keyed by topic then callback.
///
/// All mutation goes through `upsert`/`remove`, which apply the change
/// under the write lock and then rewrite the durable snapshot. The
/// in-memory map is the source of truth for the running process: a failed
/// save is logged and the mutation stays applied.
pub struct SubscriptionStore {
    topics: RwLock<HashMap<String, Vec<Subscription>>>,
    backend: Arc<dyn SnapshotStore>,
    // Serializes saves so that the last save always writes the newest state.
    persist: Mutex<()>,
}

impl SubscriptionStore {
    /// Populate a store from `backend`. A backend with nothing saved yields
    /// an empty store.
    pub async fn load(backend: Arc<dyn SnapshotStore>) -> Result<Self, PersistenceError> {
        let snapshot = backend.load().await?.unwrap_or_default();

        let topics: HashMap<String, Vec<Subscription>> = snapshot
            .into_iter()
            .filter(|(_, subs)| !subs.is_empty())
            .collect();

        let count: usize = topics.values().map(Vec::len).sum();
        tracing::info!(topics = topics.len(), subscriptions = count, "Loaded subscription snapshot");

        Ok(Self {
            topics: RwLock::new(topics),
            backend,
            persist: Mutex::new(()),
        })
    }

    /// Empty store backed by a [`MemorySnapshot`].
    pub fn in_memory() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            backend: Arc::new(MemorySnapshot::new()),
            persist: Mutex::new(()),
        }
    }

    /// Insert `subscription` under `topic`, replacing the record with the
    /// same callback if there is one, then persist.
    pub async fn upsert(&self, topic: &str, subscription: Subscription) -> Upserted {
        let outcome = {
            let mut topics = self.topics.write();
            let subs = topics.entry(topic.to_string()).or_default();

            match subs.iter_mut().find(|s| s.callback == subscription.callback) {
                Some(existing) => {
                    *existing = subscription;
                    Upserted::Replaced
                }
                None => {
                    subs.push(subscription);
                    Upserted::Inserted
                }
            }
        };

        self.persist().await;
        outcome
    }

    /// Remove the record for (`topic`, `callback`). Returns whether a record
    /// was removed; a missing record is not an error. Persists either way.
    pub async fn remove(&self, topic: &str, callback: &str) -> bool {
        let removed = {
            let mut topics = self.topics.write();
            let removed = match topics.get_mut(topic) {
                Some(subs) => {
                    let before = subs.len();
                    subs.retain(|s| s.callback != callback);
                    subs.len() != before
                }
                None => false,
            };

            if topics.get(topic).is_some_and(Vec::is_empty) {
                topics.remove(topic);
            }
            removed
        };

        self.persist().await;
        removed
    }

    /// Current subscriptions of `topic`, empty for an unknown topic.
    ///
    /// The returned list is a copy taken under the read lock.
    pub fn list_by_topic(&self, topic: &str) -> Vec<Subscription> {
        self.topics.read().get(topic).cloned().unwrap_or_default()
    }

    pub fn get(&self, topic: &str, callback: &str) -> Option<Subscription> {
        self.topics
            .read()
            .get(topic)
            .and_then(|subs| subs.iter().find(|s| s.callback == callback).cloned())
    }

    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    pub fn subscription_count(&self) -> usize {
        self.topics.read().values().map(Vec::len).sum()
    }

    /// Consistent copy of the whole registry in snapshot layout.
    pub fn snapshot(&self) -> Snapshot {
        self.topics
            .read()
            .iter()
            .map(|(topic, subs)| (topic.clone(), subs.clone()))
            .collect()
    }

    /// Write the current state to the backend.
    pub async fn persist(&self) {
        let _guard = self.persist.lock().await;
        let snapshot = self.snapshot();

        if let Err(e) = self.backend.save(&snapshot).await {
            tracing::warn!(error = %e, "Failed to persist subscription snapshot");
        }
    }
}
