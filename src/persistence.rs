//! Durable snapshot of the subscription registry.
//!
//! The store is written as one JSON object keyed by topic, each value an
//! ordered list of `{callback, lease_seconds, secret, created_at}` records.
//! The whole snapshot is rewritten after every mutation.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs;

use crate::errors::PersistenceError;
use crate::state::subscriptions::Subscription;

/// Logical snapshot layout: topic -> subscriptions in insertion order.
pub type Snapshot = BTreeMap<String, Vec<Subscription>>;

/// Where the registry is loaded from at startup and saved to afterwards.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last saved snapshot. `None` means nothing was ever saved.
    async fn load(&self) -> Result<Option<Snapshot>, PersistenceError>;

    /// Replace the saved snapshot.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError>;
}

/// Snapshot kept in a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshot {
    path: PathBuf,
}

impl JsonFileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshot {
    async fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No snapshot found at startup (path = {})", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if data.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&data)?))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(snapshot)?;

        // Write beside the target and rename so a crash never leaves a
        // half-written snapshot behind.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json.as_bytes()).await?;
        fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), topics = snapshot.len(), "Snapshot saved");
        Ok(())
    }
}

/// In-process snapshot, used when no file is configured and in tests.
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    saved: Mutex<Option<Snapshot>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `save` fail with an I/O error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn saved(&self) -> Option<Snapshot> {
        self.saved.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshot {
    async fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        Ok(self.saved.lock().clone())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(ErrorKind::Other, "snapshot storage unavailable").into());
        }

        *self.saved.lock() = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(callback: &str, secret: Option<&str>) -> Subscription {
        Subscription {
            callback: callback.to_string(),
            lease_seconds: 3600,
            secret: secret.map(str::to_string),
            created_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = JsonFileSnapshot::new(dir.path().join("absent.json"));

        assert!(snapshot.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_snapshot_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFileSnapshot::new(dir.path().join("subs.json"));

        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "https://example.com/feed".to_string(),
            vec![
                record("https://a.example/cb", Some("s3cret")),
                record("https://b.example/cb", None),
            ],
        );

        file.save(&snapshot).await.unwrap();
        let loaded = file.load().await.unwrap().unwrap();

        assert_eq!(loaded, snapshot);
        assert!(!dir.path().join("subs.json.tmp").exists());
    }

    #[tokio::test]
    async fn file_layout_is_keyed_by_topic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.json");
        let file = JsonFileSnapshot::new(&path);

        let mut snapshot = Snapshot::new();
        snapshot.insert("https://t.example/".to_string(), vec![record("https://c.example/", None)]);
        file.save(&snapshot).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let entry = &raw["https://t.example/"][0];
        assert_eq!(entry["callback"], "https://c.example/");
        assert_eq!(entry["lease_seconds"], 3600);
        assert_eq!(entry["created_at"], 1_700_000_000);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileSnapshot::new(&path).load().await.unwrap_err();
        assert!(matches!(err, PersistenceError::Json(_)));
    }

    #[tokio::test]
    async fn memory_snapshot_can_fail_on_demand() {
        let mem = MemorySnapshot::new();
        mem.fail_saves(true);
        assert!(mem.save(&Snapshot::new()).await.is_err());
        assert_eq!(mem.save_count(), 0);

        mem.fail_saves(false);
        mem.save(&Snapshot::new()).await.unwrap();
        assert_eq!(mem.save_count(), 1);
    }
}
