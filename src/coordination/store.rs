use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// CoordinationStore is the narrow seam to an external hierarchical store (ZooKeeper or similar).
#[async_trait::async_trait]
pub trait CoordinationStore: Send + Sync + 'static {
    /// Creates `path`, and any missing parents, as an ephemeral node. It disappears when this
    /// node's session with the store ends.
    async fn create_ephemeral(&self, path: &str) -> Result<(), StoreError>;

    /// Deletes `path` and everything below it. Deleting a missing path is not an error.
    async fn delete_recursive(&self, path: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Path '{0}' already exists")]
    NodeExists(String),
    #[error("Coordination store unavailable: {0}")]
    Unavailable(String),
}

/// In-process `CoordinationStore` for tests and the demo binary. Failures can be injected.
#[derive(Clone, Default)]
pub struct InMemoryCoordinationStore {
    state: Arc<Mutex<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    paths: BTreeMap<String, PathEntry>,
    failures_remaining: usize,
}

struct PathEntry {
    ctime: DateTime<Utc>,
    ephemeral: bool,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` calls fail with `StoreError::Unavailable`.
    pub fn fail_next(&self, count: usize) {
        self.state
            .lock()
            .expect("InMemoryCoordinationStore.fail_next() mutex guard poison")
            .failures_remaining = count;
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state
            .lock()
            .expect("InMemoryCoordinationStore.exists() mutex guard poison")
            .paths
            .contains_key(path)
    }

    pub fn is_ephemeral(&self, path: &str) -> bool {
        self.state
            .lock()
            .expect("InMemoryCoordinationStore.is_ephemeral() mutex guard poison")
            .paths
            .get(path)
            .map(|entry| entry.ephemeral)
            .unwrap_or(false)
    }

    pub fn created_at(&self, path: &str) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .expect("InMemoryCoordinationStore.created_at() mutex guard poison")
            .paths
            .get(path)
            .map(|entry| entry.ctime)
    }
}

impl StoreState {
    fn injected_failure(&mut self) -> Result<(), StoreError> {
        if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn create_ephemeral(&self, path: &str) -> Result<(), StoreError> {
        let mut state = self
            .state
            .lock()
            .expect("InMemoryCoordinationStore.create_ephemeral() mutex guard poison");
        state.injected_failure()?;

        if state.paths.contains_key(path) {
            return Err(StoreError::NodeExists(path.to_string()));
        }

        let now = Utc::now();
        let mut parent = String::new();
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            parent.push('/');
            parent.push_str(segment);
            if parent.len() < path.trim_end_matches('/').len() {
                state.paths.entry(parent.clone()).or_insert(PathEntry {
                    ctime: now,
                    ephemeral: false,
                });
            }
        }
        state.paths.insert(
            path.to_string(),
            PathEntry {
                ctime: now,
                ephemeral: true,
            },
        );
        Ok(())
    }

    async fn delete_recursive(&self, path: &str) -> Result<(), StoreError> {
        let mut state = self
            .state
            .lock()
            .expect("InMemoryCoordinationStore.delete_recursive() mutex guard poison");
        state.injected_failure()?;

        let children_prefix = format!("{}/", path.trim_end_matches('/'));
        state
            .paths
            .retain(|existing, _| existing != path && !existing.starts_with(&children_prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_makes_parents_and_rejects_duplicates() {
        let store = InMemoryCoordinationStore::new();

        store.create_ephemeral("/presence/workers/host-1").await.unwrap();

        assert!(store.exists("/presence"));
        assert!(store.exists("/presence/workers"));
        assert!(!store.is_ephemeral("/presence/workers"));
        assert!(store.is_ephemeral("/presence/workers/host-1"));
        assert!(store.created_at("/presence/workers/host-1").is_some());
        assert!(matches!(
            store.create_ephemeral("/presence/workers/host-1").await,
            Err(StoreError::NodeExists(_))
        ));
    }

    #[tokio::test]
    async fn delete_is_recursive() {
        let store = InMemoryCoordinationStore::new();
        store.create_ephemeral("/presence/workers/host-1").await.unwrap();
        store.create_ephemeral("/presence/workers/host-2").await.unwrap();
        store.create_ephemeral("/presence/workers-old").await.unwrap();

        store.delete_recursive("/presence/workers").await.unwrap();

        assert!(!store.exists("/presence/workers"));
        assert!(!store.exists("/presence/workers/host-1"));
        assert!(store.exists("/presence/workers-old"));
        store.delete_recursive("/missing").await.unwrap();
    }

    #[tokio::test]
    async fn injected_failures_run_out() {
        let store = InMemoryCoordinationStore::new();
        store.fail_next(2);

        assert!(store.create_ephemeral("/a").await.is_err());
        assert!(store.create_ephemeral("/a").await.is_err());
        assert!(store.create_ephemeral("/a").await.is_ok());
    }
}
