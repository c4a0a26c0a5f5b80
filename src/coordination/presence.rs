use crate::coordination::{CoordinationStore, StoreError};
use std::convert::TryFrom;
use std::sync::Arc;
use tokio::time::{self, Duration};

#[derive(Clone, Default)]
pub struct PresenceOptions {
    pub max_attempts: Option<u32>,
    pub retry_delay: Option<Duration>,
}

pub(crate) struct PresenceOptionsValidated {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl PresenceOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.max_attempts == 0 {
            return Err("Presence registration needs at least one attempt");
        }

        Ok(())
    }
}

impl TryFrom<PresenceOptions> for PresenceOptionsValidated {
    type Error = &'static str;

    fn try_from(options: PresenceOptions) -> Result<Self, Self::Error> {
        let values = PresenceOptionsValidated {
            max_attempts: options.max_attempts.unwrap_or(6),
            retry_delay: options.retry_delay.unwrap_or(Duration::from_secs(10)),
        };

        values.validate()?;
        Ok(values)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error("Illegal presence options: {0}")]
    IllegalOptions(&'static str),
    #[error("Failed to register '{path}' after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        path: String,
        attempts: u32,
        last_error: StoreError,
    },
}

/// `register_presence()` announces `host` under `namespace` as an ephemeral path, so other
/// services can see which nodes run a given subservice. Failed attempts are retried after a fixed
/// delay; running out of attempts is an error.
pub async fn register_presence(
    store: Arc<dyn CoordinationStore>,
    namespace: &str,
    host: &str,
    options: PresenceOptions,
    logger: &slog::Logger,
) -> Result<PresenceGuard, PresenceError> {
    let options = PresenceOptionsValidated::try_from(options).map_err(PresenceError::IllegalOptions)?;
    let path = format!("{}/{}", namespace.trim_end_matches('/'), host);
    slog::info!(logger, "Registering {} with {}", host, namespace);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match store.create_ephemeral(&path).await {
            Ok(()) => {
                return Ok(PresenceGuard {
                    store,
                    path,
                    logger: logger.clone(),
                    released: false,
                })
            }
            Err(e) => {
                let retrying = attempt < options.max_attempts;
                slog::warn!(
                    logger,
                    "Failed to register '{}' with coordination store: {}, retrying={}",
                    path,
                    e,
                    retrying
                );
                if !retrying {
                    return Err(PresenceError::RetriesExhausted {
                        path,
                        attempts: attempt,
                        last_error: e,
                    });
                }
            }
        }

        time::sleep(options.retry_delay).await;
    }
}

/// Keeps a presence path registered. Call `release()` on clean exit; an unreleased guard removes
/// the path in the background when dropped inside a Tokio runtime.
pub struct PresenceGuard {
    store: Arc<dyn CoordinationStore>,
    path: String,
    logger: slog::Logger,
    released: bool,
}

impl PresenceGuard {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn release(mut self) -> Result<(), StoreError> {
        self.released = true;
        slog::info!(self.logger, "Removing presence '{}'", self.path);
        self.store.delete_recursive(&self.path).await
    }
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let store = self.store.clone();
                let path = self.path.clone();
                let logger = self.logger.clone();
                runtime.spawn(async move {
                    if let Err(e) = store.delete_recursive(&path).await {
                        slog::warn!(logger, "Failed to remove presence '{}': {}", path, e);
                    }
                });
            }
            Err(_) => slog::warn!(
                self.logger,
                "Presence '{}' dropped outside a runtime. It stays until the store session ends.",
                self.path
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryCoordinationStore;

    fn discard_logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn fast_retries(max_attempts: u32) -> PresenceOptions {
        PresenceOptions {
            max_attempts: Some(max_attempts),
            retry_delay: Some(Duration::from_millis(1)),
        }
    }

    #[tokio::test]
    async fn registers_after_transient_failures() {
        let store = InMemoryCoordinationStore::new();
        store.fail_next(2);

        let guard = register_presence(Arc::new(store.clone()), "/workers/", "host-1", fast_retries(3), &discard_logger())
            .await
            .unwrap();

        assert_eq!(guard.path(), "/workers/host-1");
        assert!(store.is_ephemeral("/workers/host-1"));

        guard.release().await.unwrap();
        assert!(!store.exists("/workers/host-1"));
    }

    #[tokio::test]
    async fn exhausted_retries_are_reported() {
        let store = InMemoryCoordinationStore::new();
        store.fail_next(10);

        let result = register_presence(Arc::new(store.clone()), "/workers", "host-1", fast_retries(3), &discard_logger()).await;

        match result {
            Err(PresenceError::RetriesExhausted { path, attempts, last_error }) => {
                assert_eq!(path, "/workers/host-1");
                assert_eq!(attempts, 3);
                assert!(matches!(last_error, StoreError::Unavailable(_)));
            }
            Err(e) => panic!("Unexpected error: {}", e),
            Ok(guard) => panic!("Unexpected registration at {}", guard.path()),
        }
        assert!(!store.exists("/workers/host-1"));
    }

    #[tokio::test]
    async fn dropped_guard_cleans_up() {
        let store = InMemoryCoordinationStore::new();
        let guard = register_presence(Arc::new(store.clone()), "/workers", "host-1", fast_retries(1), &discard_logger())
            .await
            .unwrap();

        drop(guard);
        for _ in 0..100 {
            if !store.exists("/workers/host-1") {
                break;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!store.exists("/workers/host-1"));
    }

    #[tokio::test]
    async fn zero_attempts_is_rejected() {
        let store = InMemoryCoordinationStore::new();

        let result = register_presence(Arc::new(store), "/workers", "host-1", fast_retries(0), &discard_logger()).await;

        assert!(matches!(result, Err(PresenceError::IllegalOptions(_))));
    }
}
