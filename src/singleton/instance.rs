use crate::membership::NodeId;
use crate::singleton::SingletonKey;
use std::error::Error;
use tokio_util::sync::CancellationToken;

pub type StartError = Box<dyn Error + Send + Sync>;

/// Handed to a singleton instance for its whole lifetime on this node.
pub struct SingletonContext {
    key: SingletonKey,
    node: NodeId,
    stop: CancellationToken,
    logger: slog::Logger,
}

impl SingletonContext {
    pub(crate) fn new(key: SingletonKey, node: NodeId, stop: CancellationToken, logger: slog::Logger) -> Self {
        SingletonContext {
            key,
            node,
            stop,
            logger,
        }
    }

    pub fn key(&self) -> &SingletonKey {
        &self.key
    }

    /// The node this instance is running on.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn logger(&self) -> &slog::Logger {
        &self.logger
    }

    /// Resolves once this node has been asked to stand down. `run()` must return promptly after
    /// that, or the instance is aborted when the stop grace period runs out.
    pub async fn stopped(&self) {
        self.stop.cancelled().await
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }
}

/// SingletonActor is the unit of work that must run on exactly one eligible node.
#[async_trait::async_trait]
pub trait SingletonActor: Send + 'static {
    /// Runs before the instance counts as active. Bounded by the singleton start timeout.
    async fn pre_start(&mut self, _ctx: &SingletonContext) -> Result<(), StartError> {
        Ok(())
    }

    async fn run(&mut self, ctx: SingletonContext);
}

/// Builds a fresh instance every time this node becomes the leader for a singleton.
pub trait SingletonFactory: Send + Sync + 'static {
    fn create(&self) -> Box<dyn SingletonActor>;
}

impl<F> SingletonFactory for F
where
    F: Fn() -> Box<dyn SingletonActor> + Send + Sync + 'static,
{
    fn create(&self) -> Box<dyn SingletonActor> {
        (self)()
    }
}
