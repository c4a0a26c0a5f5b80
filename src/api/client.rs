use crate::actor::RegistryActorClient;
use crate::bus::{BroadcastBus, BusError, BusHandle};
use crate::membership::{
    JoinGate, JoinTimeoutError, MembershipProvider, MembershipReader, MembershipView, NodeId, ProviderError, RoleSet,
};
use crate::singleton::{
    DeregisterError, RegisterError, RegisterInput, SingletonFactory, SingletonHandle, SingletonKey,
};
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// ClusterServices is the application-facing API of one cluster node: join gating, singleton
/// registration, the broadcast bus, and graceful departure.
///
/// Dropping it stops every background task of this node.
pub struct ClusterServices {
    logger: slog::Logger,
    provider: Arc<dyn MembershipProvider>,
    membership: MembershipReader,
    join_gate: JoinGate,
    registry: RegistryActorClient,
    bus: BroadcastBus,
    tracker_shutdown: CancellationToken,
    shutdown: CancellationToken,
}

impl ClusterServices {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        logger: slog::Logger,
        provider: Arc<dyn MembershipProvider>,
        membership: MembershipReader,
        join_gate: JoinGate,
        registry: RegistryActorClient,
        bus: BroadcastBus,
        tracker_shutdown: CancellationToken,
        shutdown: CancellationToken,
    ) -> Self {
        ClusterServices {
            logger,
            provider,
            membership,
            join_gate,
            registry,
            bus,
            tracker_shutdown,
            shutdown,
        }
    }

    pub fn local_node(&self) -> NodeId {
        self.provider.local_node()
    }

    pub fn local_roles(&self) -> RoleSet {
        self.provider.local_roles()
    }

    pub fn is_joined(&self) -> bool {
        self.join_gate.is_joined()
    }

    /// Returns true once this node has been seen `Up`, or false if `timeout` elapses first.
    pub async fn wait_for_join(&self, timeout: Duration) -> bool {
        self.join_gate.wait_for_join(timeout).await
    }

    pub async fn require_join(&self, timeout: Duration) -> Result<(), JoinTimeoutError> {
        self.join_gate.require_join(timeout).await
    }

    /// Point-in-time copy of the membership view. Never blocks.
    pub fn snapshot(&self) -> Arc<MembershipView> {
        self.membership.snapshot()
    }

    pub fn membership(&self) -> MembershipReader {
        self.membership.clone()
    }

    /// `register_singleton()` makes sure exactly one instance built by `factory` runs on the
    /// oldest `Up` node carrying every role in `required_roles`. Every node that wants to host the
    /// singleton registers it; they all pick the same leader from their own membership view.
    pub async fn register_singleton<F: SingletonFactory>(
        &self,
        name: &str,
        required_roles: RoleSet,
        factory: F,
    ) -> Result<SingletonHandle, RegisterError> {
        let input = RegisterInput {
            key: SingletonKey::new(name, required_roles),
            factory: Arc::new(factory),
        };

        self.registry.register(input).await
    }

    /// Resolves once the local instance, if any, has stopped.
    pub async fn deregister_singleton(&self, name: &str) -> Result<(), DeregisterError> {
        self.registry.deregister(name.to_string()).await
    }

    pub async fn registered_singletons(&self) -> Vec<String> {
        self.registry.registered_singletons().await
    }

    pub fn broadcast_bus<T: Send + Sync + 'static>(&self, topic: &str) -> Result<BusHandle<T>, BusError> {
        self.bus.topic::<T>(topic)
    }

    /// Voluntarily leaves the cluster. Local singletons stand down as soon as the departure shows
    /// up in the membership view, and the next eligible node takes over.
    pub async fn leave(&self) -> Result<(), ProviderError> {
        slog::info!(self.logger, "Leaving the cluster");
        self.provider.leave().await
    }

    /// Leaves the cluster so that peers take over, stands down every local singleton (each within
    /// its stop grace period), detaches from the bus and stops tracking membership.
    pub async fn shutdown(&self) {
        slog::info!(self.logger, "Shutting down cluster services");
        if let Err(e) = self.provider.leave().await {
            slog::warn!(self.logger, "Could not leave the cluster cleanly: {}", e);
        }
        self.registry.shutdown().await;
        self.bus.detach();
        self.tracker_shutdown.cancel();
    }
}

impl Drop for ClusterServices {
    fn drop(&mut self) {
        self.bus.detach();
        self.shutdown.cancel();
    }
}
