use crate::actor::WeakRegistryClient;
use crate::membership::{eligible, JoinGate, MembershipReader, NodeId};
use crate::singleton::handle::status_channel;
use crate::singleton::lifecycle::{LifecycleConfig, SingletonLifecycle};
use crate::singleton::{
    DeregisterError, RegisterError, RoleRestrictionError, SingletonFactory, SingletonHandle, SingletonKey,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) struct RegisterInput {
    pub(crate) key: SingletonKey,
    pub(crate) factory: Arc<dyn SingletonFactory>,
}

/// SingletonRegistry owns every singleton registration on this node. It lives inside the registry
/// actor, which makes it the only writer of the table.
pub(crate) struct SingletonRegistry {
    logger: slog::Logger,
    local_node: NodeId,
    membership: MembershipReader,
    join_gate: JoinGate,
    config: LifecycleConfig,
    registrations: HashMap<String, Registration>,
    shutdown: CancellationToken,
    registry_client: WeakRegistryClient,
}

struct Registration {
    stop: CancellationToken,
    lifecycle: JoinHandle<()>,
}

impl SingletonRegistry {
    pub(crate) fn new(
        logger: slog::Logger,
        local_node: NodeId,
        membership: MembershipReader,
        join_gate: JoinGate,
        config: LifecycleConfig,
        shutdown: CancellationToken,
        registry_client: WeakRegistryClient,
    ) -> Self {
        SingletonRegistry {
            logger,
            local_node,
            membership,
            join_gate,
            config,
            registrations: HashMap::new(),
            shutdown,
            registry_client,
        }
    }

    pub(crate) fn register(&mut self, input: RegisterInput) -> Result<SingletonHandle, RegisterError> {
        let RegisterInput { key, factory } = input;

        if !self.join_gate.is_joined() {
            return Err(RegisterError::NotJoined);
        }
        if self.registrations.contains_key(key.name()) {
            return Err(RegisterError::AlreadyRegistered(key.name().to_string()));
        }

        let view = self.membership.snapshot();
        if eligible(&view, key.required_roles()).is_empty() {
            slog::warn!(
                self.logger,
                "Rejecting singleton '{}'. No Up node has roles {:?}.",
                key.name(),
                key.required_roles()
            );
            return Err(RoleRestrictionError {
                name: key.name().to_string(),
                required_roles: key.required_roles().clone(),
            }
            .into());
        }

        let logger = self.logger.new(slog::o!("singleton" => key.name().to_string()));
        let (notifier, status) = status_channel();
        let lifecycle = SingletonLifecycle::new(
            logger,
            key.clone(),
            self.local_node.clone(),
            factory,
            self.config,
            notifier,
        );

        let stop = self.shutdown.child_token();
        let lifecycle = tokio::spawn(lifecycle.run(self.membership.listener(), stop.clone()));
        self.registrations
            .insert(key.name().to_string(), Registration { stop, lifecycle });

        slog::info!(self.logger, "Registered singleton '{}'", key.name());
        Ok(SingletonHandle::new(key, status, self.registry_client.clone()))
    }

    /// Signals the lifecycle to stand down and returns it, so the caller can wait for the stop.
    pub(crate) fn deregister(&mut self, name: &str) -> Result<JoinHandle<()>, DeregisterError> {
        let registration = self
            .registrations
            .remove(name)
            .ok_or_else(|| DeregisterError::NotRegistered(name.to_string()))?;

        slog::info!(self.logger, "Deregistering singleton '{}'", name);
        registration.stop.cancel();
        Ok(registration.lifecycle)
    }

    pub(crate) fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registrations.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn shutdown(&mut self) -> Vec<JoinHandle<()>> {
        slog::info!(self.logger, "Stopping {} singleton lifecycle(s)", self.registrations.len());
        self.shutdown.cancel();
        self.registrations
            .drain()
            .map(|(_, registration)| registration.lifecycle)
            .collect()
    }
}

impl Drop for SingletonRegistry {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::RegistryActorClient;
    use crate::membership::{
        create_tracker, roles, JoinOrdinal, MembershipEvent, MembershipEventKind, RoleSet,
    };
    use crate::singleton::{SingletonActor, SingletonContext, SingletonState};
    use tokio::sync::mpsc;
    use tokio::time::Duration;

    struct Idler;

    #[async_trait::async_trait]
    impl SingletonActor for Idler {
        async fn run(&mut self, ctx: SingletonContext) {
            ctx.stopped().await;
        }
    }

    fn idler() -> Arc<dyn SingletonFactory> {
        Arc::new(|| -> Box<dyn SingletonActor> { Box::new(Idler) })
    }

    fn input(name: &str, required_roles: RoleSet) -> RegisterInput {
        RegisterInput {
            key: SingletonKey::new(name, required_roles),
            factory: idler(),
        }
    }

    fn up(id: &str, ordinal: u64, node_roles: RoleSet) -> MembershipEvent {
        MembershipEvent {
            node_id: NodeId::new(id),
            roles: node_roles,
            kind: MembershipEventKind::Up,
            join_ordinal: JoinOrdinal::new(ordinal),
        }
    }

    struct Fixture {
        events: mpsc::UnboundedSender<MembershipEvent>,
        gate: JoinGate,
        registry: SingletonRegistry,
        _client: RegistryActorClient,
        _tracker_shutdown: tokio_util::sync::DropGuard,
    }

    fn fixture() -> Fixture {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let (events, rx) = mpsc::unbounded_channel();
        let (tracker, reader, gate) = create_tracker(logger.clone(), NodeId::new("a"), rx);
        let tracker_shutdown = CancellationToken::new();
        tokio::spawn(tracker.run(tracker_shutdown.clone()));

        let (client, _queue) = RegistryActorClient::new(logger.clone(), 4);
        let registry = SingletonRegistry::new(
            logger,
            NodeId::new("a"),
            reader,
            gate.clone(),
            LifecycleConfig {
                start_timeout: Duration::from_secs(1),
                stop_grace_period: Duration::from_secs(1),
            },
            CancellationToken::new(),
            client.weak(),
        );

        Fixture {
            events,
            gate,
            registry,
            _client: client,
            _tracker_shutdown: tracker_shutdown.drop_guard(),
        }
    }

    async fn join(f: &Fixture) {
        f.events.send(up("a", 1, roles(["r1"]))).unwrap();
        assert!(f.gate.wait_for_join(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn register_before_join_is_rejected() {
        let mut f = fixture();

        assert!(matches!(
            f.registry.register(input("s", roles(["r1"]))),
            Err(RegisterError::NotJoined)
        ));
        assert!(f.registry.registered().is_empty());
    }

    #[tokio::test]
    async fn register_rejects_unsatisfiable_roles() {
        let mut f = fixture();
        join(&f).await;

        match f.registry.register(input("s", roles(["missing_role"]))) {
            Err(RegisterError::RoleRestriction(e)) => {
                assert_eq!(e.name, "s");
                assert_eq!(e.required_roles, roles(["missing_role"]));
            }
            other => panic!("Unexpected result: {:?}", other.map(|h| h.state())),
        }
        assert!(f.registry.registered().is_empty());
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let mut f = fixture();
        join(&f).await;

        let handle = f.registry.register(input("s", roles(["r1"]))).unwrap();
        assert!(handle.wait_for_state(SingletonState::Active, Duration::from_secs(1)).await);

        assert!(matches!(
            f.registry.register(input("s", RoleSet::new())),
            Err(RegisterError::AlreadyRegistered(name)) if name == "s"
        ));
        assert_eq!(f.registry.registered(), vec!["s".to_string()]);
    }

    #[tokio::test]
    async fn deregister_stops_the_instance() {
        let mut f = fixture();
        join(&f).await;

        let handle = f.registry.register(input("s", roles(["r1"]))).unwrap();
        assert!(handle.wait_for_state(SingletonState::Active, Duration::from_secs(1)).await);

        let lifecycle = f.registry.deregister("s").unwrap();
        lifecycle.await.unwrap();
        assert_eq!(handle.state(), SingletonState::Idle);

        assert!(matches!(
            f.registry.deregister("s"),
            Err(DeregisterError::NotRegistered(_))
        ));
    }

    #[tokio::test]
    async fn shutdown_drains_every_registration() {
        let mut f = fixture();
        join(&f).await;

        let first = f.registry.register(input("first", roles(["r1"]))).unwrap();
        let second = f.registry.register(input("second", RoleSet::new())).unwrap();
        assert!(first.wait_for_state(SingletonState::Active, Duration::from_secs(1)).await);
        assert!(second.wait_for_state(SingletonState::Active, Duration::from_secs(1)).await);

        for lifecycle in f.registry.shutdown() {
            lifecycle.await.unwrap();
        }

        assert!(f.registry.registered().is_empty());
        assert_eq!(first.state(), SingletonState::Idle);
        assert_eq!(second.state(), SingletonState::Idle);
    }
}
