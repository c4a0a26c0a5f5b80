use crate::actor::{RegistryActor, RegistryActorClient};
use crate::api::client::ClusterServices;
use crate::api::options::ClusterOptionsValidated;
use crate::bus::{BroadcastBus, BusTransport};
use crate::membership::{create_tracker, MembershipProvider};
use crate::singleton::{LifecycleConfig, SingletonRegistry};
use crate::ClusterOptions;
use std::convert::TryFrom;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ClusterServicesConfig {
    pub provider: Arc<dyn MembershipProvider>,
    pub transport: Arc<dyn BusTransport>,
    pub info_logger: slog::Logger,
    pub options: ClusterOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterServicesCreationError {
    #[error("Illegal options for configuring cluster services: {0}")]
    IllegalOptions(String),
}

/// `try_create_cluster_services()` wires up one node: it starts the membership tracker and the
/// singleton registry actor, and attaches the broadcast bus to the transport. Must be called from
/// within a Tokio runtime.
pub async fn try_create_cluster_services(
    config: ClusterServicesConfig,
) -> Result<ClusterServices, ClusterServicesCreationError> {
    let options = ClusterOptionsValidated::try_from(config.options)
        .map_err(|e| ClusterServicesCreationError::IllegalOptions(e.to_string()))?;

    let local_node = config.provider.local_node();
    let root_logger = config
        .info_logger
        .new(slog::o!("node" => local_node.to_string()));
    let shutdown = CancellationToken::new();

    let (tracker, membership, join_gate) = create_tracker(
        root_logger.new(slog::o!("component" => "membership")),
        local_node.clone(),
        config.provider.subscribe(),
    );
    let tracker_shutdown = shutdown.child_token();
    tokio::spawn(tracker.run(tracker_shutdown.clone()));

    let (registry_client, registry_queue) = RegistryActorClient::new(
        root_logger.new(slog::o!("component" => "registry")),
        options.registry_queue_size,
    );
    let registry = SingletonRegistry::new(
        root_logger.new(slog::o!("component" => "registry")),
        local_node.clone(),
        membership.clone(),
        join_gate.clone(),
        LifecycleConfig {
            start_timeout: options.singleton_start_timeout,
            stop_grace_period: options.singleton_stop_grace_period,
        },
        shutdown.child_token(),
        registry_client.weak(),
    );
    let registry_actor = RegistryActor::new(
        root_logger.new(slog::o!("component" => "registry")),
        registry_queue,
        registry,
    );
    tokio::spawn(registry_actor.run_event_loop());

    let bus = BroadcastBus::attach(
        root_logger.new(slog::o!("component" => "bus")),
        local_node,
        config.transport,
    );

    Ok(ClusterServices::new(
        root_logger,
        config.provider,
        membership,
        join_gate,
        registry_client,
        bus,
        tracker_shutdown,
        shutdown,
    ))
}
