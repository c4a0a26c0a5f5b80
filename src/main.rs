use cluster_singleton::{
    mailbox, register_presence, roles, try_create_cluster_services, BusHandle, ClusterOptions, ClusterServices,
    ClusterServicesConfig, InMemoryBusTransport, InMemoryCluster, InMemoryCoordinationStore, NodeId, PresenceOptions,
    RoleSet, SingletonActor, SingletonContext, SingletonState,
};
use slog::Drain;
use std::error::Error;
use std::sync::Arc;
use tokio::time::{self, Duration};

const PROBE_TOPIC: &str = "age-out-probe";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let logger = create_root_logger_for_stdout();
    let cluster = InMemoryCluster::new();
    let transport = InMemoryBusTransport::new();
    let store = Arc::new(InMemoryCoordinationStore::new());

    let a = start_node(&logger, &cluster, &transport, "node-a", roles(["r1"])).await?;
    let b = start_node(&logger, &cluster, &transport, "node-b", roles(["r1"])).await?;
    let c = start_node(&logger, &cluster, &transport, "node-c", roles(["r2"])).await?;

    let mut presences = Vec::new();
    for node in [&a, &b, &c].iter() {
        let presence = register_presence(
            store.clone(),
            "/cluster/members",
            node.local_node().as_str(),
            PresenceOptions::default(),
            &logger,
        )
        .await?;
        presences.push(presence);
    }

    let a_handle = register_age_out(&a).await?;
    let b_handle = register_age_out(&b).await?;
    register_age_out(&c).await?;
    a_handle.wait_for_state(SingletonState::Active, Duration::from_secs(5)).await;

    let probe = c.broadcast_bus::<String>(PROBE_TOPIC)?;
    match probe.ask("who runs age-out?".to_string(), Duration::from_secs(1)).await {
        Some(reply) => slog::info!(logger, "Probe answered: {}", reply.payload()),
        None => slog::warn!(logger, "Nobody answered the probe"),
    }

    slog::info!(logger, "Crashing node-a");
    cluster.crash(&NodeId::new("node-a"))?;
    b_handle.wait_for_state(SingletonState::Active, Duration::from_secs(5)).await;

    match probe.ask("who runs age-out now?".to_string(), Duration::from_secs(1)).await {
        Some(reply) => slog::info!(logger, "Probe answered: {}", reply.payload()),
        None => slog::warn!(logger, "Nobody answered the probe"),
    }

    for presence in presences {
        presence.release().await?;
    }
    for node in [&a, &b, &c].iter() {
        node.shutdown().await;
    }

    // Let the async drain flush.
    time::sleep(Duration::from_millis(100)).await;
    Ok(())
}

/// Stand-in for a cluster-wide maintenance job: ticks until asked to stop and answers probes.
struct AgeOutSupervisor {
    probe: BusHandle<String>,
}

#[async_trait::async_trait]
impl SingletonActor for AgeOutSupervisor {
    async fn run(&mut self, ctx: SingletonContext) {
        let (address, mut inbox) = mailbox::<String>();
        self.probe.subscribe(&address);
        let mut ticks = time::interval(Duration::from_millis(250));

        loop {
            tokio::select! {
                _ = ctx.stopped() => break,
                _ = ticks.tick() => slog::debug!(ctx.logger(), "Aging out stale data"),
                Some(request) = inbox.recv() => {
                    slog::info!(ctx.logger(), "Probe: {}", request.payload());
                    let _ = request.reply(format!("{} runs {}", ctx.node(), ctx.key().name()), Some(&address));
                }
            }
        }

        self.probe.unsubscribe(&address);
    }
}

async fn register_age_out(node: &ClusterServices) -> Result<cluster_singleton::SingletonHandle, Box<dyn Error>> {
    let probe = node.broadcast_bus::<String>(PROBE_TOPIC)?;
    let handle = node
        .register_singleton("age-out-supervisor", roles(["r1"]), move || -> Box<dyn SingletonActor> {
            Box::new(AgeOutSupervisor { probe: probe.clone() })
        })
        .await?;

    Ok(handle)
}

async fn start_node(
    logger: &slog::Logger,
    cluster: &InMemoryCluster,
    transport: &InMemoryBusTransport,
    id: &str,
    node_roles: RoleSet,
) -> Result<ClusterServices, Box<dyn Error>> {
    let services = try_create_cluster_services(ClusterServicesConfig {
        provider: Arc::new(cluster.join(NodeId::new(id), node_roles)),
        transport: Arc::new(transport.clone()),
        info_logger: logger.clone(),
        options: ClusterOptions::default(),
    })
    .await?;

    services.require_join(Duration::from_secs(5)).await?;
    Ok(services)
}

fn create_root_logger_for_stdout() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}
