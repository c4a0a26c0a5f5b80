use crate::membership::{leader, MembershipListener, MembershipView, NodeId};
use crate::singleton::handle::StatusNotifier;
use crate::singleton::{SingletonContext, SingletonFactory, SingletonFault, SingletonKey, SingletonState};
use std::future;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;

#[derive(Copy, Clone, Debug)]
pub(crate) struct LifecycleConfig {
    pub(crate) start_timeout: Duration,
    pub(crate) stop_grace_period: Duration,
}

/// SingletonLifecycle drives one registration on this node through
/// `Idle -> Starting -> Active -> Stopping -> Idle`. It re-evaluates leadership every time the
/// membership view changes and makes sure a local instance exists iff this node is the leader.
pub(crate) struct SingletonLifecycle {
    logger: slog::Logger,
    key: SingletonKey,
    local_node: NodeId,
    factory: Arc<dyn SingletonFactory>,
    config: LifecycleConfig,
    status: StatusNotifier,
    running: Option<RunningInstance>,
}

struct RunningInstance {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl SingletonLifecycle {
    pub(crate) fn new(
        logger: slog::Logger,
        key: SingletonKey,
        local_node: NodeId,
        factory: Arc<dyn SingletonFactory>,
        config: LifecycleConfig,
        status: StatusNotifier,
    ) -> Self {
        SingletonLifecycle {
            logger,
            key,
            local_node,
            factory,
            config,
            status,
            running: None,
        }
    }

    pub(crate) async fn run(mut self, mut listener: MembershipListener, shutdown: CancellationToken) {
        let view = listener.snapshot();
        self.reconcile(&view).await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = listener.changed() => {
                    if !changed {
                        slog::warn!(self.logger, "Membership tracker exited. Standing down.");
                        break;
                    }
                    let view = listener.snapshot();
                    self.reconcile(&view).await;
                }
                exited = instance_exit(&mut self.running) => self.on_instance_exit(exited),
            }
        }

        self.stand_down().await;
        slog::info!(self.logger, "Lifecycle exited");
    }

    async fn reconcile(&mut self, view: &MembershipView) {
        match leader(view, self.key.required_roles()) {
            Some(node) if node == self.local_node => self.become_leader().await,
            Some(node) => {
                slog::debug!(self.logger, "Leader is {} (view v{})", node, view.version());
                self.stand_down().await;
            }
            None => {
                slog::debug!(self.logger, "No eligible node (view v{})", view.version());
                self.stand_down().await;
            }
        }
    }

    async fn become_leader(&mut self) {
        if let Some(running) = &self.running {
            if !running.task.is_finished() {
                return;
            }
            slog::warn!(self.logger, "Instance exited while this node is still leader. Starting a new one.");
            self.stand_down().await;
        }

        self.start_instance().await;
    }

    // The instance is not restarted here. The next view change that keeps this node leader starts
    // a new one.
    fn on_instance_exit(&mut self, exited: Result<(), JoinError>) {
        self.running = None;
        self.status.set_state(SingletonState::Stopping);

        match exited {
            Ok(()) => {
                slog::warn!(self.logger, "Instance returned while this node is still leader");
                self.status.set_state(SingletonState::Idle);
            }
            Err(e) => {
                let fault = SingletonFault::InstanceFailed(e.to_string());
                slog::error!(self.logger, "{}", fault);
                self.status.update(|status| {
                    status.state = SingletonState::Idle;
                    status.last_fault = Some(fault);
                });
            }
        }
    }

    async fn start_instance(&mut self) {
        self.status.set_state(SingletonState::Starting);
        slog::info!(self.logger, "This node is leader. Starting instance.");

        let stop = CancellationToken::new();
        let ctx = SingletonContext::new(
            self.key.clone(),
            self.local_node.clone(),
            stop.clone(),
            self.logger.clone(),
        );
        let mut actor = self.factory.create();

        let started = time::timeout(self.config.start_timeout, actor.pre_start(&ctx)).await;
        let fault = match started {
            Ok(Ok(())) => {
                let task = tokio::spawn(async move { actor.run(ctx).await });
                self.running = Some(RunningInstance { stop, task });
                self.status.update(|status| {
                    status.state = SingletonState::Active;
                    status.instances_started += 1;
                });
                slog::info!(self.logger, "Instance is active");
                return;
            }
            Ok(Err(e)) => SingletonFault::StartFailed(e.to_string()),
            Err(_) => SingletonFault::StartTimeout(self.config.start_timeout),
        };

        slog::error!(self.logger, "{}", fault);
        self.status.update(|status| {
            status.state = SingletonState::Idle;
            status.last_fault = Some(fault);
        });
    }

    async fn stand_down(&mut self) {
        let running = match self.running.take() {
            Some(running) => running,
            None => return,
        };

        self.status.set_state(SingletonState::Stopping);
        slog::info!(self.logger, "Standing down");

        running.stop.cancel();
        let mut task = running.task;
        let stopped = time::timeout(self.config.stop_grace_period, &mut task).await;
        match stopped {
            Ok(Ok(())) => slog::info!(self.logger, "Instance stopped"),
            Ok(Err(e)) => slog::warn!(self.logger, "Instance terminated abnormally: {:?}", e),
            Err(_) => {
                task.abort();
                let fault = SingletonFault::HandoffFault {
                    grace_period: self.config.stop_grace_period,
                };
                slog::error!(self.logger, "{}. Aborted it; resources it held may have leaked.", fault);
                self.status.update(|status| status.last_fault = Some(fault));
            }
        }

        self.status.set_state(SingletonState::Idle);
    }
}

/// Resolves when the running instance's task ends. Pending forever while nothing runs.
async fn instance_exit(running: &mut Option<RunningInstance>) -> Result<(), JoinError> {
    match running {
        Some(running) => (&mut running.task).await,
        None => future::pending().await,
    }
}
