use crate::membership::join_gate::{self, JoinGate, JoinNotifier};
use crate::membership::{MembershipEventKind, MembershipEventStream, MembershipView, NodeId};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub(crate) fn create_tracker(
    logger: slog::Logger,
    local_node: NodeId,
    events: MembershipEventStream,
) -> (MembershipTracker, MembershipReader, JoinGate) {
    let view = Arc::new(ArcSwap::from_pointee(MembershipView::empty()));
    let (change_snd, change_rcv) = watch::channel(0);
    let (join_notifier, join_gate) = join_gate::new();

    let tracker = MembershipTracker {
        logger,
        local_node,
        events,
        view: view.clone(),
        change_snd,
        join_notifier,
    };
    let reader = MembershipReader {
        view,
        changes: change_rcv,
    };

    (tracker, reader, join_gate)
}

/// MembershipTracker is the single writer of the membership view. It folds provider events into
/// a new view and swaps the shared pointer, then pokes every listener.
pub(crate) struct MembershipTracker {
    logger: slog::Logger,
    local_node: NodeId,
    events: MembershipEventStream,
    view: Arc<ArcSwap<MembershipView>>,
    change_snd: watch::Sender<u64>,
    join_notifier: JoinNotifier,
}

impl MembershipTracker {
    pub(crate) async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    slog::info!(self.logger, "Membership tracker shutting down");
                    return;
                }
                event = self.events.recv() => match event {
                    Some(event) => {
                        let next = self.view.load().apply(&event);
                        slog::debug!(
                            self.logger,
                            "Membership event {:?} for {} (view v{})",
                            event.kind,
                            event.node_id,
                            next.version()
                        );

                        let version = next.version();
                        self.view.store(Arc::new(next));
                        let _ = self.change_snd.send(version);

                        if event.kind == MembershipEventKind::Up && event.node_id == self.local_node {
                            slog::info!(self.logger, "Local node {} is Up. Join observed.", self.local_node);
                            self.join_notifier.notify_joined();
                        }
                    }
                    None => {
                        slog::warn!(
                            self.logger,
                            "Membership event stream ended. Node {} is detached from the cluster.",
                            self.local_node
                        );
                        let detached = self.view.load().detached();
                        let version = detached.version();
                        self.view.store(Arc::new(detached));
                        let _ = self.change_snd.send(version);

                        // Keep listeners alive on the empty view until we are told to stop.
                        shutdown.cancelled().await;
                        return;
                    }
                }
            }
        }
    }
}

/// MembershipReader hands out lock-free snapshots of the current view.
#[derive(Clone)]
pub struct MembershipReader {
    view: Arc<ArcSwap<MembershipView>>,
    changes: watch::Receiver<u64>,
}

impl MembershipReader {
    pub fn snapshot(&self) -> Arc<MembershipView> {
        self.view.load_full()
    }

    pub(crate) fn listener(&self) -> MembershipListener {
        let mut changes = self.changes.clone();
        changes.borrow_and_update();
        let seen = self.view.load().version();

        MembershipListener {
            view: self.view.clone(),
            changes,
            seen,
        }
    }
}

/// MembershipListener wakes up whenever the view changes. Intermediate versions can be skipped;
/// only the latest view matters.
pub(crate) struct MembershipListener {
    view: Arc<ArcSwap<MembershipView>>,
    changes: watch::Receiver<u64>,
    // Version of the last view handed out by `snapshot()`.
    seen: u64,
}

impl MembershipListener {
    /// Also marks the returned view as seen: `changed()` only fires for a newer one.
    pub(crate) fn snapshot(&mut self) -> Arc<MembershipView> {
        self.changes.borrow_and_update();
        let view = self.view.load_full();
        self.seen = view.version();
        view
    }

    /// Returns false once the tracker has exited and no further change can arrive.
    pub(crate) async fn changed(&mut self) -> bool {
        loop {
            if self.changes.changed().await.is_err() {
                return false;
            }
            // The view is stored before the version is sent, so a snapshot taken in between
            // already covers this notification.
            if self.view.load().version() != self.seen {
                return true;
            }
        }
    }
}
