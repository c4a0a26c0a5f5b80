use crate::actor::WeakRegistryClient;
use crate::singleton::{DeregisterError, SingletonFault, SingletonKey};
use tokio::sync::watch;
use tokio::time::{self, Duration};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SingletonState {
    /// No local instance. Either another node is leader, or nobody is eligible.
    Idle,
    Starting,
    Active,
    Stopping,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SingletonStatus {
    pub state: SingletonState,
    pub last_fault: Option<SingletonFault>,
    /// How many instances this node has started for the singleton since registration.
    pub instances_started: u64,
}

impl SingletonStatus {
    fn idle() -> Self {
        SingletonStatus {
            state: SingletonState::Idle,
            last_fault: None,
            instances_started: 0,
        }
    }
}

pub(crate) fn status_channel() -> (StatusNotifier, watch::Receiver<SingletonStatus>) {
    let (snd, rcv) = watch::channel(SingletonStatus::idle());

    (
        StatusNotifier {
            current: SingletonStatus::idle(),
            snd,
        },
        rcv,
    )
}

pub(crate) struct StatusNotifier {
    current: SingletonStatus,
    snd: watch::Sender<SingletonStatus>,
}

impl StatusNotifier {
    pub(crate) fn update<F: FnOnce(&mut SingletonStatus)>(&mut self, change: F) {
        change(&mut self.current);
        let _ = self.snd.send(self.current.clone());
    }

    pub(crate) fn set_state(&mut self, state: SingletonState) {
        self.update(|status| status.state = state);
    }
}

/// SingletonHandle is what a caller gets back from registering a singleton. It observes the local
/// lifecycle of the singleton and can deregister it.
#[derive(Clone)]
pub struct SingletonHandle {
    key: SingletonKey,
    status: watch::Receiver<SingletonStatus>,
    registry: WeakRegistryClient,
}

impl SingletonHandle {
    pub(crate) fn new(
        key: SingletonKey,
        status: watch::Receiver<SingletonStatus>,
        registry: WeakRegistryClient,
    ) -> Self {
        SingletonHandle { key, status, registry }
    }

    pub fn key(&self) -> &SingletonKey {
        &self.key
    }

    pub fn status(&self) -> SingletonStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> SingletonState {
        self.status.borrow().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == SingletonState::Active
    }

    pub fn last_fault(&self) -> Option<SingletonFault> {
        self.status.borrow().last_fault.clone()
    }

    /// `wait_for_state()` returns true as soon as the local lifecycle reaches `state`, or false if
    /// `timeout` elapses first.
    pub async fn wait_for_state(&self, state: SingletonState, timeout: Duration) -> bool {
        let mut rcv = self.status.clone();
        let wait = async move {
            loop {
                let current = rcv.borrow().state;
                if current == state {
                    return true;
                }
                if rcv.changed().await.is_err() {
                    return rcv.borrow().state == state;
                }
            }
        };

        time::timeout(timeout, wait).await.unwrap_or(false)
    }

    /// Stops the local instance, if any, and removes the registration on this node.
    pub async fn deregister(self) -> Result<(), DeregisterError> {
        let registry = self.registry.upgrade().ok_or(DeregisterError::RegistryExited)?;
        registry.deregister(self.key.name().to_string()).await
    }
}
