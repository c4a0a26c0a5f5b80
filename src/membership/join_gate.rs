use tokio::sync::watch;
use tokio::time::{self, Duration};

pub(super) fn new() -> (JoinNotifier, JoinGate) {
    let (snd, rcv) = watch::channel(false);

    (JoinNotifier { snd }, JoinGate { rcv })
}

pub(super) struct JoinNotifier {
    snd: watch::Sender<bool>,
}

impl JoinNotifier {
    pub(super) fn notify_joined(&self) {
        let _ = self.snd.send(true);
    }
}

/// JoinGate opens once the local node's own `Up` event has been observed. It never closes again.
#[derive(Clone)]
pub struct JoinGate {
    rcv: watch::Receiver<bool>,
}

impl JoinGate {
    pub fn is_joined(&self) -> bool {
        *self.rcv.borrow()
    }

    /// `wait_for_join()` suspends until the local node is `Up`. Returns false if `timeout` elapses
    /// first.
    pub async fn wait_for_join(&self, timeout: Duration) -> bool {
        let mut rcv = self.rcv.clone();
        let wait = async move {
            loop {
                let joined = *rcv.borrow();
                if joined {
                    return true;
                }
                if rcv.changed().await.is_err() {
                    // Tracker is gone. Whatever it last published is final.
                    return *rcv.borrow();
                }
            }
        };

        time::timeout(timeout, wait).await.unwrap_or(false)
    }

    pub async fn require_join(&self, timeout: Duration) -> Result<(), JoinTimeoutError> {
        if self.wait_for_join(timeout).await {
            Ok(())
        } else {
            Err(JoinTimeoutError { timeout })
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Local node did not join the cluster within {timeout:?}")]
pub struct JoinTimeoutError {
    pub timeout: Duration,
}
