use crate::bus::{Envelope, ReplyError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::time::{self, Duration};

static NEXT_MAILBOX_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct MailboxId(u64);

/// `mailbox()` creates a subscriber endpoint. The `MailboxRef` half is the address handed to the
/// bus; the `Mailbox` half receives. Dropping the `Mailbox` closes the address.
pub fn mailbox<T: Send + Sync + 'static>() -> (MailboxRef<T>, Mailbox<T>) {
    let (snd, rcv) = mpsc::unbounded_channel();
    let id = MailboxId(NEXT_MAILBOX_ID.fetch_add(1, Ordering::Relaxed));

    (MailboxRef { id, snd }, Mailbox { id, rcv })
}

pub struct MailboxRef<T> {
    id: MailboxId,
    snd: mpsc::UnboundedSender<Envelope<T>>,
}

impl<T: Send + Sync + 'static> MailboxRef<T> {
    pub fn id(&self) -> MailboxId {
        self.id
    }

    /// Point-to-point send, bypassing the bus. Returns false if the mailbox is gone.
    pub fn tell(&self, payload: T, from: Option<&MailboxRef<T>>) -> bool {
        self.deliver(Envelope::new(payload, from.map(MailboxRef::downgrade)))
    }

    pub(crate) fn deliver(&self, envelope: Envelope<T>) -> bool {
        self.snd.send(envelope).is_ok()
    }

    pub fn downgrade(&self) -> WeakMailboxRef<T> {
        WeakMailboxRef {
            id: self.id,
            snd: self.snd.downgrade(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.snd.is_closed()
    }
}

impl<T> Clone for MailboxRef<T> {
    fn clone(&self) -> Self {
        MailboxRef {
            id: self.id,
            snd: self.snd.clone(),
        }
    }
}

impl<T> fmt::Debug for MailboxRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxRef").field("id", &self.id).finish()
    }
}

/// A reply address. Holding one never keeps the target mailbox alive.
pub struct WeakMailboxRef<T> {
    id: MailboxId,
    snd: mpsc::WeakUnboundedSender<Envelope<T>>,
}

impl<T: Send + Sync + 'static> WeakMailboxRef<T> {
    pub fn id(&self) -> MailboxId {
        self.id
    }

    pub fn upgrade(&self) -> Option<MailboxRef<T>> {
        self.snd.upgrade().map(|snd| MailboxRef { id: self.id, snd })
    }

    pub fn tell(&self, payload: T, from: Option<&MailboxRef<T>>) -> Result<(), ReplyError> {
        let target = self.upgrade().ok_or(ReplyError::MailboxGone)?;
        if target.tell(payload, from) {
            Ok(())
        } else {
            Err(ReplyError::MailboxGone)
        }
    }
}

impl<T> Clone for WeakMailboxRef<T> {
    fn clone(&self) -> Self {
        WeakMailboxRef {
            id: self.id,
            snd: self.snd.clone(),
        }
    }
}

impl<T> fmt::Debug for WeakMailboxRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakMailboxRef").field("id", &self.id).finish()
    }
}

pub struct Mailbox<T> {
    id: MailboxId,
    rcv: mpsc::UnboundedReceiver<Envelope<T>>,
}

impl<T> Mailbox<T> {
    pub fn id(&self) -> MailboxId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Envelope<T>> {
        self.rcv.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope<T>> {
        self.rcv.try_recv().ok()
    }

    /// None on timeout.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Envelope<T>> {
        time::timeout(timeout, self.rcv.recv()).await.ok().flatten()
    }
}
