use crate::bus::{MailboxRef, WeakMailboxRef};
use std::fmt;
use std::sync::Arc;

/// Envelope is what a subscriber receives: the published payload plus, optionally, a weak reply
/// address for the publisher.
pub struct Envelope<T> {
    payload: Arc<T>,
    sender: Option<WeakMailboxRef<T>>,
}

impl<T: Send + Sync + 'static> Envelope<T> {
    pub fn new(payload: T, sender: Option<WeakMailboxRef<T>>) -> Self {
        Self::from_shared(Arc::new(payload), sender)
    }

    // Every subscriber of a publish shares one payload allocation.
    pub(crate) fn from_shared(payload: Arc<T>, sender: Option<WeakMailboxRef<T>>) -> Self {
        Envelope { payload, sender }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn shared_payload(&self) -> Arc<T> {
        self.payload.clone()
    }

    pub fn sender(&self) -> Option<&WeakMailboxRef<T>> {
        self.sender.as_ref()
    }

    /// `reply()` sends `payload` straight back to the publisher, bypassing the bus.
    pub fn reply(&self, payload: T, from: Option<&MailboxRef<T>>) -> Result<(), ReplyError> {
        let sender = self.sender.as_ref().ok_or(ReplyError::NoSender)?;
        sender.tell(payload, from)
    }
}

impl<T> Clone for Envelope<T> {
    fn clone(&self) -> Self {
        Envelope {
            payload: self.payload.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Envelope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("payload", &self.payload)
            .field("sender", &self.sender)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("Message was published without a sender")]
    NoSender,
    #[error("Sender's mailbox no longer exists")]
    MailboxGone,
}
