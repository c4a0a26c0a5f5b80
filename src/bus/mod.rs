mod broadcast_bus;
mod dispatcher;
mod envelope;
mod in_memory;
mod mailboxes;
mod transport;

pub use broadcast_bus::{BroadcastBus, BusError, BusHandle};
pub use envelope::{Envelope, ReplyError};
pub use in_memory::InMemoryBusTransport;
pub use mailboxes::{mailbox, Mailbox, MailboxId, MailboxRef, WeakMailboxRef};
pub use transport::{BusTransport, InboundDispatch, TransportMessage};
