use crate::membership::NodeId;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// One published message as it travels between nodes. Payload and reply address are type-erased;
/// the receiving node's dispatcher recovers the topic's payload type.
#[derive(Clone)]
pub struct TransportMessage {
    pub origin: NodeId,
    pub topic: String,
    pub payload: Arc<dyn Any + Send + Sync>,
    pub sender: Option<Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for TransportMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportMessage")
            .field("origin", &self.origin)
            .field("topic", &self.topic)
            .field("has_sender", &self.sender.is_some())
            .finish()
    }
}

/// The receiving side of a node's bus, as seen by the transport.
pub trait InboundDispatch: Send + Sync + 'static {
    fn dispatch(&self, message: &TransportMessage);
}

/// BusTransport moves published messages to every attached node. Delivery is best effort: no
/// acknowledgement, retry or persistence, and nodes that attach later never see earlier messages.
pub trait BusTransport: Send + Sync + 'static {
    fn attach(&self, node: NodeId, inbound: Arc<dyn InboundDispatch>);

    fn detach(&self, node: &NodeId);

    /// Fan out to every attached node, the origin included.
    fn broadcast(&self, message: TransportMessage);
}
