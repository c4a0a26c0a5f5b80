use crate::membership::{JoinOrdinal, NodeId, RoleSet};
use tokio::sync::mpsc;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MembershipEventKind {
    Joined,
    Up,
    Leaving,
    Down,
    /// The node is confirmed gone and must be dropped from the view.
    Removed,
}

/// One membership change, as reported by the external membership provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MembershipEvent {
    pub node_id: NodeId,
    pub roles: RoleSet,
    pub kind: MembershipEventKind,
    pub join_ordinal: JoinOrdinal,
}

pub type MembershipEventStream = mpsc::UnboundedReceiver<MembershipEvent>;

/// MembershipProvider is the narrow seam to whatever runs the real membership protocol (gossip,
/// failure detection, seed discovery). We never implement that protocol ourselves.
#[async_trait::async_trait]
pub trait MembershipProvider: Send + Sync + 'static {
    /// Address of the node this process runs as.
    fn local_node(&self) -> NodeId;

    /// Roles configured for the local node at process start.
    fn local_roles(&self) -> RoleSet;

    /// `subscribe()` returns a stream of membership events. Current members are replayed first,
    /// then live events follow in the order the provider observed them. The stream ends when
    /// the local node is no longer part of the cluster.
    fn subscribe(&self) -> MembershipEventStream;

    /// Voluntarily leave the cluster. Used for graceful shutdown.
    async fn leave(&self) -> Result<(), ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Node {0} is not a member of the cluster")]
    NotAMember(NodeId),
    #[error("Membership provider failure: {0}")]
    Other(String),
}
