mod in_memory;
mod join_gate;
mod node;
mod provider;
mod role_filter;
mod tracker;
mod view;

pub use in_memory::{InMemoryCluster, InMemoryMembership};
pub use join_gate::{JoinGate, JoinTimeoutError};
pub use node::{roles, JoinOrdinal, Node, NodeId, NodeStatus, RoleSet};
pub use provider::{MembershipEvent, MembershipEventKind, MembershipEventStream, MembershipProvider, ProviderError};
pub use role_filter::{eligible, leader};
pub(crate) use tracker::{create_tracker, MembershipListener};
pub use tracker::MembershipReader;
pub use view::MembershipView;
