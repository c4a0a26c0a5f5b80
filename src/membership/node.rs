use std::collections::BTreeSet;
use std::fmt;

/// NodeId is the opaque address the membership provider uses for a cluster member.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodeId(String);

impl NodeId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type RoleSet = BTreeSet<String>;

/// `roles(["r1", "r2"])` is shorthand for building a `RoleSet`.
pub fn roles<I, S>(roles: I) -> RoleSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    roles.into_iter().map(Into::into).collect()
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NodeStatus {
    Joining,
    Up,
    Leaving,
    Down,
}

/// JoinOrdinal is handed out by the membership provider when a node joins. Every member sees the
/// same ordinal for the same node, so ordering by it lets each node pick the same leader without
/// talking to anyone.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct JoinOrdinal(u64);

impl JoinOrdinal {
    pub fn new(ordinal: u64) -> Self {
        JoinOrdinal(ordinal)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for JoinOrdinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    pub(super) id: NodeId,
    pub(super) roles: RoleSet,
    pub(super) status: NodeStatus,
    pub(super) join_ordinal: JoinOrdinal,
}

impl Node {
    pub(super) fn new(id: NodeId, roles: RoleSet, status: NodeStatus, join_ordinal: JoinOrdinal) -> Self {
        Node {
            id,
            roles,
            status,
            join_ordinal,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn join_ordinal(&self) -> JoinOrdinal {
        self.join_ordinal
    }

    /// True if this node carries every role in `required` (an empty requirement always matches).
    pub fn has_roles(&self, required: &RoleSet) -> bool {
        required.is_subset(&self.roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_roles_is_a_subset_check() {
        let node = Node::new(
            NodeId::new("a"),
            roles(["r1", "r2"]),
            NodeStatus::Up,
            JoinOrdinal::new(1),
        );

        assert!(node.has_roles(&roles(["r1"])));
        assert!(node.has_roles(&roles(["r1", "r2"])));
        assert!(node.has_roles(&RoleSet::new()));
        assert!(!node.has_roles(&roles(["r1", "r3"])));
    }
}
