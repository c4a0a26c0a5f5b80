use crate::membership::{MembershipEvent, MembershipEventKind, Node, NodeId, NodeStatus};
use std::collections::BTreeMap;

/// MembershipView is an immutable, point-in-time picture of the cluster as this node has seen it
/// through the provider's event stream. Updates never mutate a view in place; `apply()` builds the
/// next one so that readers holding the old `Arc` keep a consistent picture.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MembershipView {
    nodes: BTreeMap<NodeId, Node>,
    version: u64,
}

impl MembershipView {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of events folded into this view. Strictly increases with every update.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, node_id: &NodeId) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `apply()` returns the view that results from folding `event` into this one.
    pub(crate) fn apply(&self, event: &MembershipEvent) -> MembershipView {
        let mut next = self.clone();
        next.version += 1;

        let id = &event.node_id;
        match event.kind {
            MembershipEventKind::Joined => {
                next.nodes.entry(id.clone()).or_insert_with(|| {
                    Node::new(
                        id.clone(),
                        event.roles.clone(),
                        NodeStatus::Joining,
                        event.join_ordinal,
                    )
                });
            }
            MembershipEventKind::Up => match next.nodes.get_mut(id) {
                // Down is terminal until the provider removes the node.
                Some(node) if node.status == NodeStatus::Down => {}
                Some(node) => {
                    node.status = NodeStatus::Up;
                    node.roles = event.roles.clone();
                    node.join_ordinal = event.join_ordinal;
                }
                None => {
                    next.nodes.insert(
                        id.clone(),
                        Node::new(id.clone(), event.roles.clone(), NodeStatus::Up, event.join_ordinal),
                    );
                }
            },
            MembershipEventKind::Leaving => {
                if let Some(node) = next.nodes.get_mut(id) {
                    if node.status != NodeStatus::Down {
                        node.status = NodeStatus::Leaving;
                    }
                }
            }
            MembershipEventKind::Down => {
                if let Some(node) = next.nodes.get_mut(id) {
                    node.status = NodeStatus::Down;
                }
            }
            MembershipEventKind::Removed => {
                next.nodes.remove(id);
            }
        }

        next
    }

    /// The view a node falls back to once it is detached from the cluster.
    pub(crate) fn detached(&self) -> MembershipView {
        MembershipView {
            nodes: BTreeMap::new(),
            version: self.version + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::{roles, JoinOrdinal, RoleSet};

    fn event(id: &str, kind: MembershipEventKind, ordinal: u64, node_roles: RoleSet) -> MembershipEvent {
        MembershipEvent {
            node_id: NodeId::new(id),
            roles: node_roles,
            kind,
            join_ordinal: JoinOrdinal::new(ordinal),
        }
    }

    fn status_of(view: &MembershipView, id: &str) -> Option<NodeStatus> {
        view.get(&NodeId::new(id)).map(|n| n.status())
    }

    #[test]
    fn node_lifecycle_follows_events() {
        let r1 = roles(["r1"]);
        let view = MembershipView::empty();

        let view = view.apply(&event("a", MembershipEventKind::Joined, 1, r1.clone()));
        assert_eq!(status_of(&view, "a"), Some(NodeStatus::Joining));

        let view = view.apply(&event("a", MembershipEventKind::Up, 1, r1.clone()));
        assert_eq!(status_of(&view, "a"), Some(NodeStatus::Up));

        let view = view.apply(&event("a", MembershipEventKind::Leaving, 1, r1.clone()));
        assert_eq!(status_of(&view, "a"), Some(NodeStatus::Leaving));

        let view = view.apply(&event("a", MembershipEventKind::Removed, 1, r1));
        assert_eq!(status_of(&view, "a"), None);
        assert!(view.is_empty());
        assert_eq!(view.version(), 4);
    }

    #[test]
    fn apply_leaves_the_previous_view_untouched() {
        let before = MembershipView::empty().apply(&event("a", MembershipEventKind::Up, 1, roles(["r1"])));
        let after = before.apply(&event("b", MembershipEventKind::Up, 2, roles(["r1"])));

        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 2);
        assert!(after.version() > before.version());
    }

    #[test]
    fn duplicate_joins_keep_a_single_entry() {
        let view = MembershipView::empty()
            .apply(&event("a", MembershipEventKind::Joined, 1, roles(["r1"])))
            .apply(&event("a", MembershipEventKind::Joined, 1, roles(["r1"])))
            .apply(&event("a", MembershipEventKind::Up, 1, roles(["r1"])))
            .apply(&event("a", MembershipEventKind::Joined, 1, roles(["r1"])));

        assert_eq!(view.len(), 1);
        assert_eq!(status_of(&view, "a"), Some(NodeStatus::Up));
    }

    #[test]
    fn down_is_terminal_until_removed() {
        let view = MembershipView::empty()
            .apply(&event("a", MembershipEventKind::Up, 1, roles(["r1"])))
            .apply(&event("a", MembershipEventKind::Down, 1, roles(["r1"])))
            .apply(&event("a", MembershipEventKind::Up, 1, roles(["r1"])))
            .apply(&event("a", MembershipEventKind::Leaving, 1, roles(["r1"])));

        assert_eq!(status_of(&view, "a"), Some(NodeStatus::Down));
    }

    #[test]
    fn events_for_unknown_nodes_are_ignored_except_up() {
        let view = MembershipView::empty()
            .apply(&event("ghost", MembershipEventKind::Leaving, 7, RoleSet::new()))
            .apply(&event("ghost", MembershipEventKind::Down, 7, RoleSet::new()))
            .apply(&event("ghost", MembershipEventKind::Removed, 7, RoleSet::new()));
        assert!(view.is_empty());

        let view = view.apply(&event("late", MembershipEventKind::Up, 9, roles(["r2"])));
        assert_eq!(status_of(&view, "late"), Some(NodeStatus::Up));
        assert_eq!(
            view.get(&NodeId::new("late")).map(|n| n.join_ordinal()),
            Some(JoinOrdinal::new(9))
        );
    }
}
