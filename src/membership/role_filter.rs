use crate::membership::{MembershipView, Node, NodeId, NodeStatus, RoleSet};

/// `eligible()` lists every `Up` node that carries all of `required_roles`, oldest member first
/// (by join ordinal, then node id). An empty result is a normal state, not an error.
pub fn eligible(view: &MembershipView, required_roles: &RoleSet) -> Vec<NodeId> {
    let mut candidates: Vec<&Node> = view
        .nodes()
        .filter(|node| node.status() == NodeStatus::Up && node.has_roles(required_roles))
        .collect();

    candidates.sort_by(|a, b| {
        a.join_ordinal()
            .cmp(&b.join_ordinal())
            .then_with(|| a.id().cmp(b.id()))
    });

    candidates.into_iter().map(|node| node.id().clone()).collect()
}

/// The node that should host a singleton requiring `required_roles`, if any.
pub fn leader(view: &MembershipView, required_roles: &RoleSet) -> Option<NodeId> {
    eligible(view, required_roles).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::{roles, JoinOrdinal, MembershipEvent, MembershipEventKind};

    fn member(id: &str, ordinal: u64, node_roles: &[&str], kind: MembershipEventKind) -> [MembershipEvent; 2] {
        let event = |kind| MembershipEvent {
            node_id: NodeId::new(id),
            roles: roles(node_roles.iter().copied()),
            kind,
            join_ordinal: JoinOrdinal::new(ordinal),
        };

        [event(MembershipEventKind::Up), event(kind)]
    }

    fn view_of(members: Vec<[MembershipEvent; 2]>) -> MembershipView {
        members
            .iter()
            .flatten()
            .fold(MembershipView::empty(), |view, event| view.apply(event))
    }

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::new(*n)).collect()
    }

    #[test]
    fn orders_by_join_ordinal_and_filters_roles() {
        let view = view_of(vec![
            member("c", 1, &["r2"], MembershipEventKind::Up),
            member("b", 3, &["r1"], MembershipEventKind::Up),
            member("a", 2, &["r1", "r2"], MembershipEventKind::Up),
        ]);

        assert_eq!(eligible(&view, &roles(["r1"])), ids(&["a", "b"]));
        assert_eq!(eligible(&view, &roles(["r2"])), ids(&["c", "a"]));
        assert_eq!(eligible(&view, &roles(["r1", "r2"])), ids(&["a"]));
        assert_eq!(leader(&view, &roles(["r1"])), Some(NodeId::new("a")));
    }

    #[test]
    fn empty_requirement_matches_every_up_node() {
        let view = view_of(vec![
            member("a", 1, &[], MembershipEventKind::Up),
            member("b", 2, &["r1"], MembershipEventKind::Up),
        ]);

        assert_eq!(eligible(&view, &RoleSet::new()), ids(&["a", "b"]));
    }

    #[test]
    fn only_up_nodes_are_eligible() {
        let view = view_of(vec![
            member("a", 1, &["r1"], MembershipEventKind::Leaving),
            member("b", 2, &["r1"], MembershipEventKind::Down),
            member("c", 3, &["r1"], MembershipEventKind::Up),
        ]);

        assert_eq!(eligible(&view, &roles(["r1"])), ids(&["c"]));
    }

    #[test]
    fn missing_role_yields_no_leader() {
        let view = view_of(vec![member("a", 1, &["r1"], MembershipEventKind::Up)]);

        assert!(eligible(&view, &roles(["missing_role"])).is_empty());
        assert_eq!(leader(&view, &roles(["missing_role"])), None);
    }

    #[test]
    fn equal_ordinals_fall_back_to_node_id() {
        let view = view_of(vec![
            member("z", 5, &["r1"], MembershipEventKind::Up),
            member("m", 5, &["r1"], MembershipEventKind::Up),
        ]);

        assert_eq!(eligible(&view, &roles(["r1"])), ids(&["m", "z"]));
    }
}
