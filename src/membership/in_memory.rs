use crate::membership::{
    JoinOrdinal, MembershipEvent, MembershipEventKind, MembershipEventStream, MembershipProvider, NodeId, NodeStatus,
    ProviderError, RoleSet,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// InMemoryCluster is a single-process stand-in for a real membership provider. Every node of a
/// test cluster gets its own `InMemoryMembership` handle on the same shared state, and the test
/// drives membership changes (join, up, crash, leave) by hand.
#[derive(Clone)]
pub struct InMemoryCluster {
    state: Arc<Mutex<ClusterState>>,
}

struct ClusterState {
    auto_up: bool,
    next_ordinal: u64,
    members: BTreeMap<NodeId, Member>,
    subscribers: Vec<Subscriber>,
}

struct Member {
    roles: RoleSet,
    status: NodeStatus,
    join_ordinal: JoinOrdinal,
}

struct Subscriber {
    owner: NodeId,
    snd: mpsc::UnboundedSender<MembershipEvent>,
}

impl InMemoryCluster {
    /// Nodes go `Up` as soon as they join.
    pub fn new() -> Self {
        Self::with_auto_up(true)
    }

    /// Nodes stay `Joining` until `mark_up()` is called for them.
    pub fn with_manual_up() -> Self {
        Self::with_auto_up(false)
    }

    fn with_auto_up(auto_up: bool) -> Self {
        InMemoryCluster {
            state: Arc::new(Mutex::new(ClusterState {
                auto_up,
                next_ordinal: 1,
                members: BTreeMap::new(),
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn join(&self, node_id: NodeId, roles: RoleSet) -> InMemoryMembership {
        {
            let mut state = self.state.lock().expect("InMemoryCluster.join() mutex guard poison");
            if !state.members.contains_key(&node_id) {
                let join_ordinal = JoinOrdinal::new(state.next_ordinal);
                state.next_ordinal += 1;
                state.members.insert(
                    node_id.clone(),
                    Member {
                        roles: roles.clone(),
                        status: NodeStatus::Joining,
                        join_ordinal,
                    },
                );
                state.broadcast(&node_id, MembershipEventKind::Joined);

                if state.auto_up {
                    state.set_status(&node_id, NodeStatus::Up);
                    state.broadcast(&node_id, MembershipEventKind::Up);
                }
            }
        }

        InMemoryMembership {
            cluster: self.clone(),
            node_id,
            roles,
        }
    }

    pub fn mark_up(&self, node_id: &NodeId) -> Result<(), ProviderError> {
        let mut state = self.state.lock().expect("InMemoryCluster.mark_up() mutex guard poison");
        if !state.members.contains_key(node_id) {
            return Err(ProviderError::NotAMember(node_id.clone()));
        }

        state.set_status(node_id, NodeStatus::Up);
        state.broadcast(node_id, MembershipEventKind::Up);
        Ok(())
    }

    /// `crash()` simulates a hard failure: the node is cut off first (its own event streams end),
    /// then the survivors see it go `Down` and get removed.
    pub fn crash(&self, node_id: &NodeId) -> Result<(), ProviderError> {
        let mut state = self.state.lock().expect("InMemoryCluster.crash() mutex guard poison");
        if !state.members.contains_key(node_id) {
            return Err(ProviderError::NotAMember(node_id.clone()));
        }

        state.subscribers.retain(|sub| &sub.owner != node_id);
        state.set_status(node_id, NodeStatus::Down);
        state.broadcast(node_id, MembershipEventKind::Down);
        state.broadcast(node_id, MembershipEventKind::Removed);
        state.members.remove(node_id);
        Ok(())
    }

    /// `leave()` is a voluntary departure. Everyone, including the leaving node, sees `Leaving`
    /// then `Removed`, after which the leaving node's streams end.
    pub fn leave(&self, node_id: &NodeId) -> Result<(), ProviderError> {
        let mut state = self.state.lock().expect("InMemoryCluster.leave() mutex guard poison");
        if !state.members.contains_key(node_id) {
            return Err(ProviderError::NotAMember(node_id.clone()));
        }

        state.set_status(node_id, NodeStatus::Leaving);
        state.broadcast(node_id, MembershipEventKind::Leaving);
        state.broadcast(node_id, MembershipEventKind::Removed);
        state.members.remove(node_id);
        state.subscribers.retain(|sub| &sub.owner != node_id);
        Ok(())
    }

    /// Current members, oldest first.
    pub fn members(&self) -> Vec<NodeId> {
        let state = self.state.lock().expect("InMemoryCluster.members() mutex guard poison");
        let mut members: Vec<(&NodeId, &Member)> = state.members.iter().collect();
        members.sort_by_key(|(_, member)| member.join_ordinal);
        members.into_iter().map(|(id, _)| id.clone()).collect()
    }

    fn subscribe(&self, owner: &NodeId) -> MembershipEventStream {
        let (snd, rcv) = mpsc::unbounded_channel();
        let mut state = self.state.lock().expect("InMemoryCluster.subscribe() mutex guard poison");

        // A node that is no longer a member gets a stream that has already ended.
        if !state.members.contains_key(owner) {
            return rcv;
        }

        let mut members: Vec<(&NodeId, &Member)> = state.members.iter().collect();
        members.sort_by_key(|(_, member)| member.join_ordinal);
        for (id, member) in members {
            let _ = snd.send(member.event(id, MembershipEventKind::Joined));
            match member.status {
                NodeStatus::Joining => {}
                NodeStatus::Up => {
                    let _ = snd.send(member.event(id, MembershipEventKind::Up));
                }
                NodeStatus::Leaving => {
                    let _ = snd.send(member.event(id, MembershipEventKind::Up));
                    let _ = snd.send(member.event(id, MembershipEventKind::Leaving));
                }
                NodeStatus::Down => {
                    let _ = snd.send(member.event(id, MembershipEventKind::Down));
                }
            }
        }

        state.subscribers.push(Subscriber {
            owner: owner.clone(),
            snd,
        });
        rcv
    }
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterState {
    fn set_status(&mut self, node_id: &NodeId, status: NodeStatus) {
        if let Some(member) = self.members.get_mut(node_id) {
            member.status = status;
        }
    }

    fn broadcast(&mut self, node_id: &NodeId, kind: MembershipEventKind) {
        let event = match self.members.get(node_id) {
            Some(member) => member.event(node_id, kind),
            None => return,
        };
        self.subscribers.retain(|sub| sub.snd.send(event.clone()).is_ok());
    }
}

impl Member {
    fn event(&self, node_id: &NodeId, kind: MembershipEventKind) -> MembershipEvent {
        MembershipEvent {
            node_id: node_id.clone(),
            roles: self.roles.clone(),
            kind,
            join_ordinal: self.join_ordinal,
        }
    }
}

/// One node's view onto an `InMemoryCluster`.
#[derive(Clone)]
pub struct InMemoryMembership {
    cluster: InMemoryCluster,
    node_id: NodeId,
    roles: RoleSet,
}

#[async_trait::async_trait]
impl MembershipProvider for InMemoryMembership {
    fn local_node(&self) -> NodeId {
        self.node_id.clone()
    }

    fn local_roles(&self) -> RoleSet {
        self.roles.clone()
    }

    fn subscribe(&self) -> MembershipEventStream {
        self.cluster.subscribe(&self.node_id)
    }

    async fn leave(&self) -> Result<(), ProviderError> {
        self.cluster.leave(&self.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::roles;

    fn drain(stream: &mut MembershipEventStream) -> Vec<(String, MembershipEventKind)> {
        let mut events = Vec::new();
        while let Ok(event) = stream.try_recv() {
            events.push((event.node_id.into_inner(), event.kind));
        }
        events
    }

    #[tokio::test]
    async fn late_subscriber_gets_replay_in_join_order() {
        let cluster = InMemoryCluster::new();
        let a = cluster.join(NodeId::new("a"), roles(["r1"]));
        let _b = cluster.join(NodeId::new("b"), roles(["r2"]));

        let mut stream = a.subscribe();
        assert_eq!(
            drain(&mut stream),
            vec![
                ("a".to_string(), MembershipEventKind::Joined),
                ("a".to_string(), MembershipEventKind::Up),
                ("b".to_string(), MembershipEventKind::Joined),
                ("b".to_string(), MembershipEventKind::Up),
            ]
        );
        assert_eq!(cluster.members(), vec![NodeId::new("a"), NodeId::new("b")]);
    }

    #[tokio::test]
    async fn crash_cuts_off_the_crashed_node() {
        let cluster = InMemoryCluster::new();
        let a = cluster.join(NodeId::new("a"), roles(["r1"]));
        let b = cluster.join(NodeId::new("b"), roles(["r1"]));
        let mut a_stream = a.subscribe();
        let mut b_stream = b.subscribe();
        drain(&mut a_stream);
        drain(&mut b_stream);

        cluster.crash(&NodeId::new("a")).unwrap();

        assert_eq!(
            drain(&mut b_stream),
            vec![
                ("a".to_string(), MembershipEventKind::Down),
                ("a".to_string(), MembershipEventKind::Removed),
            ]
        );
        assert!(a_stream.recv().await.is_none());
        assert!(a.subscribe().recv().await.is_none());
    }

    #[tokio::test]
    async fn leaving_node_sees_its_own_departure() {
        let cluster = InMemoryCluster::new();
        let a = cluster.join(NodeId::new("a"), roles(["r1"]));
        let mut a_stream = a.subscribe();
        drain(&mut a_stream);

        a.leave().await.unwrap();

        assert_eq!(a_stream.recv().await.map(|e| e.kind), Some(MembershipEventKind::Leaving));
        assert_eq!(a_stream.recv().await.map(|e| e.kind), Some(MembershipEventKind::Removed));
        assert!(a_stream.recv().await.is_none());
        assert!(matches!(a.leave().await, Err(ProviderError::NotAMember(_))));
    }

    #[tokio::test]
    async fn manual_up_holds_nodes_in_joining() {
        let cluster = InMemoryCluster::with_manual_up();
        let a = cluster.join(NodeId::new("a"), roles(["r1"]));
        let mut stream = a.subscribe();
        assert_eq!(drain(&mut stream), vec![("a".to_string(), MembershipEventKind::Joined)]);

        cluster.mark_up(&NodeId::new("a")).unwrap();
        assert_eq!(drain(&mut stream), vec![("a".to_string(), MembershipEventKind::Up)]);
    }
}
