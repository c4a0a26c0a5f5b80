use crate::bus::{BusTransport, InboundDispatch, TransportMessage};
use crate::membership::NodeId;
use arc_swap::ArcSwap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// InMemoryBusTransport connects the buses of every node running in this process. Network
/// partitions can be simulated between pairs of nodes.
#[derive(Clone)]
pub struct InMemoryBusTransport {
    inner: Arc<Inner>,
}

struct Inner {
    nodes: ArcSwap<HashMap<NodeId, Arc<dyn InboundDispatch>>>,
    partitions: ArcSwap<HashSet<(NodeId, NodeId)>>,
}

impl InMemoryBusTransport {
    pub fn new() -> Self {
        InMemoryBusTransport {
            inner: Arc::new(Inner {
                nodes: ArcSwap::from_pointee(HashMap::new()),
                partitions: ArcSwap::from_pointee(HashSet::new()),
            }),
        }
    }

    /// Drop all traffic between `a` and `b`, in both directions.
    pub fn partition(&self, a: &NodeId, b: &NodeId) {
        self.inner.partitions.rcu(|partitions| {
            let mut partitions = HashSet::clone(partitions);
            partitions.insert((a.clone(), b.clone()));
            partitions.insert((b.clone(), a.clone()));
            partitions
        });
    }

    pub fn heal(&self) {
        self.inner.partitions.store(Arc::new(HashSet::new()));
    }

    pub fn attached_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.inner.nodes.load().keys().cloned().collect();
        nodes.sort();
        nodes
    }
}

impl Default for InMemoryBusTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BusTransport for InMemoryBusTransport {
    fn attach(&self, node: NodeId, inbound: Arc<dyn InboundDispatch>) {
        self.inner.nodes.rcu(|nodes| {
            let mut nodes = HashMap::clone(nodes);
            nodes.insert(node.clone(), inbound.clone());
            nodes
        });
    }

    fn detach(&self, node: &NodeId) {
        self.inner.nodes.rcu(|nodes| {
            let mut nodes = HashMap::clone(nodes);
            nodes.remove(node);
            nodes
        });
    }

    fn broadcast(&self, message: TransportMessage) {
        let nodes = self.inner.nodes.load();
        let partitions = self.inner.partitions.load();

        for (node, inbound) in nodes.iter() {
            if partitions.contains(&(message.origin.clone(), node.clone())) {
                continue;
            }
            inbound.dispatch(&message);
        }
    }
}
