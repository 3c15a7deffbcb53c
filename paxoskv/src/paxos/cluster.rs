use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::time::Duration;

use crate::error::KvError;
use crate::paxos::liveness::FailureInjector;
use crate::paxos::node::Node;
use crate::paxos::operation::Operation;
use crate::paxos::proposal::ProposalId;
use crate::paxos::{NodeId, Peer, StateMachine};

/// In-process peer. Holds a weak handle so wired nodes don't keep each other alive.
pub struct LocalPeer<S: StateMachine> {
    id: NodeId,
    node: Weak<Node<S>>,
}

impl<S: StateMachine> LocalPeer<S> {
    pub fn new(node: &Arc<Node<S>>) -> Self {
        LocalPeer {
            id: node.id(),
            node: Arc::downgrade(node),
        }
    }

    fn node(&self) -> Result<Arc<Node<S>>, KvError> {
        self.node
            .upgrade()
            .ok_or_else(|| KvError::Transport(format!("node {} is gone", self.id)))
    }
}

#[async_trait]
impl<S: StateMachine> Peer for LocalPeer<S> {
    fn id(&self) -> NodeId {
        self.id
    }

    async fn prepare(&self, id: ProposalId, operation: Operation) -> Result<Option<bool>, KvError> {
        Ok(self.node()?.prepare(id, &operation))
    }

    async fn accept(&self, id: ProposalId, operation: Operation) -> Result<(), KvError> {
        self.node()?.accept(id, operation).await
    }

    async fn learn(&self, id: ProposalId, operation: Operation) -> Result<(), KvError> {
        self.node()?.learn(id, &operation)
    }
}

/// The fixed replica set. Node ids are their index in the set.
pub struct Cluster<S: StateMachine> {
    nodes: Vec<Arc<Node<S>>>,
}

impl<S: StateMachine> Cluster<S> {
    /// Builds unwired nodes, one per state machine.
    pub fn new(machines: impl IntoIterator<Item = S>, learn_wait: Duration) -> Self {
        let nodes = machines
            .into_iter()
            .enumerate()
            .map(|(i, machine)| Arc::new(Node::new(i as NodeId, machine, learn_wait)))
            .collect();
        Cluster { nodes }
    }

    /// Builds nodes and wires every one of them to all the others in process.
    pub fn local(machines: impl IntoIterator<Item = S>, learn_wait: Duration) -> Result<Self, KvError> {
        let cluster = Self::new(machines, learn_wait);
        for node in &cluster.nodes {
            let peers = cluster
                .nodes
                .iter()
                .map(|peer| Arc::new(LocalPeer::new(peer)) as Arc<dyn Peer>)
                .collect();
            node.set_peers(peers)?;
        }
        Ok(cluster)
    }

    pub fn node(&self, index: usize) -> Option<&Arc<Node<S>>> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[Arc<Node<S>>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<S: StateMachine> FailureInjector for Cluster<S> {
    fn replicas(&self) -> usize {
        self.nodes.len()
    }

    fn mark_unavailable(&self, replica: usize, window: Duration) {
        if let Some(node) = self.nodes.get(replica) {
            node.mark_unavailable(window);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_kv::KvStore;

    fn cluster(n: usize) -> Cluster<KvStore> {
        Cluster::local((0..n).map(|_| KvStore::new()), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn every_node_sees_the_whole_replica_set() {
        let cluster = cluster(5);
        assert_eq!(cluster.len(), 5);
        for (i, node) in cluster.nodes().iter().enumerate() {
            assert_eq!(node.id(), i as NodeId);
            assert_eq!(node.cluster_size(), 5);
        }
    }

    #[test]
    fn nodes_cannot_be_rewired() {
        let cluster = cluster(3);
        let err = cluster.nodes()[0].set_peers(Vec::new()).unwrap_err();
        assert!(matches!(err, KvError::AlreadyWired));
    }

    #[test]
    fn injector_ignores_unknown_replicas() {
        let cluster = cluster(3);
        cluster.mark_unavailable(7, Duration::from_secs(5));
        cluster.mark_unavailable(1, Duration::from_secs(5));
        assert!(!cluster.nodes()[0].is_marked_down());
        assert!(cluster.nodes()[1].is_marked_down());
    }

    #[tokio::test]
    async fn dropped_node_is_unreachable() {
        let node = Arc::new(Node::new(9, KvStore::new(), Duration::from_secs(1)));
        let peer = LocalPeer::new(&node);
        drop(node);
        let reply = peer
            .prepare(ProposalId::new(0, 1), Operation::put("a", "1"))
            .await;
        assert!(matches!(reply, Err(KvError::Transport(_))));
    }
}
