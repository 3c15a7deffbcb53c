//! Paxos node implementation
//!
//! A node is proposer, acceptor and learner for every key at once. Its mutable
//! state sits behind one lock that is only ever held for a synchronous state
//! transition; all fan-out to other nodes happens after the lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use tokio::sync::oneshot;
use tokio::time::{self, Duration, Instant};

use crate::error::KvError;
use crate::metrics;
use crate::paxos::acceptor::{AcceptorEntry, AcceptorState, Promise};
use crate::paxos::learner::{LearnRecord, LearnerQuorum};
use crate::paxos::liveness::Availability;
use crate::paxos::operation::Operation;
use crate::paxos::proposal::{ProposalId, ProposalIdGenerator};
use crate::paxos::quorum::{accept_targets, quorum, PrepareOutcome, Tally};
use crate::paxos::{NodeId, Peer, StateMachine};

struct NodeState<S> {
    acceptor: AcceptorState,
    learner: LearnerQuorum,
    machine: S,
    availability: Availability,
    // proposer side completions, keyed by the proposal they wait for
    pending: HashMap<ProposalId, oneshot::Sender<bool>>,
}

/// Removes a proposal's pending completion on every exit from `propose`,
/// including when the round's future is dropped part way through.
struct PendingGuard<'a, S: StateMachine> {
    node: &'a Node<S>,
    id: ProposalId,
}

impl<S: StateMachine> Drop for PendingGuard<'_, S> {
    fn drop(&mut self) {
        self.node.state().pending.remove(&self.id);
    }
}

pub struct Node<S: StateMachine> {
    id: NodeId,
    learn_wait: Duration,
    peers: OnceCell<Vec<Arc<dyn Peer>>>,
    // held for a whole round, so client writes on one node run one at a time
    proposer: tokio::sync::Mutex<ProposalIdGenerator>,
    state: Mutex<NodeState<S>>,
}

impl<S: StateMachine> Node<S> {
    pub fn new(id: NodeId, machine: S, learn_wait: Duration) -> Self {
        Node {
            id,
            learn_wait,
            peers: OnceCell::new(),
            proposer: tokio::sync::Mutex::new(ProposalIdGenerator::new(id)),
            state: Mutex::new(NodeState {
                acceptor: AcceptorState::new(),
                learner: LearnerQuorum::new(),
                machine,
                availability: Availability::default(),
                pending: HashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Installs the fixed replica set. The list is the acceptor set and the
    /// learner set at once and must include this node.
    pub fn set_peers(&self, peers: Vec<Arc<dyn Peer>>) -> Result<(), KvError> {
        self.peers.set(peers).map_err(|_| KvError::AlreadyWired)
    }

    fn peers(&self) -> Result<&[Arc<dyn Peer>], KvError> {
        self.peers
            .get()
            .map(|peers| peers.as_slice())
            .ok_or(KvError::NotWired)
    }

    pub fn cluster_size(&self) -> usize {
        self.peers.get().map(|peers| peers.len()).unwrap_or(0)
    }

    fn state(&self) -> MutexGuard<'_, NodeState<S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn put(&self, key: String, value: String) -> Result<(), KvError> {
        self.submit(Operation::Put { key, value }).await
    }

    pub async fn delete(&self, key: String) -> Result<(), KvError> {
        self.submit(Operation::Delete { key }).await
    }

    /// Reads the local store without a consensus round; may be stale.
    pub fn get(&self, key: &str) -> Option<String> {
        self.state().machine.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state().machine.contains_key(key)
    }

    async fn submit(&self, operation: Operation) -> Result<(), KvError> {
        let mut ids = self.proposer.lock().await;
        let id = ids.next();
        let key = operation.key().to_string();
        if self.propose(id, operation).await? {
            Ok(())
        } else {
            Err(KvError::NotApplied { key })
        }
    }

    /// Runs one full round for `operation` under `id`.
    ///
    /// Returns the apply result reported by this node's learner. There is no
    /// retry: a round that misses the quorum fails and the caller decides.
    pub async fn propose(&self, id: ProposalId, operation: Operation) -> Result<bool, KvError> {
        let peers = self.peers()?;
        let cluster_size = peers.len();
        let (tx, rx) = oneshot::channel();
        self.state().pending.insert(id, tx);
        let _pending = PendingGuard { node: self, id };

        // Step 1: prepare on every acceptor, waiting for all of them
        let outcomes: Vec<PrepareOutcome> = join_all(peers.iter().map(|peer| {
            let operation = operation.clone();
            async move {
                let outcome = PrepareOutcome::from(peer.prepare(id, operation).await);
                metrics::PREPARE_COUNTER_VEC
                    .with_label_values(&[outcome.as_str()])
                    .inc();
                outcome
            }
        }))
        .await;

        // Step 2: tally the promises
        let tally = Tally::count(&outcomes);
        debug!("node {} proposal {} prepare tally {:?}", self.id, id, tally);
        if !tally.has_quorum(cluster_size) {
            metrics::PROPOSAL_COUNTER_VEC
                .with_label_values(&["no_quorum"])
                .inc();
            warn!(
                "node {} proposal {} ({}) got {} of {} required promises",
                self.id,
                id,
                operation,
                tally.promised,
                quorum(cluster_size)
            );
            return Err(KvError::QuorumNotReached {
                promised: tally.promised,
                required: quorum(cluster_size),
            });
        }

        // Step 3: accept on every acceptor that answered
        join_all(accept_targets(&outcomes).into_iter().map(|i| {
            let peer = &peers[i];
            let operation = operation.clone();
            async move {
                if let Err(e) = peer.accept(id, operation).await {
                    warn!("accept {} on node {} failed: {}", id, peer.id(), e);
                }
            }
        }))
        .await;

        // Step 4: wait for the local learner to apply it
        match time::timeout(self.learn_wait, rx).await {
            Ok(Ok(applied)) => {
                metrics::PROPOSAL_COUNTER_VEC
                    .with_label_values(&[if applied { "applied" } else { "rejected" }])
                    .inc();
                Ok(applied)
            }
            _ => {
                metrics::PROPOSAL_COUNTER_VEC
                    .with_label_values(&["not_learned"])
                    .inc();
                warn!("node {} proposal {} was not learned in time", self.id, id);
                Err(KvError::NotLearned(id))
            }
        }
    }

    /// Acceptor prepare. `None` while this node is marked down.
    pub fn prepare(&self, id: ProposalId, operation: &Operation) -> Option<bool> {
        let mut state = self.state();
        if state.availability.is_down(Instant::now()) {
            debug!("node {} is down, ignoring prepare {}", self.id, id);
            return None;
        }
        match state.acceptor.promise(id, operation) {
            Promise::Granted => Some(true),
            Promise::Refused { highest } => {
                debug!(
                    "node {} refused prepare {} for {}, holds {}",
                    self.id,
                    id,
                    operation.key(),
                    highest
                );
                Some(false)
            }
        }
    }

    /// Acceptor accept. Forwards the proposal to every learner unless this
    /// node is down or has promised something newer for the key.
    pub async fn accept(&self, id: ProposalId, operation: Operation) -> Result<(), KvError> {
        let admitted = {
            let mut state = self.state();
            if state.availability.is_down(Instant::now()) {
                debug!("node {} is down, ignoring accept {}", self.id, id);
                return Ok(());
            }
            state.acceptor.admits(&id, operation.key())
        };
        if !admitted {
            debug!(
                "node {} dropped accept {} for {}",
                self.id,
                id,
                operation.key()
            );
            return Ok(());
        }

        let learners = self.peers()?;
        join_all(learners.iter().map(|learner| {
            let operation = operation.clone();
            async move {
                if let Err(e) = learner.learn(id, operation).await {
                    warn!("learn {} on node {} failed: {}", id, learner.id(), e);
                }
            }
        }))
        .await;
        Ok(())
    }

    /// Learner vote. Applies the operation on the vote that reaches the quorum.
    pub fn learn(&self, id: ProposalId, operation: &Operation) -> Result<(), KvError> {
        let cluster_size = self.peers()?.len();
        let mut state = self.state();
        if !state.learner.vote(id, cluster_size) {
            return Ok(());
        }

        let applied = state.machine.apply(operation);
        state.learner.mark_applied(id, applied);
        metrics::APPLY_COUNTER_VEC
            .with_label_values(&[operation.kind().as_str(), if applied { "ok" } else { "fail" }])
            .inc();
        info!(
            "node {} applied {} under {}: {}",
            self.id, operation, id, applied
        );

        if let Some(waiter) = state.pending.remove(&id) {
            let _ = waiter.send(applied);
        }
        Ok(())
    }

    pub fn mark_unavailable(&self, window: Duration) {
        self.state().availability.mark_down(Instant::now(), window);
    }

    /// Whether the down flag is set, without running the recovery check.
    pub fn is_marked_down(&self) -> bool {
        self.state().availability.down_since().is_some()
    }

    pub fn acceptor_entry(&self, key: &str) -> Option<AcceptorEntry> {
        self.state().acceptor.entry(key).cloned()
    }

    pub fn learn_record(&self, id: &ProposalId) -> Option<LearnRecord> {
        self.state().learner.record(id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paxos::LocalPeer;
    use crate::state_kv::KvStore;

    fn node() -> Node<KvStore> {
        Node::new(0, KvStore::new(), Duration::from_millis(100))
    }

    #[test]
    fn unwired_node_cannot_learn() {
        let node = node();
        let err = node
            .learn(ProposalId::new(0, 1), &Operation::put("a", "1"))
            .unwrap_err();
        assert!(matches!(err, KvError::NotWired));
        assert_eq!(node.cluster_size(), 0);
    }

    #[test]
    fn prepare_records_the_promise() {
        let node = node();
        let id = ProposalId::new(3, 9);
        assert_eq!(node.prepare(id, &Operation::put("a", "1")), Some(true));
        assert_eq!(node.acceptor_entry("a").unwrap().proposal, id);
        assert_eq!(
            node.prepare(ProposalId::new(1, 8), &Operation::put("a", "2")),
            Some(false)
        );
    }

    /// A replica that never answers a prepare.
    struct Silent;

    #[async_trait::async_trait]
    impl Peer for Silent {
        fn id(&self) -> NodeId {
            1
        }

        async fn prepare(&self, _: ProposalId, _: Operation) -> Result<Option<bool>, KvError> {
            std::future::pending().await
        }

        async fn accept(&self, _: ProposalId, _: Operation) -> Result<(), KvError> {
            Ok(())
        }

        async fn learn(&self, _: ProposalId, _: Operation) -> Result<(), KvError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_round_leaves_no_pending_completion() {
        let node = node();
        node.set_peers(vec![Arc::new(Silent) as Arc<dyn Peer>]).unwrap();

        let round = node.propose(ProposalId::new(0, 1), Operation::put("a", "1"));
        assert!(time::timeout(Duration::from_secs(5), round).await.is_err());
        assert!(node.state().pending.is_empty());
    }

    #[tokio::test]
    async fn failed_round_leaves_no_pending_completion() {
        let node = Arc::new(node());
        node.set_peers(vec![Arc::new(LocalPeer::new(&node)) as Arc<dyn Peer>])
            .unwrap();
        node.mark_unavailable(Duration::from_secs(100));

        let err = node
            .propose(ProposalId::new(0, 1), Operation::put("a", "1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            KvError::QuorumNotReached {
                promised: 0,
                required: 1
            }
        ));
        assert!(node.state().pending.is_empty());
    }

    #[tokio::test]
    async fn down_node_drops_accept_before_reaching_learners() {
        let node = node();
        let id = ProposalId::new(0, 5);
        let op = Operation::put("a", "1");
        assert_eq!(node.prepare(id, &op), Some(true));

        // unwired, so anything past the availability check would be NotWired
        node.mark_unavailable(Duration::from_secs(100));
        node.accept(id, op).await.unwrap();
        assert!(node.learn_record(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn down_node_ignores_prepare_until_window_elapses() {
        let node = node();
        node.mark_unavailable(Duration::from_secs(100));

        let op = Operation::put("a", "1");
        assert_eq!(node.prepare(ProposalId::new(0, 1), &op), None);
        assert!(node.acceptor_entry("a").is_none());

        time::advance(Duration::from_secs(99)).await;
        assert_eq!(node.prepare(ProposalId::new(0, 2), &op), None);
        assert!(node.acceptor_entry("a").is_none());
        assert!(node.is_marked_down());

        time::advance(Duration::from_secs(1)).await;
        assert_eq!(node.prepare(ProposalId::new(0, 3), &op), Some(true));
        assert!(!node.is_marked_down());
    }
}
