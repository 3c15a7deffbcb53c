//! Paxos consensus engine.
//!
//! Every node plays proposer, acceptor and learner. Consensus runs per key:
//! each key is an independent single-value register rather than a slot in a
//! replicated log.

use async_trait::async_trait;

use crate::error::KvError;

pub mod acceptor;
pub mod cluster;
pub mod learner;
pub mod liveness;
pub mod node;
pub mod operation;
pub mod proposal;
pub mod quorum;

pub use cluster::{Cluster, LocalPeer};
pub use node::Node;
pub use operation::{OpKind, Operation};
pub use proposal::{ProposalId, ProposalIdGenerator};

pub type NodeId = u64;

/// Deterministic apply step run by a learner once a proposal reaches quorum.
pub trait StateMachine: Send + 'static {
    fn apply(&mut self, operation: &Operation) -> bool;
    fn get(&self, key: &str) -> Option<String>;
    fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Consensus calls one node makes on another.
///
/// `prepare` returns `None` when the target is marked down. Transport
/// failures surface as errors; callers treat both as an abstention.
#[async_trait]
pub trait Peer: Send + Sync {
    fn id(&self) -> NodeId;

    async fn prepare(&self, id: ProposalId, operation: Operation) -> Result<Option<bool>, KvError>;

    async fn accept(&self, id: ProposalId, operation: Operation) -> Result<(), KvError>;

    async fn learn(&self, id: ProposalId, operation: Operation) -> Result<(), KvError>;
}
