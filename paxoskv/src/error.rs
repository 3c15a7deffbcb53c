use thiserror::Error;

use crate::paxos::ProposalId;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("quorum not reached: {promised} of {required} promises")]
    QuorumNotReached { promised: usize, required: usize },

    #[error("proposal {0} was not learned in time")]
    NotLearned(ProposalId),

    #[error("operation on key {key} was agreed but not applied")]
    NotApplied { key: String },

    #[error("{0}")]
    InvalidInput(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("replica set is not wired")]
    NotWired,

    #[error("replica set is already wired")]
    AlreadyWired,
}
