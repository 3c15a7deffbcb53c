use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::paxos::NodeId;

/// Identifies one proposal attempt.
///
/// Competing proposals are ordered by `sequence` alone; `origin` only makes
/// ids from different nodes distinct when used as a map key. Two nodes that
/// read the same clock millisecond produce ids that compare as equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId {
    pub origin: NodeId,
    pub sequence: u64,
}

impl ProposalId {
    pub fn new(origin: NodeId, sequence: u64) -> Self {
        ProposalId { origin, sequence }
    }

    /// Strictly newer by sequence. Equal sequences from different origins are not newer.
    pub fn is_newer_than(&self, other: &ProposalId) -> bool {
        self.sequence > other.sequence
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.sequence)
    }
}

/// Hands out proposal ids for one node from the wall clock in milliseconds.
///
/// Readings are clamped to `last + 1`, so ids from the same generator are
/// strictly increasing even when the clock stalls or steps backwards.
#[derive(Debug)]
pub struct ProposalIdGenerator {
    origin: NodeId,
    last: u64,
}

impl ProposalIdGenerator {
    pub fn new(origin: NodeId) -> Self {
        ProposalIdGenerator { origin, last: 0 }
    }

    pub fn next(&mut self) -> ProposalId {
        self.next_at(wall_clock_millis())
    }

    pub fn next_at(&mut self, now_millis: u64) -> ProposalId {
        let sequence = now_millis.max(self.last + 1);
        self.last = sequence;
        ProposalId::new(self.origin, sequence)
    }
}

fn wall_clock_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
