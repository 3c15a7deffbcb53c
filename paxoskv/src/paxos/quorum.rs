//! Quorum arithmetic and prepare-phase tallying.

use log::debug;

use crate::error::KvError;

/// Majority threshold for a replica set of `cluster_size` nodes: `ceil(N / 2)`.
pub fn quorum(cluster_size: usize) -> usize {
    (cluster_size + 1) / 2
}

/// How one acceptor answered a prepare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    Promised,
    /// The acceptor already promised a newer proposal for the key.
    Refused,
    /// The acceptor is marked down, or the call failed in transit.
    Unreachable,
}

impl PrepareOutcome {
    pub fn is_reachable(&self) -> bool {
        !matches!(self, PrepareOutcome::Unreachable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrepareOutcome::Promised => "promised",
            PrepareOutcome::Refused => "refused",
            PrepareOutcome::Unreachable => "unreachable",
        }
    }
}

impl From<Result<Option<bool>, KvError>> for PrepareOutcome {
    fn from(reply: Result<Option<bool>, KvError>) -> Self {
        match reply {
            Ok(Some(true)) => PrepareOutcome::Promised,
            Ok(Some(false)) => PrepareOutcome::Refused,
            Ok(None) => PrepareOutcome::Unreachable,
            Err(e) => {
                debug!("prepare treated as abstention: {}", e);
                PrepareOutcome::Unreachable
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub promised: usize,
    pub refused: usize,
    pub unreachable: usize,
}

impl Tally {
    pub fn count(outcomes: &[PrepareOutcome]) -> Self {
        outcomes.iter().fold(Tally::default(), |mut tally, outcome| {
            match outcome {
                PrepareOutcome::Promised => tally.promised += 1,
                PrepareOutcome::Refused => tally.refused += 1,
                PrepareOutcome::Unreachable => tally.unreachable += 1,
            }
            tally
        })
    }

    pub fn has_quorum(&self, cluster_size: usize) -> bool {
        self.promised >= quorum(cluster_size)
    }
}

/// Indices of the acceptors that receive the accept phase.
///
/// Every acceptor that answered the prepare is included, whether it promised
/// or refused. Only unreachable acceptors are skipped. A refusing acceptor
/// will drop the accept itself because it holds a newer promise for the key.
pub fn accept_targets(outcomes: &[PrepareOutcome]) -> Vec<usize> {
    outcomes
        .iter()
        .enumerate()
        .filter(|(_, outcome)| outcome.is_reachable())
        .map(|(i, _)| i)
        .collect()
}
