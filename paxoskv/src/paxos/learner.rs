use std::collections::HashMap;

use crate::paxos::proposal::ProposalId;
use crate::paxos::quorum::quorum;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LearnRecord {
    pub votes: usize,
    /// Apply result, set once when the votes first reach the quorum.
    pub applied: Option<bool>,
}

/// Per-proposal learn vote counter.
///
/// Records are created on the first vote and kept for the life of the node.
#[derive(Debug, Default)]
pub struct LearnerQuorum {
    records: HashMap<ProposalId, LearnRecord>,
}

impl LearnerQuorum {
    pub fn new() -> Self {
        LearnerQuorum::default()
    }

    /// Counts one learn notification for `id`.
    ///
    /// Returns true exactly once per id: on the vote that brings the count to
    /// the quorum of `cluster_size`. The caller must then apply the operation
    /// and report the result through [`LearnerQuorum::mark_applied`].
    pub fn vote(&mut self, id: ProposalId, cluster_size: usize) -> bool {
        let record = self.records.entry(id).or_default();
        record.votes += 1;
        record.applied.is_none() && record.votes >= quorum(cluster_size)
    }

    pub fn mark_applied(&mut self, id: ProposalId, result: bool) {
        let record = self.records.entry(id).or_default();
        if record.applied.is_none() {
            record.applied = Some(result);
        }
    }

    pub fn record(&self, id: &ProposalId) -> Option<&LearnRecord> {
        self.records.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_at_quorum() {
        let mut learner = LearnerQuorum::new();
        let id = ProposalId::new(0, 7);

        assert!(!learner.vote(id, 5));
        assert!(!learner.vote(id, 5));
        assert!(learner.vote(id, 5));
        learner.mark_applied(id, true);
        assert!(!learner.vote(id, 5));
        assert!(!learner.vote(id, 5));

        let record = learner.record(&id).unwrap();
        assert_eq!(record.votes, 5);
        assert_eq!(record.applied, Some(true));
    }

    #[test]
    fn applied_never_flips_back() {
        let mut learner = LearnerQuorum::new();
        let id = ProposalId::new(1, 1);
        learner.vote(id, 1);
        learner.mark_applied(id, false);
        learner.mark_applied(id, true);
        assert_eq!(learner.record(&id).unwrap().applied, Some(false));
    }

    #[test]
    fn ids_are_counted_separately() {
        let mut learner = LearnerQuorum::new();
        let a = ProposalId::new(0, 9);
        let b = ProposalId::new(1, 9);
        learner.vote(a, 3);
        assert!(!learner.vote(b, 3));
        assert!(learner.vote(a, 3));
    }
}
