//! Acceptor log.
//!
//! The log is indexed by application key: every key is its own single-value
//! Paxos register, and proposals for different keys never compete. The entry
//! for a key is overwritten on every granted promise and is never compacted.

use std::collections::HashMap;

use crate::paxos::operation::Operation;
use crate::paxos::proposal::ProposalId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptorEntry {
    pub proposal: ProposalId,
    pub operation: Operation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promise {
    Granted,
    Refused { highest: ProposalId },
}

#[derive(Debug, Default)]
pub struct AcceptorState {
    log: HashMap<String, AcceptorEntry>,
}

impl AcceptorState {
    pub fn new() -> Self {
        AcceptorState::default()
    }

    /// Handles a prepare for `operation.key()`.
    ///
    /// A granted promise writes `(id, operation)` into the log right away,
    /// before any accept is seen. If the proposer later fails to gather a
    /// quorum the entry stays, and later prepares for the key are compared
    /// against it.
    pub fn promise(&mut self, id: ProposalId, operation: &Operation) -> Promise {
        if let Some(entry) = self.log.get(operation.key()) {
            if entry.proposal.is_newer_than(&id) {
                return Promise::Refused {
                    highest: entry.proposal,
                };
            }
        }
        self.log.insert(
            operation.key().to_string(),
            AcceptorEntry {
                proposal: id,
                operation: operation.clone(),
            },
        );
        Promise::Granted
    }

    /// Whether an accept for `id` on `key` may be passed on to the learners.
    ///
    /// A key with no entry was never promised here and admits nothing.
    pub fn admits(&self, id: &ProposalId, key: &str) -> bool {
        self.log
            .get(key)
            .map(|entry| !entry.proposal.is_newer_than(id))
            .unwrap_or(false)
    }

    pub fn entry(&self, key: &str) -> Option<&AcceptorEntry> {
        self.log.get(key)
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(origin: u64, sequence: u64) -> ProposalId {
        ProposalId::new(origin, sequence)
    }

    #[test]
    fn first_prepare_is_granted_and_recorded() {
        let mut state = AcceptorState::new();
        let op = Operation::put("a", "1");
        assert_eq!(state.promise(id(0, 10), &op), Promise::Granted);
        let entry = state.entry("a").unwrap();
        assert_eq!(entry.proposal, id(0, 10));
        assert_eq!(entry.operation, op);
    }

    #[test]
    fn older_prepare_is_refused_without_mutation() {
        let mut state = AcceptorState::new();
        state.promise(id(1, 20), &Operation::put("a", "new"));
        let refused = state.promise(id(0, 10), &Operation::put("a", "old"));
        assert_eq!(refused, Promise::Refused { highest: id(1, 20) });
        assert_eq!(state.entry("a").unwrap().operation, Operation::put("a", "new"));
    }

    #[test]
    fn equal_sequence_overwrites() {
        let mut state = AcceptorState::new();
        state.promise(id(1, 20), &Operation::put("a", "x"));
        assert_eq!(
            state.promise(id(2, 20), &Operation::put("a", "y")),
            Promise::Granted
        );
        assert_eq!(state.entry("a").unwrap().proposal, id(2, 20));
    }

    #[test]
    fn abandoned_promise_still_blocks_older_proposals() {
        let mut state = AcceptorState::new();
        // promised but never accepted
        state.promise(id(3, 50), &Operation::delete("k"));
        assert!(matches!(
            state.promise(id(0, 40), &Operation::put("k", "v")),
            Promise::Refused { .. }
        ));
    }

    #[test]
    fn keys_are_independent_registers() {
        let mut state = AcceptorState::new();
        state.promise(id(0, 100), &Operation::put("a", "1"));
        assert_eq!(
            state.promise(id(0, 1), &Operation::put("b", "2")),
            Promise::Granted
        );
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn stale_accept_is_not_admitted() {
        let mut state = AcceptorState::new();
        state.promise(id(0, 10), &Operation::put("a", "1"));
        state.promise(id(1, 20), &Operation::put("a", "2"));
        assert!(!state.admits(&id(0, 10), "a"));
        assert!(state.admits(&id(1, 20), "a"));
        assert!(state.admits(&id(4, 30), "a"));
        assert!(!state.admits(&id(1, 20), "missing"));
    }
}
