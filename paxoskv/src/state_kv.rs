//! Key-value state machine
//!
//! The store every replica applies learned operations to.

use std::collections::HashMap;

use log::{info, warn};

use crate::paxos::{Operation, StateMachine};

#[derive(Debug, Default, Clone)]
pub struct KvStore {
    entries: HashMap<String, String>,
}

impl KvStore {
    pub fn new() -> KvStore {
        KvStore::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateMachine for KvStore {
    /// PUT always succeeds. DELETE fails and changes nothing when the key is absent.
    fn apply(&mut self, operation: &Operation) -> bool {
        match operation {
            Operation::Put { key, value } => {
                self.entries.insert(key.clone(), value.clone());
                info!("PUT {} = {}", key, value);
                true
            }
            Operation::Delete { key } => {
                if self.entries.remove(key).is_some() {
                    info!("DELETE {}", key);
                    true
                } else {
                    warn!("DELETE {} failed, no such key", key);
                    false
                }
            }
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}
