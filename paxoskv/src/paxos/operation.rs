use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// The kind of a replicated write, used for logging and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    Put,
    Delete,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Put => "PUT",
            OpKind::Delete => "DELETE",
        }
    }
}

/// A client write that is agreed on through consensus before it is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Put { key: String, value: String },
    Delete { key: String },
}

impl Operation {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Operation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Operation::Delete { key: key.into() }
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Put { .. } => OpKind::Put,
            Operation::Delete { .. } => OpKind::Delete,
        }
    }

    /// Every operation targets exactly one key, which is also its consensus register.
    pub fn key(&self) -> &str {
        match self {
            Operation::Put { key, .. } | Operation::Delete { key } => key,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Operation::Put { value, .. } => Some(value),
            Operation::Delete { .. } => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Put { key, value } => write!(f, "PUT {} {}", key, value),
            Operation::Delete { key } => write!(f, "DELETE {}", key),
        }
    }
}
