//! Wire messages for the node RPC endpoint. Bodies are bincode encoded.

use serde_derive::{Deserialize, Serialize};

use crate::error::KvError;
use crate::paxos::{Operation, ProposalId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcRequest {
    Prepare { id: ProposalId, operation: Operation },
    Accept { id: ProposalId, operation: Operation },
    Learn { id: ProposalId, operation: Operation },
    Put { key: String, value: String },
    Delete { key: String },
    Get { key: String },
    ContainsKey { key: String },
}

impl RpcRequest {
    pub fn method(&self) -> &'static str {
        match self {
            RpcRequest::Prepare { .. } => "prepare",
            RpcRequest::Accept { .. } => "accept",
            RpcRequest::Learn { .. } => "learn",
            RpcRequest::Put { .. } => "put",
            RpcRequest::Delete { .. } => "delete",
            RpcRequest::Get { .. } => "get",
            RpcRequest::ContainsKey { .. } => "contains_key",
        }
    }
}

/// Outcome of a client write, with the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcResponse {
    Prepared(Option<bool>),
    Ack,
    Reply(Reply),
    Value(Option<String>),
    Contains(bool),
    Error(String),
}

pub fn encode<T: serde::Serialize>(message: &T) -> Result<Vec<u8>, KvError> {
    Ok(bincode::serialize(message)?)
}

pub fn decode<'a, T: serde::Deserialize<'a>>(data: &'a [u8]) -> Result<T, KvError> {
    Ok(bincode::deserialize(data)?)
}
