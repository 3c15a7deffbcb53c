//! A key-value store replicated with per-key Paxos.
//!
//! Every node of a fixed replica set proposes, accepts and learns. Writes go
//! through a prepare/accept/learn round; reads are served from the local store.

pub mod command;
pub mod config;
pub mod error;
pub mod metrics;
pub mod paxos;
pub mod rpc_client;
pub mod rpc_messages;
pub mod rpc_service;
pub mod server;
pub mod state_kv;

pub use error::KvError;
