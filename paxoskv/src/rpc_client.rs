//! RPC client implementation
//!
//! `RpcClient` talks to one node's endpoint. `HttpPeer` puts the consensus
//! calls of the [`Peer`] trait on top of it.

use std::time::Duration;

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Client, Request, Uri};
use tokio::time;

use crate::error::KvError;
use crate::paxos::{NodeId, Operation, Peer, ProposalId};
use crate::rpc_messages::{decode, encode, Reply, RpcRequest, RpcResponse};

#[derive(Clone, Debug)]
pub struct RpcClient {
    client: Client<HttpConnector>,
    uri: Uri,
    timeout: Duration,
}

fn unexpected(response: RpcResponse) -> KvError {
    KvError::Transport(format!("unexpected response {:?}", response))
}

impl RpcClient {
    /// `addr` is `host:port` of the node.
    pub fn new(addr: &str, service_name: &str, timeout: Duration) -> Result<Self, KvError> {
        let uri: Uri = format!("http://{}/{}", addr, service_name)
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| KvError::Transport(e.to_string()))?;
        Ok(RpcClient {
            client: Client::new(),
            uri,
            timeout,
        })
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Sends one request and waits for the answer, bounded by the timeout.
    pub async fn call(&self, request: &RpcRequest) -> Result<RpcResponse, KvError> {
        let http_request = Request::post(self.uri.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(encode(request)?))
            .map_err(|e| KvError::Transport(e.to_string()))?;

        let exchange = async {
            let response = self.client.request(http_request).await?;
            let status = response.status();
            let bytes = hyper::body::to_bytes(response.into_body()).await?;
            Ok::<_, KvError>((status, bytes))
        };
        let (status, bytes) = time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                KvError::Transport(format!(
                    "{} {} timed out after {:?}",
                    request.method(),
                    self.uri,
                    self.timeout
                ))
            })??;
        if !status.is_success() {
            return Err(KvError::Transport(format!(
                "{} answered {}",
                self.uri, status
            )));
        }

        match decode::<RpcResponse>(&bytes)? {
            RpcResponse::Error(message) => Err(KvError::Transport(message)),
            response => Ok(response),
        }
    }

    pub async fn put(&self, key: &str, value: &str) -> Result<Reply, KvError> {
        let request = RpcRequest::Put {
            key: key.to_string(),
            value: value.to_string(),
        };
        match self.call(&request).await? {
            RpcResponse::Reply(reply) => Ok(reply),
            other => Err(unexpected(other)),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<Reply, KvError> {
        let request = RpcRequest::Delete {
            key: key.to_string(),
        };
        match self.call(&request).await? {
            RpcResponse::Reply(reply) => Ok(reply),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let request = RpcRequest::Get {
            key: key.to_string(),
        };
        match self.call(&request).await? {
            RpcResponse::Value(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    pub async fn contains_key(&self, key: &str) -> Result<bool, KvError> {
        let request = RpcRequest::ContainsKey {
            key: key.to_string(),
        };
        match self.call(&request).await? {
            RpcResponse::Contains(found) => Ok(found),
            other => Err(unexpected(other)),
        }
    }
}

/// A replica reached over its RPC endpoint.
pub struct HttpPeer {
    id: NodeId,
    rpc: RpcClient,
}

impl HttpPeer {
    pub fn new(id: NodeId, rpc: RpcClient) -> Self {
        HttpPeer { id, rpc }
    }
}

#[async_trait]
impl Peer for HttpPeer {
    fn id(&self) -> NodeId {
        self.id
    }

    async fn prepare(&self, id: ProposalId, operation: Operation) -> Result<Option<bool>, KvError> {
        match self.rpc.call(&RpcRequest::Prepare { id, operation }).await? {
            RpcResponse::Prepared(promise) => Ok(promise),
            other => Err(unexpected(other)),
        }
    }

    async fn accept(&self, id: ProposalId, operation: Operation) -> Result<(), KvError> {
        match self.rpc.call(&RpcRequest::Accept { id, operation }).await? {
            RpcResponse::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn learn(&self, id: ProposalId, operation: Operation) -> Result<(), KvError> {
        match self.rpc.call(&RpcRequest::Learn { id, operation }).await? {
            RpcResponse::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}
