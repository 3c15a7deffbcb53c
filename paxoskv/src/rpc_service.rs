//! Node RPC endpoint
//!
//! Serves consensus calls from peers and key-value calls from clients on a
//! single `POST /<service_name>` route.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, StatusCode};
use log::{error, info, warn};
use tokio::task::JoinHandle;

use crate::error::KvError;
use crate::metrics;
use crate::paxos::{Node, StateMachine};
use crate::rpc_messages::{decode, encode, Reply, RpcRequest, RpcResponse};

/// Executes one request against the node.
pub async fn dispatch<S: StateMachine>(node: &Node<S>, request: RpcRequest) -> RpcResponse {
    match request {
        RpcRequest::Prepare { id, operation } => RpcResponse::Prepared(node.prepare(id, &operation)),
        RpcRequest::Accept { id, operation } => match node.accept(id, operation).await {
            Ok(()) => RpcResponse::Ack,
            Err(e) => RpcResponse::Error(e.to_string()),
        },
        RpcRequest::Learn { id, operation } => match node.learn(id, &operation) {
            Ok(()) => RpcResponse::Ack,
            Err(e) => RpcResponse::Error(e.to_string()),
        },
        RpcRequest::Put { key, value } => {
            let result =
                metrics::record_metrics("put", || node.put(key.clone(), value.clone())).await;
            RpcResponse::Reply(put_reply(&key, &value, result))
        }
        RpcRequest::Delete { key } => {
            let result = metrics::record_metrics("delete", || node.delete(key.clone())).await;
            RpcResponse::Reply(delete_reply(&key, result))
        }
        RpcRequest::Get { key } => {
            metrics::REQ_COUNTER_VEC.with_label_values(&["get"]).inc();
            RpcResponse::Value(node.get(&key))
        }
        RpcRequest::ContainsKey { key } => {
            metrics::REQ_COUNTER_VEC
                .with_label_values(&["contains_key"])
                .inc();
            RpcResponse::Contains(node.contains_key(&key))
        }
    }
}

fn put_reply(key: &str, value: &str, result: Result<(), KvError>) -> Reply {
    match result {
        Ok(()) => Reply {
            success: true,
            message: format!(
                "PUT operation successful for key - {} with value - {}",
                key, value
            ),
        },
        Err(e) => Reply {
            success: false,
            message: format!("Error occurred during PUT operation for key - {}: {}", key, e),
        },
    }
}

fn delete_reply(key: &str, result: Result<(), KvError>) -> Reply {
    match result {
        Ok(()) => Reply {
            success: true,
            message: format!("DELETE operation successful for key - {}", key),
        },
        Err(e) => Reply {
            success: false,
            message: format!(
                "Error occurred during DELETE operation for key - {}: {}",
                key, e
            ),
        },
    }
}

fn status(code: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = code;
    response
}

async fn handle<S: StateMachine>(
    node: Arc<Node<S>>,
    path: Arc<str>,
    request: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if request.method() != Method::POST || request.uri().path() != &*path {
        return Ok(status(StatusCode::NOT_FOUND));
    }
    let body = match hyper::body::to_bytes(request.into_body()).await {
        Ok(body) => body,
        Err(e) => {
            warn!("node {} failed to read request body: {}", node.id(), e);
            return Ok(status(StatusCode::BAD_REQUEST));
        }
    };
    let request: RpcRequest = match decode(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("node {} got an undecodable request: {}", node.id(), e);
            return Ok(status(StatusCode::BAD_REQUEST));
        }
    };

    let response = dispatch(&node, request).await;
    match encode(&response) {
        Ok(bytes) => Ok(Response::new(Body::from(bytes))),
        Err(e) => {
            error!("node {} failed to encode response: {}", node.id(), e);
            Ok(status(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

/// Binds the node's endpoint and serves it in the background.
///
/// Returns the bound address, which differs from `addr` when port 0 is used.
pub fn spawn_rpc_server<S: StateMachine>(
    node: Arc<Node<S>>,
    addr: &SocketAddr,
    service_name: &str,
) -> Result<(SocketAddr, JoinHandle<()>), KvError> {
    let id = node.id();
    let path: Arc<str> = Arc::from(format!("/{}", service_name));
    let make_svc = make_service_fn(move |_| {
        let node = node.clone();
        let path = path.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |request| {
                handle(node.clone(), path.clone(), request)
            }))
        }
    });
    let server = hyper::Server::try_bind(addr)?.serve(make_svc);
    let local_addr = server.local_addr();
    let handle = tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("rpc server of node {} stopped: {}", id, e);
        }
    });
    info!("node {} rpc server started on {}", id, local_addr);
    Ok((local_addr, handle))
}
