use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use paxoskv::paxos::liveness::FailureInjector;
use paxoskv::paxos::{Cluster, NodeId, Peer};
use paxoskv::rpc_client::{HttpPeer, RpcClient};
use paxoskv::rpc_service::spawn_rpc_server;
use paxoskv::state_kv::KvStore;

const SERVICE: &str = "kvstore";
const TIMEOUT: Duration = Duration::from_secs(2);

/// Five replicas on ephemeral ports, wired to each other over RPC.
fn start_cluster() -> (Cluster<KvStore>, Vec<SocketAddr>) {
    let cluster = Cluster::new((0..5).map(|_| KvStore::new()), Duration::from_secs(2));
    let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let addrs: Vec<SocketAddr> = cluster
        .nodes()
        .iter()
        .map(|node| spawn_rpc_server(node.clone(), &any, SERVICE).unwrap().0)
        .collect();

    for node in cluster.nodes() {
        let peers = addrs
            .iter()
            .enumerate()
            .map(|(i, addr)| {
                let rpc = RpcClient::new(&addr.to_string(), SERVICE, TIMEOUT).unwrap();
                Arc::new(HttpPeer::new(i as NodeId, rpc)) as Arc<dyn Peer>
            })
            .collect();
        node.set_peers(peers).unwrap();
    }
    (cluster, addrs)
}

fn client(addr: &SocketAddr) -> RpcClient {
    RpcClient::new(&addr.to_string(), SERVICE, TIMEOUT).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn put_over_rpc_is_readable_from_any_replica() {
    let (_cluster, addrs) = start_cluster();

    let reply = client(&addrs[0]).put("a", "1").await.unwrap();
    assert!(reply.success, "{}", reply.message);

    for addr in &addrs {
        let replica = client(addr);
        assert!(replica.contains_key("a").await.unwrap());
        assert_eq!(replica.get("a").await.unwrap().as_deref(), Some("1"));
    }
    assert_eq!(client(&addrs[3]).get("missing").await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rpc_round_without_quorum_reports_failure() {
    let (cluster, addrs) = start_cluster();
    for replica in 2..5 {
        cluster.mark_unavailable(replica, Duration::from_secs(100));
    }

    let reply = client(&addrs[1]).put("c", "3").await.unwrap();
    assert!(!reply.success);
    assert!(reply.message.contains("quorum not reached"), "{}", reply.message);
    for addr in &addrs {
        assert!(!client(addr).contains_key("c").await.unwrap());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delete_over_rpc() {
    let (_cluster, addrs) = start_cluster();
    let entry = client(&addrs[2]);

    assert!(!entry.delete("nothing").await.unwrap().success);
    assert!(entry.put("k", "v").await.unwrap().success);
    assert!(entry.delete("k").await.unwrap().success);
    assert!(!client(&addrs[4]).contains_key("k").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wrong_service_name_is_a_transport_error() {
    let (_cluster, addrs) = start_cluster();
    let stranger = RpcClient::new(&addrs[0].to_string(), "other", TIMEOUT).unwrap();
    assert!(stranger.get("a").await.is_err());
}
