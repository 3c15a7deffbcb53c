use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response};
use prometheus::{Encoder, TextEncoder};
use tokio::task::JoinHandle;

use crate::config::{RuntimeConfig, TransportKind};
use crate::error::KvError;
use crate::metrics;
use crate::paxos::liveness::{FailureSimulator, RandomVictim};
use crate::paxos::{Cluster, NodeId, Peer};
use crate::rpc_client::{HttpPeer, RpcClient};
use crate::rpc_service;
use crate::state_kv::KvStore;

/// Hosts the whole replica set in one process, one RPC listener per node.
pub struct Server {
    config: RuntimeConfig,
    cluster: Arc<Cluster<KvStore>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    pub fn builder(config: RuntimeConfig) -> Result<Self, KvError> {
        config.validate()?;
        let machines = (0..config.node_count).map(|_| KvStore::new());
        let cluster = match config.transport {
            TransportKind::Local => Cluster::local(machines, config.learn_wait())?,
            TransportKind::Http => {
                let cluster = Cluster::new(machines, config.learn_wait());
                for node in cluster.nodes() {
                    node.set_peers(Self::http_peers(&config)?)?;
                }
                cluster
            }
        };
        Ok(Server {
            config,
            cluster: Arc::new(cluster),
            tasks: Vec::new(),
        })
    }

    fn http_peers(config: &RuntimeConfig) -> Result<Vec<Arc<dyn Peer>>, KvError> {
        (0..config.node_count)
            .map(|i| {
                let rpc = RpcClient::new(
                    &config.node_addr(i),
                    &config.service_name,
                    config.rpc_timeout(),
                )?;
                Ok(Arc::new(HttpPeer::new(i as NodeId, rpc)) as Arc<dyn Peer>)
            })
            .collect()
    }

    pub fn cluster(&self) -> &Arc<Cluster<KvStore>> {
        &self.cluster
    }

    pub async fn start(&mut self) -> Result<(), KvError> {
        self.start_rpc_servers()?;
        self.start_metrics_server()?;
        self.start_failure_simulator();
        Ok(())
    }

    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        log::info!("server stop");
    }

    fn start_rpc_servers(&mut self) -> Result<(), KvError> {
        for (i, node) in self.cluster.nodes().iter().enumerate() {
            let addr: SocketAddr = self
                .config
                .node_addr(i)
                .parse()
                .map_err(|e| KvError::Config(format!("bad node address: {}", e)))?;
            let (_, task) =
                rpc_service::spawn_rpc_server(node.clone(), &addr, &self.config.service_name)?;
            self.tasks.push(task);
            log::info!(
                "Server {} is ready at port {}",
                i,
                self.config.node_port(i)
            );
        }
        Ok(())
    }

    fn start_metrics_server(&mut self) -> Result<(), KvError> {
        let addr: SocketAddr = self
            .config
            .metrics_addr
            .parse()
            .map_err(|e| KvError::Config(format!("bad metrics address: {}", e)))?;
        let make_svc = make_service_fn(move |_| {
            let registry = metrics::REGISTRY_INSTANCE.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |_: Request<Body>| {
                    let registry = registry.clone();
                    async move {
                        let encoder = TextEncoder::new();
                        let metric_families = registry.gather();
                        let mut buffer = Vec::new();
                        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
                            log::error!("failed to encode metrics: {}", e);
                        }
                        Ok::<_, hyper::Error>(Response::new(Body::from(buffer)))
                    }
                }))
            }
        });
        metrics::init_registry();
        let server = hyper::Server::try_bind(&addr)?.serve(make_svc);
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = server.await {
                log::error!("metrics server stopped: {}", e);
            }
        }));
        log::info!("metrics server started on {}", addr);
        Ok(())
    }

    fn start_failure_simulator(&mut self) {
        let failure = &self.config.failure;
        if !failure.enabled {
            log::info!("failure simulator disabled");
            return;
        }
        let simulator = FailureSimulator::new(
            self.cluster.clone(),
            RandomVictim::new(),
            failure.initial_delay(),
            failure.period(),
            failure.recovery(),
        );
        self.tasks.push(simulator.spawn());
        log::info!(
            "failure simulator started, first failure in {:?}, then every {:?}",
            failure.initial_delay(),
            failure.period()
        );
    }
}
