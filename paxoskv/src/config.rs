use log::warn;
use serde_derive::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::KvError;

/// How nodes reach each other for prepare, accept and learn.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Every consensus call goes through the node's RPC endpoint.
    Http,
    /// Nodes in this process call each other directly.
    Local,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FailureConfig {
    pub enabled: bool,
    pub initial_delay_secs: u64,
    pub period_secs: u64,
    pub recovery_secs: u64,
}

impl Default for FailureConfig {
    fn default() -> Self {
        FailureConfig {
            enabled: true,
            initial_delay_secs: 10,
            period_secs: 100,
            recovery_secs: 100,
        }
    }
}

impl FailureConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn recovery(&self) -> Duration {
        Duration::from_secs(self.recovery_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    pub host: String,
    pub base_port: u16,
    pub service_name: String,
    pub node_count: usize,
    pub transport: TransportKind,
    pub metrics_addr: String,
    pub rpc_timeout_ms: u64,
    pub learn_wait_ms: u64,
    pub failure: FailureConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        RuntimeConfig {
            host: "127.0.0.1".to_string(),
            base_port: 4000,
            service_name: "kvstore".to_string(),
            node_count: 5,
            transport: TransportKind::Http,
            metrics_addr: "127.0.0.1:4010".to_string(),
            rpc_timeout_ms: 2000,
            learn_wait_ms: 1000,
            failure: FailureConfig::default(),
        }
    }

    /// Loads the config file. A missing file falls back to the defaults.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self, KvError> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    "Something went wrong reading the runtime config file {}, using defaults: {:?}",
                    path.display(),
                    e
                );
                return Ok(RuntimeConfig::new());
            }
        };
        let config: RuntimeConfig =
            toml::from_str(&contents).map_err(|e| KvError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), KvError> {
        if self.node_count == 0 {
            return Err(KvError::Config("node_count must be at least 1".into()));
        }
        if self.service_name.is_empty() {
            return Err(KvError::Config("service_name must not be empty".into()));
        }
        if self.base_port as usize + self.node_count - 1 > u16::MAX as usize {
            return Err(KvError::Config(format!(
                "{} nodes do not fit above port {}",
                self.node_count, self.base_port
            )));
        }
        let metrics_addr: SocketAddr = self
            .metrics_addr
            .parse()
            .map_err(|e| KvError::Config(format!("bad metrics_addr {}: {}", self.metrics_addr, e)))?;
        let node_ports = self.base_port as usize..self.base_port as usize + self.node_count;
        if node_ports.contains(&(metrics_addr.port() as usize)) {
            return Err(KvError::Config(format!(
                "metrics_addr {} collides with node ports {}..{}",
                self.metrics_addr, node_ports.start, node_ports.end
            )));
        }
        if self.failure.enabled && self.failure.period_secs == 0 {
            return Err(KvError::Config(
                "failure.period_secs must be at least 1 while the simulator is enabled".into(),
            ));
        }
        Ok(())
    }

    /// Port of the node at `index`. Callers keep `index` below `node_count`.
    pub fn node_port(&self, index: usize) -> u16 {
        self.base_port + index as u16
    }

    pub fn node_addr(&self, index: usize) -> String {
        format!("{}:{}", self.host, self.node_port(index))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn learn_wait(&self) -> Duration {
        Duration::from_millis(self.learn_wait_ms)
    }
}
