//! Metrics collection module for the key-value service
//!
//! Consensus and request metrics exposed through a Prometheus registry.

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::future::Future;
use std::time::Instant;

use crate::error::KvError;

lazy_static! {
    /// Global Prometheus registry instance
    pub static ref REGISTRY_INSTANCE: Registry = Registry::new();

    /// Client requests by method
    pub static ref REQ_COUNTER_VEC: CounterVec =
        CounterVec::new(Opts::new("request_counter", "request counter"), &["method"]).unwrap();

    /// Client request latency by method
    pub static ref METHOD_HISTOGRAM_VEC: HistogramVec = HistogramVec::new(
        HistogramOpts::new("method_cost", "method cost"),
        &["method"]
    )
    .unwrap();

    /// Finished proposal rounds by result
    pub static ref PROPOSAL_COUNTER_VEC: CounterVec =
        CounterVec::new(Opts::new("proposal_counter", "proposal rounds by result"), &["result"]).unwrap();

    /// Prepare answers seen by proposers
    pub static ref PREPARE_COUNTER_VEC: CounterVec =
        CounterVec::new(Opts::new("prepare_counter", "prepare outcomes"), &["outcome"]).unwrap();

    /// Learned operations applied to the local store
    pub static ref APPLY_COUNTER_VEC: CounterVec = CounterVec::new(
        Opts::new("apply_counter", "applied operations"),
        &["kind", "result"]
    )
    .unwrap();

    /// Replicas taken down by the failure simulator
    pub static ref FAILURE_COUNTER: Counter =
        Counter::new("injected_failure_counter", "injected replica failures").unwrap();
}

/// Registers all metric collectors with the global registry
pub fn init_registry() {
    let _ = REGISTRY_INSTANCE.register(Box::new(REQ_COUNTER_VEC.clone()));
    let _ = REGISTRY_INSTANCE.register(Box::new(METHOD_HISTOGRAM_VEC.clone()));
    let _ = REGISTRY_INSTANCE.register(Box::new(PROPOSAL_COUNTER_VEC.clone()));
    let _ = REGISTRY_INSTANCE.register(Box::new(PREPARE_COUNTER_VEC.clone()));
    let _ = REGISTRY_INSTANCE.register(Box::new(APPLY_COUNTER_VEC.clone()));
    let _ = REGISTRY_INSTANCE.register(Box::new(FAILURE_COUNTER.clone()));
}

/// Counts and times one client-facing call.
pub async fn record_metrics<F, Fut, T>(method_name: &'static str, handler: F) -> Result<T, KvError>
where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<T, KvError>> + Send,
{
    let start = Instant::now();
    REQ_COUNTER_VEC.with_label_values(&[method_name]).inc();
    let result = handler().await;

    let elapsed = start.elapsed();
    METHOD_HISTOGRAM_VEC
        .with_label_values(&[method_name])
        .observe(elapsed.as_secs_f64());

    result
}
