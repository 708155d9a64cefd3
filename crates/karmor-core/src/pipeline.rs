//! The `Pipeline`: a construction-time-owned handle to every shared pipeline
//! resource, instead of process-global queues and singletons.

use crate::feeder::{LocalSink, LogFeeder, MessageLevel};
use crate::ingest::{self, IngestStats};
use crate::logbuilder::{EventOrigin, LogBuilder};
use crate::registry::ContainerRegistry;
use crate::tree::ProcessTreeTracker;
use karmor_common::RawSyscallRecord;
use karmor_policy::PolicyIndex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Process arguments the pipeline needs at construction time, independent
/// of how `karmor-agent` sources them (flags, config file, or defaults).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub cluster_name: String,
    pub host_name: String,
    pub host_ip: String,
    pub host_labels: Vec<String>,
    pub enable_host_policy: bool,
    pub enable_auditd: bool,
    pub subscriber_queue_depth: usize,
    pub reclaim_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cluster_name: "default".to_string(),
            host_name: "unknown".to_string(),
            host_ip: "0.0.0.0".to_string(),
            host_labels: Vec::new(),
            enable_host_policy: false,
            enable_auditd: false,
            subscriber_queue_depth: 256,
            reclaim_interval: Duration::from_secs(30),
        }
    }
}

/// One raw kernel record plus the container attribution the ingestor
/// resolved for it (from mnt/pid namespace or cgroup lookup — resolved by
/// an external collaborator, out of scope here).
pub struct IngestItem {
    pub record: RawSyscallRecord,
    pub origin: EventOrigin,
}

/// Owns every shared pipeline resource. Constructed once in
/// `karmor-agent::main` and shared by `Arc` with the ingestor task and the
/// RPC service — no process-global state.
pub struct Pipeline {
    pub registry: Arc<ContainerRegistry>,
    pub policy_index: Arc<PolicyIndex>,
    pub tracker: Arc<ProcessTreeTracker>,
    pub feeder: Arc<LogFeeder>,
    pub ingest_stats: Arc<IngestStats>,
    pub cancellation: CancellationToken,
    config: PipelineConfig,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: PipelineConfig, local_sink: LocalSink) -> Self {
        let registry = Arc::new(ContainerRegistry::new());
        let policy_index = Arc::new(PolicyIndex::new());
        let tracker = Arc::new(ProcessTreeTracker::default());
        let feeder = Arc::new(LogFeeder::new(
            policy_index.clone(),
            registry.clone(),
            config.enable_host_policy,
            config.host_labels.clone(),
            local_sink,
        ));
        Self {
            registry,
            policy_index,
            tracker,
            feeder,
            ingest_stats: Arc::new(IngestStats::default()),
            cancellation: CancellationToken::new(),
            config,
        }
    }

    /// Decodes one raw record, builds its `Log`, and feeds it — the
    /// Event Ingestor -> Log Builder -> Log Feeder leg of the pipeline
    /// (the Policy Matcher runs inside `LogFeeder::push_log`).
    pub fn ingest_one(&self, record: &RawSyscallRecord, origin: &EventOrigin, now: u64) {
        let Some(event) = ingest::decode(record, &self.ingest_stats) else {
            return;
        };

        if LogBuilder::should_suppress(&event, self.config.enable_auditd) {
            return;
        }

        let builder = LogBuilder::new(&self.registry, &self.tracker);
        let log = builder.build(&event, origin, now);
        self.feeder.push_log(log);
    }

    /// Drains `items` until the channel closes or cancellation is
    /// requested, building and feeding a `Log` for each.
    pub async fn run_ingest_loop(self: Arc<Self>, mut items: mpsc::Receiver<IngestItem>, now: impl Fn() -> u64) {
        loop {
            tokio::select! {
                biased;
                () = self.cancellation.cancelled() => {
                    info!("ingest loop cancelled, shutting down");
                    return;
                }
                item = items.recv() => {
                    match item {
                        Some(item) => self.ingest_one(&item.record, &item.origin, now()),
                        None => {
                            info!("ingest channel closed, shutting down ingest loop");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Drains the Log Feeder's local-sink queue for the life of the
    /// pipeline; see [`LogFeeder::run_local_sink_loop`].
    pub async fn run_local_sink_loop(self: Arc<Self>) {
        self.feeder.run_local_sink_loop(self.cancellation.clone()).await;
    }

    /// Periodically reclaims exited process-tree nodes past their grace
    /// window.
    pub async fn run_reclaim_loop(self: Arc<Self>, now: impl Fn() -> u64) {
        let mut ticker = tokio::time::interval(self.config.reclaim_interval);
        loop {
            tokio::select! {
                biased;
                () = self.cancellation.cancelled() => return,
                _ = ticker.tick() => self.tracker.reclaim(now()),
            }
        }
    }

    pub fn push_message(&self, level: MessageLevel, text: impl Into<String>, now: u64) {
        self.feeder.push_message(level, text, now, &self.config.cluster_name, &self.config.host_name, &self.config.host_ip);
    }

    /// Flips the cancellation signal; every task spawned off this pipeline
    /// observes it at its next suspension point.
    pub fn shutdown(&self) {
        warn!("pipeline shutdown requested");
        self.cancellation.cancel();
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}
