//! Log Feeder: fans out decorated logs and agent messages to a local sink
//! and any number of streaming RPC subscribers.

use crate::logbuilder::{Log, LogType};
use crate::matcher::PolicyMatcher;
use crate::registry::ContainerRegistry;
use karmor_policy::PolicyIndex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::error;

/// How many serialized log lines the local-sink queue holds before it
/// starts dropping the oldest to make room for the newest.
const LOCAL_SINK_QUEUE_DEPTH: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageLevel {
    Info,
    Debug,
    Error,
}

/// An agent-diagnostics line.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub updated_time: u64,
    pub cluster_name: String,
    pub host_name: String,
    pub host_ip: String,
    pub level: MessageLevel,
    pub text: String,
}

/// Where decorated logs are additionally written, outside the RPC fan-out
///.
pub enum LocalSink {
    Stdout,
    File(PathBuf),
    None,
}

impl LocalSink {
    fn write(&self, line: &str) -> std::io::Result<()> {
        match self {
            LocalSink::Stdout => {
                println!("{line}");
                Ok(())
            }
            LocalSink::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                writeln!(file, "{line}")
            }
            LocalSink::None => Ok(()),
        }
    }
}

fn matches_log_filter(filter: &str, log_type: LogType) -> bool {
    match filter {
        "" => true,
        "policy" => matches!(log_type, LogType::MatchedPolicy | LogType::MatchedHostPolicy),
        "system" => matches!(log_type, LogType::ContainerLog | LogType::HostLog),
        _ => false,
    }
}

struct LogSubscriber {
    filter: String,
    tx: mpsc::Sender<Log>,
}

struct MessageSubscriber {
    tx: mpsc::Sender<Message>,
}

/// Shared, reference-counted subscriber table. Kept as its own `Arc` (not
/// tied to `LogFeeder`'s own lifetime) so a [`LogSubscription`] guard can
/// outlive or be dropped independently of the feeder handle that created it
///.
struct SubscriberTable<T> {
    entries: Mutex<BTreeMap<u64, T>>,
    next_id: AtomicU64,
}

impl<T> SubscriberTable<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self { entries: Mutex::new(BTreeMap::new()), next_id: AtomicU64::new(0) })
    }

    fn insert(&self, entry: T) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().expect("subscriber table lock poisoned").insert(id, entry);
        id
    }

    fn remove(&self, id: u64) {
        self.entries.lock().expect("subscriber table lock poisoned").remove(&id);
    }
}

/// RAII handle for a log subscription: dropping it unregisters the
/// subscriber, eliminating the defer/cleanup pattern the original relied on.
pub struct LogSubscription {
    id: u64,
    table: Arc<SubscriberTable<LogSubscriber>>,
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}

/// RAII handle for a message subscription, mirroring [`LogSubscription`].
pub struct MessageSubscription {
    id: u64,
    table: Arc<SubscriberTable<MessageSubscriber>>,
}

impl Drop for MessageSubscription {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}

#[derive(Default)]
pub struct FeederStats {
    pub local_sink_errors: AtomicU64,
    pub local_sink_drops: AtomicU64,
    pub subscribers_unregistered: AtomicU64,
}

/// A bounded queue of serialized log lines awaiting a local-sink write.
/// Decouples `push_log` (called from the Event Ingestor's draining task)
/// from the sink's own write latency: once full, the oldest queued line
/// is dropped to make room for the newest.
struct LocalSinkQueue {
    lines: Mutex<VecDeque<String>>,
    notify: Notify,
    capacity: usize,
}

impl LocalSinkQueue {
    fn new(capacity: usize) -> Self {
        Self { lines: Mutex::new(VecDeque::with_capacity(capacity)), notify: Notify::new(), capacity }
    }

    /// Enqueues `line`; returns `true` if the oldest queued line was
    /// dropped to make room for it.
    fn push(&self, line: String) -> bool {
        let mut lines = self.lines.lock().expect("local sink queue lock poisoned");
        let dropped = lines.len() >= self.capacity && lines.pop_front().is_some();
        lines.push_back(line);
        drop(lines);
        self.notify.notify_one();
        dropped
    }

    fn pop(&self) -> Option<String> {
        self.lines.lock().expect("local sink queue lock poisoned").pop_front()
    }
}

pub struct LogFeeder {
    index: Arc<PolicyIndex>,
    registry: Arc<ContainerRegistry>,
    enable_host_policy: bool,
    host_labels: Vec<String>,
    local_sink: Mutex<LocalSink>,
    local_sink_queue: LocalSinkQueue,
    log_subscribers: Arc<SubscriberTable<LogSubscriber>>,
    msg_subscribers: Arc<SubscriberTable<MessageSubscriber>>,
    pub stats: FeederStats,
}

impl LogFeeder {
    #[must_use]
    pub fn new(
        index: Arc<PolicyIndex>,
        registry: Arc<ContainerRegistry>,
        enable_host_policy: bool,
        host_labels: Vec<String>,
        local_sink: LocalSink,
    ) -> Self {
        Self {
            index,
            registry,
            enable_host_policy,
            host_labels,
            local_sink: Mutex::new(local_sink),
            local_sink_queue: LocalSinkQueue::new(LOCAL_SINK_QUEUE_DEPTH),
            log_subscribers: SubscriberTable::new(),
            msg_subscribers: SubscriberTable::new(),
            stats: FeederStats::default(),
        }
    }

    /// Registers a new `WatchLogs` subscriber with a bounded per-subscriber
    /// channel. The returned pair is the RPC handler's receive stream plus
    /// the guard that unregisters it on drop.
    #[must_use]
    pub fn subscribe_logs(&self, filter: String, depth: usize) -> (mpsc::Receiver<Log>, LogSubscription) {
        let (tx, rx) = mpsc::channel(depth);
        let id = self.log_subscribers.insert(LogSubscriber { filter, tx });
        (rx, LogSubscription { id, table: self.log_subscribers.clone() })
    }

    #[must_use]
    pub fn subscribe_messages(&self, depth: usize) -> (mpsc::Receiver<Message>, MessageSubscription) {
        let (tx, rx) = mpsc::channel(depth);
        let id = self.msg_subscribers.insert(MessageSubscriber { tx });
        (rx, MessageSubscription { id, table: self.msg_subscribers.clone() })
    }

    pub fn push_message(&self, level: MessageLevel, text: impl Into<String>, now: u64, cluster_name: &str, host_name: &str, host_ip: &str) {
        let message = Message {
            updated_time: now,
            cluster_name: cluster_name.to_string(),
            host_name: host_name.to_string(),
            host_ip: host_ip.to_string(),
            level,
            text: text.into(),
        };
        let snapshot: Vec<(u64, mpsc::Sender<Message>)> = {
            let entries = self.msg_subscribers.entries.lock().expect("subscriber table lock poisoned");
            entries.iter().map(|(&id, sub)| (id, sub.tx.clone())).collect()
        };
        for (id, tx) in snapshot {
            if tx.try_send(message.clone()).is_err() {
                self.msg_subscribers.remove(id);
                self.stats.subscribers_unregistered.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Decorates `log` via the Policy Matcher, enqueues it for the local
    /// sink, then fans it out to every subscriber whose filter matches.
    /// The sink write itself happens on [`Self::run_local_sink_loop`], so a
    /// slow or stuck sink never blocks the caller.
    pub fn push_log(&self, log: Log) {
        let matcher = PolicyMatcher::new(&self.index, &self.registry, self.enable_host_policy, &self.host_labels);
        let decorated = matcher.decorate(log);

        if let Ok(line) = serde_json::to_string(&decorated) {
            if self.local_sink_queue.push(line) {
                error!("local sink queue full, dropped oldest entry");
                self.stats.local_sink_drops.fetch_add(1, Ordering::Relaxed);
            }
        }

        let snapshot: Vec<(u64, String, mpsc::Sender<Log>)> = {
            let entries = self.log_subscribers.entries.lock().expect("subscriber table lock poisoned");
            entries.iter().map(|(&id, sub)| (id, sub.filter.clone(), sub.tx.clone())).collect()
        };
        for (id, filter, tx) in snapshot {
            if !matches_log_filter(&filter, decorated.log_type) {
                continue;
            }
            if tx.try_send(decorated.clone()).is_err() {
                self.log_subscribers.remove(id);
                self.stats.subscribers_unregistered.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Drains the local-sink queue until `cancellation` fires, writing each
    /// queued line in turn. Runs on its own task so the blocking sink write
    /// never happens on the task draining the Event Ingestor.
    pub async fn run_local_sink_loop(&self, cancellation: CancellationToken) {
        loop {
            while let Some(line) = self.local_sink_queue.pop() {
                let sink = self.local_sink.lock().expect("local sink lock poisoned");
                if let Err(err) = sink.write(&line) {
                    error!(%err, "local sink write failed");
                    self.stats.local_sink_errors.fetch_add(1, Ordering::Relaxed);
                }
            }
            tokio::select! {
                biased;
                () = cancellation.cancelled() => return,
                () = self.local_sink_queue.notify.notified() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karmor_policy::Operation;

    fn sample_log(log_type: LogType) -> Log {
        Log {
            updated_time: 0,
            cluster_name: "default".into(),
            host_name: "node-1".into(),
            namespace_name: "ns1".into(),
            pod_name: "web".into(),
            container_id: "c1".into(),
            container_name: "nginx".into(),
            host_pid: 42,
            ppid: 1,
            pid: 7,
            uid: 0,
            log_type,
            source: "nginx".into(),
            operation: Operation::File,
            resource: "/etc/passwd".into(),
            data: String::new(),
            result: "Passed".into(),
            action: None,
            policy_name: None,
            severity: None,
            tags: vec![],
            message: None,
        }
    }

    fn feeder() -> LogFeeder {
        LogFeeder::new(Arc::new(PolicyIndex::new()), Arc::new(ContainerRegistry::new()), false, Vec::new(), LocalSink::None)
    }

    #[tokio::test]
    async fn filter_correctness_across_two_subscribers() {
        let feeder = feeder();
        let (mut rx_all, _guard_a) = feeder.subscribe_logs(String::new(), 8);
        let (mut rx_policy, _guard_b) = feeder.subscribe_logs("policy".into(), 8);

        feeder.push_log(sample_log(LogType::ContainerLog));
        feeder.push_log(sample_log(LogType::MatchedPolicy));

        let first = rx_all.recv().await.expect("A receives first log");
        assert_eq!(first.log_type, LogType::ContainerLog);
        let second = rx_all.recv().await.expect("A receives second log");
        assert_eq!(second.log_type, LogType::MatchedPolicy);

        let only = rx_policy.recv().await.expect("B receives the matched log");
        assert_eq!(only.log_type, LogType::MatchedPolicy);
        assert!(rx_policy.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_filter_yields_no_matches() {
        let feeder = feeder();
        let (mut rx, _guard) = feeder.subscribe_logs("bogus".into(), 8);
        feeder.push_log(sample_log(LogType::ContainerLog));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_subscriber_does_not_block_others() {
        let feeder = feeder();
        let (rx_b, guard_b) = feeder.subscribe_logs(String::new(), 8);
        let (mut rx_a, _guard_a) = feeder.subscribe_logs(String::new(), 8);

        drop(rx_b); // simulate B's RPC stream erroring out / client gone
        feeder.push_log(sample_log(LogType::ContainerLog));

        assert!(rx_a.recv().await.is_some());
        assert_eq!(feeder.stats.subscribers_unregistered.load(Ordering::Relaxed), 1);
        drop(guard_b);
    }

    #[test]
    fn local_sink_queue_drops_oldest_when_full() {
        let queue = LocalSinkQueue::new(2);
        assert!(!queue.push("a".into()));
        assert!(!queue.push("b".into()));
        assert!(queue.push("c".into()));
        assert_eq!(queue.pop().as_deref(), Some("b"));
        assert_eq!(queue.pop().as_deref(), Some("c"));
        assert_eq!(queue.pop(), None);
    }

    #[tokio::test]
    async fn run_local_sink_loop_drains_queued_lines_without_blocking_push_log() {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let path = std::env::temp_dir().join(format!("karmor-feeder-test-{}.log", COUNTER.fetch_add(1, Ordering::Relaxed)));
        let feeder = Arc::new(LogFeeder::new(
            Arc::new(PolicyIndex::new()),
            Arc::new(ContainerRegistry::new()),
            false,
            Vec::new(),
            LocalSink::File(path.clone()),
        ));

        feeder.push_log(sample_log(LogType::ContainerLog));
        assert_eq!(feeder.stats.local_sink_drops.load(Ordering::Relaxed), 0);

        let cancellation = CancellationToken::new();
        let handle = tokio::spawn({
            let feeder = feeder.clone();
            let cancellation = cancellation.clone();
            async move { feeder.run_local_sink_loop(cancellation).await }
        });
        tokio::task::yield_now().await;
        cancellation.cancel();
        handle.await.expect("sink loop task did not panic");

        let contents = std::fs::read_to_string(&path).expect("sink file written by the drain loop");
        assert!(contents.contains("ContainerLog"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn full_queue_drops_oldest_and_counts_it() {
        let feeder = feeder();
        for _ in 0..LOCAL_SINK_QUEUE_DEPTH {
            feeder.push_log(sample_log(LogType::ContainerLog));
        }
        assert_eq!(feeder.stats.local_sink_drops.load(Ordering::Relaxed), 0);
        feeder.push_log(sample_log(LogType::ContainerLog));
        assert_eq!(feeder.stats.local_sink_drops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn dropping_subscription_removes_subscriber() {
        let feeder = feeder();
        let (_rx, guard) = feeder.subscribe_logs(String::new(), 8);
        assert_eq!(feeder.log_subscribers.entries.lock().unwrap().len(), 1);
        drop(guard);
        assert_eq!(feeder.log_subscribers.entries.lock().unwrap().len(), 0);
    }
}
