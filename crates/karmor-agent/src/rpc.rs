//! The streaming RPC service: a thin
//! `tonic` wrapper around `karmor_core::LogFeeder`'s subscriber tables.

use karmor_core::{Log, LogFeeder, Message, MessageLevel};
use karmor_proto::karmor_server::Karmor;
use karmor_proto::{NonceMessage, ReplyMessage, RequestMessage};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};

pub struct KarmorService {
    feeder: Arc<LogFeeder>,
}

impl KarmorService {
    #[must_use]
    pub fn new(feeder: Arc<LogFeeder>) -> Self {
        Self { feeder }
    }
}

#[tonic::async_trait]
impl Karmor for KarmorService {
    async fn health_check(&self, request: Request<NonceMessage>) -> Result<Response<ReplyMessage>, Status> {
        let nonce = request.into_inner().nonce;
        Ok(Response::new(ReplyMessage { retval: nonce }))
    }

    type WatchMessagesStream = Pin<Box<dyn Stream<Item = Result<karmor_proto::Message, Status>> + Send + 'static>>;

    async fn watch_messages(&self, _request: Request<RequestMessage>) -> Result<Response<Self::WatchMessagesStream>, Status> {
        let (rx, guard) = self.feeder.subscribe_messages(256);
        let stream = ReceiverStream::new(rx).map(|m| Ok(message_to_proto(&m)));
        // The subscription guard must outlive the stream; holding it inside
        // the mapped stream's closure environment keeps it alive for exactly
        // as long as the client stays subscribed.
        let stream = GuardedStream { inner: stream, _guard: guard };
        Ok(Response::new(Box::pin(stream)))
    }

    type WatchLogsStream = Pin<Box<dyn Stream<Item = Result<karmor_proto::Log, Status>> + Send + 'static>>;

    async fn watch_logs(&self, request: Request<RequestMessage>) -> Result<Response<Self::WatchLogsStream>, Status> {
        let filter = request.into_inner().filter;
        let (rx, guard) = self.feeder.subscribe_logs(filter, 256);
        let stream = ReceiverStream::new(rx).map(|l| Ok(log_to_proto(&l)));
        let stream = GuardedStream { inner: stream, _guard: guard };
        Ok(Response::new(Box::pin(stream)))
    }
}

/// Wraps a subscriber stream together with its RAII unregistration guard so
/// the guard drops exactly when the stream (and thus the subscription) does,
/// never before.
struct GuardedStream<S, G> {
    inner: S,
    _guard: G,
}

impl<S: Stream + Unpin, G: Unpin> Stream for GuardedStream<S, G> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

fn message_to_proto(message: &Message) -> karmor_proto::Message {
    karmor_proto::Message {
        updated_time: message.updated_time,
        cluster_name: message.cluster_name.clone(),
        host_name: message.host_name.clone(),
        host_ip: message.host_ip.clone(),
        level: level_to_str(message.level).to_string(),
        message: message.text.clone(),
    }
}

fn level_to_str(level: MessageLevel) -> &'static str {
    match level {
        MessageLevel::Info => "INFO",
        MessageLevel::Debug => "DEBUG",
        MessageLevel::Error => "ERROR",
    }
}

fn log_to_proto(log: &Log) -> karmor_proto::Log {
    karmor_proto::Log {
        updated_time: log.updated_time,
        cluster_name: log.cluster_name.clone(),
        host_name: log.host_name.clone(),
        namespace_name: log.namespace_name.clone(),
        pod_name: log.pod_name.clone(),
        container_id: log.container_id.clone(),
        container_name: log.container_name.clone(),
        host_pid: log.host_pid as i32,
        ppid: log.ppid as i32,
        pid: log.pid as i32,
        uid: log.uid as i32,
        policy_name: log.policy_name.clone().unwrap_or_default(),
        severity: log.severity.unwrap_or_default(),
        tags: log.tags.clone(),
        message: log.message.clone().unwrap_or_default(),
        r#type: format!("{:?}", log.log_type),
        source: log.source.clone(),
        operation: log.operation.as_str().to_string(),
        resource: log.resource.clone(),
        data: log.data.clone(),
        action: log.action.map(|a| format!("{a:?}")).unwrap_or_default(),
        result: log.result.clone(),
    }
}
