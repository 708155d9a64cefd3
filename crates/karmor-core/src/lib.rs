//! The Karmor core pipeline: Container Registry, Process-Tree Tracker,
//! Event Ingestor, Log Builder, Policy Matcher, and Log Feeder.

pub mod feeder;
pub mod ingest;
pub mod logbuilder;
pub mod matcher;
pub mod pipeline;
pub mod registry;
pub mod tree;

pub use feeder::{LocalSink, LogFeeder, LogSubscription, Message, MessageLevel, MessageSubscription};
pub use ingest::IngestStats;
pub use logbuilder::{EventOrigin, Log, LogBuilder, LogType};
pub use matcher::PolicyMatcher;
pub use pipeline::{IngestItem, Pipeline, PipelineConfig};
pub use registry::{Container, ContainerNames, ContainerRegistry, PodGroup};
pub use tree::{PidNode, ProcessTreeTracker};
