//! Process-Tree Tracker.

mod node;
mod tracker;

pub use node::PidNode;
pub use tracker::{ProcessTreeTracker, DEFAULT_GRACE_WINDOW_SECS};
