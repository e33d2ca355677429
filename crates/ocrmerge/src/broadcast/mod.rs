//! Broadcasting for real-time order progress streaming.

pub mod order_progress;

pub use order_progress::{
    OrderProgressBroadcaster, OrderProgressEvent, OrderProgressTracker, ProgressPhase,
};
