//! Projection module
//!
//! Consumer side of the fanout: each projection queue is drained by a
//! `QueueConsumer` feeding a `ProjectionSink`. Sinks are idempotent by
//! transfer id because delivery is at-least-once.

mod consumer;

pub use consumer::{
    Applied, ConsumeReport, InMemoryProjection, ProjectionError, ProjectionSink, QueueConsumer,
};
