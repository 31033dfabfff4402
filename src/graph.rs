//! Agent graph: alternate between the model and the tools until the model
//! produces a final answer
//!
//! A run owns its `GraphState` and advances one node at a time. Events are
//! delivered over a channel in the order they happen; a run failure is the
//! final item.

mod checkpoint;
mod engine;
mod event;
mod route;
mod state;

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore};
pub use engine::{
    normalize_arguments, AgentGraph, EventStream, GraphConfig, FALLBACK_REPLY, RATE_LIMIT_REPLY,
};
pub use event::{ProtocolEvent, RunError};
pub use route::{route, Route};
pub use state::GraphState;
