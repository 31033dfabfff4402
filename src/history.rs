//! Prompt-window preparation
//!
//! Bounds the history sent to the model and marks the anchor messages the
//! backend may serve from its prompt cache.

mod cache;
mod trim;

#[cfg(test)]
mod proptests;

pub use cache::annotate_cache_hints;
pub use trim::trim_messages;
