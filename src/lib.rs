//! Streaming agent chat: an agent graph behind a server-push endpoint, and
//! the client that follows it

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod graph;
pub mod history;
pub mod llm;
pub mod message;
pub mod protocol;
pub mod store;
pub mod system_prompt;
pub mod tools;
