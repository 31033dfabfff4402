//! Client side of the chat stream
//!
//! `render` folds decoded frames into display state; `session` drives one
//! chat against a server and persists finished replies.

mod render;
mod session;

pub use render::{
    display_value, tool_block, ClientRenderState, OpenTool, RenderError, RenderStep, BLOCK_END,
    BLOCK_START, PENDING_OUTPUT,
};
pub use session::{ChatSession, ClientError, HttpMessageStore};
