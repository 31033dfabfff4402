//! Server-to-client push protocol
//!
//! Each frame is one `data: <json>` line followed by a blank line. The JSON
//! payload carries a `type` discriminant; a stream is one `connected` frame,
//! any number of `token` / `tool_start` / `tool_end` frames, and exactly one
//! terminal `done` or `error` frame.

mod decoder;
mod encoder;
mod frame;

#[cfg(test)]
mod proptests;

pub use decoder::{FrameDecoder, LineBuffer, ProtocolParseError};
pub use encoder::{EncodeSummary, StreamEncoder, Terminal};
pub use frame::{WireFrame, DATA_PREFIX};
