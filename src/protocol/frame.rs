//! Wire frame type

use crate::graph::ProtocolEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DATA_PREFIX: &str = "data: ";

/// One record of the push protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireFrame {
    Connected,
    Token { token: String },
    ToolStart { tool: String, input: Value },
    ToolEnd { tool: String, output: Value },
    Error { error: String },
    Done,
}

impl WireFrame {
    pub fn error(message: impl Into<String>) -> Self {
        WireFrame::Error {
            error: message.into(),
        }
    }

    /// `done` and `error` close a stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, WireFrame::Done | WireFrame::Error { .. })
    }

    /// Serialize to the exact bytes written on the wire
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{DATA_PREFIX}{json}\n\n"))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            WireFrame::Connected => "connected",
            WireFrame::Token { .. } => "token",
            WireFrame::ToolStart { .. } => "tool_start",
            WireFrame::ToolEnd { .. } => "tool_end",
            WireFrame::Error { .. } => "error",
            WireFrame::Done => "done",
        }
    }
}

impl From<ProtocolEvent> for WireFrame {
    fn from(event: ProtocolEvent) -> Self {
        match event {
            ProtocolEvent::Token(token) => WireFrame::Token { token },
            ProtocolEvent::TurnComplete => WireFrame::Done,
            ProtocolEvent::ToolStarted { tool, input } => WireFrame::ToolStart { tool, input },
            ProtocolEvent::ToolCompleted { tool, output } => WireFrame::ToolEnd { tool, output },
            ProtocolEvent::RunError(error) => WireFrame::Error { error },
        }
    }
}
