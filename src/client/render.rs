//! Folding decoded frames into display state

use crate::protocol::WireFrame;
use serde_json::Value;
use thiserror::Error;

pub const BLOCK_START: &str = "---START---";
pub const BLOCK_END: &str = "---END---";
/// Output shown in a tool block until its result arrives
pub const PENDING_OUTPUT: &str = "Processing...";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The server ended the run with an error frame
    #[error("{0}")]
    Run(String),
}

/// What the caller should do after a frame was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderStep {
    Continue,
    /// The reply is complete; carries the final text
    Finished(String),
}

/// Tool announced by `tool_start` and not yet resolved
#[derive(Debug, Clone, PartialEq)]
pub struct OpenTool {
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientRenderState {
    /// Reply text accumulated so far, tool blocks included
    pub text: String,
    pub current_tool: Option<OpenTool>,
    pub loading: bool,
}

impl ClientRenderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new submission
    pub fn reset(&mut self) {
        self.text.clear();
        self.current_tool = None;
        self.loading = true;
    }

    /// Replace the display with an error block and stop loading
    pub fn fail(&mut self, message: &str) {
        self.text = tool_block(
            "error",
            &Value::from("Failed to process message"),
            &Value::from(message),
        );
        self.current_tool = None;
        self.loading = false;
    }

    pub fn apply(&mut self, frame: WireFrame) -> Result<RenderStep, RenderError> {
        match frame {
            WireFrame::Connected => {}
            WireFrame::Token { token } => self.text.push_str(&token),
            WireFrame::ToolStart { tool, input } => {
                self.text
                    .push_str(&tool_block(&tool, &input, &Value::from(PENDING_OUTPUT)));
                self.current_tool = Some(OpenTool { name: tool, input });
            }
            WireFrame::ToolEnd { tool, output } => self.close_tool(&tool, &output),
            WireFrame::Error { error } => return Err(RenderError::Run(error)),
            WireFrame::Done => {
                self.current_tool = None;
                return Ok(RenderStep::Finished(std::mem::take(&mut self.text)));
            }
        }
        Ok(RenderStep::Continue)
    }

    fn close_tool(&mut self, tool: &str, output: &Value) {
        let Some(open) = self.current_tool.take() else {
            tracing::warn!(tool, "Dropping tool_end without an open tool");
            return;
        };
        match self.text.rfind(BLOCK_START) {
            Some(start) => {
                self.text.truncate(start);
                self.text.push_str(&tool_block(tool, &open.input, output));
            }
            None => tracing::warn!(tool, "Open tool has no block in the reply text"),
        }
    }
}

/// Text shown for a tool input or output: strings verbatim, anything else
/// as pretty JSON
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

pub fn tool_block(tool: &str, input: &Value, output: &Value) -> String {
    format!(
        "{BLOCK_START}\n[{tool}]\n$ Input\n{}\n$ Output\n{}\n{BLOCK_END}",
        display_value(input),
        display_value(output),
    )
}
