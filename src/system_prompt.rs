//! System prompt construction
//!
//! The base instruction is built in or loaded from a file, then followed by
//! a catalog of the tools the agent can call.

use crate::llm::ToolDefinition;
use std::fmt::Write;
use std::path::Path;

/// Base system prompt establishing the agent's role
const BASE_PROMPT: &str = r"You are a helpful AI assistant. Answer clearly and concisely.

Use a tool whenever it gives a more reliable answer than reasoning alone, for example arithmetic or the current date. Explain tool results in plain language once you have them.";

/// Build the system prompt. `override_path` replaces the built-in base text.
pub fn build_system_prompt(
    override_path: Option<&Path>,
    tools: &[ToolDefinition],
) -> std::io::Result<String> {
    let mut prompt = match override_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            tracing::info!(path = %path.display(), "Loaded system prompt");
            text.trim_end().to_string()
        }
        None => BASE_PROMPT.to_string(),
    };

    if !tools.is_empty() {
        prompt.push_str("\n\nAvailable tools:\n");
        for tool in tools {
            let _ = writeln!(prompt, "- {}: {}", tool.name, tool.description);
        }
    }

    Ok(prompt)
}
