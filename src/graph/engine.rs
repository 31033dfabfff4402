//! Graph execution

use super::checkpoint::CheckpointStore;
use super::event::{ProtocolEvent, RunError};
use super::route::{route, Route};
use super::state::GraphState;
use crate::history::{annotate_cache_hints, trim_messages};
use crate::llm::{LlmError, LlmRequest, LlmService, LlmStreamEvent, SystemContent};
use crate::message::{ConversationMessage, ToolCallRequest};
use crate::tools::ToolBackend;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Substituted for a model reply with no text and no tool calls
pub const FALLBACK_REPLY: &str =
    "I'm sorry, I wasn't able to come up with a response. Could you try rephrasing your question?";

/// Final reply when the model backend is rate limited or out of quota
pub const RATE_LIMIT_REPLY: &str =
    "I'm sorry, I've hit my usage limit for the moment. Please try again in a little while.";

pub type EventStream = BoxStream<'static, Result<ProtocolEvent, RunError>>;

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub system_prompt: String,
    /// History window, in messages
    pub trim_max_messages: usize,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Executed-node budget per run; `None` is unbounded
    pub max_steps: Option<u32>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            trim_max_messages: 10,
            max_tokens: Some(3000),
            temperature: Some(0.5),
            max_steps: None,
        }
    }
}

/// The agent graph, with its collaborators injected once and shared by runs
#[derive(Clone)]
pub struct AgentGraph {
    llm: Arc<dyn LlmService>,
    tools: Arc<dyn ToolBackend>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: Arc<GraphConfig>,
}

type Sink = mpsc::Sender<Result<ProtocolEvent, RunError>>;

async fn emit(sink: &Sink, event: ProtocolEvent) {
    // A closed receiver only means nobody is listening; the run still
    // completes and checkpoints.
    let _ = sink.send(Ok(event)).await;
}

impl AgentGraph {
    pub fn new(
        llm: Arc<dyn LlmService>,
        tools: Arc<dyn ToolBackend>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: GraphConfig,
    ) -> Self {
        Self {
            llm,
            tools,
            checkpoints,
            config: Arc::new(config),
        }
    }

    /// Start a run in the background and return its event stream
    ///
    /// The run is supervised: a failure, a panic included, is always the
    /// final item, and the run's checkpoint is removed before the stream
    /// ends.
    pub fn stream(&self, run_id: impl Into<String>, messages: Vec<ConversationMessage>) -> EventStream {
        let (tx, rx) = mpsc::channel(64);
        let run_id = run_id.into();

        let graph = self.clone();
        let sink = tx.clone();
        let id = run_id.clone();
        let run = tokio::spawn(async move { graph.run(&id, GraphState::new(messages), &sink).await });

        let checkpoints = self.checkpoints.clone();
        tokio::spawn(async move {
            let failure = match run.await {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => {
                    tracing::warn!(run_id = %run_id, error = %e, "Agent run failed");
                    Some(e)
                }
                Err(e) => {
                    tracing::error!(run_id = %run_id, error = %e, "Agent run aborted");
                    Some(RunError::Aborted)
                }
            };
            checkpoints.remove(&run_id).await;
            if let Some(e) = failure {
                let _ = tx.send(Err(e)).await;
            }
        });

        ReceiverStream::new(rx).boxed()
    }

    /// Drive a run to completion, emitting events as they occur
    async fn run(&self, run_id: &str, mut state: GraphState, sink: &Sink) -> Result<GraphState, RunError> {
        let mut next = Route::Agent;
        let mut turn_ended = false;

        loop {
            match next {
                Route::Agent => turn_ended = self.agent_node(&mut state, sink).await?,
                Route::Tools => self.tool_node(&mut state, sink).await,
                Route::End => {
                    if turn_ended {
                        emit(sink, ProtocolEvent::TurnComplete).await;
                    }
                    tracing::info!(run_id = %run_id, steps = state.steps(), "Agent run finished");
                    return Ok(state);
                }
                Route::StepLimitExceeded { max } => {
                    return Err(RunError::StepLimitExceeded { max });
                }
            }

            state.record_step();
            self.checkpoints.save(run_id, &state).await;
            next = route(&state, self.config.max_steps);
            tracing::debug!(run_id = %run_id, steps = state.steps(), next = ?next, "Routed");
        }
    }

    fn build_request(&self, state: &GraphState) -> LlmRequest {
        let window = trim_messages(state.messages(), self.config.trim_max_messages);
        LlmRequest {
            system: vec![SystemContent::cached(self.config.system_prompt.clone())],
            messages: annotate_cache_hints(window),
            tools: self.tools.list_tools(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    /// Ask the model. Returns whether the backend signalled end of turn.
    async fn agent_node(&self, state: &mut GraphState, sink: &Sink) -> Result<bool, RunError> {
        let request = self.build_request(state);

        let mut events = match self.llm.stream(&request).await {
            Ok(events) => events,
            Err(e) => return model_failed(state, sink, e, String::new()).await,
        };

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut ended = false;
        while let Some(event) = events.next().await {
            match event {
                Ok(LlmStreamEvent::Token(fragment)) => {
                    text.push_str(&fragment);
                    emit(sink, ProtocolEvent::Token(fragment)).await;
                }
                Ok(LlmStreamEvent::ToolCall(call)) => tool_calls.push(call),
                Ok(LlmStreamEvent::End { .. }) => ended = true,
                Err(e) => return model_failed(state, sink, e, text).await,
            }
        }

        if text.trim().is_empty() && tool_calls.is_empty() {
            tracing::warn!("Model returned an empty reply, substituting fallback");
            text = FALLBACK_REPLY.to_string();
            emit(sink, ProtocolEvent::Token(text.clone())).await;
        }

        state.push(ConversationMessage::assistant(text).with_tool_calls(tool_calls));
        Ok(ended)
    }

    /// Run every tool call of the latest message, in order
    async fn tool_node(&self, state: &mut GraphState, sink: &Sink) {
        let calls: Vec<ToolCallRequest> = state
            .last()
            .map(|msg| msg.tool_calls.clone())
            .unwrap_or_default();

        for call in calls {
            let (input, output) = match normalize_arguments(&call.arguments) {
                Ok(args) => {
                    emit(sink, ProtocolEvent::ToolStarted {
                        tool: call.name.clone(),
                        input: args.clone(),
                    })
                    .await;
                    let output = match self.tools.invoke(&call.name, args.clone()).await {
                        Ok(output) => output,
                        Err(e) => {
                            tracing::warn!(tool = %call.name, error = %e, "Tool failed");
                            json!({ "error": e.to_string() })
                        }
                    };
                    (args, output)
                }
                Err(sentinel) => {
                    tracing::warn!(tool = %call.name, "Unparseable tool arguments, skipping call");
                    emit(sink, ProtocolEvent::ToolStarted {
                        tool: call.name.clone(),
                        input: sentinel.clone(),
                    })
                    .await;
                    (sentinel, json!({ "error": "invalid tool arguments" }))
                }
            };

            tracing::debug!(tool = %call.name, input = %input, "Tool call resolved");
            emit(sink, ProtocolEvent::ToolCompleted {
                tool: call.name.clone(),
                output: output.clone(),
            })
            .await;
            state.push(ConversationMessage::tool_result(call.id, call.name, value_to_text(&output)));
        }
    }
}

/// Rate limits become an in-band final reply; anything else fails the run.
/// `partial` is the text already streamed in this turn; the apology is set
/// apart from it and the assistant message holds both.
async fn model_failed(
    state: &mut GraphState,
    sink: &Sink,
    error: LlmError,
    partial: String,
) -> Result<bool, RunError> {
    if !error.kind.is_rate_limit() {
        return Err(RunError::Model(error));
    }
    tracing::warn!(error = %error.message, "Model rate limited, ending run with apology");
    let apology = if partial.is_empty() {
        RATE_LIMIT_REPLY.to_string()
    } else {
        format!("\n\n{RATE_LIMIT_REPLY}")
    };
    emit(sink, ProtocolEvent::Token(apology.clone())).await;
    state.push(ConversationMessage::assistant(partial + &apology));
    Ok(true)
}

/// Structured arguments pass through; serialized ones are parsed. An
/// unparseable string yields the sentinel payload as the error.
pub fn normalize_arguments(arguments: &Value) -> Result<Value, Value> {
    match arguments {
        Value::String(raw) if raw.trim().is_empty() => Ok(json!({})),
        Value::String(raw) => serde_json::from_str(raw)
            .map_err(|_| json!({ "error": "invalid tool arguments", "raw": raw })),
        other => Ok(other.clone()),
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
