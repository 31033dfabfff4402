//! Routing between graph nodes
//!
//! Pure function of the state: the engine calls it after every node and
//! never inspects messages itself.

use super::state::GraphState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Ask the model
    Agent,
    /// Run the tool calls of the latest assistant message
    Tools,
    /// Final answer ready
    End,
    /// The run wanted to continue but has executed `max` nodes already
    StepLimitExceeded { max: u32 },
}

pub fn route(state: &GraphState, max_steps: Option<u32>) -> Route {
    let next = match state.last() {
        Some(msg) if msg.has_tool_calls() => Route::Tools,
        Some(msg) if msg.is_tool_result() => Route::Agent,
        _ => return Route::End,
    };

    match max_steps {
        Some(max) if state.steps() >= max => Route::StepLimitExceeded { max },
        _ => next,
    }
}
