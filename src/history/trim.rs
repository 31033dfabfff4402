//! Message history trimming

use crate::message::{ConversationMessage, Role};

/// Keep the newest `max` messages of `history`, one message per unit.
///
/// A leading system message is always retained and takes one slot when
/// the limit allows it. The kept window never starts mid-turn: leading
/// assistant and tool messages are dropped until a user message begins it.
/// Histories within the limit come back unchanged.
pub fn trim_messages(history: &[ConversationMessage], max: usize) -> Vec<ConversationMessage> {
    if history.len() <= max {
        return history.to_vec();
    }

    let (system, rest) = match history.split_first() {
        Some((first, rest)) if first.role == Role::System => (Some(first), rest),
        _ => (None, history),
    };
    let budget = if system.is_some() {
        max.saturating_sub(1)
    } else {
        max
    };

    let newest = &rest[rest.len().saturating_sub(budget)..];
    let window = match newest.iter().position(|m| m.role == Role::User) {
        Some(start) => &newest[start..],
        None => &[],
    };

    system.into_iter().chain(window).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCallRequest;
    use serde_json::json;

    fn texts(messages: &[ConversationMessage]) -> Vec<String> {
        messages.iter().map(ConversationMessage::text).collect()
    }

    #[test]
    fn test_short_history_unchanged() {
        let history = vec![
            ConversationMessage::assistant("welcome"),
            ConversationMessage::user("hi"),
        ];
        assert_eq!(trim_messages(&history, 10), history);
        assert!(trim_messages(&[], 10).is_empty());
    }

    #[test]
    fn test_keeps_newest_and_starts_on_user() {
        let history = vec![
            ConversationMessage::user("u1"),
            ConversationMessage::assistant("a1"),
            ConversationMessage::user("u2"),
            ConversationMessage::assistant("a2"),
            ConversationMessage::user("u3"),
        ];
        // newest four start on a1, which is dropped
        assert_eq!(texts(&trim_messages(&history, 4)), ["u2", "a2", "u3"]);
        assert_eq!(texts(&trim_messages(&history, 3)), ["u2", "a2", "u3"]);
    }

    #[test]
    fn test_system_message_retained_and_counted() {
        let history = vec![
            ConversationMessage::system("rules"),
            ConversationMessage::user("u1"),
            ConversationMessage::assistant("a1"),
            ConversationMessage::user("u2"),
            ConversationMessage::assistant("a2"),
        ];
        assert_eq!(texts(&trim_messages(&history, 3)), ["rules", "u2", "a2"]);
        assert_eq!(texts(&trim_messages(&history, 0)), ["rules"]);
    }

    #[test]
    fn test_never_starts_on_tool_result() {
        let history = vec![
            ConversationMessage::user("2+2?"),
            ConversationMessage::assistant("").with_tool_calls(vec![ToolCallRequest::new(
                "c1",
                "calculator",
                json!({"a": 2, "b": 2}),
            )]),
            ConversationMessage::tool_result("c1", "calculator", "4"),
            ConversationMessage::assistant("4"),
        ];
        // no user message among the newest three
        assert!(trim_messages(&history, 3).is_empty());
        assert_eq!(trim_messages(&history, 4), history);
    }
}
