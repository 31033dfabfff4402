//! Property-based tests for prompt-window preparation

use super::*;
use crate::message::{ConversationMessage, Role};
use proptest::prelude::*;

fn arb_message() -> impl Strategy<Value = ConversationMessage> {
    (
        prop_oneof![Just(Role::User), Just(Role::Assistant), Just(Role::Tool)],
        "[a-z0-9 ]{0,12}",
    )
        .prop_map(|(role, text)| match role {
            Role::User => ConversationMessage::user(text),
            Role::Tool => ConversationMessage::tool_result("call", "calculator", text),
            _ => ConversationMessage::assistant(text),
        })
}

fn arb_history() -> impl Strategy<Value = Vec<ConversationMessage>> {
    (
        any::<bool>(),
        proptest::collection::vec(arb_message(), 0..30),
    )
        .prop_map(|(with_system, mut messages)| {
            if with_system {
                messages.insert(0, ConversationMessage::system("rules"));
            }
            messages
        })
}

proptest! {
    /// Trimmed windows fit the limit (the system message may exceed a zero
    /// limit) and start on a user message after the optional system message
    #[test]
    fn prop_trim_bounds_and_start(history in arb_history(), max in 0usize..15) {
        let trimmed = trim_messages(&history, max);
        let has_system = history.first().is_some_and(|m| m.role == Role::System);

        if history.len() <= max {
            prop_assert_eq!(&trimmed, &history);
        } else {
            prop_assert!(trimmed.len() <= max.max(usize::from(has_system)));

            let body = if has_system {
                prop_assert_eq!(trimmed[0].role, Role::System);
                &trimmed[1..]
            } else {
                &trimmed[..]
            };
            if let Some(first) = body.first() {
                prop_assert_eq!(first.role, Role::User);
            }
            // the window is a suffix of the history
            prop_assert!(history.ends_with(body));
        }
    }

    /// Exactly the last message plus, with two or more user messages, one
    /// earlier user message are marked
    #[test]
    fn prop_annotate_marks_anchors(history in proptest::collection::vec(arb_message(), 1..20)) {
        let users = history.iter().filter(|m| m.role == Role::User).count();
        let marked = annotate_cache_hints(history);

        let last = marked.len() - 1;
        prop_assert!(marked[last].content.is_cached());

        let earlier: Vec<_> = marked[..last]
            .iter()
            .filter(|m| m.content.is_cached())
            .collect();
        prop_assert_eq!(earlier.len(), usize::from(users >= 2));
        prop_assert!(earlier.iter().all(|m| m.role == Role::User));
    }

    #[test]
    fn prop_annotate_is_idempotent(history in proptest::collection::vec(arb_message(), 0..20)) {
        let once = annotate_cache_hints(history);
        prop_assert_eq!(annotate_cache_hints(once.clone()), once);
    }
}
