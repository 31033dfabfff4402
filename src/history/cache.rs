//! Prompt cache anchors

use crate::message::{CacheControl, ContentPart, ConversationMessage, MessageContent, Role};

/// Mark the final message and the second-to-last user message (scanning
/// backward, the final message included) as cache-eligible.
///
/// Marked plain text becomes a single cached part; multi-part content gets
/// the directive on its last part. Every other message is left as is, so
/// applying this twice is the same as applying it once.
pub fn annotate_cache_hints(mut messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
    let Some(last) = messages.len().checked_sub(1) else {
        return messages;
    };

    let earlier_user = messages
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, m)| m.role == Role::User)
        .nth(1)
        .map(|(i, _)| i);

    mark_cached(&mut messages[last]);
    if let Some(i) = earlier_user {
        mark_cached(&mut messages[i]);
    }
    messages
}

fn mark_cached(message: &mut ConversationMessage) {
    let mut parts = match std::mem::replace(&mut message.content, MessageContent::Parts(Vec::new())) {
        MessageContent::Text(text) => vec![ContentPart::text(text)],
        MessageContent::Parts(parts) => parts,
    };
    match parts.last_mut() {
        Some(ContentPart::Text { cache_control, .. }) => {
            *cache_control = Some(CacheControl::Ephemeral);
        }
        None => parts.push(ContentPart::cached(String::new())),
    }
    message.content = MessageContent::Parts(parts);
}
