//! Conversion from transcript entries to rig::completion::Message.

use order_flow::{ChatMessage, MessageRole};
use rig::completion::Message;

/// Convert a transcript entry to a rig::completion::Message
pub fn to_rig_message(msg: &ChatMessage) -> Message {
    match msg.role {
        MessageRole::User => Message::user(msg.content.clone()),
        MessageRole::Assistant => Message::assistant(msg.content.clone()),
    }
}

/// Convert a slice of transcript entries, oldest first
pub fn to_rig_messages(messages: &[ChatMessage]) -> Vec<Message> {
    messages.iter().map(to_rig_message).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_conversion_keeps_order_and_length() {
        let history = vec![
            ChatMessage::user("hola, tienen yerba?"),
            ChatMessage::assistant("Sí, tenemos Playadito"),
            ChatMessage::user("dame dos"),
        ];

        let messages = to_rig_messages(&history);
        assert_eq!(messages.len(), 3);
        assert_eq!(
            format!("{:?}", messages[1]),
            format!("{:?}", Message::assistant("Sí, tenemos Playadito"))
        );
    }

    #[test]
    fn test_empty_history() {
        assert!(to_rig_messages(&[]).is_empty());
    }
}
