use chrono::{DateTime, Utc};

use crate::telegram::{ChatKind, Message};

/// One handled inbound message, as published to activity observers.
#[derive(Debug, Clone)]
pub struct ActivityEntry {
    /// 1-based count of messages handled by this poller.
    pub sequence: u64,
    pub update_id: i64,
    pub chat_id: i64,
    pub chat_name: String,
    pub chat_kind: ChatKind,
    pub from_id: Option<i64>,
    pub from_name: String,
    pub text: Option<String>,
    pub received_at: DateTime<Utc>,
    pub reply_text: String,
    pub reply: ReplyOutcome,
}

impl ActivityEntry {
    pub fn new(
        sequence: u64,
        update_id: i64,
        message: &Message,
        received_at: DateTime<Utc>,
        reply_text: String,
        reply: ReplyOutcome,
    ) -> Self {
        Self {
            sequence,
            update_id,
            chat_id: message.chat.id,
            chat_name: message.chat.display_name().to_string(),
            chat_kind: message.chat.kind,
            from_id: message.from.as_ref().map(|user| user.id),
            from_name: message
                .from
                .as_ref()
                .map(|user| user.first_name.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            text: message.text.clone(),
            received_at,
            reply_text,
            reply,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Sent { message_id: i64 },
    Failed { reason: String },
}

impl ReplyOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, ReplyOutcome::Sent { .. })
    }
}
