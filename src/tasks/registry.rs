use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{
    domain::{ChatRecord, ChatTypeFilter},
    telegram::Message,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    New,
    Refreshed,
}

/// Every chat seen so far, in first-seen order. Identity fields are captured
/// on first sight and never rewritten; only `last_seen` moves.
#[derive(Debug, Default)]
pub struct ChatRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    order: Vec<i64>,
    records: HashMap<i64, ChatRecord>,
}

impl ChatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, message: &Message, seen_at: DateTime<Utc>) -> Observation {
        let mut inner = self.inner.lock();
        let chat = &message.chat;
        if let Some(record) = inner.records.get_mut(&chat.id) {
            if seen_at > record.last_seen {
                record.last_seen = seen_at;
            }
            return Observation::Refreshed;
        }

        inner.order.push(chat.id);
        inner
            .records
            .insert(chat.id, ChatRecord::from_chat(chat, seen_at));
        tracing::debug!(
            target: "registry",
            chat_id = chat.id,
            kind = chat.kind.as_str(),
            "new chat discovered"
        );
        Observation::New
    }

    pub fn snapshot(&self, filter: ChatTypeFilter) -> Vec<ChatRecord> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id))
            .filter(|record| filter.matches(record.kind))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
