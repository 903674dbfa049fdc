use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::telegram::{Chat, ChatKind};

/// A chat the bot has received at least one message from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRecord {
    pub id: i64,
    pub kind: ChatKind,
    pub display_name: String,
    pub username: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl ChatRecord {
    pub fn from_chat(chat: &Chat, seen_at: DateTime<Utc>) -> Self {
        Self {
            id: chat.id,
            kind: chat.kind,
            display_name: chat.display_name().to_string(),
            username: chat.username.clone(),
            first_seen: seen_at,
            last_seen: seen_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatTypeFilter {
    #[default]
    All,
    Only(ChatKind),
}

impl ChatTypeFilter {
    pub fn matches(&self, kind: ChatKind) -> bool {
        match self {
            ChatTypeFilter::All => true,
            ChatTypeFilter::Only(expected) => *expected == kind,
        }
    }
}

impl fmt::Display for ChatTypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatTypeFilter::All => f.write_str("all"),
            ChatTypeFilter::Only(kind) => f.write_str(kind.as_str()),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown chat type '{0}' (expected all, private, group, supergroup or channel)")]
pub struct UnknownChatType(pub String);

impl FromStr for ChatTypeFilter {
    type Err = UnknownChatType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "all" | "All" => Ok(ChatTypeFilter::All),
            "private" => Ok(ChatTypeFilter::Only(ChatKind::Private)),
            "group" => Ok(ChatTypeFilter::Only(ChatKind::Group)),
            "supergroup" => Ok(ChatTypeFilter::Only(ChatKind::Supergroup)),
            "channel" => Ok(ChatTypeFilter::Only(ChatKind::Channel)),
            other => Err(UnknownChatType(other.to_string())),
        }
    }
}
