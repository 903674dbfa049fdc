pub mod client;
pub mod error;
pub mod types;

pub use client::TelegramClient;
pub use error::TelegramError;
pub use types::{BotIdentity, Chat, ChatKind, ChatTarget, Message, ParseMode, RawUpdate, Update};
