use chrono::{DateTime, Utc};

use crate::{domain::LocalClock, telegram::Message};

pub const GREETING: &str =
    "👋 Hello! I'm your Telegram bot. Send me a message and I'll echo it back!";
pub const HELP: &str = "Available commands:\n/start - Start the bot\n/help - Show this help message\n/time - Get current time";

/// Maps an inbound message to the single reply the bot sends back.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandResponder {
    clock: LocalClock,
}

impl CommandResponder {
    pub fn new(clock: LocalClock) -> Self {
        Self { clock }
    }

    pub fn reply_to(&self, message: &Message, now: DateTime<Utc>) -> String {
        self.compute_reply(message.text.as_deref().unwrap_or(""), now)
    }

    /// Exact, case-sensitive match against the command table; anything else
    /// is echoed back verbatim.
    pub fn compute_reply(&self, text: &str, now: DateTime<Utc>) -> String {
        match text {
            "/start" => GREETING.to_string(),
            "/help" => HELP.to_string(),
            "/time" => format!("⏰ Current time: {}", self.clock.timestamp(now)),
            _ => format!("You said: {text}"),
        }
    }
}
