//! Command line surface.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

use crate::{domain::ChatTypeFilter, telegram::ParseMode};

/// Telegram bot monitor: auto-replies to commands, tracks chats and sends broadcasts.
#[derive(Debug, Parser)]
#[command(name = "tg-bot-monitor", version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Args {
    /// Without a subcommand the monitor runs.
    pub fn command(self) -> Command {
        self.command
            .unwrap_or(Command::Monitor(MonitorArgs { paused: false }))
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll for messages, auto-reply and show live activity.
    Monitor(MonitorArgs),
    /// Send one message to many chats.
    Broadcast(BroadcastArgs),
    /// List chats found in pending updates without acknowledging them.
    Discover {
        /// Only show chats of this type.
        #[arg(long = "type", value_name = "TYPE", default_value = "all")]
        chat_type: ChatTypeFilter,
    },
    /// Show the bot account behind the token.
    Whoami,
    /// Show metadata of one chat.
    Chat {
        /// Numeric chat id or @username.
        chat_id: String,
    },
}

#[derive(Debug, ClapArgs)]
pub struct MonitorArgs {
    /// Start with monitoring paused; resume from the console.
    #[arg(long)]
    pub paused: bool,
}

#[derive(Debug, ClapArgs)]
pub struct BroadcastArgs {
    /// Message text.
    #[arg(short = 'm', long, conflicts_with = "message_file", required_unless_present = "message_file")]
    pub message: Option<String>,

    /// Read the message text from a file.
    #[arg(long, value_name = "PATH")]
    pub message_file: Option<PathBuf>,

    /// File with one chat id per line, or `-` for stdin.
    #[arg(short = 'r', long, value_name = "PATH")]
    pub recipients: Option<PathBuf>,

    /// Additional recipient; may be repeated.
    #[arg(long = "to", value_name = "CHAT_ID", allow_hyphen_values = true)]
    pub to: Vec<String>,

    /// Formatting applied by Telegram.
    #[arg(long, value_enum, default_value_t = FormatArg::None)]
    pub format: FormatArg,

    /// Send to the first recipient only.
    #[arg(long)]
    pub test: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    None,
    Markdown,
    #[value(name = "markdownv2")]
    MarkdownV2,
    Html,
}

impl FormatArg {
    pub fn parse_mode(self) -> Option<ParseMode> {
        match self {
            FormatArg::None => None,
            FormatArg::Markdown => Some(ParseMode::Markdown),
            FormatArg::MarkdownV2 => Some(ParseMode::MarkdownV2),
            FormatArg::Html => Some(ParseMode::Html),
        }
    }
}
