use std::{fmt::Write as _, sync::Arc};

use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
    task::JoinHandle,
};

use crate::{
    domain::{ActivityEntry, ChatRecord, ChatTypeFilter, LocalClock, PollerSnapshot, ReplyOutcome},
    infrastructure::shutdown::{Shutdown, ShutdownListener},
    tasks::{poller::PollerHandle, registry::ChatRegistry, switch::MonitorSwitch},
};

const CONSOLE_HELP: &str = "commands: pause | resume | toggle | status | chats [all|private|group|supergroup|channel] | help | quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Pause,
    Resume,
    Toggle,
    Status,
    Chats(ChatTypeFilter),
    Help,
    Quit,
}

impl ConsoleCommand {
    /// `Ok(None)` for blank input.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut parts = line.split_whitespace();
        let Some(word) = parts.next() else {
            return Ok(None);
        };
        let command = match word {
            "pause" | "stop" => ConsoleCommand::Pause,
            "resume" | "start" => ConsoleCommand::Resume,
            "toggle" => ConsoleCommand::Toggle,
            "status" => ConsoleCommand::Status,
            "chats" => {
                let filter = match parts.next() {
                    Some(kind) => kind.parse::<ChatTypeFilter>().map_err(|e| e.to_string())?,
                    None => ChatTypeFilter::All,
                };
                ConsoleCommand::Chats(filter)
            }
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(format!("unknown command '{other}'")),
        };
        Ok(Some(command))
    }
}

pub fn render_activity(entry: &ActivityEntry, clock: &LocalClock) -> String {
    let mut out = format!("New message #{}:\n", entry.sequence);
    let _ = writeln!(out, "- From: {}", entry.from_name);
    let _ = writeln!(out, "- Chat: {} (ID: {})", entry.chat_name, entry.chat_id);
    let _ = writeln!(out, "- Type: {}", entry.chat_kind);
    let _ = writeln!(out, "- Text: {}", entry.text.as_deref().unwrap_or("N/A"));
    let _ = writeln!(out, "- Time: {}", clock.format(entry.received_at, "%H:%M:%S"));
    match &entry.reply {
        ReplyOutcome::Sent { message_id } => {
            let _ = write!(out, "- Reply: sent (message {message_id})");
        }
        ReplyOutcome::Failed { reason } => {
            let _ = write!(out, "- Reply: failed ({reason})");
        }
    }
    out
}

pub fn render_status(snapshot: &PollerSnapshot, known_chats: usize) -> String {
    format!(
        "{} | messages processed: {} | replies sent: {} failed: {} | polls ok: {} failed: {} | cursor: {} | chats: {}",
        if snapshot.paused { "paused" } else { "monitoring" },
        snapshot.messages_processed,
        snapshot.replies_sent,
        snapshot.replies_failed,
        snapshot.polls_completed,
        snapshot.polls_failed,
        snapshot
            .cursor
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string()),
        known_chats,
    )
}

pub fn render_chats(records: &[ChatRecord], filter: ChatTypeFilter, clock: &LocalClock) -> String {
    if records.is_empty() {
        return format!(
            "No chats discovered yet (filter: {filter}). Send the bot a message or add it to a group first."
        );
    }
    let mut out = format!("Total chats: {} (filter: {filter})", records.len());
    for record in records {
        let _ = write!(
            out,
            "\n💬 {} ({})\n   Chat ID: {}\n   Username: @{}\n   First Seen: {}\n   Last Seen: {}",
            record.display_name,
            record.kind,
            record.id,
            record.username.as_deref().unwrap_or("N/A"),
            clock.timestamp(record.first_seen),
            clock.timestamp(record.last_seen),
        );
    }
    out
}

/// Prints every activity entry the poller publishes.
pub fn spawn_activity_log(
    handle: &PollerHandle,
    clock: LocalClock,
    mut shutdown: ShutdownListener,
) -> JoinHandle<()> {
    let mut activity = handle.subscribe_activity();
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                res = activity.recv() => res,
                _ = shutdown.notified() => break,
            };
            match received {
                Ok(entry) => {
                    tracing::info!(
                        target: "activity",
                        sequence = entry.sequence,
                        chat_id = entry.chat_id,
                        from_id = entry.from_id,
                        update_id = entry.update_id,
                        replied = entry.reply.is_sent(),
                        "message handled"
                    );
                    println!("{}\n", render_activity(&entry, &clock));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "activity", skipped, "activity feed lagged; entries dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

pub struct Console {
    pub switch: MonitorSwitch,
    pub registry: Arc<ChatRegistry>,
    pub poller: PollerHandle,
    pub clock: LocalClock,
    pub shutdown: Shutdown,
}

impl Console {
    /// Reads commands from stdin until `quit`, end of input or shutdown.
    /// End of input leaves the monitor running.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut listener = self.shutdown.subscribe();
            let mut lines = BufReader::new(io::stdin()).lines();
            println!("{CONSOLE_HELP}");
            loop {
                let line = tokio::select! {
                    line = lines.next_line() => line,
                    _ = listener.notified() => break,
                };
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        tracing::debug!(target: "console", "stdin closed; console disabled");
                        break;
                    }
                    Err(err) => {
                        tracing::warn!(target: "console", error = %err, "failed to read stdin");
                        break;
                    }
                };
                match ConsoleCommand::parse(&line) {
                    Ok(Some(command)) => {
                        if !self.execute(command) {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => println!("{message}\n{CONSOLE_HELP}"),
                }
            }
        })
    }

    /// Returns `false` once the console should stop reading.
    fn execute(&self, command: ConsoleCommand) -> bool {
        match command {
            ConsoleCommand::Pause => {
                self.switch.set(false);
                println!("Monitoring paused. A poll already in flight will still complete.");
            }
            ConsoleCommand::Resume => {
                self.switch.set(true);
                println!("Monitoring resumed.");
            }
            ConsoleCommand::Toggle => {
                let enabled = self.switch.toggle();
                println!("Monitoring {}.", if enabled { "resumed" } else { "paused" });
            }
            ConsoleCommand::Status => {
                println!("{}", render_status(&self.poller.snapshot(), self.registry.len()));
            }
            ConsoleCommand::Chats(filter) => {
                let records = self.registry.snapshot(filter);
                println!("{}", render_chats(&records, filter, &self.clock));
            }
            ConsoleCommand::Help => println!("{CONSOLE_HELP}"),
            ConsoleCommand::Quit => {
                tracing::info!(target: "console", "quit requested");
                self.shutdown.trigger();
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::telegram::ChatKind;

    #[test]
    fn parses_console_commands() {
        assert_eq!(ConsoleCommand::parse("   "), Ok(None));
        assert_eq!(ConsoleCommand::parse("pause"), Ok(Some(ConsoleCommand::Pause)));
        assert_eq!(
            ConsoleCommand::parse("chats group"),
            Ok(Some(ConsoleCommand::Chats(ChatTypeFilter::Only(ChatKind::Group))))
        );
        assert_eq!(
            ConsoleCommand::parse("chats"),
            Ok(Some(ConsoleCommand::Chats(ChatTypeFilter::All)))
        );
        assert!(ConsoleCommand::parse("chats forum").is_err());
        assert!(ConsoleCommand::parse("dance").is_err());
    }

    #[test]
    fn renders_activity_like_the_feed() {
        let clock = LocalClock::new(Some(chrono_tz::UTC));
        let entry = ActivityEntry {
            sequence: 3,
            update_id: 77,
            chat_id: -100,
            chat_name: "Ops".into(),
            chat_kind: ChatKind::Supergroup,
            from_id: Some(9),
            from_name: "Ann".into(),
            text: None,
            received_at: Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap(),
            reply_text: "You said: ".into(),
            reply: ReplyOutcome::Failed {
                reason: "blocked".into(),
            },
        };
        assert_eq!(
            render_activity(&entry, &clock),
            "New message #3:\n- From: Ann\n- Chat: Ops (ID: -100)\n- Type: supergroup\n- Text: N/A\n- Time: 07:08:09\n- Reply: failed (blocked)"
        );
    }

    #[test]
    fn renders_status_and_empty_chat_list() {
        let snapshot = PollerSnapshot {
            cursor: Some(6),
            messages_processed: 1,
            replies_sent: 1,
            polls_completed: 2,
            ..PollerSnapshot::default()
        };
        let status = render_status(&snapshot, 1);
        assert!(status.starts_with("monitoring | messages processed: 1"));
        assert!(status.contains("cursor: 6"));

        let clock = LocalClock::default();
        assert!(render_chats(&[], ChatTypeFilter::All, &clock).starts_with("No chats discovered yet"));
    }
}
