use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{
    tasks::registry::{ChatRegistry, Observation},
    telegram::{TelegramClient, TelegramError},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub updates_seen: usize,
    pub new_chats: usize,
}

/// Reads pending updates without an offset and without waiting, so nothing
/// is acknowledged, and records every chat found in them.
pub async fn discover_chats(
    client: &TelegramClient,
    registry: &ChatRegistry,
    seen_at: DateTime<Utc>,
    client_timeout: Duration,
) -> Result<DiscoveryReport, TelegramError> {
    let updates = client
        .get_updates(None, Duration::ZERO, client_timeout)
        .await?;

    let mut report = DiscoveryReport {
        updates_seen: updates.len(),
        new_chats: 0,
    };
    for raw in updates {
        let update_id = raw.update_id();
        let update = match raw.decode() {
            Ok(update) => update,
            Err(source) => {
                let err = TelegramError::Decode {
                    method: "getUpdates",
                    source,
                };
                tracing::warn!(target: "registry", error = %err, update_id, "skipping malformed update");
                continue;
            }
        };
        if let Some(message) = &update.message {
            if registry.observe(message, seen_at) == Observation::New {
                report.new_chats += 1;
            }
        }
    }

    tracing::info!(
        target: "registry",
        updates = report.updates_seen,
        new_chats = report.new_chats,
        total = registry.len(),
        "chat discovery finished"
    );
    Ok(report)
}
