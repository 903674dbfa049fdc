use std::time::Duration;

use thiserror::Error;

use crate::{
    infrastructure::shutdown::ShutdownListener,
    telegram::{ChatTarget, ParseMode, TelegramClient},
};

pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Splits raw input into recipients: one per line, trimmed, blank lines
/// dropped. Duplicates are kept and nothing is validated.
pub fn parse_recipients(raw: &str) -> Vec<ChatTarget> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ChatTarget::parse)
        .collect()
}

#[derive(Debug, Clone)]
pub struct BroadcastRequest {
    pub recipients: Vec<ChatTarget>,
    pub text: String,
    pub parse_mode: Option<ParseMode>,
    /// Send to the first recipient only.
    pub test_mode: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("message text is empty")]
    EmptyMessage,
    #[error("no recipients given")]
    NoRecipients,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent { message_id: i64 },
    Failed { description: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub recipient: ChatTarget,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct BroadcastProgress<'a> {
    /// 1-based position of the send just attempted.
    pub index: usize,
    pub total: usize,
    pub delivery: &'a Delivery,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub deliveries: Vec<Delivery>,
    /// Shutdown stopped the run before every recipient was tried.
    pub interrupted: bool,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.deliveries.len()
    }

    pub fn succeeded(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| matches!(d.status, DeliveryStatus::Sent { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ChatTarget, &str)> {
        self.deliveries.iter().filter_map(|d| match &d.status {
            DeliveryStatus::Failed { description } => Some((&d.recipient, description.as_str())),
            DeliveryStatus::Sent { .. } => None,
        })
    }
}

/// Sends one message body to many chats, one at a time.
pub struct Broadcaster {
    client: TelegramClient,
    send_delay: Duration,
    shutdown: Option<ShutdownListener>,
}

impl Broadcaster {
    pub fn new(client: TelegramClient, send_delay: Duration) -> Self {
        Self {
            client,
            send_delay,
            shutdown: None,
        }
    }

    /// Stop between sends once shutdown fires, keeping what was delivered.
    pub fn with_shutdown(mut self, listener: ShutdownListener) -> Self {
        self.shutdown = Some(listener);
        self
    }

    /// Individual failures never abort the run; they are recorded in the
    /// report. Only invalid input is an error.
    pub async fn run<F>(
        &self,
        request: BroadcastRequest,
        mut on_progress: F,
    ) -> Result<BroadcastReport, BroadcastError>
    where
        F: FnMut(BroadcastProgress<'_>),
    {
        if request.text.trim().is_empty() {
            return Err(BroadcastError::EmptyMessage);
        }
        let mut recipients = request.recipients;
        if recipients.is_empty() {
            return Err(BroadcastError::NoRecipients);
        }
        if request.test_mode {
            recipients.truncate(1);
            tracing::info!(target: "broadcast", recipient = %recipients[0], "test mode: first recipient only");
        }

        let total = recipients.len();
        let mut report = BroadcastReport {
            deliveries: Vec::with_capacity(total),
            interrupted: false,
        };
        let mut shutdown = self.shutdown.clone();

        for (idx, recipient) in recipients.into_iter().enumerate() {
            let delay = if idx > 0 { self.send_delay } else { Duration::ZERO };
            if !pause(&mut shutdown, delay).await {
                tracing::warn!(
                    target: "broadcast",
                    remaining = total - idx,
                    "shutdown requested; broadcast stopped early"
                );
                report.interrupted = true;
                break;
            }

            let status = match self
                .client
                .send_message(&recipient, &request.text, request.parse_mode)
                .await
            {
                Ok(sent) => {
                    tracing::info!(target: "broadcast", recipient = %recipient, "sent");
                    DeliveryStatus::Sent {
                        message_id: sent.message_id,
                    }
                }
                Err(err) => {
                    tracing::warn!(target: "broadcast", recipient = %recipient, error = %err, "send failed");
                    DeliveryStatus::Failed {
                        description: err.description().unwrap_or(UNKNOWN_ERROR).to_string(),
                    }
                }
            };

            report.deliveries.push(Delivery { recipient, status });
            if let Some(delivery) = report.deliveries.last() {
                on_progress(BroadcastProgress {
                    index: idx + 1,
                    total,
                    delivery,
                });
            }
        }

        tracing::info!(
            target: "broadcast",
            attempted = report.attempted(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            interrupted = report.interrupted,
            "broadcast finished"
        );
        Ok(report)
    }
}

/// Returns `false` when shutdown fired before or during the pause.
async fn pause(shutdown: &mut Option<ShutdownListener>, delay: Duration) -> bool {
    match shutdown {
        Some(listener) => listener.sleep(delay).await,
        None => {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            true
        }
    }
}
