use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};

use crate::{
    config::{DeliveryMode, PollingConfig},
    domain::{ActivityEntry, LocalClock, PollerSnapshot, ReplyOutcome},
    infrastructure::shutdown::ShutdownListener,
    tasks::{registry::ChatRegistry, responder::CommandResponder, switch::MonitorSwitch},
    telegram::{ChatTarget, Message, RawUpdate, TelegramClient, TelegramError, Update},
};

const ACTIVITY_CAPACITY: usize = 256;

/// Result of handling one fetched batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub fetched: usize,
    pub acknowledged: usize,
}

impl BatchSummary {
    /// Some updates were left unacknowledged and will be fetched again.
    pub fn stalled(&self) -> bool {
        self.acknowledged < self.fetched
    }
}

/// Consumer side of a running poller: snapshots and the activity feed.
#[derive(Clone)]
pub struct PollerHandle {
    snapshot: watch::Receiver<PollerSnapshot>,
    activity: broadcast::Sender<ActivityEntry>,
}

impl PollerHandle {
    pub fn snapshot(&self) -> PollerSnapshot {
        *self.snapshot.borrow()
    }

    pub fn subscribe_activity(&self) -> broadcast::Receiver<ActivityEntry> {
        self.activity.subscribe()
    }
}

/// Long-polls `getUpdates`, replies through the [`CommandResponder`] and
/// records chats. It is the sole owner of the cursor.
pub struct UpdatePoller {
    client: TelegramClient,
    responder: CommandResponder,
    registry: Arc<ChatRegistry>,
    clock: LocalClock,
    config: PollingConfig,
    switch: MonitorSwitch,
    activity: broadcast::Sender<ActivityEntry>,
    snapshot_tx: watch::Sender<PollerSnapshot>,
    state: PollerSnapshot,
}

impl UpdatePoller {
    pub fn new(
        client: TelegramClient,
        responder: CommandResponder,
        registry: Arc<ChatRegistry>,
        clock: LocalClock,
        config: PollingConfig,
        switch: MonitorSwitch,
    ) -> Self {
        let state = PollerSnapshot {
            paused: !switch.is_enabled(),
            ..PollerSnapshot::default()
        };
        let (activity, _) = broadcast::channel(ACTIVITY_CAPACITY);
        let (snapshot_tx, _) = watch::channel(state);
        Self {
            client,
            responder,
            registry,
            clock,
            config,
            switch,
            activity,
            snapshot_tx,
            state,
        }
    }

    pub fn handle(&self) -> PollerHandle {
        PollerHandle {
            snapshot: self.snapshot_tx.subscribe(),
            activity: self.activity.clone(),
        }
    }

    pub fn cursor(&self) -> Option<i64> {
        self.state.cursor
    }

    pub fn spawn(self, shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(self.run_loop(shutdown))
    }

    async fn run_loop(mut self, mut shutdown: ShutdownListener) {
        let mut switch = self.switch.subscribe();
        tracing::info!(
            target: "poller",
            delivery = %self.config.delivery,
            wait_secs = self.config.long_poll_timeout.as_secs(),
            "update poller started"
        );

        loop {
            if shutdown.is_triggered() {
                break;
            }

            if !*switch.borrow_and_update() {
                self.set_paused(true);
                tracing::info!(target: "poller", "monitoring paused");
                let closed = tokio::select! {
                    changed = switch.changed() => changed.is_err(),
                    _ = shutdown.notified() => true,
                };
                if closed {
                    break;
                }
                continue;
            }
            if self.state.paused {
                self.set_paused(false);
                tracing::info!(target: "poller", "monitoring resumed");
            }

            // Dropping an in-flight fetch is safe: the cursor only moves once
            // a response has been received.
            let fetched = tokio::select! {
                res = self.fetch() => res,
                _ = shutdown.notified() => break,
            };

            let outcome = match fetched {
                Ok(updates) => Ok(self.process(updates).await),
                Err(err) => {
                    tracing::warn!(
                        target: "poller",
                        error = %err,
                        timeout = err.is_timeout(),
                        cursor = ?self.state.cursor,
                        "getUpdates failed; retrying after backoff"
                    );
                    Err(err)
                }
            };

            if !shutdown.sleep(delay_after(&self.config, &outcome)).await {
                break;
            }
        }

        self.publish();
        tracing::info!(
            target: "poller",
            cursor = ?self.cursor(),
            processed = self.state.messages_processed,
            "update poller stopped"
        );
    }

    /// One full iteration without the surrounding sleeps.
    #[cfg(test)]
    pub async fn poll_once(&mut self) -> Result<BatchSummary, TelegramError> {
        let updates = self.fetch().await?;
        Ok(self.process(updates).await)
    }

    async fn fetch(&mut self) -> Result<Vec<RawUpdate>, TelegramError> {
        let result = self
            .client
            .get_updates(
                self.state.cursor,
                self.config.long_poll_timeout,
                self.config.client_timeout,
            )
            .await;
        match &result {
            Ok(updates) => {
                self.state.polls_completed += 1;
                if !updates.is_empty() {
                    tracing::debug!(target: "poller", count = updates.len(), "updates fetched");
                }
            }
            Err(_) => self.state.polls_failed += 1,
        }
        self.publish();
        result
    }

    async fn process(&mut self, updates: Vec<RawUpdate>) -> BatchSummary {
        let mut summary = BatchSummary {
            fetched: updates.len(),
            acknowledged: 0,
        };

        for raw in updates {
            let Some(update) = self.decode(raw) else {
                summary.acknowledged += 1;
                continue;
            };
            let update_id = update.update_id;
            match self.config.delivery {
                DeliveryMode::AtMostOnce => {
                    self.advance_cursor(update_id);
                    if let Some(message) = &update.message {
                        // Already acknowledged; a failed reply is not retried.
                        let _ = self.handle_message(update_id, message).await;
                    }
                }
                DeliveryMode::AtLeastOnce => {
                    if let Some(message) = &update.message {
                        if let Err(err) = self.handle_message(update_id, message).await {
                            if err.is_retryable() {
                                tracing::warn!(
                                    target: "poller",
                                    update_id,
                                    "reply failed; update left unacknowledged for redelivery"
                                );
                                break;
                            }
                            // A rejected reply fails the same way on every retry.
                            tracing::warn!(
                                target: "poller",
                                update_id,
                                "reply rejected; acknowledging update without retry"
                            );
                        }
                    }
                    self.advance_cursor(update_id);
                }
            }
            summary.acknowledged += 1;
        }

        self.publish();
        summary
    }

    /// A malformed update is acknowledged through its `update_id` and
    /// skipped. Without a readable id it is left for a later update in the
    /// batch to acknowledge.
    fn decode(&mut self, raw: RawUpdate) -> Option<Update> {
        let update_id = raw.update_id();
        match raw.decode() {
            Ok(update) => Some(update),
            Err(source) => {
                let err = TelegramError::Decode {
                    method: "getUpdates",
                    source,
                };
                tracing::warn!(
                    target: "poller",
                    error = %err,
                    update_id,
                    "skipping malformed update"
                );
                if let Some(update_id) = update_id {
                    self.advance_cursor(update_id);
                }
                None
            }
        }
    }

    async fn handle_message(
        &mut self,
        update_id: i64,
        message: &Message,
    ) -> Result<(), TelegramError> {
        let received_at = self.clock.now();
        self.registry.observe(message, received_at);
        self.state.messages_processed += 1;

        let reply = self.responder.reply_to(message, received_at);
        let target = ChatTarget::Id(message.chat.id);
        let result = self.client.send_message(&target, &reply, None).await;

        let outcome = match &result {
            Ok(sent) => {
                self.state.replies_sent += 1;
                ReplyOutcome::Sent {
                    message_id: sent.message_id,
                }
            }
            Err(err) => {
                self.state.replies_failed += 1;
                tracing::warn!(
                    target: "poller",
                    error = %err,
                    chat_id = message.chat.id,
                    update_id,
                    "failed to send reply"
                );
                ReplyOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        };

        let entry = ActivityEntry::new(
            self.state.messages_processed,
            update_id,
            message,
            received_at,
            reply,
            outcome,
        );
        // No subscribers is fine; the feed is best effort.
        let _ = self.activity.send(entry);

        result.map(|_| ())
    }

    /// Moves the cursor past `update_id`. The cursor never moves backwards,
    /// so an out-of-order id can not cause redelivery of acknowledged updates.
    fn advance_cursor(&mut self, update_id: i64) {
        let next = update_id.saturating_add(1);
        match self.state.cursor {
            Some(current) if next < current => {
                tracing::warn!(
                    target: "poller",
                    update_id,
                    cursor = current,
                    "update id behind cursor; keeping cursor"
                );
            }
            _ => self.state.cursor = Some(next),
        }
    }

    fn set_paused(&mut self, paused: bool) {
        self.state.paused = paused;
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.state);
    }
}

/// Pause before the next fetch: the error backoff after a failed poll or a
/// batch that stopped early, the idle delay otherwise.
fn delay_after(config: &PollingConfig, outcome: &Result<BatchSummary, TelegramError>) -> Duration {
    match outcome {
        Ok(summary) if !summary.stalled() => config.idle_delay,
        _ => config.error_backoff,
    }
}

#[cfg(test)]
mod tests {
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use regex::Regex;
    use reqwest::Client;
    use serde_json::json;
    use url::Url;

    use super::*;
    use crate::infrastructure::shutdown::Shutdown;

    fn poller_for(server: &MockServer, delivery: DeliveryMode, enabled: bool) -> UpdatePoller {
        let base = Url::parse(&server.base_url()).unwrap();
        let client = TelegramClient::new(Client::new(), &base, "t", Duration::from_secs(5));
        let clock = LocalClock::new(Some(chrono_tz::UTC));
        let config = PollingConfig {
            long_poll_timeout: Duration::from_secs(0),
            client_timeout: Duration::from_secs(5),
            idle_delay: Duration::from_millis(20),
            error_backoff: Duration::from_millis(20),
            delivery,
        };
        UpdatePoller::new(
            client,
            CommandResponder::new(clock),
            Arc::new(ChatRegistry::new()),
            clock,
            config,
            MonitorSwitch::new(enabled),
        )
    }

    fn text_update(update_id: i64, chat_id: i64, text: &str) -> serde_json::Value {
        json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id * 10,
                "date": 1_700_000_000,
                "chat": {"id": chat_id, "type": "private", "first_name": "A"},
                "from": {"id": chat_id, "is_bot": false, "first_name": "A"},
                "text": text
            }
        })
    }

    #[tokio::test]
    async fn time_command_replies_and_advances_cursor() {
        let server = MockServer::start();
        let mut first = server.mock(|when, then| {
            when.method(GET).path("/bott/getUpdates");
            then.status(200)
                .json_body(json!({"ok": true, "result": [text_update(5, 1, "/time")]}));
        });
        let reply = server.mock(|when, then| {
            when.method(POST)
                .path("/bott/sendMessage")
                .body_includes("\"chat_id\":1")
                .body_includes("Current time: ");
            then.status(200)
                .json_body(json!({"ok": true, "result": {"message_id": 99}}));
        });

        let mut poller = poller_for(&server, DeliveryMode::AtMostOnce, true);
        let mut activity = poller.handle().subscribe_activity();
        let summary = poller.poll_once().await.unwrap();

        assert_eq!(summary, BatchSummary { fetched: 1, acknowledged: 1 });
        assert_eq!(poller.cursor(), Some(6));
        first.assert_calls(1);
        reply.assert_calls(1);

        let entry = activity.try_recv().unwrap();
        assert_eq!(entry.sequence, 1);
        assert_eq!(entry.update_id, 5);
        assert_eq!(entry.reply, ReplyOutcome::Sent { message_id: 99 });
        assert!(Regex::new(r"^⏰ Current time: \d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$")
            .unwrap()
            .is_match(&entry.reply_text));

        first.delete();
        let next = server.mock(|when, then| {
            when.method(GET)
                .path("/bott/getUpdates")
                .query_param("offset", "6");
            then.status(200).json_body(json!({"ok": true, "result": []}));
        });
        let summary = poller.poll_once().await.unwrap();
        next.assert_calls(1);
        assert_eq!(summary.fetched, 0);
        assert_eq!(poller.cursor(), Some(6));
        assert_eq!(poller.handle().snapshot().polls_completed, 2);
    }

    #[tokio::test]
    async fn cursor_ends_one_past_last_update() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/bott/getUpdates");
            then.status(200).json_body(json!({"ok": true, "result": [
                text_update(10, 1, "a"),
                {"update_id": 11},
                text_update(14, 2, "b")
            ]}));
        });
        let sends = server.mock(|when, then| {
            when.method(POST).path("/bott/sendMessage");
            then.status(200)
                .json_body(json!({"ok": true, "result": {"message_id": 1}}));
        });

        let mut poller = poller_for(&server, DeliveryMode::AtMostOnce, true);
        poller.poll_once().await.unwrap();

        assert_eq!(poller.cursor(), Some(15));
        sends.assert_calls(2);
        let snapshot = poller.handle().snapshot();
        assert_eq!(snapshot.messages_processed, 2);
        assert_eq!(snapshot.replies_sent, 2);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_cursor() {
        let server = MockServer::start();
        let mut ok = server.mock(|when, then| {
            when.method(GET).path("/bott/getUpdates");
            then.status(200)
                .json_body(json!({"ok": true, "result": [{"update_id": 40}]}));
        });
        let mut poller = poller_for(&server, DeliveryMode::AtMostOnce, true);
        poller.poll_once().await.unwrap();
        assert_eq!(poller.cursor(), Some(41));

        ok.delete();
        server.mock(|when, then| {
            when.method(GET).path("/bott/getUpdates");
            then.status(502).body("bad gateway");
        });
        let err = poller.poll_once().await.unwrap_err();
        assert!(matches!(err, TelegramError::Rejected { status: 502, .. }));
        assert_eq!(poller.cursor(), Some(41));
        assert_eq!(poller.handle().snapshot().polls_failed, 1);
    }

    #[tokio::test]
    async fn at_most_once_acknowledges_failed_replies() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/bott/getUpdates");
            then.status(200)
                .json_body(json!({"ok": true, "result": [text_update(3, 2, "hi")]}));
        });
        server.mock(|when, then| {
            when.method(POST).path("/bott/sendMessage");
            then.status(403)
                .json_body(json!({"ok": false, "description": "Forbidden: bot was blocked by the user"}));
        });

        let mut poller = poller_for(&server, DeliveryMode::AtMostOnce, true);
        let mut activity = poller.handle().subscribe_activity();
        let summary = poller.poll_once().await.unwrap();

        assert!(!summary.stalled());
        assert_eq!(poller.cursor(), Some(4));
        assert_eq!(poller.handle().snapshot().replies_failed, 1);
        let entry = activity.try_recv().unwrap();
        assert!(!entry.reply.is_sent());
    }

    #[tokio::test]
    async fn at_least_once_stops_before_retryable_reply_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/bott/getUpdates");
            then.status(200).json_body(json!({"ok": true, "result": [
                text_update(7, 1, "first"),
                text_update(8, 2, "second"),
                text_update(9, 1, "third")
            ]}));
        });
        let ok = server.mock(|when, then| {
            when.method(POST)
                .path("/bott/sendMessage")
                .body_includes("\"chat_id\":1,");
            then.status(200)
                .json_body(json!({"ok": true, "result": {"message_id": 1}}));
        });
        let failing = server.mock(|when, then| {
            when.method(POST)
                .path("/bott/sendMessage")
                .body_includes("\"chat_id\":2,");
            then.status(500)
                .json_body(json!({"ok": false, "description": "Internal Server Error"}));
        });

        let mut poller = poller_for(&server, DeliveryMode::AtLeastOnce, true);
        let summary = poller.poll_once().await.unwrap();

        assert_eq!(summary, BatchSummary { fetched: 3, acknowledged: 1 });
        assert!(summary.stalled());
        assert_eq!(poller.cursor(), Some(8));
        ok.assert_calls(1);
        failing.assert_calls(1);
    }

    #[tokio::test]
    async fn at_least_once_acknowledges_permanent_rejection() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/bott/getUpdates");
            then.status(200).json_body(json!({"ok": true, "result": [
                text_update(7, 2, "blocked"),
                text_update(8, 1, "still answered")
            ]}));
        });
        let blocked = server.mock(|when, then| {
            when.method(POST)
                .path("/bott/sendMessage")
                .body_includes("\"chat_id\":2,");
            then.status(403)
                .json_body(json!({"ok": false, "description": "Forbidden: bot was blocked by the user"}));
        });
        let answered = server.mock(|when, then| {
            when.method(POST)
                .path("/bott/sendMessage")
                .body_includes("\"chat_id\":1,")
                .body_includes("You said: still answered");
            then.status(200)
                .json_body(json!({"ok": true, "result": {"message_id": 3}}));
        });

        let mut poller = poller_for(&server, DeliveryMode::AtLeastOnce, true);
        let summary = poller.poll_once().await.unwrap();

        assert_eq!(summary, BatchSummary { fetched: 2, acknowledged: 2 });
        assert!(!summary.stalled());
        assert_eq!(poller.cursor(), Some(9));
        blocked.assert_calls(1);
        answered.assert_calls(1);
        let snapshot = poller.handle().snapshot();
        assert_eq!(snapshot.replies_failed, 1);
        assert_eq!(snapshot.replies_sent, 1);
    }

    #[tokio::test]
    async fn malformed_update_is_skipped_in_both_modes() {
        for delivery in [DeliveryMode::AtMostOnce, DeliveryMode::AtLeastOnce] {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(GET).path("/bott/getUpdates");
                then.status(200).json_body(json!({"ok": true, "result": [
                    {"update_id": 20, "message": {
                        "chat": {"id": 1, "type": "private", "first_name": "A"},
                        "text": 42
                    }},
                    text_update(21, 1, "hello")
                ]}));
            });
            let reply = server.mock(|when, then| {
                when.method(POST)
                    .path("/bott/sendMessage")
                    .body_includes("You said: hello");
                then.status(200)
                    .json_body(json!({"ok": true, "result": {"message_id": 1}}));
            });

            let mut poller = poller_for(&server, delivery, true);
            let summary = poller.poll_once().await.unwrap();

            assert_eq!(summary, BatchSummary { fetched: 2, acknowledged: 2 });
            assert_eq!(poller.cursor(), Some(22), "{delivery}");
            reply.assert_calls(1);
            assert_eq!(poller.handle().snapshot().messages_processed, 1);
        }
    }

    #[tokio::test]
    async fn malformed_last_update_still_moves_cursor() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/bott/getUpdates");
            then.status(200).json_body(json!({"ok": true, "result": [
                {"update_id": 30, "message": "not a message"}
            ]}));
        });
        let sends = server.mock(|when, then| {
            when.method(POST).path("/bott/sendMessage");
            then.status(200)
                .json_body(json!({"ok": true, "result": {"message_id": 1}}));
        });

        let mut poller = poller_for(&server, DeliveryMode::AtLeastOnce, true);
        poller.poll_once().await.unwrap();

        assert_eq!(poller.cursor(), Some(31));
        sends.assert_calls(0);
    }

    #[tokio::test]
    async fn transport_failure_keeps_cursor() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/bott/getUpdates");
            then.status(200)
                .json_body(json!({"ok": true, "result": [{"update_id": 40}]}));
        });
        let mut poller = poller_for(&server, DeliveryMode::AtMostOnce, true);
        poller.poll_once().await.unwrap();
        assert_eq!(poller.cursor(), Some(41));

        let unreachable = Url::parse("http://127.0.0.1:9").unwrap();
        poller.client =
            TelegramClient::new(Client::new(), &unreachable, "t", Duration::from_secs(2));
        let err = poller.poll_once().await.unwrap_err();

        assert!(matches!(err, TelegramError::Transport { method: "getUpdates", .. }));
        assert!(err.is_retryable());
        assert_eq!(poller.cursor(), Some(41));
        assert_eq!(poller.handle().snapshot().polls_failed, 1);
    }

    #[tokio::test]
    async fn timed_out_fetch_keeps_cursor() {
        let server = MockServer::start();
        let mut ok = server.mock(|when, then| {
            when.method(GET).path("/bott/getUpdates");
            then.status(200)
                .json_body(json!({"ok": true, "result": [{"update_id": 50}]}));
        });
        let mut poller = poller_for(&server, DeliveryMode::AtMostOnce, true);
        poller.poll_once().await.unwrap();

        ok.delete();
        server.mock(|when, then| {
            when.method(GET).path("/bott/getUpdates");
            then.status(200)
                .delay(Duration::from_secs(3))
                .json_body(json!({"ok": true, "result": [{"update_id": 51}]}));
        });
        poller.config.client_timeout = Duration::from_millis(200);
        let err = poller.poll_once().await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(poller.cursor(), Some(51));
    }

    #[test]
    fn backoff_follows_failures_and_stalls() {
        let config = PollingConfig {
            idle_delay: Duration::from_millis(100),
            error_backoff: Duration::from_millis(900),
            ..PollingConfig::default()
        };
        let done = BatchSummary { fetched: 2, acknowledged: 2 };
        let stalled = BatchSummary { fetched: 2, acknowledged: 1 };
        let failed = TelegramError::Rejected {
            method: "getUpdates",
            status: 502,
            error_code: None,
            description: None,
        };

        assert_eq!(delay_after(&config, &Ok(done)), config.idle_delay);
        assert_eq!(delay_after(&config, &Ok(stalled)), config.error_backoff);
        assert_eq!(delay_after(&config, &Err(failed)), config.error_backoff);
    }

    #[tokio::test]
    async fn paused_poller_waits_for_switch() {
        let server = MockServer::start();
        let fetch = server.mock(|when, then| {
            when.method(GET).path("/bott/getUpdates");
            then.status(200).json_body(json!({"ok": true, "result": []}));
        });

        let poller = poller_for(&server, DeliveryMode::AtMostOnce, false);
        let switch = poller.switch.clone();
        let handle = poller.handle();
        let (shutdown, listener) = Shutdown::new();
        let task = poller.spawn(listener);

        tokio::time::sleep(Duration::from_millis(100)).await;
        fetch.assert_calls(0);
        assert!(handle.snapshot().paused);

        switch.set(true);
        tokio::time::timeout(Duration::from_secs(5), async {
            while handle.snapshot().polls_completed == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("poller resumed");
        assert!(!handle.snapshot().paused);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("poller stopped")
            .unwrap();
    }
}
