use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use reqwest::Client;
use tokio::{io::AsyncReadExt, task::JoinHandle, time::timeout};

use crate::{
    cli::{BroadcastArgs, Command, MonitorArgs},
    config::AppConfig,
    console::{self, Console},
    domain::{ChatTypeFilter, LocalClock},
    infrastructure::shutdown::Shutdown,
    tasks::{
        broadcast::{parse_recipients, BroadcastRequest, Broadcaster, DeliveryStatus},
        discovery::discover_chats,
        poller::UpdatePoller,
        registry::ChatRegistry,
        responder::CommandResponder,
        switch::MonitorSwitch,
    },
    telegram::{BotIdentity, ChatTarget, TelegramClient},
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct BotMonitorApp {
    config: Arc<AppConfig>,
    client: TelegramClient,
    clock: LocalClock,
    shutdown: Shutdown,
    identity: BotIdentity,
}

impl BotMonitorApp {
    /// Connects to the Bot API. Every command depends on a working token, so
    /// a failed `getMe` stops here.
    pub async fn initialize(config: AppConfig, shutdown: Shutdown) -> Result<Self> {
        let config = Arc::new(config);
        let http_client = Client::builder()
            .user_agent(format!("tg-bot-monitor/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        let client = TelegramClient::new(
            http_client,
            &config.api_base,
            &config.telegram_bot_token,
            config.request_timeout,
        );

        let identity = client
            .get_me()
            .await
            .context("failed to connect to the bot; check TELEGRAM_BOT_TOKEN")?;
        tracing::info!(
            target: "telegram",
            bot_id = identity.id,
            username = ?identity.username,
            "bot connected"
        );

        Ok(Self {
            clock: LocalClock::new(config.timezone),
            config,
            client,
            shutdown,
            identity,
        })
    }

    pub async fn run(self, command: Command) -> Result<()> {
        match command {
            Command::Monitor(args) => self.run_monitor(args).await,
            Command::Broadcast(args) => self.run_broadcast(args).await,
            Command::Discover { chat_type } => self.run_discover(chat_type).await,
            Command::Whoami => {
                self.print_identity();
                Ok(())
            }
            Command::Chat { chat_id } => self.show_chat(&chat_id).await,
        }
    }

    fn print_identity(&self) {
        println!("✅ Bot is connected!");
        println!("Bot Name: {}", self.identity.first_name);
        println!(
            "Username: @{}",
            self.identity.username.as_deref().unwrap_or("N/A")
        );
        println!("Bot ID: {}", self.identity.id);
    }

    async fn run_monitor(self, args: MonitorArgs) -> Result<()> {
        self.print_identity();
        if !self.config.allowed_chat_ids.is_empty() {
            tracing::info!(
                target: "lifecycle",
                allowed = ?self.config.allowed_chat_ids,
                "ALLOWED_CHAT_IDS is set but not enforced; replies go to every chat"
            );
        }

        let registry = Arc::new(ChatRegistry::new());
        let switch = MonitorSwitch::new(!args.paused);
        let poller = UpdatePoller::new(
            self.client.clone(),
            CommandResponder::new(self.clock),
            registry.clone(),
            self.clock,
            self.config.polling.clone(),
            switch.clone(),
        );
        let handle = poller.handle();

        let activity_handle =
            console::spawn_activity_log(&handle, self.clock, self.shutdown.subscribe());
        let mut poller_handle = poller.spawn(self.shutdown.subscribe());
        let console_handle = Console {
            switch,
            registry: registry.clone(),
            poller: handle.clone(),
            clock: self.clock,
            shutdown: self.shutdown.clone(),
        }
        .spawn();

        let mut shutdown_listener = self.shutdown.subscribe();
        let mut poller_finished = false;
        tokio::select! {
            _ = shutdown_listener.notified() => {
                tracing::info!(target: "lifecycle", "shutdown requested");
            }
            res = &mut poller_handle => {
                poller_finished = true;
                if let Err(err) = res {
                    tracing::error!(target: "lifecycle", error = %err, "update poller task failed");
                }
            }
        }

        self.shutdown.trigger();

        if !poller_finished {
            join_with_timeout("poller", poller_handle).await;
        }
        join_with_timeout("activity", activity_handle).await;
        // Console reads stdin, which can not be interrupted; abort it.
        console_handle.abort();

        let snapshot = handle.snapshot();
        tracing::info!(
            target: "lifecycle",
            processed = snapshot.messages_processed,
            chats = registry.len(),
            "monitor stopped"
        );
        if !registry.is_empty() {
            println!(
                "{}",
                console::render_chats(
                    &registry.snapshot(ChatTypeFilter::All),
                    ChatTypeFilter::All,
                    &self.clock
                )
            );
        }
        Ok(())
    }

    async fn run_broadcast(&self, args: BroadcastArgs) -> Result<()> {
        let text = match (&args.message, &args.message_file) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read message file {}", path.display()))?,
            (None, None) => bail!("a message is required"),
        };

        let mut raw_recipients = match &args.recipients {
            Some(path) => read_recipients(path).await?,
            None => String::new(),
        };
        for extra in &args.to {
            raw_recipients.push('\n');
            raw_recipients.push_str(extra);
        }

        let request = BroadcastRequest {
            recipients: parse_recipients(&raw_recipients),
            text,
            parse_mode: args.format.parse_mode(),
            test_mode: args.test,
        };
        if request.test_mode {
            if let Some(first) = request.recipients.first() {
                println!("🧪 Test mode: sending to {first} only");
            }
        }

        let broadcaster = Broadcaster::new(self.client.clone(), self.config.broadcast.send_delay)
            .with_shutdown(self.shutdown.subscribe());
        let report = broadcaster
            .run(request, |progress| match &progress.delivery.status {
                DeliveryStatus::Sent { .. } => println!(
                    "[{}/{}] ✅ Sent to {}",
                    progress.index, progress.total, progress.delivery.recipient
                ),
                DeliveryStatus::Failed { description } => println!(
                    "[{}/{}] ❌ Failed to send to {}: {}",
                    progress.index, progress.total, progress.delivery.recipient, description
                ),
            })
            .await?;

        println!(
            "Total Sent: {} | ✅ Success: {} | ❌ Failed: {}",
            report.attempted(),
            report.succeeded(),
            report.failed()
        );
        if report.interrupted {
            bail!("broadcast interrupted before every recipient was tried");
        }
        Ok(())
    }

    async fn run_discover(&self, filter: ChatTypeFilter) -> Result<()> {
        let registry = ChatRegistry::new();
        let report = discover_chats(
            &self.client,
            &registry,
            self.clock.now(),
            self.config.request_timeout,
        )
        .await
        .context("failed to fetch pending updates")?;

        if report.new_chats > 0 {
            println!("✅ Found {} chat(s)", report.new_chats);
        }
        println!(
            "{}",
            console::render_chats(&registry.snapshot(filter), filter, &self.clock)
        );
        Ok(())
    }

    async fn show_chat(&self, raw: &str) -> Result<()> {
        let target = ChatTarget::parse(raw.trim());
        let info = self
            .client
            .get_chat(&target)
            .await
            .with_context(|| format!("failed to look up chat {target}"))?;

        let name = info
            .title
            .as_deref()
            .or(info.first_name.as_deref())
            .unwrap_or("Unknown");
        println!("💬 {} ({})", name, info.kind);
        println!("   Chat ID: {}", info.id);
        println!("   Username: @{}", info.username.as_deref().unwrap_or("N/A"));
        if let Some(last_name) = &info.last_name {
            println!("   Last Name: {last_name}");
        }
        if let Some(description) = &info.description {
            println!("   Description: {description}");
        }
        Ok(())
    }
}

async fn read_recipients(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context("failed to read recipients from stdin")?;
        return Ok(raw);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read recipients file {}", path.display()))
}

async fn join_with_timeout(name: &'static str, mut handle: JoinHandle<()>) {
    match timeout(SHUTDOWN_TIMEOUT, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            if err.is_panic() {
                tracing::error!(target: "lifecycle", task = name, "task panicked");
            }
        }
        Err(_) => {
            tracing::warn!(
                target: "lifecycle",
                task = name,
                "task did not stop within {:?}; aborting",
                SHUTDOWN_TIMEOUT
            );
            handle.abort();
        }
    }
}
