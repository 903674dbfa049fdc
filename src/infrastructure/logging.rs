use std::io;

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

use crate::{config::AppConfig, infrastructure::directories::ResolvedPaths};

static INIT: OnceCell<()> = OnceCell::new();
static GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

const LOG_FILE_PREFIX: &str = "tg-bot-monitor.log";
// HTTP internals are noisy at debug and would echo request URLs carrying the token.
const QUIET_DEPENDENCIES: [&str; 3] = ["hyper_util=warn", "reqwest=warn", "h2=warn"];

/// Console logs go to stderr so command output on stdout stays clean.
pub fn init_tracing(config: &AppConfig, paths: &ResolvedPaths) -> Result<()> {
    INIT.get_or_try_init::<_, anyhow::Error>(|| {
        let env_filter = build_filter(&config.logging.level);

        let file_appender = tracing_appender::rolling::daily(&paths.logs_dir, LOG_FILE_PREFIX);
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
        let _ = GUARD.set(guard);

        let console_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .with_ansi(true);

        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()?;

        tracing::info!(target: "lifecycle", logs = %paths.logs_dir.display(), "tracing initialized");
        Ok(())
    })?;
    Ok(())
}

fn build_filter(level: &str) -> EnvFilter {
    build_filter_from(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(), level)
}

/// `RUST_LOG` wins outright; the quiet defaults only apply under `LOG_LEVEL`.
fn build_filter_from(rust_log: Option<&str>, level: &str) -> EnvFilter {
    if let Some(filter) = rust_log
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| EnvFilter::try_new(raw).ok())
    {
        return filter;
    }
    let base = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    QUIET_DEPENDENCIES
        .iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(base, |filter, directive| filter.add_directive(directive))
}
