//! tgbridge - Claude Code to Telegram bridge daemon
//!
//! Serves the Telegram webhook and runs the pane watcher against the
//! configured tmux session.
//!
//! # Components
//! - `webhook`: HTTP endpoint receiving Telegram updates
//! - `PaneWatcher` (core): background reconciliation loop

mod webhook;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tgbridge_core::chat::BOT_COMMANDS;
use tgbridge_core::{
    BridgeConfig, CommandRouter, FileSignalStore, PaneWatcher, RouterOptions, TelegramClient,
    TmuxConsole,
};
use tracing::{info, warn};

use crate::webhook::{build_router, WebhookState};

#[derive(Parser, Debug)]
#[command(name = "tgbridge")]
#[command(about = "Bridge a Claude Code tmux session to a Telegram chat")]
#[command(version)]
struct Args {
    /// Config file (YAML), defaults to ~/.claude/telegram_bridge.yaml when present
    #[arg(short, long, env = "TGBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port, overrides PORT
    #[arg(short, long)]
    port: Option<u16>,

    /// tmux session name, overrides TMUX_SESSION
    #[arg(short, long)]
    session: Option<String>,
}

fn log_filter() -> tracing_subscriber::EnvFilter {
    let level = if let Ok(v) = std::env::var("RUST_LOG") {
        v
    } else if let Ok(v) = std::env::var("TGBRIDGE_LOG_LEVEL") {
        match v.as_str() {
            "silent" => "off".to_string(),
            "fatal" => "error".to_string(),
            other => other.to_string(),
        }
    } else {
        "info".to_string()
    };

    tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = BridgeConfig::load_with(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(session) = args.session {
        config.tmux_session = session;
    }

    // Dual-layer logging: stderr + file (daily rotation)
    let log_dir = config.logs_dir();
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&log_dir, "tgbridge.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(log_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    std::panic::set_hook(Box::new(|info| {
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_default();
        eprintln!("PANIC at {}: {}", location, payload);
        tracing::error!(location = %location, "BRIDGE PANIC: {}", payload);
    }));

    let token = config.require_token()?;
    let chat = Arc::new(TelegramClient::new(
        token,
        config.proxy.as_deref(),
        config.io_timeout(),
    )?);
    match chat.set_my_commands(BOT_COMMANDS).await {
        Ok(()) => info!(count = BOT_COMMANDS.len(), "Bot commands registered"),
        Err(e) => warn!(error = %e, "Failed to register bot commands"),
    }

    let store = Arc::new(FileSignalStore::new(config.signal_paths()));
    let console = Arc::new(TmuxConsole::new(
        config.tmux_session.clone(),
        config.agent_process_pattern.clone(),
        config.io_timeout(),
    ));

    let watcher = PaneWatcher::new(
        config.watcher.clone(),
        store.clone(),
        chat.clone(),
        console.clone(),
    );
    let watcher_task = tokio::spawn(watcher.run());

    let router = CommandRouter::new(RouterOptions::from_config(&config), store, chat, console);
    let app = build_router(WebhookState::new(router.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(
        addr = %addr,
        session = %config.tmux_session,
        proxy = config.proxy.as_deref().unwrap_or("none"),
        "Bridge listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Webhook server failed")?;

    router.shutdown();
    watcher_task.abort();
    info!("Bridge stopped");
    Ok(())
}
