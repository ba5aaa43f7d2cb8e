//! # QuizPulse — Interval Quiz Delivery Bot
//!
//! Sends quiz polls to Telegram chats on a per-chat cadence. Each chat
//! picks a category and an interval; the scheduler keeps every chat on
//! its own drift-free grid, enforces daily caps, and never repeats a
//! question before the category is exhausted.
//!
//! Usage:
//!   quizpulse                          # Run with ~/.quizpulse/config.toml
//!   quizpulse --config ./dev.toml      # Custom config
//!   quizpulse --quiz-dir ./quizzes     # Override the catalog directory

mod commands;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use quizpulse_channels::{TelegramPoller, TelegramTransport};
use quizpulse_core::QuizPulseConfig;
use quizpulse_core::traits::QuestionCatalog;
use quizpulse_scheduler::{DeliveryGate, Dispatcher, QuestionSource, QuizEngine, spawn_driver};
use quizpulse_store::{SqliteStore, StaticCatalog};
use tracing_subscriber::EnvFilter;

use commands::CommandRouter;

#[derive(Parser)]
#[command(name = "quizpulse", version, about = "Interval quiz delivery bot")]
struct Cli {
    /// Config file path (default: ~/.quizpulse/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Database path (overrides config)
    #[arg(long)]
    db: Option<String>,

    /// Question catalog directory (overrides config)
    #[arg(long)]
    quiz_dir: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "quizpulse=debug,quizpulse_scheduler=debug,quizpulse_channels=debug,quizpulse_store=debug"
    } else {
        "quizpulse=info,quizpulse_scheduler=info,quizpulse_channels=info,quizpulse_store=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => QuizPulseConfig::load_from(Path::new(path))?,
        None => QuizPulseConfig::load()?,
    };
    if config.telegram.bot_token.is_empty() {
        anyhow::bail!("telegram.bot_token is not configured");
    }

    let db_path = expand_path(cli.db.as_deref().unwrap_or(&config.store.db_path));
    let quiz_dir = expand_path(cli.quiz_dir.as_deref().unwrap_or(&config.catalog.dir));

    // Storage and catalog
    let store = Arc::new(SqliteStore::open(Path::new(&db_path))?);
    let catalog = Arc::new(StaticCatalog::from_dir(Path::new(&quiz_dir))?);
    tracing::info!(db = %db_path, categories = ?catalog.categories(), "storage ready");

    // Transport
    let transport = Arc::new(TelegramTransport::new(config.telegram.clone())?);
    let poller = TelegramPoller::new(config.telegram.clone());
    poller
        .check_identity()
        .await
        .map_err(|e| anyhow::anyhow!("telegram connection failed: {e}"))?;

    // Scheduling engine
    let questions = QuestionSource::new(catalog.clone(), store.clone());
    let gate = DeliveryGate::new(
        store.clone(),
        config.limits.direct_daily_cap,
        config.limits.group_daily_cap,
    );
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        transport.clone(),
        questions,
        gate,
    ));
    let engine = Arc::new(QuizEngine::new(
        dispatcher,
        store.clone(),
        &config.scheduler,
    ));

    // Resume sessions that were running before the restart.
    engine.rehydrate().await?;

    let driver = spawn_driver(engine.clone(), config.scheduler.tick_secs);

    // Command loop
    let router = CommandRouter::new(
        engine,
        store.clone(),
        catalog,
        transport,
        config.scheduler.min_interval_secs,
    );
    let mut messages = poller.start_polling();

    tracing::info!("QuizPulse running, press Ctrl+C to stop");
    loop {
        tokio::select! {
            Some(msg) = messages.next() => {
                router.handle(msg).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    driver.abort();
    Ok(())
}
