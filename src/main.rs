//! # RSS Digest Bot
//!
//! A Telegram bot that collects fresh articles from a fixed list of RSS
//! feeds, builds short extractive summaries, and posts a digest to a channel,
//! either on request or automatically at fixed times of day.
//!
//! ## Features
//!
//! - Random source and entry order, at most one article per feed per digest
//! - Persistent de-duplication: an article link is never handed out twice
//! - Automatic publication five times a day (configurable, timezone aware)
//! - Channel subscriber history with a weekly join/leave delta
//!
//! ## Usage
//!
//! ```sh
//! BOT_TOKEN=123:abc CHANNEL_ID=@my_news rss_digest_bot --data-dir ./state
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: download each feed document ([`fetcher`])
//! 2. **Selection**: pick and summarize fresh entries ([`selector`], [`summarizer`])
//! 3. **Rendering**: assemble the HTML digest ([`digest`])
//! 4. **Delivery**: send to a chat or the channel ([`publish`], [`telegram`])
//!
//! The command loop ([`bot`]) and the [`scheduler`] share one
//! [`news::NewsService`], which serialises access to the seen-links store.

use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod bot;
mod cli;
mod config;
mod digest;
mod fetcher;
mod models;
mod news;
mod publish;
mod scheduler;
mod selector;
mod storage;
mod summarizer;
mod telegram;
mod utils;

use bot::Bot;
use cli::Cli;
use config::{Credentials, Settings};
use fetcher::FeedFetcher;
use news::NewsService;
use publish::ChannelTarget;
use scheduler::{Schedule, Scheduler};
use selector::Selector;
use storage::seen_links::SeenLinksStore;
use storage::subscribers::SubscriberHistory;
use telegram::{ChatId, TelegramClient};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("rss_digest_bot starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.config, ?args.data_dir, args.no_scheduler, "Parsed CLI arguments");

    // ---- Configuration; any error here aborts before anything starts ----
    let credentials = Credentials::from_cli(&args).inspect_err(|e| {
        error!(error = %e, "Invalid bot credentials");
    })?;
    let settings = Settings::load(args.config.as_deref().map(Path::new)).inspect_err(|e| {
        error!(error = %e, "Invalid settings");
    })?;
    let timezone = settings.timezone()?;
    let fire_times = settings.fire_times()?;

    if let Err(e) = ensure_writable_dir(&args.data_dir).await {
        error!(
            path = %args.data_dir,
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Wiring ----
    let fetcher = FeedFetcher::new(settings.fetch_timeout())?;
    let selector = Selector::new(fetcher, settings.fetch.concurrency);
    let news = Arc::new(NewsService::new(
        selector,
        settings.sources.clone(),
        SeenLinksStore::in_dir(&args.data_dir),
    ));

    let client = TelegramClient::new(&settings.telegram.api_base, &credentials.bot_token)?;
    let channel_id = ChatId::from(credentials.channel_id.as_str());
    let channel = ChannelTarget::new(client.clone(), channel_id.clone());

    let scheduler = Arc::new(Scheduler::new(
        news.clone(),
        channel.clone(),
        Schedule::new(timezone, fire_times),
        settings.digest.limit,
        settings.poll_interval(),
    ));
    if args.no_scheduler {
        info!("Automatic publication disabled");
    } else {
        scheduler.start().await;
    }

    let bot = Bot::new(
        client,
        channel_id,
        channel,
        news,
        scheduler.clone(),
        SubscriberHistory::in_dir(&args.data_dir),
    )
    .with_limit(settings.digest.limit)
    .with_poll_timeout(Duration::from_secs(settings.telegram.poll_timeout_secs));

    info!(
        bot = %credentials.bot_username,
        channel = %credentials.channel_id,
        sources = settings.sources.len(),
        "Bot is ready"
    );

    bot.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl-C; running until killed");
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    })
    .await;

    scheduler.stop().await;

    let elapsed = start_time.elapsed();
    info!(
        uptime_secs = elapsed.as_secs(),
        "Shut down cleanly"
    );
    Ok(())
}
