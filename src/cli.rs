//! Command-line interface definitions for the digest bot.
//!
//! Every option can also be supplied through the environment, which is how
//! the bot is normally deployed.

use clap::Parser;

/// Command-line arguments for the RSS digest bot.
///
/// # Examples
///
/// ```sh
/// BOT_TOKEN=123:abc CHANNEL_ID=@my_news rss_digest_bot
///
/// # Custom feeds and schedule, state kept under /var/lib/newsbot
/// rss_digest_bot --config newsbot.yaml --data-dir /var/lib/newsbot
///
/// # Interactive commands only
/// rss_digest_bot --no-scheduler
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Telegram bot token issued by @BotFather
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Destination channel (`@name` or numeric id)
    #[arg(long, env = "CHANNEL_ID")]
    pub channel_id: Option<String>,

    /// Bot username, used in log output
    #[arg(long, env = "BOT_USERNAME", default_value = "news_bot")]
    pub bot_username: String,

    /// Optional path to a YAML settings file
    #[arg(short, long, env = "NEWSBOT_CONFIG")]
    pub config: Option<String>,

    /// Directory holding seen_links.txt and subscribers.txt
    #[arg(short, long, env = "NEWSBOT_DATA_DIR", default_value = ".")]
    pub data_dir: String,

    /// Answer commands but never publish on a timer
    #[arg(long)]
    pub no_scheduler: bool,
}
