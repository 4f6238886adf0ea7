//! Telegram command surface.
//!
//! Long-polls `getUpdates`, maps each text message to a [`Command`] and
//! answers through a [`ChatTarget`]. Messages are handled one at a time.

use crate::digest;
use crate::news::NewsService;
use crate::publish::{ChatTarget, PublicationTarget};
use crate::scheduler::{ScheduleInfo, Scheduler};
use crate::selector::DEFAULT_LIMIT;
use crate::storage::subscribers::{self, SubscriberHistory, WeeklyDelta};
use crate::telegram::{ChatId, Message, ReplyKeyboard, TelegramClient};
use crate::utils::truncate_for_log;
use itertools::Itertools;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

pub const BUTTON_FETCH: &str = "📰 Fresh news";
pub const BUTTON_PUBLISH: &str = "📢 Publish to channel";
pub const BUTTON_STATS: &str = "📊 Statistics";
pub const BUTTON_SCHEDULE: &str = "📅 Auto-publishing";
pub const BUTTON_SUPPORT: &str = "🆘 Support";

/// Failing sources listed in a "no news" reply.
const MAX_LISTED_FAILURES: usize = 3;

/// Pause after a failed `getUpdates` call.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

pub fn main_keyboard() -> ReplyKeyboard {
    ReplyKeyboard::new(&[
        &[BUTTON_FETCH, BUTTON_PUBLISH],
        &[BUTTON_STATS, BUTTON_SCHEDULE],
        &[BUTTON_SUPPORT],
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    FetchNews,
    PublishLast,
    ShowStats,
    ShowSchedule,
    Support,
    Unknown,
}

impl Command {
    /// Map a menu button or slash command to a command. `/cmd@botname` is
    /// accepted for group chats.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text {
            BUTTON_FETCH => return Command::FetchNews,
            BUTTON_PUBLISH => return Command::PublishLast,
            BUTTON_STATS => return Command::ShowStats,
            BUTTON_SCHEDULE => return Command::ShowSchedule,
            BUTTON_SUPPORT => return Command::Support,
            _ => {}
        }

        let Some(command) = text.strip_prefix('/') else {
            return Command::Unknown;
        };
        let name = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .split('@')
            .next()
            .unwrap_or_default();
        match name {
            "start" | "help" => Command::Start,
            "news" => Command::FetchNews,
            "publish" => Command::PublishLast,
            "stats" => Command::ShowStats,
            "schedule" => Command::ShowSchedule,
            "support" => Command::Support,
            _ => Command::Unknown,
        }
    }
}

/// The digest most recently fetched in a chat, ready to be published.
#[derive(Debug, Clone)]
struct LastDigest {
    message: String,
    items: usize,
}

pub struct Bot<C> {
    client: TelegramClient,
    channel_id: ChatId,
    channel: C,
    news: Arc<NewsService>,
    scheduler: Arc<Scheduler<C>>,
    subscribers: SubscriberHistory,
    keyboard: ReplyKeyboard,
    limit: usize,
    poll_timeout: Duration,
    last_fetched: Mutex<HashMap<i64, LastDigest>>,
}

impl<C> Bot<C>
where
    C: PublicationTarget + Send + Sync + 'static,
{
    pub fn new(
        client: TelegramClient,
        channel_id: ChatId,
        channel: C,
        news: Arc<NewsService>,
        scheduler: Arc<Scheduler<C>>,
        subscribers: SubscriberHistory,
    ) -> Self {
        Self {
            client,
            channel_id,
            channel,
            news,
            scheduler,
            subscribers,
            keyboard: main_keyboard(),
            limit: DEFAULT_LIMIT,
            poll_timeout: Duration::from_secs(30),
            last_fetched: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Poll for updates until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut offset = 0;
        info!(poll_timeout_secs = self.poll_timeout.as_secs(), "Command loop started");

        loop {
            let updates = tokio::select! {
                _ = &mut shutdown => break,
                updates = self.client.get_updates(offset, self.poll_timeout) => updates,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        if let Some(message) = update.message {
                            self.handle_message(message).await;
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "getUpdates failed");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                    }
                }
            }
        }
        info!("Command loop stopped");
    }

    async fn handle_message(&self, message: Message) {
        let Some(text) = message.text.as_deref() else {
            debug!(chat = message.chat.id, "Ignoring non-text message");
            return;
        };
        let command = Command::parse(text);
        info!(
            chat = message.chat.id,
            user = message.from.as_ref().map(|u| u.id),
            text = %truncate_for_log(text, 64),
            ?command,
            "Received message"
        );

        let reply = ChatTarget::new(
            self.client.clone(),
            ChatId::Id(message.chat.id),
            Some(self.keyboard.clone()),
        );
        self.dispatch(message.chat.id, command, &reply).await;
    }

    /// Run `command` for `chat`, answering through `reply`.
    #[instrument(level = "info", skip(self, reply))]
    pub async fn dispatch<R: PublicationTarget>(&self, chat: i64, command: Command, reply: &R) {
        match command {
            Command::Start => say(reply, WELCOME).await,
            Command::FetchNews => self.fetch_news(chat, reply).await,
            Command::PublishLast => self.publish_last(chat, reply).await,
            Command::ShowStats => self.show_stats(reply).await,
            Command::ShowSchedule => {
                let info = self.scheduler.schedule_info().await;
                say(reply, &render_schedule(&info)).await;
            }
            Command::Support => say(reply, SUPPORT).await,
            Command::Unknown => say(reply, MENU_HINT).await,
        }
    }

    async fn fetch_news<R: PublicationTarget>(&self, chat: i64, reply: &R) {
        say(reply, "📡 <b>Loading fresh news...</b>").await;

        let selection = self.news.collect(self.limit).await;
        if selection.items.is_empty() {
            warn!(failed = ?selection.failed, "No news could be collected");
            let mut text = String::from("⚠️ <b>No news!</b> 😔");
            if !selection.failed.is_empty() {
                text.push_str(&format!(
                    "\nProblems with sources: {}\n• {}",
                    selection.failed.len(),
                    selection
                        .failed
                        .iter()
                        .take(MAX_LISTED_FAILURES)
                        .map(|f| html_escape::encode_text(&f.to_string()).into_owned())
                        .join("\n• ")
                ));
            }
            say(reply, &text).await;
            return;
        }

        let message = digest::render(&selection.items);
        if let Err(e) = reply.publish(&message).await {
            error!(
                error = %e,
                destination = %reply.destination(),
                chars = message.chars().count(),
                "Digest reply failed"
            );
            say(reply, "❌ <b>Loading failed!</b> Try again later.").await;
            return;
        }
        self.last_fetched.lock().await.insert(
            chat,
            LastDigest {
                message,
                items: selection.items.len(),
            },
        );
    }

    async fn publish_last<R: PublicationTarget>(&self, chat: i64, reply: &R) {
        let Some(last) = self.last_fetched.lock().await.get(&chat).cloned() else {
            say(reply, "❌ <b>Fetch news first!</b>").await;
            return;
        };

        say(reply, "📢 <b>Publishing to the channel...</b>").await;
        match self.channel.publish(&last.message).await {
            Ok(()) => {
                self.news.record_posted(last.items);
                say(reply, "✅ <b>News published!</b> 🎉").await;
            }
            Err(e) => {
                error!(error = %e, destination = %self.channel.destination(), "Manual publication failed");
                say(
                    reply,
                    "❌ <b>Publication failed!</b> Check the bot's rights in the channel and try again later.",
                )
                .await;
            }
        }
    }

    async fn show_stats<R: PublicationTarget>(&self, reply: &R) {
        let subscribers = match self.client.get_chat_member_count(&self.channel_id).await {
            Ok(count) => Some(count),
            Err(e) => {
                error!(error = %e, "Could not read channel subscriber count");
                None
            }
        };

        let delta = match subscribers {
            Some(count) => Some(self.record_subscribers(count).await),
            None => None,
        };

        let info = self.scheduler.schedule_info().await;
        let text = render_stats(
            self.news.news_fetched(),
            self.news.news_posted(),
            subscribers,
            delta,
            &info,
        );
        say(reply, &text).await;
    }

    /// Append a sample and compare it with the history as it was before.
    async fn record_subscribers(&self, count: u64) -> WeeklyDelta {
        let now = subscribers::now();
        let history = self.subscribers.load().await.unwrap_or_else(|e| {
            error!(error = %e, "Could not read subscriber history");
            Vec::new()
        });
        if let Err(e) = self.subscribers.append(now, count).await {
            error!(error = %e, "Could not record subscriber sample");
        }
        subscribers::weekly_delta(&history, now, count)
    }
}

async fn say<R: PublicationTarget>(reply: &R, text: &str) {
    if let Err(e) = reply.publish(text).await {
        error!(error = %e, destination = %reply.destination(), "Reply failed");
    }
}

const WELCOME: &str = "👋 <b>Welcome to the news bot!</b> 🎉\n\n\
    I collect fresh news and publish digests to the channel.\n\n\
    Choose an action below:";

const SUPPORT: &str = "📞 <b>Support</b>\n\n\
    🔧 The bot runs on its own\n\
    📰 News comes from a fixed list of RSS feeds\n\
    📅 Digests are published to the channel on a daily schedule\n\n\
    ❓ For questions, contact the channel administrator.";

const MENU_HINT: &str = "📝 <b>Use the menu buttons to work with the bot!</b> 😊";

fn fire_times(info: &ScheduleInfo) -> Vec<String> {
    info.times
        .iter()
        .map(|t| t.format("%H:%M").to_string())
        .collect()
}

fn last_post(info: &ScheduleInfo) -> String {
    info.last_auto_post
        .map(|at| at.format("%d.%m.%Y %H:%M").to_string())
        .unwrap_or_else(|| "none".to_string())
}

fn next_post(info: &ScheduleInfo) -> String {
    match (&info.next_auto_post, info.is_running) {
        (Some(next), true) => next.to_string(),
        _ => "not active".to_string(),
    }
}

fn status(info: &ScheduleInfo) -> &'static str {
    if info.is_running {
        "✅ Active"
    } else {
        "❌ Inactive"
    }
}

pub fn render_schedule(info: &ScheduleInfo) -> String {
    let mut text = format!(
        "📅 <b>Automatic news publication</b>\n\n⏰ <b>Schedule ({}):</b>\n",
        info.timezone
    );
    for time in fire_times(info) {
        text.push_str(&format!("   • {time}\n"));
    }
    text.push_str(&format!(
        "\n📊 <b>Statistics:</b>\n\
         🤖 Automatic posts: {}\n\
         🕐 Last post: {}\n\
         ⏳ Next post: {}\n\n\
         🔄 <b>Status:</b> {}",
        info.auto_posts,
        last_post(info),
        next_post(info),
        status(info)
    ));
    text
}

pub fn render_stats(
    fetched: u64,
    posted: u64,
    subscribers: Option<u64>,
    delta: Option<WeeklyDelta>,
    info: &ScheduleInfo,
) -> String {
    let subscribers = subscribers
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unavailable".to_string());
    let mut text = format!(
        "📊 <b>Bot statistics</b>\n\n\
         📈 News collected: {fetched}\n\
         📤 Published manually: {posted}\n\
         🤖 Automatic posts: {}\n\
         👥 Channel subscribers: {subscribers}\n",
        info.auto_posts
    );
    if let Some(delta) = delta {
        text.push_str(&format!(
            "➕ New this week: {}\n➖ Left this week: {}\n",
            delta.joined, delta.left
        ));
    }
    text.push_str(&format!(
        "\n📅 <b>Auto-publishing:</b>\n\
         ⏰ Schedule: {} ({})\n\
         🕐 Last: {}\n\
         ⏳ Next: {}\n\
         🔄 Status: {}",
        fire_times(info).join(", "),
        info.timezone,
        last_post(info),
        next_post(info),
        status(info)
    ));
    text
}
