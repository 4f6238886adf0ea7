//! Automatic publication at fixed times of day.
//!
//! The [`Scheduler`] owns a background task that sleeps until the next fire
//! time (never longer than the poll interval), then checks whether a fire
//! time has passed since its previous check and, if so, selects, renders and
//! sends one automatic digest. Shutdown is a message on a channel; `stop`
//! waits for the task with a bounded timeout.
//!
//! Statistics (`auto_posts`, `last_auto_post`) live in memory only and change
//! only after a successful send.

use crate::digest;
use crate::news::NewsService;
use crate::publish::PublicationTarget;
use chrono::{DateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// How long `stop` waits for the background task.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Daily fire times anchored to one timezone.
#[derive(Debug, Clone)]
pub struct Schedule {
    tz: Tz,
    times: Vec<NaiveTime>,
}

/// Next fire time as reported to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextFire {
    Today(NaiveTime),
    Tomorrow(NaiveTime),
}

impl fmt::Display for NextFire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextFire::Today(t) => write!(f, "today at {}", t.format("%H:%M")),
            NextFire::Tomorrow(t) => write!(f, "tomorrow at {}", t.format("%H:%M")),
        }
    }
}

impl Schedule {
    pub fn new(tz: Tz, mut times: Vec<NaiveTime>) -> Self {
        times.sort_unstable();
        times.dedup();
        Self { tz, times }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn times(&self) -> &[NaiveTime] {
        &self.times
    }

    /// First fire time whose hour is later than the hour of `now`, or the
    /// first time of tomorrow. Two fire times within one hour are not told
    /// apart.
    pub fn next_fire(&self, now: &DateTime<Tz>) -> Option<NextFire> {
        let hour = now.hour();
        match self.times.iter().find(|t| t.hour() > hour) {
            Some(t) => Some(NextFire::Today(*t)),
            None => self.times.first().map(|t| NextFire::Tomorrow(*t)),
        }
    }

    /// Earliest fire instant strictly after `after`.
    pub fn next_instant(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let today = after.date_naive();
        let tomorrow = today.succ_opt()?;
        [today, tomorrow]
            .into_iter()
            .flat_map(|day| self.times.iter().map(move |t| day.and_time(*t)))
            .filter_map(|local| self.tz.from_local_datetime(&local).earliest())
            .find(|at| at > after)
    }

    /// A fire instant in `(after, upto]`, if any.
    pub fn due_between(&self, after: &DateTime<Tz>, upto: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.next_instant(after).filter(|at| at <= upto)
    }
}

/// Source of the current instant for the firing loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Default)]
struct Stats {
    auto_posts: u64,
    last_auto_post: Option<DateTime<Tz>>,
}

/// Snapshot returned by [`Scheduler::schedule_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleInfo {
    pub timezone: Tz,
    pub times: Vec<NaiveTime>,
    pub auto_posts: u64,
    pub last_auto_post: Option<DateTime<Tz>>,
    pub next_auto_post: Option<NextFire>,
    pub is_running: bool,
}

/// Result of one automatic publication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { items: usize },
    NoItems,
    SendFailed,
}

enum SchedulerMessage {
    Shutdown,
}

struct Running {
    sender: mpsc::Sender<SchedulerMessage>,
    handle: JoinHandle<()>,
}

struct Inner<T> {
    news: Arc<NewsService>,
    target: T,
    schedule: Schedule,
    limit: usize,
    poll_interval: Duration,
    clock: Arc<dyn Clock>,
    stats: Mutex<Stats>,
}

/// Publishes a digest to `T` at every fire time while running.
pub struct Scheduler<T> {
    inner: Arc<Inner<T>>,
    running: Mutex<Option<Running>>,
}

impl<T> Scheduler<T>
where
    T: PublicationTarget + Send + Sync + 'static,
{
    pub fn new(
        news: Arc<NewsService>,
        target: T,
        schedule: Schedule,
        limit: usize,
        poll_interval: Duration,
    ) -> Self {
        Self::with_clock(
            news,
            target,
            schedule,
            limit,
            poll_interval,
            Arc::new(SystemClock),
        )
    }

    /// Like [`Scheduler::new`], reading the current time from `clock`.
    pub fn with_clock(
        news: Arc<NewsService>,
        target: T,
        schedule: Schedule,
        limit: usize,
        poll_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                news,
                target,
                schedule,
                limit,
                poll_interval,
                clock,
                stats: Mutex::new(Stats::default()),
            }),
            running: Mutex::new(None),
        }
    }

    /// Spawn the background task. Returns `false` with a warning when it is
    /// already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            warn!("Scheduler is already running");
            return false;
        }

        let (sender, receiver) = mpsc::channel(1);
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { inner.run(receiver).await });
        *running = Some(Running { sender, handle });

        let times: Vec<String> = self
            .inner
            .schedule
            .times()
            .iter()
            .map(|t| t.format("%H:%M").to_string())
            .collect();
        info!(
            times = %times.join(", "),
            timezone = %self.inner.schedule.timezone(),
            target = %self.inner.target.destination(),
            "Scheduler started"
        );
        true
    }

    /// Signal the background task and wait up to [`STOP_TIMEOUT`] for it.
    pub async fn stop(&self) {
        let Some(Running { sender, mut handle }) = self.running.lock().await.take() else {
            return;
        };
        let _ = sender.send(SchedulerMessage::Shutdown).await;
        match tokio::time::timeout(STOP_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => info!("Scheduler stopped"),
            Ok(Err(e)) => error!(error = %e, "Scheduler task ended abnormally"),
            Err(_) => {
                warn!("Scheduler did not stop in time, aborting");
                handle.abort();
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    pub async fn schedule_info(&self) -> ScheduleInfo {
        let now = self.inner.now();
        self.schedule_info_at(&now).await
    }

    pub async fn schedule_info_at(&self, now: &DateTime<Tz>) -> ScheduleInfo {
        let stats = self.inner.stats.lock().await.clone();
        ScheduleInfo {
            timezone: self.inner.schedule.timezone(),
            times: self.inner.schedule.times().to_vec(),
            auto_posts: stats.auto_posts,
            last_auto_post: stats.last_auto_post,
            next_auto_post: self.inner.schedule.next_fire(now),
            is_running: self.is_running().await,
        }
    }
}

impl<T> Inner<T>
where
    T: PublicationTarget + Send + Sync + 'static,
{
    fn now(&self) -> DateTime<Tz> {
        self.clock.now().with_timezone(&self.schedule.timezone())
    }

    async fn run(&self, mut receiver: mpsc::Receiver<SchedulerMessage>) {
        let mut last_check = self.now();
        loop {
            let now = self.now();
            let wait = self
                .schedule
                .next_instant(&last_check)
                .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
                .unwrap_or(self.poll_interval)
                .min(self.poll_interval);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                msg = receiver.recv() => match msg {
                    Some(SchedulerMessage::Shutdown) | None => break,
                },
            }

            let now = self.now();
            if let Some(PublishOutcome::Published { items }) = self.tick(&last_check, now).await {
                debug!(items, "Fire time handled");
            }
            last_check = now;
        }
    }

    /// Publish once if any fire time lies in `(last_check, now]`. Several
    /// missed fire times still produce a single run.
    async fn tick(&self, last_check: &DateTime<Tz>, now: DateTime<Tz>) -> Option<PublishOutcome> {
        let fire = self.schedule.due_between(last_check, &now)?;
        info!(fire_time = %fire.format("%H:%M %Z"), "Fire time reached");
        Some(self.auto_publish(now).await)
    }

    /// Select, render and send one automatic digest stamped with `now`.
    #[instrument(level = "info", skip_all, fields(at = %now.format("%H:%M %Z")))]
    async fn auto_publish(&self, now: DateTime<Tz>) -> PublishOutcome {
        let selection = self.news.collect(self.limit).await;
        if selection.items.is_empty() {
            warn!(
                failed_sources = selection.failed.len(),
                "No news for automatic publication, skipping this run"
            );
            return PublishOutcome::NoItems;
        }

        let message = digest::render_auto(&selection.items, &now);
        if let Err(e) = self.target.publish(&message).await {
            error!(
                error = %e,
                target = %self.target.destination(),
                "Automatic publication failed"
            );
            return PublishOutcome::SendFailed;
        }

        let mut stats = self.stats.lock().await;
        stats.auto_posts += 1;
        stats.last_auto_post = Some(now);
        info!(
            items = selection.items.len(),
            auto_posts = stats.auto_posts,
            "Automatic publication sent"
        );
        PublishOutcome::Published {
            items: selection.items.len(),
        }
    }
}
