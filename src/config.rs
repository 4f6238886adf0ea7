//! Runtime configuration.
//!
//! Credentials come from the command line or the environment (see
//! [`crate::cli`]). Everything else lives in an optional YAML settings file;
//! every field has a default, so an absent file or a partial one is valid.
//!
//! ```yaml
//! sources:
//!   - https://lenta.ru/rss/news
//! digest:
//!   limit: 6
//! fetch:
//!   timeout_secs: 60
//!   concurrency: 1
//! schedule:
//!   timezone: Europe/Moscow
//!   times: ["09:00", "12:00", "15:00", "18:00", "21:00"]
//!   poll_interval_secs: 60
//! telegram:
//!   api_base: https://api.telegram.org
//!   poll_timeout_secs: 30
//! ```

use crate::cli::Cli;
use crate::fetcher::DEFAULT_TIMEOUT;
use crate::selector::DEFAULT_LIMIT;
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};
use url::Url;

/// Feeds polled when the settings file does not name any.
pub const DEFAULT_SOURCES: [&str; 6] = [
    "https://lenta.ru/rss/news",
    "https://ria.ru/export/rss2/archive/index.xml",
    "https://tass.ru/rss/v2.xml",
    "https://www.interfax.ru/rss.asp",
    "https://www.vedomosti.ru/rss/news",
    "https://rssexport.rbc.ru/rbcnews/news/30/full.rss",
];

pub const DEFAULT_FIRE_TIMES: [&str; 5] = ["09:00", "12:00", "15:00", "18:00", "21:00"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("bot token is missing (set BOT_TOKEN or --bot-token)")]
    MissingToken,

    #[error("channel id is missing (set CHANNEL_ID or --channel-id)")]
    MissingChannel,

    #[error("bot token is malformed: expected '<id>:<secret>'")]
    MalformedToken,

    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown timezone {0:?}")]
    Timezone(String),

    #[error("invalid fire time {0:?}, expected HH:MM")]
    FireTime(String),

    #[error("invalid feed source {url:?}: {reason}")]
    Source { url: String, reason: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Bot identity and destination, from the command line or environment.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub bot_token: String,
    pub channel_id: String,
    pub bot_username: String,
}

impl Credentials {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let bot_token = cli.bot_token.as_deref().map(str::trim).unwrap_or_default();
        if bot_token.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if !bot_token.contains(':') {
            return Err(ConfigError::MalformedToken);
        }
        let channel_id = cli.channel_id.as_deref().map(str::trim).unwrap_or_default();
        if channel_id.is_empty() {
            return Err(ConfigError::MissingChannel);
        }
        Ok(Self {
            bot_token: bot_token.to_string(),
            channel_id: channel_id.to_string(),
            bot_username: cli.bot_username.trim_start_matches('@').to_string(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub sources: Vec<String>,
    pub digest: DigestSettings,
    pub fetch: FetchSettings,
    pub schedule: ScheduleSettings,
    pub telegram: TelegramSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DigestSettings {
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    /// 1 fetches sources one after another.
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleSettings {
    pub timezone: String,
    pub times: Vec<String>,
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelegramSettings {
    pub api_base: String,
    pub poll_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sources: DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
            digest: DigestSettings::default(),
            fetch: FetchSettings::default(),
            schedule: ScheduleSettings::default(),
            telegram: TelegramSettings::default(),
        }
    }
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            concurrency: 1,
        }
    }
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            timezone: "Europe/Moscow".to_string(),
            times: DEFAULT_FIRE_TIMES.iter().map(|s| s.to_string()).collect(),
            poll_interval_secs: 60,
        }
    }
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or defaults when no path is given.
    #[instrument(level = "info", skip_all, fields(path = ?path))]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match path {
            None => Self::default(),
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?
            }
        };
        settings.validate()?;
        info!(
            sources = settings.sources.len(),
            limit = settings.digest.limit,
            timezone = %settings.schedule.timezone,
            "Loaded settings"
        );
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document is all defaults.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for source in &self.sources {
            validate_source(source)?;
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Zero("fetch.timeout_secs"));
        }
        if self.schedule.poll_interval_secs == 0 {
            return Err(ConfigError::Zero("schedule.poll_interval_secs"));
        }
        self.timezone()?;
        self.fire_times()?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.schedule
            .timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(self.schedule.timezone.clone()))
    }

    /// Fire times in ascending order, duplicates removed.
    pub fn fire_times(&self) -> Result<Vec<NaiveTime>, ConfigError> {
        let mut times = self
            .schedule
            .times
            .iter()
            .map(|t| {
                NaiveTime::parse_from_str(t.trim(), "%H:%M")
                    .map_err(|_| ConfigError::FireTime(t.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        times.sort_unstable();
        times.dedup();
        Ok(times)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.poll_interval_secs)
    }
}

fn validate_source(source: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::Source {
        url: source.to_string(),
        reason,
    };
    let url = Url::parse(source).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}
