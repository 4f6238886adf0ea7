//! Channel subscriber history: one `<RFC 3339 timestamp>,<count>` sample per
//! line, appended each time statistics are requested.

use super::StoreError;
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{instrument, warn};

pub const FILE_NAME: &str = "subscribers.txt";

/// Window over which joins and leaves are reported.
pub const WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub at: DateTime<FixedOffset>,
    pub count: u64,
}

/// Net movement against the oldest sample inside the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeeklyDelta {
    pub joined: u64,
    pub left: u64,
}

#[derive(Debug, Clone)]
pub struct SubscriberHistory {
    path: PathBuf,
}

impl SubscriberHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join(FILE_NAME))
    }

    /// All well-formed samples in file order. Malformed lines are skipped
    /// with a warning; a missing file is an empty history.
    pub async fn load(&self) -> Result<Vec<Sample>, StoreError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let mut samples = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(idx + 1, line) {
                Ok(sample) => samples.push(sample),
                Err(e) => warn!(error = %e, "Skipping subscriber history line"),
            }
        }
        Ok(samples)
    }

    #[instrument(level = "info", skip(self), fields(path = %self.path.display()))]
    pub async fn append(&self, at: DateTime<FixedOffset>, count: u64) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        let line = format!("{},{}\n", at.to_rfc3339(), count);
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| StoreError::io(&self.path, e))
    }
}

/// Compare `current` with the oldest sample taken within the last
/// [`WINDOW_DAYS`] days of `now`. No sample in the window means no movement.
pub fn weekly_delta(history: &[Sample], now: DateTime<FixedOffset>, current: u64) -> WeeklyDelta {
    let cutoff = now - Duration::days(WINDOW_DAYS);
    let Some(oldest) = history.iter().find(|s| s.at >= cutoff) else {
        return WeeklyDelta::default();
    };
    WeeklyDelta {
        joined: current.saturating_sub(oldest.count),
        left: oldest.count.saturating_sub(current),
    }
}

fn parse_line(line_no: usize, line: &str) -> Result<Sample, StoreError> {
    let malformed = |reason: String| StoreError::Malformed {
        line: line_no,
        reason,
    };

    let (stamp, count) = line
        .rsplit_once(',')
        .ok_or_else(|| malformed("missing ','".to_string()))?;
    let count = count
        .trim()
        .parse::<u64>()
        .map_err(|e| malformed(format!("count: {e}")))?;
    let at = parse_timestamp(stamp.trim()).ok_or_else(|| malformed(format!("timestamp {stamp:?}")))?;
    Ok(Sample { at, count })
}

/// RFC 3339, or a naive ISO-8601 timestamp read as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok().or_else(|| {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

/// Current time as a fixed-offset timestamp.
pub fn now() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<FixedOffset> {
        Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0)
            .unwrap()
            .fixed_offset()
    }

    fn sample(day: u32, count: u64) -> Sample {
        Sample { at: at(day), count }
    }

    #[test]
    fn test_weekly_delta_growth() {
        let history = vec![sample(1, 50), sample(10, 100), sample(12, 110)];
        let delta = weekly_delta(&history, at(15), 120);
        assert_eq!(delta, WeeklyDelta { joined: 20, left: 0 });
    }

    #[test]
    fn test_weekly_delta_shrink() {
        let history = vec![sample(10, 100)];
        let delta = weekly_delta(&history, at(15), 90);
        assert_eq!(delta, WeeklyDelta { joined: 0, left: 10 });
    }

    #[test]
    fn test_weekly_delta_no_recent_samples() {
        let history = vec![sample(1, 10)];
        assert_eq!(weekly_delta(&history, at(15), 500), WeeklyDelta::default());
        assert_eq!(weekly_delta(&[], at(15), 500), WeeklyDelta::default());
    }

    #[test]
    fn test_parse_line_formats() {
        let s = parse_line(1, "2026-03-01T12:00:00+03:00,42").unwrap();
        assert_eq!(s.count, 42);
        let s = parse_line(1, "2026-03-01T12:00:00.123456,7").unwrap();
        assert_eq!(s.at, at(1) + Duration::microseconds(123456));
        assert!(parse_line(3, "garbage").is_err());
        assert!(parse_line(3, "2026-03-01T12:00:00,abc").is_err());
    }

    #[tokio::test]
    async fn test_append_and_load_skip_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let history = SubscriberHistory::in_dir(dir.path());
        assert!(history.load().await.unwrap().is_empty());

        history.append(at(1), 10).await.unwrap();
        let path = dir.path().join(FILE_NAME);
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("not a sample\n");
        std::fs::write(&path, raw).unwrap();
        history.append(at(2), 12).await.unwrap();

        let loaded = history.load().await.unwrap();
        assert_eq!(loaded, vec![sample(1, 10), sample(2, 12)]);
    }
}
