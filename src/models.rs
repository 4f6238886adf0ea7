//! Data models shared by the selection pipeline, the digest renderer and the
//! command surface.
//!
//! - [`RawEntry`]: one article as exposed by a parsed feed document
//! - [`NewsItem`]: an accepted, summarized article
//! - [`FailedSource`]: a source that produced nothing during a pass
//! - [`Selection`]: the result of one selection pass

use std::fmt;

/// Placeholder used when a feed entry carries no title.
pub const UNTITLED: &str = "Untitled";

/// One article as exposed by a parsed feed document.
///
/// Transient: exists only during a selection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Entry title, or [`UNTITLED`] when the feed omits it.
    pub title: String,
    /// Article link. Used as the unique identifier of the article.
    pub link: String,
    /// Raw summary/description, possibly carrying HTML markup.
    pub summary: Option<String>,
}

impl RawEntry {
    /// Convert a `feed-rs` entry. The first link wins; an entry without
    /// links gets an empty link, which the selector never accepts.
    pub fn from_feed_entry(entry: feed_rs::model::Entry) -> Self {
        let title = entry
            .title
            .map(|t| t.content)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());
        let link = entry
            .links
            .into_iter()
            .next()
            .map(|l| l.href)
            .unwrap_or_default();
        let summary = entry.summary.map(|s| s.content);

        Self {
            title,
            link,
            summary,
        }
    }
}

/// The accepted, processed form of a [`RawEntry`].
///
/// Immutable once created. Only `link` outlives the request/publish cycle,
/// via the seen-links store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub raw_summary: String,
    pub link: String,
    /// Extractive summary: between one and three sentences.
    pub summary: Vec<String>,
}

/// Why a source contributed nothing to a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The fetcher returned an error (status code or transport failure).
    Fetch(String),
    /// The document parsed, but it had no entries (or was not a feed).
    EmptyFeed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Fetch(reason) => write!(f, "{reason}"),
            FailureReason::EmptyFeed => write!(f, "empty feed"),
        }
    }
}

/// A source-level failure recorded during a selection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSource {
    pub url: String,
    pub reason: FailureReason,
}

impl fmt::Display for FailedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.reason)
    }
}

/// Outcome of one selection pass: at most `limit` items plus every
/// source-level failure encountered on the way.
#[derive(Debug, Default, Clone)]
pub struct Selection {
    pub items: Vec<NewsItem>,
    pub failed: Vec<FailedSource>,
}
