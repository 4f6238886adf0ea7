//! Selection of fresh articles across the configured feeds.
//!
//! One pass walks the sources in random order and takes at most one article
//! per source: the first entry (in shuffled order) whose link was never seen
//! and whose description yields an acceptable summary. The pass stops once
//! `limit` items are collected.
//!
//! Documents are fetched lazily through a `buffered` stream, so with a
//! concurrency of 1 the sources are fetched strictly one after another and
//! nothing is fetched after the limit is reached.

use crate::fetcher::FeedFetcher;
use crate::models::{FailedSource, FailureReason, NewsItem, RawEntry, Selection};
use crate::summarizer::summarize;
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// Default number of items per digest.
pub const DEFAULT_LIMIT: usize = 6;

/// Picks fresh, summarizable articles from a list of feed URLs.
#[derive(Debug, Clone)]
pub struct Selector {
    fetcher: FeedFetcher,
    concurrency: usize,
}

impl Selector {
    /// `concurrency` caps the number of documents in flight; 1 means
    /// sequential fetching.
    pub fn new(fetcher: FeedFetcher, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Run one selection pass with a freshly seeded RNG.
    ///
    /// Links of accepted items are inserted into `seen`; persisting it is the
    /// caller's job.
    pub async fn select(
        &self,
        sources: &[String],
        seen: &mut HashSet<String>,
        limit: usize,
    ) -> Selection {
        let mut rng = StdRng::from_rng(&mut rand::rng());
        self.select_with_rng(sources, seen, limit, &mut rng).await
    }

    /// Run one selection pass using `rng` for source and entry ordering.
    #[instrument(level = "info", skip_all, fields(sources = sources.len(), limit = limit))]
    pub async fn select_with_rng<R: Rng + Send>(
        &self,
        sources: &[String],
        seen: &mut HashSet<String>,
        limit: usize,
        rng: &mut R,
    ) -> Selection {
        let mut selection = Selection::default();
        if limit == 0 {
            return selection;
        }

        let mut order = sources.to_vec();
        order.shuffle(rng);

        let fetcher = &self.fetcher;
        let documents = stream::iter(order)
            .map(move |url| async move {
                let document = fetcher.fetch(&url).await;
                (url, document)
            })
            .buffered(self.concurrency);
        let mut documents = std::pin::pin!(documents);

        let mut used_sources: HashSet<String> = HashSet::new();

        while let Some((url, document)) = documents.next().await {
            if used_sources.contains(&url) {
                continue;
            }
            info!(source = %url, "Loading feed");

            let body = match document {
                Ok(body) => body,
                Err(e) => {
                    warn!(source = %url, error = %e, "Skipping source");
                    selection.failed.push(FailedSource {
                        url,
                        reason: FailureReason::Fetch(e.to_string()),
                    });
                    continue;
                }
            };

            let mut entries = parse_entries(&body);
            if entries.is_empty() {
                warn!(source = %url, "Feed has no entries");
                selection.failed.push(FailedSource {
                    url,
                    reason: FailureReason::EmptyFeed,
                });
                continue;
            }
            entries.shuffle(rng);

            if let Some(item) = pick_fresh(entries, seen) {
                info!(source = %url, title = %item.title, link = %item.link, "Selected article");
                debug!(raw_summary = %truncate_for_log(&item.raw_summary, 200), "Article description");
                seen.insert(item.link.clone());
                used_sources.insert(url);
                selection.items.push(item);
                if selection.items.len() >= limit {
                    break;
                }
            } else {
                debug!(source = %url, "No fresh article in feed");
            }
        }

        info!(
            selected = selection.items.len(),
            failed = selection.failed.len(),
            "Selection pass finished"
        );
        selection
    }
}

/// Parse a feed document. Unparseable documents count as having no entries.
pub fn parse_entries(body: &[u8]) -> Vec<RawEntry> {
    match feed_rs::parser::parse(body) {
        Ok(feed) => feed
            .entries
            .into_iter()
            .map(RawEntry::from_feed_entry)
            .collect(),
        Err(e) => {
            warn!(
                error = %e,
                preview = %truncate_for_log(&String::from_utf8_lossy(body), 120),
                "Document is not a feed"
            );
            Vec::new()
        }
    }
}

/// Take the first entry whose link is unseen and whose description produces
/// an acceptable summary. Entries without a description are skipped.
pub fn pick_fresh(entries: Vec<RawEntry>, seen: &HashSet<String>) -> Option<NewsItem> {
    entries.into_iter().find_map(|entry| {
        if entry.link.is_empty() || seen.contains(&entry.link) {
            return None;
        }
        let raw_summary = entry.summary.filter(|s| !s.trim().is_empty())?;
        let summary = summarize(&entry.title, &raw_summary)?;
        Some(NewsItem {
            title: entry.title,
            raw_summary,
            link: entry.link,
            summary,
        })
    })
}
