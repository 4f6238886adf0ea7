//! The shared selection pipeline behind both manual and scheduled digests.
//!
//! [`NewsService::collect`] runs one read-select-persist section against the
//! seen-links store while holding its lock, so a manual request and a
//! scheduled run can never hand out the same article.

use crate::models::Selection;
use crate::selector::Selector;
use crate::storage::seen_links::SeenLinksStore;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, instrument};

#[derive(Debug)]
pub struct NewsService {
    selector: Selector,
    sources: Vec<String>,
    store: SeenLinksStore,
    news_fetched: AtomicU64,
    news_posted: AtomicU64,
}

impl NewsService {
    pub fn new(selector: Selector, sources: Vec<String>, store: SeenLinksStore) -> Self {
        Self {
            selector,
            sources,
            store,
            news_fetched: AtomicU64::new(0),
            news_posted: AtomicU64::new(0),
        }
    }

    /// Select up to `limit` fresh items and persist their links.
    ///
    /// A failure to persist is logged; the selection is still returned.
    #[instrument(level = "info", skip(self))]
    pub async fn collect(&self, limit: usize) -> Selection {
        let mut section = self.store.begin().await;
        debug!(seen = section.links().len(), "Loaded seen links");
        let selection = self
            .selector
            .select(&self.sources, section.links_mut(), limit)
            .await;

        if let Err(e) = section.commit().await {
            error!(error = %e, "Failed to persist seen links");
        }

        let accepted = selection.items.len() as u64;
        self.news_fetched.fetch_add(accepted, Ordering::Relaxed);
        info!(
            items = accepted,
            failed_sources = selection.failed.len(),
            "Collected news"
        );
        selection
    }

    /// Count items delivered to the channel on request.
    pub fn record_posted(&self, items: usize) {
        self.news_posted.fetch_add(items as u64, Ordering::Relaxed);
    }

    pub fn news_fetched(&self) -> u64 {
        self.news_fetched.load(Ordering::Relaxed)
    }

    pub fn news_posted(&self) -> u64 {
        self.news_posted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fetcher::{DEFAULT_TIMEOUT, FeedFetcher};
    use crate::selector::tests::{article_text, rss};
    use httpmock::prelude::*;
    use std::path::Path;
    use std::sync::Arc;

    pub(crate) fn service(sources: Vec<String>, data_dir: &Path) -> NewsService {
        let selector = Selector::new(FeedFetcher::new(DEFAULT_TIMEOUT).unwrap(), 1);
        NewsService::new(selector, sources, SeenLinksStore::in_dir(data_dir))
    }

    pub(crate) async fn feed_server(links: &[&str]) -> (MockServer, String) {
        let server = MockServer::start_async().await;
        let text = article_text("transport");
        let items: Vec<(&str, &str)> = links.iter().map(|l| (*l, text.as_str())).collect();
        let body = rss(&items);
        server
            .mock_async(|when, then| {
                when.method(GET).path("/rss");
                then.status(200).body(body);
            })
            .await;
        let url = server.url("/rss");
        (server, url)
    }

    #[tokio::test]
    async fn test_collect_persists_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let (_server, url) = feed_server(&["https://n.example/1", "https://n.example/2"]).await;
        let news = service(vec![url], dir.path());

        let first = news.collect(6).await;
        assert_eq!(first.items.len(), 1);
        assert_eq!(news.news_fetched(), 1);

        let stored = SeenLinksStore::in_dir(dir.path()).load().await.unwrap();
        assert!(stored.contains(&first.items[0].link));

        let second = news.collect(6).await;
        assert_eq!(second.items.len(), 1);
        assert_ne!(first.items[0].link, second.items[0].link);

        let third = news.collect(6).await;
        assert!(third.items.is_empty());
        assert_eq!(news.news_fetched(), 2);
    }

    #[tokio::test]
    async fn test_seen_links_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let (_server, url) = feed_server(&["https://n.example/only"]).await;

        let before = service(vec![url.clone()], dir.path()).collect(6).await;
        assert_eq!(before.items.len(), 1);

        let after = service(vec![url], dir.path()).collect(6).await;
        assert!(after.items.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_collects_never_share_a_link() {
        let dir = tempfile::tempdir().unwrap();
        let (_server, url) = feed_server(&["https://n.example/shared"]).await;
        let news = Arc::new(service(vec![url], dir.path()));

        let (a, b) = tokio::join!(news.collect(6), news.collect(6));
        assert_eq!(a.items.len() + b.items.len(), 1);
    }

    #[test]
    fn test_record_posted() {
        let dir = tempfile::tempdir().unwrap();
        let news = service(Vec::new(), dir.path());
        news.record_posted(4);
        news.record_posted(2);
        assert_eq!(news.news_posted(), 6);
        assert_eq!(news.news_fetched(), 0);
    }
}
