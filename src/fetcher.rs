//! HTTP retrieval of raw feed documents.
//!
//! One GET per call, a user agent picked at random from a small browser pool,
//! a bounded timeout, certificate validation disabled for compatibility with
//! poorly configured feed hosts. Failures come back as [`FetchError`]; there
//! is no retry.

use rand::seq::IndexedRandom;
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, instrument};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Browser user agents rotated across requests.
pub const USER_AGENTS: [&str; 2] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.2 Safari/605.1.15",
];

/// Why a feed document could not be retrieved.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with something other than 200.
    #[error("HTTP {0}")]
    Status(u16),

    /// Connection, TLS, timeout or body decoding failure.
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
}

/// Retrieves feed documents over HTTP.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    /// Build a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { client })
    }

    /// Fetch the raw body of `url`. Only HTTP 200 counts as success.
    ///
    /// The body is left undecoded so the feed parser can honour the
    /// encoding declared in the XML prolog.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let user_agent = random_user_agent();
        let t0 = Instant::now();

        let result = async {
            let response = self
                .client
                .get(url)
                .header(USER_AGENT, user_agent)
                .send()
                .await?;
            let status = response.status();
            if status != StatusCode::OK {
                return Err(FetchError::Status(status.as_u16()));
            }
            Ok::<Vec<u8>, FetchError>(response.bytes().await?.to_vec())
        }
        .await;

        match &result {
            Ok(body) => debug!(
                bytes = body.len(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "Fetched feed document"
            ),
            Err(e) => error!(
                error = %e,
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "Feed fetch failed"
            ),
        }
        result
    }
}

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}
