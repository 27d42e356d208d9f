use crate::config::FeedSource;
use crate::feed::parser::{parse_feed, Feed, ParseError};
use futures::StreamExt;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching one feed.
///
/// A fetch error only ever describes a single source; the other sources of a
/// batch are unaffected.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Feed XML could not be parsed as RSS or Atom
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Outcome of fetching one configured source.
#[derive(Debug)]
pub struct FeedOutcome {
    pub source: FeedSource,
    pub result: Result<Feed, FetchError>,
}

/// Fetches every source in order, one after another.
///
/// Failures are recorded per source and logged; they never stop the remaining
/// sources from being fetched. The returned outcomes follow the input order.
pub async fn fetch_all(client: &reqwest::Client, sources: &[FeedSource]) -> Vec<FeedOutcome> {
    let mut outcomes = Vec::with_capacity(sources.len());

    for source in sources {
        let result = fetch_feed(client, &source.url).await;

        match &result {
            Ok(feed) => tracing::debug!(
                kind = %source.kind,
                url = %source.url,
                entries = feed.len(),
                "Fetched feed"
            ),
            Err(e) => tracing::warn!(
                kind = %source.kind,
                url = %source.url,
                error = %e,
                "Feed fetch failed"
            ),
        }

        outcomes.push(FeedOutcome {
            source: source.clone(),
            result,
        });
    }

    outcomes
}

/// Fetches and parses a single feed.
///
/// # Errors
///
/// - [`FetchError::Network`] - Connection or TLS errors
/// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
/// - [`FetchError::ResponseTooLarge`] - Response exceeded 10MB
/// - [`FetchError::IncompleteResponse`] - Body shorter than Content-Length
/// - [`FetchError::Parse`] - Invalid RSS/Atom XML
pub async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<Feed, FetchError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;

    Ok(parse_feed(&bytes)?)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
