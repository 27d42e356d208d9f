//! Air-quality feed retrieval and entry extraction.
//!
//! - [`parser`] - RSS/Atom parsing using the `feed-rs` crate
//! - [`fetcher`] - HTTP retrieval of the configured sources with per-source
//!   failure isolation
//!
//! # Example
//!
//! ```ignore
//! use aqi_relay::feed::fetch_all;
//!
//! let outcomes = fetch_all(&client, &config.feeds).await;
//! for outcome in &outcomes {
//!     if let Ok(feed) = &outcome.result {
//!         for entry in feed.entries() {
//!             println!("{} -> {:?}", entry.title, entry.summary);
//!         }
//!     }
//! }
//! ```

mod fetcher;
mod parser;

pub use fetcher::{fetch_all, fetch_feed, FeedOutcome, FetchError};
pub use parser::{parse_feed, Entry, Feed, ParseError};
