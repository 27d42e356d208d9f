//! Configuration file parser for `aqi-relay.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown top-level keys are accepted but logged, to surface typos.
//! The Gemini API key is read from `GEMINI_API_KEY` first and the file second;
//! there is no built-in key.
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::util::{validate_base_url, validate_http_url, UrlValidationError};

/// Environment variable holding the Gemini API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
];
// EnviroFlash layout for one area; set [[feeds]] for the deployment area
const DEFAULT_FEEDS: &[(FeedKind, &str)] = &[
    (
        FeedKind::Forecast,
        "https://feeds.enviroflash.info/rss/forecast/33.xml",
    ),
    (
        FeedKind::ActionDay,
        "https://feeds.enviroflash.info/rss/actionday/33.xml",
    ),
    (
        FeedKind::RealTime,
        "https://feeds.enviroflash.info/rss/realtime/33.xml",
    ),
];

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: UrlValidationError,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Which air-quality bulletin a feed carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Forecast,
    ActionDay,
    RealTime,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FeedKind::Forecast => "forecast",
            FeedKind::ActionDay => "action_day",
            FeedKind::RealTime => "real_time",
        })
    }
}

/// One configured RSS source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub kind: FeedKind,
    pub url: String,
}

/// How entry summaries are chosen for the prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySelection {
    /// First entry with a summary from every fetched feed, in config order.
    #[default]
    LatestPerFeed,
    /// Only the last entry of the last fetched feed.
    LastEntry,
}

/// Gemini API settings.
///
/// SEC-015: Custom Debug impl masks `api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// API root, without the `/v1beta` path.
    pub base_url: String,
    /// Candidate models, tried in order when one is unavailable.
    pub models: Vec<String>,
    /// API key (alternative to the GEMINI_API_KEY env var).
    /// Env var takes precedence over config file.
    pub api_key: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            api_key: None,
        }
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl GeminiConfig {
    /// Picks the env value when set and non-empty, else the file value.
    fn resolve_api_key(&self, env_value: Option<String>) -> Option<SecretString> {
        env_value
            .filter(|v| !v.trim().is_empty())
            .or_else(|| {
                self.api_key
                    .clone()
                    .filter(|v| !v.trim().is_empty())
            })
            .map(SecretString::from)
    }
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Socket address the HTTP server listens on.
    pub bind_addr: String,

    pub summary_selection: SummarySelection,

    /// Sources fetched on every `/aqi-info` request, in this order.
    pub feeds: Vec<FeedSource>,

    pub gemini: GeminiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            summary_selection: SummarySelection::default(),
            feeds: DEFAULT_FEEDS
                .iter()
                .map(|(kind, url)| FeedSource {
                    kind: *kind,
                    url: url.to_string(),
                })
                .collect(),
            gemini: GeminiConfig::default(),
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    /// - Invalid values → `Err(ConfigError::Invalid)` / `Err(ConfigError::InvalidUrl)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = ["bind_addr", "summary_selection", "feeds", "gemini"];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        let config = config.validated()?;
        tracing::info!(
            path = %path.display(),
            feeds = config.feeds.len(),
            models = config.gemini.models.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Checks values serde cannot, and drops duplicate feed URLs.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        self.feeds.retain(|feed| {
            let fresh = seen.insert(feed.url.clone());
            if !fresh {
                tracing::warn!(url = %feed.url, kind = %feed.kind, "Duplicate feed URL, ignoring");
            }
            fresh
        });

        if self.feeds.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one feed must be configured".to_string(),
            ));
        }

        for feed in &self.feeds {
            validate_http_url(&feed.url).map_err(|source| ConfigError::InvalidUrl {
                url: feed.url.clone(),
                source,
            })?;
        }

        validate_base_url(&self.gemini.base_url).map_err(|source| ConfigError::InvalidUrl {
            url: self.gemini.base_url.clone(),
            source,
        })?;

        self.gemini.models.retain(|m| !m.trim().is_empty());
        if self.gemini.models.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one Gemini model must be configured".to_string(),
            ));
        }

        Ok(self)
    }

    /// Resolves the Gemini API key: `GEMINI_API_KEY` first, then the file.
    pub fn api_key(&self) -> Option<SecretString> {
        self.gemini.resolve_api_key(std::env::var(API_KEY_ENV).ok())
    }
}

// ============================================================================
// Tests
// ============================================================================
