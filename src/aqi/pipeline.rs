use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::prompt::{build_prompt, select_summary};
use super::reading::{parse_aqi_values, AqiParseError, AqiReading};
use crate::config::{FeedKind, FeedSource, SummarySelection};
use crate::feed::{fetch_all, Feed, FeedOutcome};
use crate::llm::{GeminiClient, LlmError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("All {} feeds failed", .0.len())]
    AllFeedsFailed(Vec<FeedStatus>),
    #[error("No feed entry carried a summary")]
    NoSummaries,
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("Malformed model response: {source}")]
    Response {
        raw: String,
        #[source]
        source: AqiParseError,
    },
}

/// Per-source summary of a fetch, reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedStatus {
    pub kind: FeedKind,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&FeedOutcome> for FeedStatus {
    fn from(outcome: &FeedOutcome) -> Self {
        let (title, entries, error) = match &outcome.result {
            Ok(feed) => (Some(feed.title.clone()), Some(feed.len()), None),
            Err(e) => (None, None, Some(e.to_string())),
        };
        Self {
            kind: outcome.source.kind,
            url: outcome.source.url.clone(),
            title,
            entries,
            error,
        }
    }
}

/// Body of a successful `/aqi-info` call.
#[derive(Debug, Clone, Serialize)]
pub struct AqiReport {
    /// Model output exactly as received.
    pub raw: String,
    pub readings: Vec<AqiReading>,
    pub feeds: Vec<FeedStatus>,
    pub generated_at: DateTime<Utc>,
}

/// fetch → extract → normalize → parse, run once per request.
///
/// Holds no per-request state; every [`run`](Self::run) fetches all sources
/// again.
pub struct AqiPipeline {
    http: reqwest::Client,
    sources: Vec<FeedSource>,
    selection: SummarySelection,
    llm: GeminiClient,
}

impl AqiPipeline {
    pub fn new(
        http: reqwest::Client,
        sources: Vec<FeedSource>,
        selection: SummarySelection,
        llm: GeminiClient,
    ) -> Self {
        Self {
            http,
            sources,
            selection,
            llm,
        }
    }

    pub async fn run(&self) -> Result<AqiReport, PipelineError> {
        // Checked before any feed is fetched
        if !self.llm.has_api_key() {
            return Err(LlmError::MissingApiKey.into());
        }

        let outcomes = fetch_all(&self.http, &self.sources).await;
        let statuses: Vec<FeedStatus> = outcomes.iter().map(FeedStatus::from).collect();

        let feeds: Vec<&Feed> = outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .collect();

        if feeds.is_empty() {
            return Err(PipelineError::AllFeedsFailed(statuses));
        }

        let summary =
            select_summary(feeds.iter().copied(), self.selection).ok_or(PipelineError::NoSummaries)?;
        let prompt = build_prompt(&summary);

        tracing::debug!(
            feeds = feeds.len(),
            prompt_chars = prompt.len(),
            selection = ?self.selection,
            "Sending summary to model"
        );

        let raw = self.llm.generate(&prompt).await?;

        let readings = match parse_aqi_values(&raw) {
            Ok(readings) => readings,
            Err(source) => {
                let preview: String = raw.chars().take(200).collect();
                tracing::warn!(
                    error = %source,
                    preview = %preview,
                    "Model response is not an AQI array"
                );
                return Err(PipelineError::Response { raw, source });
            }
        };

        let values: Vec<u32> = readings.iter().map(|r| r.aqi).collect();
        tracing::info!(values = ?values, "AQI values extracted");

        Ok(AqiReport {
            raw,
            readings,
            feeds: statuses,
            generated_at: Utc::now(),
        })
    }
}
