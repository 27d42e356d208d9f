//! Integration tests for `AqiPipeline::run` against fake feeds and a fake
//! Gemini endpoint.

use aqi_relay::aqi::{AqiCategory, AqiPipeline, PipelineError, INSTRUCTION};
use aqi_relay::config::{FeedKind, FeedSource, GeminiConfig, SummarySelection};
use aqi_relay::llm::{GeminiClient, LlmError};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FORECAST_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Forecast</title>
  <item><title>Today</title><link>https://airnow.example/today</link><summary>S-today</summary></item>
  <item><title>Tomorrow</title><link>https://airnow.example/tomorrow</link><summary>S-tomorrow</summary></item>
</channel></rss>"#;

const REALTIME_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Real Time</title>
  <item><title>Now</title><link>https://airnow.example/now</link><description>S-now</description></item>
  <item><title>Earlier</title><link>https://airnow.example/earlier</link><description>S-earlier</description></item>
</channel></rss>"#;

async fn feed_server() -> MockServer {
    let server = MockServer::start().await;
    for (name, body) in [("forecast", FORECAST_RSS), ("realtime", REALTIME_RSS)] {
        Mock::given(method("GET"))
            .and(path(format!("/{}.xml", name)))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
    }
    server
}

fn sources(feeds: &MockServer) -> Vec<FeedSource> {
    vec![
        FeedSource {
            kind: FeedKind::Forecast,
            url: format!("{}/forecast.xml", feeds.uri()),
        },
        FeedSource {
            kind: FeedKind::RealTime,
            url: format!("{}/realtime.xml", feeds.uri()),
        },
    ]
}

fn pipeline(
    feeds: &MockServer,
    gemini: &MockServer,
    models: &[&str],
    selection: SummarySelection,
) -> AqiPipeline {
    let http = reqwest::Client::new();
    let config = GeminiConfig {
        base_url: gemini.uri(),
        models: models.iter().map(|m| m.to_string()).collect(),
        api_key: None,
    };
    let key = SecretString::from("test-key".to_string());
    let llm = GeminiClient::new(http.clone(), &config, Some(key)).unwrap();
    AqiPipeline::new(http, sources(feeds), selection, llm)
}

fn prompt_body(summary: &str) -> serde_json::Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": format!("{}{}", summary, INSTRUCTION) }] }]
    })
}

fn reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{ "content": { "parts": [{ "text": text }] } }]
    }))
}

#[tokio::test]
async fn test_latest_per_feed_sends_first_summary_of_each_feed() {
    let feeds = feed_server().await;
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_json(prompt_body("S-today\n\nS-now")))
        .respond_with(reply("[12, 180, 350]"))
        .expect(1)
        .mount(&gemini)
        .await;

    let report = pipeline(
        &feeds,
        &gemini,
        &["gemini-2.5-flash"],
        SummarySelection::LatestPerFeed,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(
        report.readings.iter().map(|r| r.category).collect::<Vec<_>>(),
        vec![
            AqiCategory::Good,
            AqiCategory::Unhealthy,
            AqiCategory::Hazardous
        ]
    );
    assert_eq!(report.feeds.len(), 2);
    assert_eq!(report.feeds[0].entries, Some(2));
    assert_eq!(report.feeds[1].title.as_deref(), Some("Real Time"));
}

#[tokio::test]
async fn test_last_entry_sends_only_final_summary() {
    let feeds = feed_server().await;
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_json(prompt_body("S-earlier")))
        .respond_with(reply("[1, 2, 3]"))
        .expect(1)
        .mount(&gemini)
        .await;

    let report = pipeline(
        &feeds,
        &gemini,
        &["gemini-2.5-flash"],
        SummarySelection::LastEntry,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.raw, "[1, 2, 3]");
}

#[tokio::test]
async fn test_unavailable_model_falls_through_to_next() {
    let feeds = feed_server().await;
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&gemini)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
        .respond_with(reply("[40, 60, 120]"))
        .expect(1)
        .mount(&gemini)
        .await;

    let report = pipeline(
        &feeds,
        &gemini,
        &["gemini-2.5-flash", "gemini-2.0-flash"],
        SummarySelection::LatestPerFeed,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(
        report.readings.iter().map(|r| r.aqi).collect::<Vec<_>>(),
        vec![40, 60, 120]
    );
}

#[tokio::test]
async fn test_fenced_reply_is_accepted() {
    let feeds = feed_server().await;
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(reply("```json\n[5, 6, 7]\n```"))
        .mount(&gemini)
        .await;

    let report = pipeline(
        &feeds,
        &gemini,
        &["gemini-2.5-flash"],
        SummarySelection::LatestPerFeed,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.raw, "```json\n[5, 6, 7]\n```");
    assert_eq!(report.readings.len(), 3);
}

#[tokio::test]
async fn test_two_values_is_response_error() {
    let feeds = feed_server().await;
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(reply("[5, 6]"))
        .mount(&gemini)
        .await;

    let err = pipeline(
        &feeds,
        &gemini,
        &["gemini-2.5-flash"],
        SummarySelection::LatestPerFeed,
    )
    .run()
    .await
    .unwrap_err();

    match err {
        PipelineError::Response { raw, .. } => assert_eq!(raw, "[5, 6]"),
        other => panic!("expected Response error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_key_fetches_nothing() {
    let feeds = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&feeds)
        .await;
    let gemini = MockServer::start().await;

    let http = reqwest::Client::new();
    let config = GeminiConfig {
        base_url: gemini.uri(),
        ..GeminiConfig::default()
    };
    let llm = GeminiClient::new(http.clone(), &config, None).unwrap();
    let pipeline = AqiPipeline::new(http, sources(&feeds), SummarySelection::default(), llm);

    let err = pipeline.run().await.unwrap_err();

    assert!(matches!(err, PipelineError::Llm(LlmError::MissingApiKey)));
}
