use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use aqi_relay::aqi::AqiPipeline;
use aqi_relay::config::{Config, API_KEY_ENV};
use aqi_relay::llm::GeminiClient;
use aqi_relay::server::{self, AppState};
use aqi_relay::util::http_client;

#[derive(Parser, Debug)]
#[command(
    name = "aqi-relay",
    about = "Serves AQI values extracted from air-quality RSS feeds"
)]
struct Args {
    /// Config file (TOML). Missing file means defaults.
    #[arg(long, value_name = "FILE", default_value = "aqi-relay.toml")]
    config: PathBuf,

    /// Listen address, overrides `bind_addr` from the config file
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from '{}'", args.config.display()))?;

    let bind = args.bind.as_deref().unwrap_or(&config.bind_addr);
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid listen address '{}'", bind))?;

    let api_key = config.api_key().with_context(|| {
        format!(
            "No Gemini API key: set {} or gemini.api_key in '{}'",
            API_KEY_ENV,
            args.config.display()
        )
    })?;

    let http = http_client().context("Failed to build HTTP client")?;
    let llm = GeminiClient::new(http.clone(), &config.gemini, Some(api_key))
        .context("Failed to create Gemini client")?;

    tracing::info!(
        feeds = config.feeds.len(),
        models = ?llm.models(),
        selection = ?config.summary_selection,
        "Configuration loaded"
    );

    let pipeline = AqiPipeline::new(http, config.feeds, config.summary_selection, llm);

    server::serve(addr, AppState::new(pipeline))
        .await
        .context("HTTP server failed")
}
