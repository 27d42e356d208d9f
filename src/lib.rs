pub mod aqi;
pub mod config;
pub mod feed;
pub mod llm;
pub mod server;
pub mod util;
