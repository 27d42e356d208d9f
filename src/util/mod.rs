//! Utility functions shared by the config loader and the HTTP clients.
//!
//! - **URL validation**: scheme checks for feed sources and the HTTPS policy
//!   applied to API base URLs that receive credentials
//! - **HTTP client**: the single outbound `reqwest::Client` with its redirect
//!   policy

mod http;
mod url_validator;

pub use http::http_client;
pub use url_validator::{validate_base_url, validate_http_url, UrlValidationError};
