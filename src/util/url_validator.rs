use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// A credential-carrying base URL is plain HTTP on a non-local host.
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

/// Validates a URL string for use as a feed source.
///
/// Feed sources are operator-supplied, so only the scheme is checked:
/// `file://`, `ftp://` and friends are rejected, any http(s) host is accepted.
///
/// # Examples
///
/// ```
/// use aqi_relay::util::validate_http_url;
///
/// let url = validate_http_url("https://example.com/rss/forecast.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_http_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_http_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

/// Validates the base URL of an API that is sent an API key.
///
/// SEC-002: HTTPS is required so the key never travels in clear text. Plain
/// HTTP is allowed only for localhost, which is what the test fakes bind to.
pub fn validate_base_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = validate_http_url(url_str)?;

    if url.scheme() == "https" {
        return Ok(url);
    }

    match url.host_str() {
        Some("localhost") | Some("127.0.0.1") | Some("[::1]") => {
            tracing::warn!(base_url = %url, "Using non-HTTPS API base URL (localhost only)");
            Ok(url)
        }
        _ => Err(UrlValidationError::InsecureBaseUrl),
    }
}
