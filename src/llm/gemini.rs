use crate::config::GeminiConfig;
use crate::util::{validate_base_url, UrlValidationError};
use futures::StreamExt;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_RESPONSE_SIZE: usize = 1024 * 1024; // 1MB
const MAX_ERROR_BODY_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Gemini API key is not configured (set GEMINI_API_KEY)")]
    MissingApiKey,
    #[error("Gemini rejected the API key (status {0})")]
    Unauthorized(u16),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("No configured model is available: {}", .0.join(", "))]
    ModelsUnavailable(Vec<String>),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Prompt blocked by Gemini: {0}")]
    Blocked(String),
    #[error("Gemini returned no text")]
    EmptyResponse,
    #[error(transparent)]
    InvalidBaseUrl(#[from] UrlValidationError),
}

impl LlmError {
    /// True for a missing or rejected credential.
    pub fn is_authorization(&self) -> bool {
        matches!(self, LlmError::MissingApiKey | LlmError::Unauthorized(_))
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

impl<'a> GenerateContentRequest<'a> {
    fn user_text(text: &'a str) -> Self {
        Self {
            contents: [RequestContent {
                role: "user",
                parts: [RequestPart { text }],
            }],
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Client for the Gemini `generateContent` endpoint.
///
/// Built once at startup from [`GeminiConfig`]; the key is passed in
/// explicitly and never read from the environment here.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    models: Vec<String>,
    api_key: Option<SecretString>,
}

impl GeminiClient {
    /// Creates a client. A `None` key is accepted so that callers get
    /// [`LlmError::MissingApiKey`] per request instead of a startup panic.
    ///
    /// # Errors
    ///
    /// [`LlmError::InvalidBaseUrl`] when the base URL is not HTTPS (localhost
    /// excepted).
    pub fn new(
        http: reqwest::Client,
        config: &GeminiConfig,
        api_key: Option<SecretString>,
    ) -> Result<Self, LlmError> {
        validate_base_url(&config.base_url)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            models: config.models.clone(),
            api_key,
        })
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Sends `prompt` as a single user turn and returns the reply text as-is.
    ///
    /// Models are tried in configured order. Only a 404 (model unknown to
    /// this API version) moves on to the next model; every other failure is
    /// returned immediately and nothing is retried.
    pub async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let key = self.api_key.as_ref().ok_or(LlmError::MissingApiKey)?;

        for model in &self.models {
            match self.generate_with_model(model, prompt, key).await {
                Err(LlmError::HttpStatus(404)) => {
                    tracing::debug!(model = %model, "Gemini model unavailable, trying next");
                }
                Ok(text) => {
                    tracing::debug!(model = %model, chars = text.len(), "Gemini response received");
                    return Ok(text);
                }
                Err(e) => return Err(e),
            }
        }

        Err(LlmError::ModelsUnavailable(self.models.clone()))
    }

    async fn generate_with_model(
        &self,
        model: &str,
        prompt: &str,
        key: &SecretString,
    ) -> Result<String, LlmError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", key.expose_secret())
            .json(&GenerateContentRequest::user_text(prompt))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(LlmError::Unauthorized(status.as_u16()));
        }

        if !status.is_success() {
            let body = read_limited_text(response, MAX_ERROR_BODY_SIZE)
                .await
                .unwrap_or_default();
            // Gemini reports a bad key as 400 INVALID_ARGUMENT
            if status == StatusCode::BAD_REQUEST && body.contains("API_KEY_INVALID") {
                return Err(LlmError::Unauthorized(status.as_u16()));
            }
            if status != StatusCode::NOT_FOUND {
                tracing::warn!(model = %model, status = %status, "Gemini request failed");
            }
            return Err(LlmError::HttpStatus(status.as_u16()));
        }

        let body = read_limited_text(response, MAX_RESPONSE_SIZE).await?;
        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;

        response_text(parsed)
    }
}

fn response_text(response: GenerateContentResponse) -> Result<String, LlmError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(LlmError::Blocked(reason));
    }

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(LlmError::EmptyResponse);
    }

    Ok(text)
}

async fn read_limited_text(response: reqwest::Response, limit: usize) -> Result<String, LlmError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(LlmError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        // SEC-003: Use saturating_add to prevent integer overflow in size check
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(LlmError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| LlmError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str, models: &[&str]) -> GeminiConfig {
        GeminiConfig {
            base_url: base_url.to_string(),
            models: models.iter().map(|m| m.to_string()).collect(),
            api_key: None,
        }
    }

    fn client(server: &MockServer, models: &[&str]) -> GeminiClient {
        GeminiClient::new(
            reqwest::Client::new(),
            &config(&server.uri(), models),
            Some(SecretString::from("test-key".to_string())),
        )
        .unwrap()
    }

    fn text_reply(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        })
    }

    #[tokio::test]
    async fn test_generate_sends_prompt_and_key() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_json(json!({
                "contents": [{ "role": "user", "parts": [{ "text": "S1 instruction" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("[42, 57, 101]")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let gemini = client(&mock_server, &["gemini-2.5-flash"]);
        let text = gemini.generate("S1 instruction").await.unwrap();

        assert_eq!(text, "[42, 57, 101]");
    }

    #[tokio::test]
    async fn test_multiple_parts_are_concatenated() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "[42, " }, { "text": "57, 101]" }] } }]
            })))
            .mount(&mock_server)
            .await;

        let text = client(&mock_server, &["m"]).generate("p").await.unwrap();

        assert_eq!(text, "[42, 57, 101]");
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("[1, 2, 3]")))
            .expect(0)
            .mount(&mock_server)
            .await;

        let gemini =
            GeminiClient::new(reqwest::Client::new(), &config(&mock_server.uri(), &["m"]), None)
                .unwrap();

        let err = gemini.generate("p").await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
        assert!(err.is_authorization());
        assert!(!gemini.has_api_key());
    }

    #[tokio::test]
    async fn test_rejected_key_is_unauthorized() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, &["m"]).generate("p").await.unwrap_err();

        assert!(matches!(err, LlmError::Unauthorized(403)));
    }

    #[tokio::test]
    async fn test_api_key_invalid_400_is_unauthorized() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": 400,
                    "message": "API key not valid. Please pass a valid API key.",
                    "status": "INVALID_ARGUMENT",
                    "details": [{ "reason": "API_KEY_INVALID" }]
                }
            })))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, &["m"]).generate("p").await.unwrap_err();

        assert!(matches!(err, LlmError::Unauthorized(400)));
    }

    #[tokio::test]
    async fn test_other_400_is_http_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, &["m"]).generate("p").await.unwrap_err();

        assert!(matches!(err, LlmError::HttpStatus(400)));
        assert!(!err.is_authorization());
    }

    #[tokio::test]
    async fn test_unavailable_model_falls_through() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("[1, 2, 3]")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let gemini = client(&mock_server, &["gemini-2.5-flash", "gemini-2.0-flash"]);

        assert_eq!(gemini.generate("p").await.unwrap(), "[1, 2, 3]");
    }

    #[tokio::test]
    async fn test_all_models_unavailable() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, &["a", "b"]).generate("p").await.unwrap_err();

        match err {
            LlmError::ModelsUnavailable(models) => assert_eq!(models, vec!["a", "b"]),
            e => panic!("Expected ModelsUnavailable, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, &["a", "b"]).generate("p").await.unwrap_err();

        assert!(matches!(err, LlmError::HttpStatus(503)));
    }

    #[tokio::test]
    async fn test_blocked_prompt() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, &["m"]).generate("p").await.unwrap_err();

        assert!(matches!(err, LlmError::Blocked(reason) if reason == "SAFETY"));
    }

    #[tokio::test]
    async fn test_no_candidates_is_empty_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, &["m"]).generate("p").await.unwrap_err();

        assert!(matches!(err, LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_non_json_body_is_decode_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, &["m"]).generate("p").await.unwrap_err();

        assert!(matches!(err, LlmError::Decode(_)));
    }

    #[test]
    fn test_http_base_url_rejected() {
        let result = GeminiClient::new(
            reqwest::Client::new(),
            &config("http://evil.com", &["m"]),
            Some(SecretString::from("k".to_string())),
        );

        assert!(matches!(
            result,
            Err(LlmError::InvalidBaseUrl(UrlValidationError::InsecureBaseUrl))
        ));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let gemini = GeminiClient::new(
            reqwest::Client::new(),
            &config("https://generativelanguage.googleapis.com/", &["m"]),
            None,
        )
        .unwrap();

        assert_eq!(gemini.base_url, "https://generativelanguage.googleapis.com");
        assert_eq!(gemini.models(), ["m".to_string()]);
    }
}
