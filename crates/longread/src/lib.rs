//! Sliding-window summarization for documents larger than a model's context.
//!
//! `longread` splits a long text into bounded chunks and summarizes them in
//! document order. Each request carries the trailing paragraphs of the
//! summary so far plus the next chunk, so the model can continue the summary
//! instead of restarting it. Memory and per-request token cost stay bounded
//! by the window size no matter how long the document is.
//!
//! # Getting started
//!
//! ```ignore
//! use longread::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api_key = std::env::var("LONGREAD_API_KEY")?;
//!     let client = OpenRouterClient::new(ServiceConfig::new(api_key))?;
//!
//!     let config = EngineConfig::for_level(SummaryLevel::Concise.name())?;
//!     let text = extract_text(&Source::parse("notes.txt"), None).await?;
//!
//!     let output = Engine::new(&client, config)
//!         .with_event_handler(&LoggingHandler)
//!         .run(&text)
//!         .await?;
//!
//!     println!("{}", output.text);
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Chunking, windows, output assembly:** [`context`]: [`ChunkSplitter`](context::splitter::ChunkSplitter),
//!   [`WindowManager`](context::window::WindowManager),
//!   [`SummaryAssembler`](context::assembler::SummaryAssembler) and the
//!   pluggable [`MarkerRules`](context::markers::MarkerRules).
//! - **Summary levels and prompts:** [`engine::level`] and [`engine::prompt`].
//! - **The run loop:** [`Engine`](engine::runner::Engine), observed through
//!   [`EventHandler`](engine::events::EventHandler).
//! - **Talking to the model:** [`api::service::CompletionService`] is the seam;
//!   [`OpenRouterClient`] implements it for any OpenAI-compatible
//!   chat-completions endpoint. Retry policy lives in [`api::retry`].
//! - **Getting text in and out:** [`extract`] and [`output`].

pub mod api;
pub mod context;
pub mod engine;
pub mod error;
pub mod extract;
pub mod output;
pub mod prelude;

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::api::retry::{
    is_inline_rate_limit_notice, is_rate_limit_message, parse_retry_after_header,
    parse_retry_after_ms_header, retry_hint_from_body,
};
use crate::api::service::{
    CompletionFuture, CompletionService, ServiceError, ServiceResponse,
};

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for summarization requests.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body (OpenAI-compatible). Unused optional fields
/// are omitted from serialization.
#[derive(Serialize, Debug, Default, Clone)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    pub stream: bool,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// How the API key is presented to the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>` (OpenRouter, OpenAI, Azure AD tokens).
    #[default]
    Bearer,
    /// `api-key: <key>`, the Azure OpenAI resource-key header.
    ApiKey,
}

impl AuthScheme {
    /// Azure OpenAI hosts get `api-key`; everything else gets a bearer token.
    pub fn for_endpoint(endpoint: &str) -> Self {
        let host = reqwest::Url::parse(endpoint)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase));
        match host {
            Some(host) if host.ends_with(".openai.azure.com") => AuthScheme::ApiKey,
            _ => AuthScheme::Bearer,
        }
    }
}

impl std::str::FromStr for AuthScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bearer" => Ok(AuthScheme::Bearer),
            "api-key" | "api_key" => Ok(AuthScheme::ApiKey),
            other => Err(format!("unknown auth scheme '{other}' (expected bearer or api-key)")),
        }
    }
}

/// Connection settings for [`OpenRouterClient`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Full chat-completions URL.
    pub endpoint: String,
    pub api_key: String,
    pub auth: AuthScheme,
    pub referer: String,
    pub title: String,
    pub timeout: Duration,
}

impl ServiceConfig {
    /// Defaults to the OpenRouter endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: OPENROUTER_URL.to_string(),
            api_key: api_key.into(),
            auth: AuthScheme::Bearer,
            referer: "https://github.com/longread-rs/longread".to_string(),
            title: "longread".to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auth(mut self, auth: AuthScheme) -> Self {
        self.auth = auth;
        self
    }
}

/// Async HTTP client for OpenAI-compatible chat-completions endpoints.
///
/// OpenRouter is the default. Azure OpenAI deployment URLs work with
/// [`AuthScheme::ApiKey`] for resource keys, or the default bearer scheme
/// for Azure AD tokens.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) config: ServiceConfig,
}

impl OpenRouterClient {
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("longread/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::Other {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ServiceResponse, ServiceError> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model.as_deref().unwrap_or("(none)"),
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let request = self.client.post(&self.config.endpoint);
        let request = match self.config.auth {
            AuthScheme::Bearer => {
                request.header("Authorization", format!("Bearer {}", self.config.api_key))
            }
            AuthScheme::ApiKey => request.header("api-key", &self.config.api_key),
        };

        let resp = request
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let text = resp.text().await.map_err(classify_transport_error)?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(classify_status(status, &headers, &text));
        }

        parse_completion(&text)
    }
}

impl CompletionService for OpenRouterClient {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> CompletionFuture<'a> {
        Box::pin(self.chat(request))
    }
}

/// Any transport-level failure counts as a network/timeout signal.
fn classify_transport_error(e: reqwest::Error) -> ServiceError {
    if e.is_builder() {
        ServiceError::Other {
            message: format!("invalid request: {e}"),
        }
    } else {
        ServiceError::Timeout {
            message: format!("request failed: {e}"),
        }
    }
}

fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> ServiceError {
    let code = status.as_u16();
    let message = format!("HTTP {status}: {body}");

    match status {
        StatusCode::TOO_MANY_REQUESTS => ServiceError::RateLimited {
            retry_after: retry_hint_from_headers(headers).or_else(|| retry_hint_from_body(body)),
            message,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Auth {
            status: code,
            message,
        },
        StatusCode::REQUEST_TIMEOUT
        | StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => ServiceError::Timeout { message },
        _ if is_content_policy_message(body) => ServiceError::ContentPolicy { message },
        _ if status.is_client_error() => ServiceError::InvalidRequest {
            status: code,
            message,
        },
        _ => ServiceError::Other { message },
    }
}

fn retry_hint_from_headers(headers: &HeaderMap) -> Option<Duration> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    header("retry-after-ms")
        .and_then(parse_retry_after_ms_header)
        .or_else(|| header("retry-after").and_then(parse_retry_after_header))
}

fn is_content_policy_message(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("content_filter")
        || lower.contains("content_policy")
        || lower.contains("content management policy")
}

/// Parse a 2xx body. Some providers report errors (including rate limits)
/// inside a success response, so the body is classified too.
fn parse_completion(text: &str) -> Result<ServiceResponse, ServiceError> {
    let parsed: RawChatResponse = serde_json::from_str(text).map_err(|e| ServiceError::Other {
        message: format!("failed to parse response: {e}"),
    })?;

    if let Some(err) = parsed.error {
        let code = err.code.map(|c| c.to_string()).unwrap_or_default();
        let message = format!("API error {code}: {}", err.message);
        if is_rate_limit_message(&err.message) || code.contains("429") {
            return Err(ServiceError::RateLimited {
                retry_after: retry_hint_from_body(&err.message),
                message,
            });
        }
        if is_content_policy_message(&message) {
            return Err(ServiceError::ContentPolicy { message });
        }
        return Err(ServiceError::Other { message });
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    let Some(choice) = parsed.choices.and_then(|c| c.into_iter().next()) else {
        debug!("LLM output: empty (no choices)");
        return Err(ServiceError::EmptyResponse);
    };

    let content = choice.message.content.unwrap_or_default();
    let content = content.trim();
    debug!("LLM output: {} chars text", content.len());

    if content.is_empty() {
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(ServiceError::ContentPolicy {
                message: "response withheld by content filter".to_string(),
            });
        }
        return Err(ServiceError::EmptyResponse);
    }

    // Azure has answered quota overruns with a 200 whose only choice is the
    // throttling notice.
    if is_inline_rate_limit_notice(content) {
        return Err(ServiceError::RateLimited {
            retry_after: retry_hint_from_body(content),
            message: content.to_string(),
        });
    }

    Ok(ServiceResponse {
        text: content.to_string(),
        usage: parsed.usage,
        finish_reason: choice.finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::service::ServiceErrorKind;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content, "hello");

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(MessageRole::Assistant.to_string(), "assistant");
    }

    #[test]
    fn chat_request_skips_unset_fields() {
        let req = ChatRequest {
            model: Some("test-model".into()),
            messages: vec![Message::user("hi")],
            max_tokens: 100,
            temperature: 0.4,
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("top_p").is_none());
        assert!(json.get("stop").is_none());
        assert_eq!(json["max_tokens"], 100);
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn auth_scheme_follows_azure_hosts() {
        assert_eq!(
            AuthScheme::for_endpoint(
                "https://acme.openai.azure.com/openai/deployments/gpt4/chat/completions?api-version=2024-02-01"
            ),
            AuthScheme::ApiKey
        );
        assert_eq!(AuthScheme::for_endpoint(OPENROUTER_URL), AuthScheme::Bearer);
        assert_eq!(AuthScheme::for_endpoint("not a url"), AuthScheme::Bearer);
        assert_eq!("API-KEY".parse::<AuthScheme>(), Ok(AuthScheme::ApiKey));
        assert!("basic".parse::<AuthScheme>().is_err());
    }

    #[test]
    fn parse_success_trims_content() {
        let body = r#"{"choices":[{"message":{"content":"  A summary.  "},"finish_reason":"stop"}],
                       "usage":{"prompt_tokens":10,"completion_tokens":3,"total_tokens":13}}"#;
        let resp = parse_completion(body).unwrap();
        assert_eq!(resp.text, "A summary.");
        assert_eq!(resp.usage.unwrap().completion_tokens, Some(3));
    }

    #[test]
    fn parse_empty_choices_is_empty_response() {
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert_eq!(err.kind(), ServiceErrorKind::EmptyResponse);
    }

    #[test]
    fn parse_content_filter_finish_is_policy_error() {
        let body = r#"{"choices":[{"message":{"content":null},"finish_reason":"content_filter"}]}"#;
        assert_eq!(
            parse_completion(body).unwrap_err().kind(),
            ServiceErrorKind::ContentPolicy
        );
    }

    #[test]
    fn rate_limit_text_in_success_body_is_rate_limited() {
        let body = r#"{"choices":[{"message":{"content":"You have exceeded token rate limit. Please retry after 9 seconds."}}]}"#;
        let err = parse_completion(body).unwrap_err();
        assert_eq!(err.kind(), ServiceErrorKind::RateLimited);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(9)));
    }

    #[test]
    fn summary_about_rate_limits_is_accepted() {
        let body = r#"{"choices":[{"message":{"content":"The API returns HTTP 429 Too Many Requests when clients exceed quotas; a rate limit exceeded error tells them to retry after 30 seconds."},"finish_reason":"stop"}]}"#;
        let resp = parse_completion(body).unwrap();
        assert!(resp.text.starts_with("The API returns HTTP 429"));
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn embedded_error_object_is_classified() {
        let body = r#"{"error":{"message":"Rate limit exceeded: free-models-per-min","code":429}}"#;
        assert_eq!(
            parse_completion(body).unwrap_err().kind(),
            ServiceErrorKind::RateLimited
        );
    }

    #[test]
    fn status_classification() {
        let headers = HeaderMap::new();
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, &headers, "bad key").kind(),
            ServiceErrorKind::Auth
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, &headers, "").kind(),
            ServiceErrorKind::Timeout
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, &headers, "context too long").kind(),
            ServiceErrorKind::InvalidRequest
        );
        assert_eq!(
            classify_status(
                StatusCode::BAD_REQUEST,
                &headers,
                r#"{"error":{"code":"content_filter"}}"#
            )
            .kind(),
            ServiceErrorKind::ContentPolicy
        );
    }

    #[test]
    fn rate_limit_status_reads_header_hint() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", "12".parse().unwrap());
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, &headers, "slow down");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));

        headers.insert("retry-after-ms", "1500".parse().unwrap());
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, &headers, "slow down");
        assert_eq!(err.retry_after(), Some(Duration::from_millis(1500)));
    }
}
