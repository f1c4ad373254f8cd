//! The completion-service boundary.
//!
//! [`CompletionService`] is the seam between the summarization engine and
//! whatever generates text. [`OpenRouterClient`](crate::OpenRouterClient)
//! implements it over HTTP; tests implement it with scripted responses.
//! Every failure is reported as a [`ServiceError`] whose [`kind`](ServiceError::kind)
//! drives the retry policy in [`CompletionClient`](crate::engine::completion::CompletionClient).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::{ChatRequest, UsageInfo};

/// Boxed future returned by [`CompletionService::complete`]. Boxing keeps the
/// trait dyn-compatible so engines can hold `&dyn CompletionService`.
pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ServiceResponse, ServiceError>> + Send + 'a>>;

/// A text-generation backend.
pub trait CompletionService: Send + Sync {
    /// Send one chat request and return the generated text.
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> CompletionFuture<'a>;
}

/// Generated text plus optional token accounting.
#[derive(Debug, Clone, Default)]
pub struct ServiceResponse {
    pub text: String,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

impl ServiceResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Classification of a service failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    RateLimited,
    Timeout,
    Auth,
    ContentPolicy,
    InvalidRequest,
    EmptyResponse,
    Other,
}

impl ServiceErrorKind {
    /// Rate limits, timeouts and empty bodies are worth retrying; nothing else is.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ServiceErrorKind::RateLimited | ServiceErrorKind::Timeout | ServiceErrorKind::EmptyResponse
        )
    }
}

impl std::fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceErrorKind::RateLimited => write!(f, "rate-limited"),
            ServiceErrorKind::Timeout => write!(f, "timeout"),
            ServiceErrorKind::Auth => write!(f, "auth"),
            ServiceErrorKind::ContentPolicy => write!(f, "content-policy"),
            ServiceErrorKind::InvalidRequest => write!(f, "invalid-request"),
            ServiceErrorKind::EmptyResponse => write!(f, "empty-response"),
            ServiceErrorKind::Other => write!(f, "other"),
        }
    }
}

/// A structured failure from the completion service.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("rate limited: {message}")]
    RateLimited {
        /// Delay suggested by the service, if it sent one.
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("request timed out: {message}")]
    Timeout { message: String },

    #[error("authentication failed (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("rejected by content policy: {message}")]
    ContentPolicy { message: String },

    #[error("invalid request (HTTP {status}): {message}")]
    InvalidRequest { status: u16, message: String },

    #[error("service returned no text")]
    EmptyResponse,

    #[error("{message}")]
    Other { message: String },
}

impl ServiceError {
    pub fn kind(&self) -> ServiceErrorKind {
        match self {
            ServiceError::RateLimited { .. } => ServiceErrorKind::RateLimited,
            ServiceError::Timeout { .. } => ServiceErrorKind::Timeout,
            ServiceError::Auth { .. } => ServiceErrorKind::Auth,
            ServiceError::ContentPolicy { .. } => ServiceErrorKind::ContentPolicy,
            ServiceError::InvalidRequest { .. } => ServiceErrorKind::InvalidRequest,
            ServiceError::EmptyResponse => ServiceErrorKind::EmptyResponse,
            ServiceError::Other { .. } => ServiceErrorKind::Other,
        }
    }

    /// Suggested wait before retrying, when the service provided one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ServiceError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        ServiceError::RateLimited {
            retry_after: None,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        ServiceError::Timeout {
            message: message.into(),
        }
    }
}
