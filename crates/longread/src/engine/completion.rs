//! Per-window completion requests with retry and backoff.
//!
//! [`CompletionClient`] turns a [`ContentWindow`] into a chat request and
//! sends it through a [`CompletionService`]. Transient failures are retried
//! according to the [`RetryPolicy`]; every scheduled retry is reported as an
//! [`EngineEvent::RetryScheduled`] before the wait starts. Waits and
//! in-flight requests both give way to cancellation.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::retry::{RetryDecision, RetryPolicy, RetryState};
use crate::api::service::CompletionService;
use crate::context::window::ContentWindow;
use crate::engine::config::{EngineConfig, SamplingConfig};
use crate::engine::events::{EngineEvent, EventHandler};
use crate::engine::prompt::PromptBuilder;
use crate::error::CompletionError;
use crate::{ChatRequest, UsageInfo};

/// A successful completion and what it took to get it.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Option<UsageInfo>,
    /// Requests sent, including failed ones.
    pub attempts: u32,
}

impl Completion {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Sends windows to a completion service.
pub struct CompletionClient<'s> {
    service: &'s dyn CompletionService,
    prompts: PromptBuilder,
    model: Option<String>,
    sampling: SamplingConfig,
    max_tokens: u32,
    policy: RetryPolicy,
}

impl<'s> CompletionClient<'s> {
    pub fn new(service: &'s dyn CompletionService, config: &EngineConfig) -> Self {
        Self {
            service,
            prompts: config.prompt_builder(),
            model: config.model.clone(),
            sampling: config.sampling.clone(),
            max_tokens: config.level.max_response_tokens,
            policy: config.retry.clone(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        self.prompts.system_prompt()
    }

    /// The chat request for one window.
    pub fn build_request(&self, window: &ContentWindow<'_>) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: self.prompts.messages(window),
            max_tokens: self.max_tokens,
            temperature: self.sampling.temperature,
            top_p: self.sampling.top_p,
            frequency_penalty: Some(self.sampling.frequency_penalty),
            presence_penalty: Some(self.sampling.presence_penalty),
            stop: None,
            stream: false,
        }
    }

    /// Summarize one window, retrying transient failures.
    pub async fn summarize_window(
        &self,
        window: &ContentWindow<'_>,
        handler: &dyn EventHandler,
        cancel: &CancellationToken,
    ) -> Result<Completion, CompletionError> {
        let request = self.build_request(window);
        let mut state = RetryState::new();

        loop {
            state.begin_attempt();
            debug!(
                "Chunk {} attempt {}: {} window chars",
                window.index + 1,
                state.attempts,
                window.chars()
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
                result = self.service.complete(&request) => result,
            };

            let error = match result {
                Ok(response) => {
                    return Ok(Completion {
                        text: response.text,
                        usage: response.usage,
                        attempts: state.attempts,
                    });
                }
                Err(e) => e,
            };

            match state.on_failure(&error, &self.policy) {
                RetryDecision::GiveUp(err) => {
                    debug!(
                        "Chunk {} giving up after {} attempt(s): {err}",
                        window.index + 1,
                        state.attempts
                    );
                    return Err(err);
                }
                RetryDecision::Retry(delay) => {
                    let message = error.to_string();
                    handler.on_event(&EngineEvent::RetryScheduled {
                        chunk_index: window.index,
                        attempt: state.attempts,
                        kind: error.kind(),
                        delay,
                        message: &message,
                    });
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
