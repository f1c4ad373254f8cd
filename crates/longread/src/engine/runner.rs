//! The summarization run loop.
//!
//! [`Engine::run`] walks the chunks of a document in order. For each chunk
//! it builds a window from the held-back tail of the summary so far, sends
//! it through the [`CompletionClient`], and folds the response into the
//! [`SummaryAssembler`](crate::context::assembler::SummaryAssembler). The
//! next window is only built after the previous response has been folded
//! in, so at most one request is ever in flight.
//!
//! ```text
//! Idle -> Splitting -> Iterating -> Finalizing -> Done
//!                          |
//!                          +-> Failed { reason }
//! ```
//!
//! A failed or cancelled run returns an error and discards everything it
//! assembled. There is no partial result.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::service::CompletionService;
use crate::engine::completion::CompletionClient;
use crate::engine::config::EngineConfig;
use crate::engine::events::{EngineEvent, EventHandler, NoopHandler};
use crate::error::{CompletionError, CompletionErrorKind, RunError};

/// Lifecycle of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Splitting,
    Iterating,
    Finalizing,
    Done,
    Failed { reason: CompletionErrorKind },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed { .. })
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Splitting => write!(f, "splitting"),
            RunState::Iterating => write!(f, "iterating"),
            RunState::Finalizing => write!(f, "finalizing"),
            RunState::Done => write!(f, "done"),
            RunState::Failed { reason } => write!(f, "failed ({reason})"),
        }
    }
}

/// The result of a successful [`Engine::run`].
#[derive(Debug, Clone)]
pub struct SummaryOutput {
    /// The assembled summary, ending in a newline.
    pub text: String,
    /// Number of chunks the input was split into.
    pub chunks: usize,
    /// Requests sent, including failed attempts.
    pub completion_calls: u32,
    /// Requests beyond the first for each chunk.
    pub retries: u32,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl SummaryOutput {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Drives one summarization run at a time.
pub struct Engine<'a> {
    service: &'a dyn CompletionService,
    config: EngineConfig,
    handler: &'a dyn EventHandler,
    cancel: CancellationToken,
    state: RunState,
}

impl<'a> Engine<'a> {
    pub fn new(service: &'a dyn CompletionService, config: EngineConfig) -> Self {
        Self {
            service,
            config,
            handler: &NoopHandler,
            cancel: CancellationToken::new(),
            state: RunState::Idle,
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.handler = handler;
        self
    }

    /// Abort the run when `token` is cancelled. Checked before every chunk,
    /// while a request is in flight, and during retry waits.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Summarize `text`. Every run builds fresh components, so an engine can
    /// be reused for several documents one after another. An invalid
    /// configuration fails with [`RunError::Config`] before any request.
    pub async fn run(&mut self, text: &str) -> Result<SummaryOutput, RunError> {
        self.state = RunState::Idle;
        if let Err(e) = self.config.validate() {
            let error = RunError::Config(e);
            self.handler.on_event(&EngineEvent::Failed { error: &error });
            return Err(error);
        }
        if text.trim().is_empty() {
            let error = RunError::EmptyInput;
            self.handler.on_event(&EngineEvent::Failed { error: &error });
            return Err(error);
        }

        self.transition(RunState::Splitting);
        let chunks = self.config.splitter().split(text);
        let total_chunks = chunks.clone().count();
        let total_chars = text.chars().count();
        self.handler.on_event(&EngineEvent::RunStarted {
            level: &self.config.level.name,
            total_chunks,
            input_chars: total_chars,
        });

        self.transition(RunState::Iterating);
        let windows = self.config.window_manager();
        let mut assembler = self.config.assembler();
        let client = CompletionClient::new(self.service, &self.config);

        let mut processed_chars = 0;
        let mut completion_calls = 0;
        let mut retries = 0;
        let mut prompt_tokens = 0u64;
        let mut completion_tokens = 0u64;

        for chunk in chunks {
            if self.cancel.is_cancelled() {
                return Err(self.fail(RunError::Cancelled {
                    chunk_index: chunk.index,
                }));
            }

            let prior = assembler.pending_text();
            let window = windows.next_window(&prior, &chunk);
            assembler.carry(window.tail.whole_paragraphs);

            self.handler.on_event(&EngineEvent::ChunkStarted {
                index: chunk.index,
                total: total_chunks,
                chunk_chars: window.chunk.chars().count(),
                tail_chars: window.tail.chars(),
            });

            let completion = match client
                .summarize_window(&window, self.handler, &self.cancel)
                .await
            {
                Ok(completion) => completion,
                Err(CompletionError::Cancelled) => {
                    return Err(self.fail(RunError::Cancelled {
                        chunk_index: chunk.index,
                    }));
                }
                Err(source) => {
                    return Err(self.fail(RunError::Completion {
                        chunk_index: chunk.index,
                        total_chunks,
                        source,
                    }));
                }
            };

            completion_calls += completion.attempts;
            retries += completion.retries();
            if let Some(ref usage) = completion.usage {
                let prompt = usage.prompt_tokens.unwrap_or(0);
                let generated = usage.completion_tokens.unwrap_or(0);
                prompt_tokens += u64::from(prompt);
                completion_tokens += u64::from(generated);
                self.handler.on_event(&EngineEvent::TokenUsage {
                    prompt_tokens: prompt,
                    completion_tokens: generated,
                });
            }

            let response_chars = assembler.append(&completion.text);
            self.handler.on_event(&EngineEvent::ChunkSummarized {
                index: chunk.index,
                total: total_chunks,
                response_chars,
            });

            processed_chars += chunk.text.chars().count();
            self.handler.on_event(&EngineEvent::Progress {
                processed_chars,
                total_chars,
            });
        }

        self.transition(RunState::Finalizing);
        let summary = assembler.finalize();
        self.transition(RunState::Done);

        self.handler.on_event(&EngineEvent::Finished {
            summary_chars: summary.chars().count(),
            completion_calls,
        });

        Ok(SummaryOutput {
            text: summary,
            chunks: total_chunks,
            completion_calls,
            retries,
            prompt_tokens,
            completion_tokens,
        })
    }

    fn transition(&mut self, to: RunState) {
        let from = std::mem::replace(&mut self.state, to);
        debug!("Run state {from} -> {}", self.state);
        self.handler.on_event(&EngineEvent::StateChanged {
            from: &from,
            to: &self.state,
        });
    }

    fn fail(&mut self, error: RunError) -> RunError {
        let reason = error.kind().unwrap_or(CompletionErrorKind::Fatal);
        self.transition(RunState::Failed { reason });
        self.handler.on_event(&EngineEvent::Failed { error: &error });
        error
    }
}
