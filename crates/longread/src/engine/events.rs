//! Events and handlers for the [`Engine`](super::runner::Engine).
//!
//! The engine reports the lifecycle of a run through [`EngineEvent`]
//! variants, from splitting through each chunk's requests and retries to
//! completion or failure. Callers implement [`EventHandler`] to observe them
//! for logging, progress display, or metrics.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`EventObserver`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |
//! | Custom `impl EventHandler` | Full control |

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::service::ServiceErrorKind;
use crate::engine::runner::RunState;
use crate::error::RunError;

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the engine during a run.
#[derive(Debug)]
pub enum EngineEvent<'a> {
    /// The input was split and the loop is about to start.
    RunStarted {
        level: &'a str,
        total_chunks: usize,
        input_chars: usize,
    },
    /// The run moved to a new state.
    StateChanged { from: &'a RunState, to: &'a RunState },
    /// A window was built and its request is about to be sent.
    ChunkStarted {
        index: usize,
        total: usize,
        chunk_chars: usize,
        tail_chars: usize,
    },
    /// A transient failure will be retried after `delay`.
    RetryScheduled {
        chunk_index: usize,
        /// 1-based number of the attempt that failed.
        attempt: u32,
        kind: ServiceErrorKind,
        delay: Duration,
        message: &'a str,
    },
    /// A chunk's response was cleaned and folded into the summary.
    ChunkSummarized {
        index: usize,
        total: usize,
        response_chars: usize,
    },
    /// Token usage reported by the service for one request.
    TokenUsage {
        prompt_tokens: u32,
        completion_tokens: u32,
    },
    /// Source characters processed so far.
    Progress {
        processed_chars: usize,
        total_chars: usize,
    },
    /// The summary is complete.
    Finished {
        summary_chars: usize,
        completion_calls: u32,
    },
    /// The run aborted.
    Failed { error: &'a RunError },
}

impl EngineEvent<'_> {
    /// Percentage for `Progress` events, `None` for all others.
    pub fn progress_percent(&self) -> Option<f64> {
        if let EngineEvent::Progress {
            processed_chars,
            total_chars,
        } = self
        {
            if *total_chars == 0 {
                return Some(100.0);
            }
            Some(*processed_chars as f64 / *total_chars as f64 * 100.0)
        } else {
            None
        }
    }
}

/// Handler for engine events. The default implementation ignores them.
///
/// # Example
///
/// ```ignore
/// struct Progress;
///
/// impl EventHandler for Progress {
///     fn on_event(&self, event: &EngineEvent<'_>) {
///         if let Some(pct) = event.progress_percent() {
///             eprintln!("{pct:.0}%");
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &EngineEvent<'_>) {
        let _ = event;
    }
}

/// A handler that ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// Adapts an observing closure into an [`EventHandler`].
///
/// ```ignore
/// let handler = EventObserver::new(|event| {
///     if let EngineEvent::ChunkSummarized { index, total, .. } = event {
///         println!("{}/{}", index + 1, total);
///     }
/// });
/// ```
pub struct EventObserver<F>(F)
where
    F: Fn(&EngineEvent<'_>) + Send + Sync;

impl<F> EventObserver<F>
where
    F: Fn(&EngineEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for EventObserver<F>
where
    F: Fn(&EngineEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &EngineEvent<'_>) {
        (self.0)(event);
    }
}

/// Dispatches each event to several handlers in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with(my_progress_bar);
/// ```
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add a handler only when `condition` holds, keeping the builder chain.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &EngineEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &EngineEvent<'_>) {
        match event {
            EngineEvent::RunStarted {
                level,
                total_chunks,
                input_chars,
            } => {
                info!("Summarizing {input_chars} chars in {total_chunks} chunk(s) at level '{level}'");
            }
            EngineEvent::StateChanged { from, to } => {
                debug!("State: {from} -> {to}");
            }
            EngineEvent::ChunkStarted {
                index,
                total,
                chunk_chars,
                tail_chars,
            } => {
                info!(
                    "[chunk {}/{}] {chunk_chars} chars + {tail_chars} chars of prior summary",
                    index + 1,
                    total
                );
            }
            EngineEvent::RetryScheduled {
                chunk_index,
                attempt,
                kind,
                delay,
                message,
            } => {
                warn!(
                    "Chunk {} attempt {attempt} failed ({kind}): {message}. Retrying in {delay:?}...",
                    chunk_index + 1
                );
            }
            EngineEvent::ChunkSummarized {
                index,
                total,
                response_chars,
            } => {
                debug!("Chunk {}/{} summarized: {response_chars} chars", index + 1, total);
            }
            EngineEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
            } => {
                debug!("Tokens: prompt={prompt_tokens}, completion={completion_tokens}");
            }
            EngineEvent::Progress {
                processed_chars,
                total_chars,
            } => {
                info!(
                    "Progress: {processed_chars}/{total_chars} ({:.2}%)",
                    event.progress_percent().unwrap_or_default()
                );
            }
            EngineEvent::Finished {
                summary_chars,
                completion_calls,
            } => {
                info!("Summary complete: {summary_chars} chars from {completion_calls} request(s)");
            }
            EngineEvent::Failed { error } => {
                warn!("Run failed: {error}");
            }
        }
    }
}
