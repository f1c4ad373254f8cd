//! The summarization engine.
//!
//! - [`level`]: [`SummaryLevel`] and the [`LevelTable`] of size budgets.
//! - [`prompt`]: instruction templates and request rendering.
//! - [`completion`]: [`CompletionClient`], one window per request with
//!   retry and backoff.
//! - [`events`]: [`EngineEvent`] and the [`EventHandler`] trait.
//! - [`config`]: [`EngineConfig`], everything a run needs besides the text.
//! - [`runner`]: [`Engine`], the run loop and its [`RunState`] machine.

pub mod completion;
pub mod config;
pub mod events;
pub mod level;
pub mod prompt;
pub mod runner;

pub use completion::{Completion, CompletionClient};
pub use config::{EngineConfig, SamplingConfig};
pub use events::{
    CompositeEventHandler, EngineEvent, EventHandler, EventObserver, LoggingHandler, NoopHandler,
};
pub use level::{LevelOverride, LevelProfile, LevelTable, SummaryLevel};
pub use prompt::{PromptBuilder, PromptMode};
pub use runner::{Engine, RunState, SummaryOutput};
