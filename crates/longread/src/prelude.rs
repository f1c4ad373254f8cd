//! Convenience re-exports for common `longread` types.
//!
//! Meant to be glob-imported:
//!
//! ```ignore
//! use longread::prelude::*;
//! ```
//!
//! Covers a typical program: a client, an [`EngineConfig`], the [`Engine`]
//! and its event handlers, plus extraction and output. Lower-level pieces
//! (splitter, window manager, assembler, retry math) are left out; import
//! them from their modules when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{AuthScheme, ChatRequest, Message, OpenRouterClient, ServiceConfig};

// ── Completion service ──────────────────────────────────────────────
pub use crate::api::{CompletionService, RetryPolicy, ServiceError, ServiceErrorKind};

// ── Engine ──────────────────────────────────────────────────────────
pub use crate::engine::{
    CompositeEventHandler, Engine, EngineConfig, EngineEvent, EventHandler, EventObserver,
    LevelTable, LoggingHandler, NoopHandler, PromptMode, RunState, SummaryLevel, SummaryOutput,
};

// ── Input and output ────────────────────────────────────────────────
pub use crate::context::TextMeasure;
pub use crate::error::{CompletionError, ConfigError, ExtractionError, OutputError, RunError};
pub use crate::extract::{Source, SourceFormat, extract_text};
pub use crate::output::write_summary;
