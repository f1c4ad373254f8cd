//! Text handling for the summarization loop.
//!
//! 1. **[`measure`]**: [`TextMeasure`] sizes text in characters or estimated
//!    tokens. Every budget below is in its unit.
//!
//! 2. **[`splitter`]**: [`ChunkSplitter`] cuts the input into ordered chunks
//!    on paragraph boundaries, falling back to sentence, line, and word
//!    breaks for oversized paragraphs.
//!
//! 3. **[`window`]**: [`WindowManager`] pairs each chunk with the trailing
//!    paragraphs of the summary so far. Tail selection is the pure function
//!    [`trailing_paragraphs`].
//!
//! 4. **[`markers`]** and **[`assembler`]**: model output is cleaned of
//!    artifact labels by [`MarkerRules`] and folded into the final text by
//!    [`SummaryAssembler`].

pub mod assembler;
pub mod markers;
pub mod measure;
pub mod splitter;
pub mod window;

pub use assembler::SummaryAssembler;
pub use markers::{MarkerRule, MarkerRules};
pub use measure::{DEFAULT_CHARS_PER_TOKEN, SizeUnit, TextMeasure};
pub use splitter::{Chunk, ChunkSplitter, Chunks};
pub use window::{ContentWindow, Tail, WindowManager, trailing_paragraphs};
