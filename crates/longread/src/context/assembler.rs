//! Assembly of per-chunk responses into one summary.
//!
//! Every response is the model's continuation of the summary. Its last few
//! paragraphs are held back as *pending*: they become the tail of the next
//! window, and the next response restates them, so the restated version
//! replaces them. Everything before the pending paragraphs is *committed*
//! and never touched again.
//!
//! The orchestrator drives this with two calls per chunk:
//!
//! 1. [`SummaryAssembler::carry`] with the number of whole paragraphs that
//!    made it into the window tail. Pending paragraphs that did not fit are
//!    committed right away so nothing is lost.
//! 2. [`SummaryAssembler::append`] with the raw response.

use tracing::trace;

use crate::context::markers::MarkerRules;
use crate::context::window::{PARAGRAPH_SEPARATOR, paragraphs};

/// Accumulates cleaned model output across iterations.
#[derive(Debug, Clone)]
pub struct SummaryAssembler {
    rules: MarkerRules,
    hold_back: usize,
    committed: Vec<String>,
    pending: Vec<String>,
    carried: usize,
}

impl SummaryAssembler {
    /// `hold_back` is how many trailing paragraphs of each response stay
    /// pending for the next window.
    pub fn new(rules: MarkerRules, hold_back: usize) -> Self {
        Self {
            rules,
            hold_back,
            committed: Vec::new(),
            pending: Vec::new(),
            carried: 0,
        }
    }

    /// Pending paragraphs joined as text; the source of the next tail.
    pub fn pending_text(&self) -> String {
        self.pending.join(PARAGRAPH_SEPARATOR)
    }

    /// Mark the last `whole_paragraphs` pending paragraphs as carried into
    /// the upcoming window and commit the rest.
    pub fn carry(&mut self, whole_paragraphs: usize) {
        let keep = whole_paragraphs.min(self.pending.len());
        let split = self.pending.len() - keep;
        self.committed.extend(self.pending.drain(..split));
        self.carried = keep;
    }

    /// Clean `partial` and fold it in. Returns the number of characters the
    /// cleaned response contributed.
    ///
    /// A non-empty response supersedes the carried paragraphs. An empty one
    /// (nothing left after marker cleanup) commits them instead.
    pub fn append(&mut self, partial: &str) -> usize {
        let cleaned = self.rules.clean(partial);
        let new_paragraphs: Vec<String> = paragraphs(&cleaned)
            .into_iter()
            .map(str::to_string)
            .collect();

        if new_paragraphs.is_empty() {
            trace!(carried = self.carried, "empty response after cleanup");
            self.committed.append(&mut self.pending);
            self.carried = 0;
            return 0;
        }

        let superseded = self.carried.min(self.pending.len());
        self.pending.truncate(self.pending.len() - superseded);
        self.committed.append(&mut self.pending);

        let hold = self.hold_back.min(new_paragraphs.len());
        let split = new_paragraphs.len() - hold;
        let mut new_paragraphs = new_paragraphs;
        self.pending = new_paragraphs.split_off(split);
        self.committed.extend(new_paragraphs);
        self.carried = 0;

        cleaned.chars().count()
    }

    /// The full summary: committed then pending paragraphs, with a single
    /// trailing newline. Does not change state, so repeated calls agree.
    pub fn finalize(&self) -> String {
        let all: Vec<&str> = self
            .committed
            .iter()
            .chain(self.pending.iter())
            .map(String::as_str)
            .collect();
        if all.is_empty() {
            return String::new();
        }
        let mut text = all.join(PARAGRAPH_SEPARATOR);
        text.push('\n');
        text
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.pending.is_empty()
    }

    pub fn committed_paragraphs(&self) -> usize {
        self.committed.len()
    }

    pub fn pending_paragraphs(&self) -> usize {
        self.pending.len()
    }
}
