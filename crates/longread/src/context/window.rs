//! The sliding content window.
//!
//! Each request sees the trailing paragraphs of the summary produced so far
//! followed by the next chunk. The tail is selected by the pure function
//! [`trailing_paragraphs`]; [`WindowManager`] only decides how much room the
//! tail gets. The chunk is never shortened: when the two do not fit together,
//! the tail shrinks first.

use std::sync::LazyLock;

use regex::Regex;

use crate::context::measure::TextMeasure;
use crate::context::splitter::Chunk;

static BLANK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r]*\n").expect("valid regex"));

/// Separator placed between paragraphs when they are re-joined.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Non-empty, trimmed paragraphs of `text` in order.
pub fn paragraphs(text: &str) -> Vec<&str> {
    BLANK_LINE
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Trailing context taken from prior summary output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tail {
    pub text: String,
    /// Number of complete paragraphs in `text`. Zero when `text` is empty or
    /// is only the end of a paragraph too long to carry whole.
    pub whole_paragraphs: usize,
}

impl Tail {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Size in characters, separators included.
    pub fn chars(&self) -> usize {
        self.text.chars().count()
    }
}

/// Select the last paragraphs of `prior` that fit in `budget_chars`,
/// taking at most `max_paragraphs`.
///
/// Paragraphs are taken newest first and kept whole. When not even the last
/// paragraph fits, its final `budget_chars` characters are returned instead,
/// starting at a word boundary, with `whole_paragraphs == 0`.
pub fn trailing_paragraphs(prior: &str, budget_chars: usize, max_paragraphs: usize) -> Tail {
    if budget_chars == 0 || max_paragraphs == 0 {
        return Tail::default();
    }
    let paras = paragraphs(prior);
    let Some(last) = paras.last() else {
        return Tail::default();
    };

    let sep = PARAGRAPH_SEPARATOR.len();
    let mut taken = 0;
    let mut size = 0;
    for p in paras.iter().rev().take(max_paragraphs) {
        let add = p.chars().count() + if taken > 0 { sep } else { 0 };
        if size + add > budget_chars {
            break;
        }
        size += add;
        taken += 1;
    }

    if taken > 0 {
        return Tail {
            text: paras[paras.len() - taken..].join(PARAGRAPH_SEPARATOR),
            whole_paragraphs: taken,
        };
    }

    Tail {
        text: paragraph_fragment(last, budget_chars).to_string(),
        whole_paragraphs: 0,
    }
}

/// The end of `paragraph`, at most `budget_chars` long, starting on a word.
fn paragraph_fragment(paragraph: &str, budget_chars: usize) -> &str {
    let total = paragraph.chars().count();
    let skip = total.saturating_sub(budget_chars);
    let start = paragraph
        .char_indices()
        .nth(skip)
        .map_or(paragraph.len(), |(i, _)| i);
    let fragment = &paragraph[start..];

    // Drop a partial leading word unless the cut landed on a boundary.
    let on_boundary = start == 0
        || paragraph[..start]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
    let fragment = if on_boundary {
        fragment
    } else {
        fragment
            .find(char::is_whitespace)
            .map_or("", |i| &fragment[i..])
    };
    fragment.trim()
}

/// One iteration's model input: tail context plus the chunk.
#[derive(Debug, Clone)]
pub struct ContentWindow<'a> {
    /// Index of the chunk this window carries.
    pub index: usize,
    pub tail: Tail,
    /// Trimmed chunk content.
    pub chunk: &'a str,
}

impl ContentWindow<'_> {
    pub fn has_tail(&self) -> bool {
        !self.tail.is_empty()
    }

    /// Window size in characters: tail plus chunk content.
    pub fn chars(&self) -> usize {
        self.tail.chars() + self.chunk.chars().count()
    }

    /// Window size in the given unit.
    pub fn size(&self, measure: &TextMeasure) -> usize {
        measure.from_chars(self.chars())
    }
}

/// Builds a fresh [`ContentWindow`] for each chunk.
#[derive(Debug, Clone, Copy)]
pub struct WindowManager {
    max_window_chars: usize,
    tail_budget_chars: usize,
    context_paragraphs: usize,
}

impl WindowManager {
    /// Budgets are in the unit of `measure`.
    pub fn new(
        max_window: usize,
        tail_budget: usize,
        context_paragraphs: usize,
        measure: TextMeasure,
    ) -> Self {
        Self {
            max_window_chars: measure.chars_within(max_window),
            tail_budget_chars: measure.chars_within(tail_budget),
            context_paragraphs,
        }
    }

    pub fn max_window_chars(&self) -> usize {
        self.max_window_chars
    }

    /// Room left for the tail next to a chunk of `chunk_chars` characters.
    pub fn tail_budget_for(&self, chunk_chars: usize) -> usize {
        self.tail_budget_chars
            .min(self.max_window_chars.saturating_sub(chunk_chars))
    }

    /// Build the window for `chunk` given the prior summary output.
    /// An empty `prior` yields the chunk alone.
    pub fn next_window<'a>(&self, prior: &str, chunk: &Chunk<'a>) -> ContentWindow<'a> {
        let content = chunk.content();
        let budget = self.tail_budget_for(content.chars().count());
        ContentWindow {
            index: chunk.index,
            tail: trailing_paragraphs(prior, budget, self.context_paragraphs),
            chunk: content,
        }
    }
}
