//! Paragraph-first chunking of normalized input text.
//!
//! [`ChunkSplitter::split`] returns a lazy, cloneable iterator of [`Chunk`]s
//! that borrow from the source. Paragraphs (text separated by blank lines)
//! are packed greedily until the next one would overflow the limit. A
//! paragraph that is too large on its own is cut at the last sentence end
//! that fits, falling back to a line break, then a word break. Only a single
//! word longer than the whole limit is ever cut mid-word.
//!
//! Chunk sizes are measured on the trimmed content: the whitespace that
//! separates paragraphs rides along at the end of a chunk so that
//! concatenating every `Chunk::text` reproduces the input exactly, but it
//! never counts against the limit.

use std::sync::LazyLock;

use regex::Regex;

use crate::context::measure::TextMeasure;

/// A blank line, plus any whitespace that follows it.
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r\x0B\x0C]*\n\s*").expect("valid regex"));

/// Characters that may trail a sentence terminator (`."`, `?)`, ...).
const SENTENCE_CLOSERS: &[char] = &['"', '\'', ')', ']', '}', '\u{201D}', '\u{2019}', '*', '_'];
const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '\u{2026}', '\u{3002}'];

/// One bounded, ordered slice of the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Zero-based position in document order.
    pub index: usize,
    /// Exact source slice, including trailing separator whitespace.
    pub text: &'a str,
    /// Byte offset of `text` within the source.
    pub start: usize,
}

impl<'a> Chunk<'a> {
    /// The chunk without surrounding whitespace; this is what gets sent.
    pub fn content(&self) -> &'a str {
        self.text.trim()
    }

    /// Byte offset one past the end of this chunk in the source.
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

/// Splits text into chunks of at most `max_chunk` units of a [`TextMeasure`].
#[derive(Debug, Clone, Copy)]
pub struct ChunkSplitter {
    max_chars: usize,
}

impl ChunkSplitter {
    pub fn new(max_chunk: usize, measure: TextMeasure) -> Self {
        Self {
            max_chars: measure.chars_within(max_chunk).max(1),
        }
    }

    /// Character limit after converting from the configured unit.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Lazily split `text`. The iterator can be cloned to restart from the
    /// same point and always yields the same chunks for the same input.
    pub fn split<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            source: text,
            pos: 0,
            index: 0,
            max_chars: self.max_chars,
        }
    }
}

/// Iterator returned by [`ChunkSplitter::split`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    source: &'a str,
    pos: usize,
    index: usize,
    max_chars: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        let rest = &self.source[self.pos..];
        if rest.trim().is_empty() {
            self.pos = self.source.len();
            return None;
        }

        let mut end = chunk_end(rest, self.max_chars);
        // Absorb trailing whitespace so no whitespace-only chunk follows.
        if rest[end..].trim().is_empty() {
            end = rest.len();
        }

        let chunk = Chunk {
            index: self.index,
            text: &rest[..end],
            start: self.pos,
        };
        self.pos += end;
        self.index += 1;
        Some(chunk)
    }
}

/// Byte length of the next chunk taken from the front of `rest`.
fn chunk_end(rest: &str, max_chars: usize) -> usize {
    let lead = leading_ws_chars(rest);
    let mut end = 0;
    let mut total_chars = 0;

    for segment in paragraph_segments(rest) {
        let seg_chars = segment.chars().count();
        let content = total_chars + seg_chars - lead - trailing_ws_chars(segment);
        if content <= max_chars {
            end += segment.len();
            total_chars += seg_chars;
            continue;
        }
        if end == 0 {
            // The first paragraph alone is too large.
            return oversized_cut(segment, lead, max_chars);
        }
        break;
    }

    end
}

/// Split `text` into paragraphs, each carrying the blank-line run that
/// follows it. Leading whitespace stays attached to the first paragraph.
fn paragraph_segments(text: &str) -> impl Iterator<Item = &str> + '_ {
    let mut breaks = PARAGRAPH_BREAK.find_iter(text);
    let mut seg_start = 0;
    std::iter::from_fn(move || {
        if seg_start >= text.len() {
            return None;
        }
        for m in breaks.by_ref() {
            if text[seg_start..m.start()].trim().is_empty() {
                continue;
            }
            let segment = &text[seg_start..m.end()];
            seg_start = m.end();
            return Some(segment);
        }
        let segment = &text[seg_start..];
        seg_start = text.len();
        Some(segment)
    })
}

/// Choose where to cut a paragraph whose content exceeds `max_chars`.
///
/// Preference: last sentence end that fits, then last line break, then last
/// word break. Cuts land after the whitespace run so the next chunk starts
/// on a word.
fn oversized_cut(segment: &str, lead: usize, max_chars: usize) -> usize {
    let limit_byte = segment
        .char_indices()
        .nth(lead + max_chars)
        .map_or(segment.len(), |(i, _)| i);

    let mut best_sentence = None;
    let mut best_line = None;
    let mut best_word = None;
    let mut last_non_ws: Option<char> = None;
    let mut last_non_ws_before_closers: Option<char> = None;

    let mut chars = segment.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !c.is_whitespace() {
            if !SENTENCE_CLOSERS.contains(&c) {
                last_non_ws_before_closers = Some(c);
            }
            last_non_ws = Some(c);
            continue;
        }
        if last_non_ws.is_none() {
            continue;
        }
        // `i` ends a run of content; it must fit under the limit.
        if i > limit_byte {
            break;
        }

        let mut saw_newline = c == '\n';
        let mut cut = segment.len();
        while let Some(&(j, next)) = chars.peek() {
            if !next.is_whitespace() {
                cut = j;
                break;
            }
            saw_newline |= next == '\n';
            chars.next();
        }

        if last_non_ws_before_closers.is_some_and(|t| SENTENCE_TERMINATORS.contains(&t))
            && last_non_ws.is_some_and(|t| {
                SENTENCE_TERMINATORS.contains(&t) || SENTENCE_CLOSERS.contains(&t)
            })
        {
            best_sentence = Some(cut);
        }
        if saw_newline {
            best_line = Some(cut);
        }
        best_word = Some(cut);
        last_non_ws = None;
        last_non_ws_before_closers = None;
    }

    best_sentence
        .or(best_line)
        .or(best_word)
        .unwrap_or(limit_byte)
        .max(first_char_len(segment))
}

fn first_char_len(s: &str) -> usize {
    s.chars().next().map_or(0, char::len_utf8)
}

fn leading_ws_chars(s: &str) -> usize {
    s.chars().take_while(|c| c.is_whitespace()).count()
}

fn trailing_ws_chars(s: &str) -> usize {
    s.chars().rev().take_while(|c| c.is_whitespace()).count()
}
