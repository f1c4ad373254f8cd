//! Instruction templates and prompt rendering.
//!
//! Each request is two messages. The system message is the level's
//! instruction template (or a caller's custom prompt) followed by a directive
//! to continue the summary instead of restarting it. The user message is the
//! window, labeled so the template can refer to its parts:
//!
//! ```text
//! [PREVIOUS_SUMMARY]
//!
//! ...trailing paragraphs of the summary so far...
//!
//! [CURRENT_CHUNK]
//!
//! ...next chunk of the document...
//! ```
//!
//! The `[PREVIOUS_SUMMARY]` section is left out when there is no tail.

use std::str::FromStr;

use serde::Deserialize;

use crate::Message;
use crate::context::window::ContentWindow;
use crate::engine::level::SummaryLevel;
use crate::error::ConfigError;

pub const PREVIOUS_SUMMARY_LABEL: &str = "[PREVIOUS_SUMMARY]";
pub const CURRENT_CHUNK_LABEL: &str = "[CURRENT_CHUNK]";

const VERBOSE: &str = "Summarize verbosely, emphasizing key details, action items, and described goals, while incorporating new information from [CURRENT_CHUNK] into [PREVIOUS_SUMMARY]. Retain the first two paragraphs of [PREVIOUS_SUMMARY]. Remove labels, maintain paragraph breaks for readability, and avoid phrases like 'in conclusion' or 'in summary'. Do not reference 'chunk' or 'chunks' in your summary. Collect all questions that were asked but require further follow up, as well as action items.";

const CONCISE: &str = "Summarize concisely, highlighting key details and important points, update with new info. Extract and save all questions that were asked but require further follow up. Use [PREVIOUS_SUMMARY] and [CURRENT_CHUNK]. Keep first two paragraphs in [PREVIOUS_SUMMARY] as-is. Exclude these labels from summary. Ensure readability using paragraph breaks, and avoid phrases like 'in conclusion' or 'in summary'.";

const TERSE: &str = "Summarize tersely for executive action using [PREVIOUS_SUMMARY] and [CURRENT_CHUNK], focusing on key details and technical content. Retain the first two paragraphs of [PREVIOUS_SUMMARY], remove labels, and maintain paragraph breaks for readability. Avoid phrases like 'in conclusion' or 'in summary'.";

const BARNEY: &str = "Break the content down Barney style, emphasizing key details and incorporating new information from [CURRENT_CHUNK] into [PREVIOUS_SUMMARY]. Retain the first two paragraphs of [PREVIOUS_SUMMARY]. Remove labels, maintain paragraph breaks for readability, and avoid phrases like 'in conclusion' or 'in summary'.";

const TRANSCRIBE: &str = "Convert the following transcript into a dialogue format, similar to a script in a novel. Please remove filler words like 'uh' and 'umm', lightly edit sentences for clarity and readability, and include all the details discussed in the conversation without abbreviating or summarizing any part of it. Maintain paragraph breaks for readability. Do not summarize or omit any details.";

/// Appended when windows carry prior output.
const CONTINUE_SUMMARY: &str = "When [PREVIOUS_SUMMARY] is present, it is the end of the summary written so far. Continue and update it rather than starting a new summary: restate those paragraphs with any revisions, then carry on with the new material. Do not add titles or a 'Summary:' label.";

/// Appended when windows never carry prior output.
const CONTINUE_SECTION: &str = "The text is one section of a longer document. Pick up seamlessly where the previous section ended, without titles, labels, or closing remarks.";

/// Built-in instruction template for a level.
pub fn template(level: SummaryLevel) -> &'static str {
    match level {
        SummaryLevel::Verbose => VERBOSE,
        SummaryLevel::Concise => CONCISE,
        SummaryLevel::Terse => TERSE,
        SummaryLevel::Barney => BARNEY,
        SummaryLevel::Transcribe => TRANSCRIBE,
    }
}

/// How a caller's custom prompt combines with the level template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// The custom prompt is the whole instruction.
    #[default]
    Replace,
    /// The custom prompt is added after the level template.
    Append,
}

impl FromStr for PromptMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(PromptMode::Replace),
            "append" => Ok(PromptMode::Append),
            other => Err(ConfigError::InvalidValue {
                key: "prompt_mode".into(),
                message: format!("expected 'replace' or 'append', got '{other}'"),
            }),
        }
    }
}

/// Renders the two messages of each request.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system: String,
}

impl PromptBuilder {
    /// `continues` selects the continuation directive: true when windows
    /// carry prior output. A blank custom prompt counts as none.
    pub fn new(template: &str, custom: Option<&str>, mode: PromptMode, continues: bool) -> Self {
        let custom = custom.map(str::trim).filter(|c| !c.is_empty());
        let instructions = match (custom, mode) {
            (None, _) => template.trim().to_string(),
            (Some(c), PromptMode::Replace) => c.to_string(),
            (Some(c), PromptMode::Append) => format!("{} {c}", template.trim()),
        };
        let directive = if continues {
            CONTINUE_SUMMARY
        } else {
            CONTINUE_SECTION
        };
        Self {
            system: format!("{instructions}\n\n{directive}"),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system
    }

    /// The labeled window text sent as the user message.
    pub fn render_window(window: &ContentWindow<'_>) -> String {
        if window.has_tail() {
            format!(
                "{PREVIOUS_SUMMARY_LABEL}\n\n{}\n\n{CURRENT_CHUNK_LABEL}\n\n{}",
                window.tail.text, window.chunk
            )
        } else {
            format!("{CURRENT_CHUNK_LABEL}\n\n{}", window.chunk)
        }
    }

    pub fn messages(&self, window: &ContentWindow<'_>) -> Vec<Message> {
        vec![
            Message::system(self.system.clone()),
            Message::user(Self::render_window(window)),
        ]
    }
}
