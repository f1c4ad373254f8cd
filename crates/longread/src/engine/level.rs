//! Summary levels and their size budgets.
//!
//! A level fixes how large each chunk is, how much prior output is carried
//! into each window, how long a response may be, and which instruction
//! template the model gets. The five built-in levels are [`SummaryLevel`];
//! [`LevelTable`] holds the active profiles keyed by name, so config files
//! can retune a built-in level or add a new one without code changes.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Deserialize;

use crate::engine::prompt;
use crate::error::ConfigError;

/// The built-in summary levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SummaryLevel {
    #[default]
    Verbose,
    Concise,
    Terse,
    /// Simplified, plain-language breakdown.
    Barney,
    /// Dialogue formatting of a transcript; nothing is summarized away.
    Transcribe,
}

impl SummaryLevel {
    pub const ALL: [SummaryLevel; 5] = [
        SummaryLevel::Verbose,
        SummaryLevel::Concise,
        SummaryLevel::Terse,
        SummaryLevel::Barney,
        SummaryLevel::Transcribe,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SummaryLevel::Verbose => "verbose",
            SummaryLevel::Concise => "concise",
            SummaryLevel::Terse => "terse",
            SummaryLevel::Barney => "barney",
            SummaryLevel::Transcribe => "transcribe",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.name().eq_ignore_ascii_case(name))
    }

    /// The built-in profile for this level.
    pub fn profile(self) -> LevelProfile {
        let (max_chunk, tail_budget, max_window, context_paragraphs, max_response_tokens) =
            match self {
                SummaryLevel::Verbose => (20_000, 8_000, 28_000, 3, 10_000),
                SummaryLevel::Concise => (20_000, 6_000, 26_000, 3, 5_000),
                SummaryLevel::Terse => (20_000, 3_000, 23_000, 3, 1_000),
                SummaryLevel::Barney => (5_000, 3_000, 8_000, 3, 3_000),
                SummaryLevel::Transcribe => (10_000, 0, 10_000, 0, 10_000),
            };
        LevelProfile {
            name: self.name().to_string(),
            max_chunk,
            tail_budget,
            max_window,
            context_paragraphs,
            max_response_tokens,
            prompt: prompt::template(self).to_string(),
        }
    }
}

impl std::fmt::Display for SummaryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SummaryLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ConfigError::UnknownLevel {
            name: s.to_string(),
            known: Self::ALL.iter().map(|l| l.name().to_string()).collect(),
        })
    }
}

/// Budgets and instructions for one level. Sizes are in the active
/// [`TextMeasure`](crate::context::measure::TextMeasure) unit.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelProfile {
    pub name: String,
    /// Largest chunk of source text per request.
    pub max_chunk: usize,
    /// Largest tail of prior output carried into a window.
    pub tail_budget: usize,
    /// Largest window (tail plus chunk).
    pub max_window: usize,
    /// Most paragraphs of prior output carried into a window, and held back
    /// from each response for the next one.
    pub context_paragraphs: usize,
    /// `max_tokens` for each completion request.
    pub max_response_tokens: u32,
    /// Instruction template.
    pub prompt: String,
}

impl LevelProfile {
    /// Check that the budgets are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, message: String| ConfigError::InvalidValue {
            key: format!("levels.{}.{field}", self.name),
            message,
        };
        if self.max_chunk == 0 {
            return Err(invalid("max_chunk", "must be greater than zero".into()));
        }
        if self.max_chunk > self.max_window {
            return Err(invalid(
                "max_window",
                format!(
                    "must be at least max_chunk ({}), got {}",
                    self.max_chunk, self.max_window
                ),
            ));
        }
        if self.tail_budget > self.max_window {
            return Err(invalid(
                "tail_budget",
                format!(
                    "must not exceed max_window ({}), got {}",
                    self.max_window, self.tail_budget
                ),
            ));
        }
        if self.max_response_tokens == 0 {
            return Err(invalid(
                "max_response_tokens",
                "must be greater than zero".into(),
            ));
        }
        if self.prompt.trim().is_empty() {
            return Err(invalid("prompt", "must not be empty".into()));
        }
        Ok(())
    }

    /// Whether windows for this level can carry prior output at all.
    pub fn carries_context(&self) -> bool {
        self.tail_budget > 0 && self.context_paragraphs > 0
    }
}

/// Partial profile from a `[levels.<name>]` config table. Unset fields keep
/// the built-in value (or, for a new level, the `verbose` value).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelOverride {
    pub max_chunk: Option<usize>,
    pub tail_budget: Option<usize>,
    pub max_window: Option<usize>,
    pub context_paragraphs: Option<usize>,
    pub max_response_tokens: Option<u32>,
    pub prompt: Option<String>,
}

/// Active level profiles keyed by lowercase name.
#[derive(Debug, Clone)]
pub struct LevelTable {
    levels: BTreeMap<String, LevelProfile>,
}

impl Default for LevelTable {
    fn default() -> Self {
        let levels = SummaryLevel::ALL
            .into_iter()
            .map(|level| (level.name().to_string(), level.profile()))
            .collect();
        Self { levels }
    }
}

impl LevelTable {
    /// Look up a level by name (case-insensitive).
    pub fn get(&self, name: &str) -> Result<&LevelProfile, ConfigError> {
        self.levels
            .get(&name.trim().to_ascii_lowercase())
            .ok_or_else(|| ConfigError::UnknownLevel {
                name: name.to_string(),
                known: self.names(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.levels.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.levels.contains_key(&name.trim().to_ascii_lowercase())
    }

    /// Add or replace a profile after validating it.
    pub fn insert(&mut self, mut profile: LevelProfile) -> Result<(), ConfigError> {
        profile.validate()?;
        profile.name = profile.name.to_ascii_lowercase();
        self.levels.insert(profile.name.clone(), profile);
        Ok(())
    }

    /// Merge a config override into the named level, creating it if needed.
    /// A new level must bring its own prompt.
    pub fn apply_override(&mut self, name: &str, over: &LevelOverride) -> Result<(), ConfigError> {
        let key = name.trim().to_ascii_lowercase();
        let mut profile = match self.levels.get(&key) {
            Some(existing) => existing.clone(),
            None => {
                if over.prompt.is_none() {
                    return Err(ConfigError::InvalidValue {
                        key: format!("levels.{key}.prompt"),
                        message: "a new level needs a prompt".into(),
                    });
                }
                LevelProfile {
                    name: key.clone(),
                    ..SummaryLevel::Verbose.profile()
                }
            }
        };

        if let Some(v) = over.max_chunk {
            profile.max_chunk = v;
        }
        if let Some(v) = over.tail_budget {
            profile.tail_budget = v;
        }
        match over.max_window {
            Some(v) => profile.max_window = v,
            // Keep the window in step with a retuned chunk or tail.
            None if over.max_chunk.is_some() || over.tail_budget.is_some() => {
                profile.max_window = profile.max_chunk + profile.tail_budget;
            }
            None => {}
        }
        if let Some(v) = over.context_paragraphs {
            profile.context_paragraphs = v;
        }
        if let Some(v) = over.max_response_tokens {
            profile.max_response_tokens = v;
        }
        if let Some(ref p) = over.prompt {
            profile.prompt = p.clone();
        }

        self.insert(profile)
    }
}
