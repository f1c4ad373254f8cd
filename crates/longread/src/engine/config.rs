//! Configuration for the [`Engine`](super::runner::Engine).
//!
//! Everything the run loop needs beyond the input text: the level profile,
//! model and sampling settings, the retry policy, artifact markers, and the
//! size unit. Defaults match the built-in levels.
//!
//! ```ignore
//! let config = EngineConfig::for_level("terse")?
//!     .with_model("openai/gpt-4o")
//!     .with_custom_prompt("Focus on budget figures.", PromptMode::Append)
//!     .with_max_attempts(3);
//! ```

use serde::Deserialize;

use crate::api::retry::RetryPolicy;
use crate::context::assembler::SummaryAssembler;
use crate::context::markers::MarkerRules;
use crate::context::measure::TextMeasure;
use crate::context::splitter::ChunkSplitter;
use crate::context::window::WindowManager;
use crate::engine::level::{LevelProfile, LevelTable, SummaryLevel};
use crate::engine::prompt::{PromptBuilder, PromptMode};
use crate::error::ConfigError;

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            top_p: Some(0.4),
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// Settings for one summarization run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub level: LevelProfile,
    /// Model identifier. `None` lets the endpoint pick (Azure deployments).
    pub model: Option<String>,
    pub custom_prompt: Option<String>,
    pub prompt_mode: PromptMode,
    pub sampling: SamplingConfig,
    pub retry: RetryPolicy,
    pub markers: MarkerRules,
    pub measure: TextMeasure,
}

impl EngineConfig {
    pub fn new(level: LevelProfile) -> Self {
        Self {
            level,
            model: Some(crate::DEFAULT_MODEL.to_string()),
            custom_prompt: None,
            prompt_mode: PromptMode::default(),
            sampling: SamplingConfig::default(),
            retry: RetryPolicy::default(),
            markers: MarkerRules::default(),
            measure: TextMeasure::default(),
        }
    }

    /// Configuration for a built-in level by name.
    pub fn for_level(name: &str) -> Result<Self, ConfigError> {
        Self::from_table(&LevelTable::default(), name)
    }

    /// Configuration for a level from a (possibly customized) table.
    pub fn from_table(table: &LevelTable, name: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(table.get(name)?.clone()))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn without_model(mut self) -> Self {
        self.model = None;
        self
    }

    pub fn with_custom_prompt(mut self, prompt: impl Into<String>, mode: PromptMode) -> Self {
        self.custom_prompt = Some(prompt.into());
        self.prompt_mode = mode;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the attempt ceiling for both rate-limit and timeout retries.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.retry = self.retry.with_max_attempts(attempts);
        self
    }

    pub fn with_markers(mut self, markers: MarkerRules) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_measure(mut self, measure: TextMeasure) -> Self {
        self.measure = measure;
        self
    }

    /// Check the whole configuration before a run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.level.validate()?;
        if self.retry.rate_limit.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retry.rate_limit.max_attempts".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.retry.timeout.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retry.timeout.max_attempts".into(),
                message: "must be at least 1".into(),
            });
        }
        let multiplier = self.retry.rate_limit.multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "retry.rate_limit.multiplier".into(),
                message: format!("must be a finite number of at least 1, got {multiplier}"),
            });
        }
        if !(0.0..=2.0).contains(&self.sampling.temperature) {
            return Err(ConfigError::InvalidValue {
                key: "sampling.temperature".into(),
                message: format!("must be between 0 and 2, got {}", self.sampling.temperature),
            });
        }
        Ok(())
    }

    /// Whether the level is one of the built-ins, unmodified.
    pub fn builtin_level(&self) -> Option<SummaryLevel> {
        SummaryLevel::from_name(&self.level.name).filter(|l| l.profile() == self.level)
    }

    pub(crate) fn splitter(&self) -> ChunkSplitter {
        ChunkSplitter::new(self.level.max_chunk, self.measure)
    }

    pub(crate) fn window_manager(&self) -> WindowManager {
        WindowManager::new(
            self.level.max_window,
            self.level.tail_budget,
            self.level.context_paragraphs,
            self.measure,
        )
    }

    pub(crate) fn prompt_builder(&self) -> PromptBuilder {
        PromptBuilder::new(
            &self.level.prompt,
            self.custom_prompt.as_deref(),
            self.prompt_mode,
            self.level.carries_context(),
        )
    }

    pub(crate) fn assembler(&self) -> SummaryAssembler {
        let hold_back = if self.level.carries_context() {
            self.level.context_paragraphs
        } else {
            0
        };
        SummaryAssembler::new(self.markers.clone(), hold_back)
    }
}
