//! Text size measurement.
//!
//! Every budget in the crate (chunk size, window size, tail budget) is
//! expressed in the unit of the active [`TextMeasure`]. Characters are exact;
//! tokens are estimated from character counts, which is close enough for
//! budgeting and needs no tokenizer.

use serde::Deserialize;

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; 3.5 is a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Unit used for every size budget.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TextMeasure {
    /// Unicode scalar values.
    #[default]
    Chars,
    /// Estimated tokens at the given chars-per-token ratio.
    Tokens { chars_per_token: f64 },
}

impl TextMeasure {
    pub fn tokens() -> Self {
        TextMeasure::Tokens {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }

    /// Size of `text` in this unit.
    pub fn measure(&self, text: &str) -> usize {
        let chars = text.chars().count();
        self.from_chars(chars)
    }

    /// Convert a character count into this unit. Token estimates round up
    /// so summed measurements never undercount.
    pub fn from_chars(&self, chars: usize) -> usize {
        match self {
            TextMeasure::Chars => chars,
            TextMeasure::Tokens { chars_per_token } => {
                (chars as f64 / chars_per_token.max(0.1)).ceil() as usize
            }
        }
    }

    /// Largest character count whose measurement fits in `budget`.
    pub fn chars_within(&self, budget: usize) -> usize {
        match self {
            TextMeasure::Chars => budget,
            TextMeasure::Tokens { chars_per_token } => {
                (budget as f64 * chars_per_token.max(0.1)).floor() as usize
            }
        }
    }

    pub fn unit_name(&self) -> &'static str {
        match self {
            TextMeasure::Chars => "chars",
            TextMeasure::Tokens { .. } => "tokens",
        }
    }
}

/// Config-file spelling of [`TextMeasure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeUnit {
    #[default]
    Chars,
    Tokens,
}

impl From<SizeUnit> for TextMeasure {
    fn from(unit: SizeUnit) -> Self {
        match unit {
            SizeUnit::Chars => TextMeasure::Chars,
            SizeUnit::Tokens => TextMeasure::tokens(),
        }
    }
}
