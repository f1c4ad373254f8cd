//! Artifact markers models add to their output.
//!
//! Models tend to restate section labels, open with "Summary:", or trail
//! off with "..." where they expect to continue. Left in place these make
//! the assembled summary read as a stack of labeled fragments. Each
//! [`MarkerRule`] is a regex whose matches are deleted; [`MarkerRules`]
//! applies every rule until the text stops changing.
//!
//! Extra rules can be appended at runtime (see `markers` in the config
//! file) without touching the assembler.

use regex::Regex;

use crate::error::ConfigError;

/// Upper bound on cleanup passes. Each pass that changes the text removes at
/// least one character, so this only guards against pathological rules.
const MAX_PASSES: usize = 16;

/// A named pattern whose matches are removed from model output.
#[derive(Debug, Clone)]
pub struct MarkerRule {
    name: String,
    pattern: Regex,
}

impl MarkerRule {
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, ConfigError> {
        let pattern = Regex::new(pattern).map_err(|source| ConfigError::InvalidMarker {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            name: name.into(),
            pattern,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    fn strip<'t>(&self, text: &'t str) -> std::borrow::Cow<'t, str> {
        self.pattern.replace_all(text, "")
    }
}

/// Built-in rules as (name, pattern).
const BUILTIN_RULES: &[(&str, &str)] = &[
    // [PREVIOUS_SUMMARY] / [CURRENT_CHUNK] echoed back on their own line.
    (
        "section-label",
        r"(?m)^[ \t]*\[(?:PREVIOUS_SUMMARY|CURRENT_CHUNK)\][ \t]*:?[ \t]*(?:\r?\n|$)",
    ),
    // "# Summary", "## Updated Summary (continued)" headings.
    (
        "summary-heading",
        r"(?im)^[ \t]*#{1,6}[ \t]*(?:updated |continued |final |revised )?summary(?:[ \t]*\(continued\))?[ \t]*:?[ \t]*(?:\r?\n|$)",
    ),
    // "Summary:" / "**Updated summary:**" at the start of a line.
    (
        "summary-prefix",
        r"(?im)^[ \t]*(?:\*\*)?(?:updated |continued |final |revised )?summary(?:[ \t]*\(continued\))?[ \t]*:(?:\*\*)?[ \t]*",
    ),
    // Continuation marks opening the response.
    ("leading-continuation", r"\A\s*(?:\.{3}|\u{2026}|\(continued\))[ \t]*"),
    // Continuation marks closing the response.
    ("trailing-continuation", r"[ \t]*(?:\.{3}|\u{2026}|\(continued\)|\(to be continued\))\s*\z"),
];

/// Ordered, extensible set of [`MarkerRule`]s.
#[derive(Debug, Clone)]
pub struct MarkerRules {
    rules: Vec<MarkerRule>,
}

impl Default for MarkerRules {
    fn default() -> Self {
        let rules = BUILTIN_RULES
            .iter()
            .filter_map(|(name, pattern)| MarkerRule::new(*name, pattern).ok())
            .collect();
        Self { rules }
    }
}

impl MarkerRules {
    /// A rule set with no rules; `clean` then only trims.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn push(&mut self, rule: MarkerRule) {
        self.rules.push(rule);
    }

    /// Append a user-supplied pattern to the set.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, ConfigError> {
        let name = format!("custom-{}", self.rules.len());
        self.push(MarkerRule::new(name, pattern)?);
        Ok(self)
    }

    /// Append several patterns, failing on the first invalid one.
    pub fn with_patterns<I, S>(self, patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        patterns
            .into_iter()
            .try_fold(self, |rules, p| rules.with_pattern(p.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarkerRule> {
        self.rules.iter()
    }

    /// Remove every marker and trim surrounding whitespace.
    pub fn clean(&self, text: &str) -> String {
        let mut current = text.trim().to_string();
        for _ in 0..MAX_PASSES {
            let mut next = current.clone();
            for rule in &self.rules {
                next = rule.strip(&next).into_owned();
            }
            let next = next.trim().to_string();
            if next == current {
                break;
            }
            current = next;
        }
        current
    }
}
