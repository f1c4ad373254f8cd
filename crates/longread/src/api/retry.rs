//! Retry policy for completion requests.
//!
//! Two independent sub-policies, keyed off [`ServiceErrorKind`]:
//!
//! - **Rate limits** wait for the service's own hint (`Retry-After`,
//!   `retry-after-ms`, or "Please retry after N" in the body) when present,
//!   otherwise back off exponentially from a fixed base.
//! - **Timeouts** (and empty responses) retry immediately, then back off
//!   linearly.
//!
//! Everything else is fatal and never retried. The math here is pure so the
//! schedule is deterministic for a given sequence of failures; the async
//! loop that sleeps between attempts lives in
//! [`CompletionClient`](crate::engine::completion::CompletionClient).

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::api::service::{ServiceError, ServiceErrorKind};
use crate::error::CompletionError;

static RETRY_AFTER_BODY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry after (\d+)(?:\s*(ms|milliseconds))?").expect("valid regex")
});

/// Backoff for rate-limit responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    /// Total requests allowed while rate limited, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry when the service gave no hint.
    #[serde(with = "millis", rename = "base_delay_ms")]
    pub base_delay: Duration,
    /// Cap for the exponential schedule.
    #[serde(with = "millis", rename = "max_delay_ms")]
    pub max_delay: Duration,
    /// Backoff multiplier (2.0 doubles each time).
    pub multiplier: f64,
    /// Prefer the service's suggested delay over the exponential schedule.
    pub honor_retry_after: bool,
    /// Upper bound applied to service-suggested delays.
    #[serde(with = "millis", rename = "max_retry_after_ms")]
    pub max_retry_after: Duration,
    /// Deterministic jitter to spread retries. Off by default.
    pub jitter: bool,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            honor_retry_after: true,
            max_retry_after: Duration::from_secs(120),
            jitter: false,
        }
    }
}

impl RateLimitPolicy {
    /// Delay before retry number `retry` (0-indexed), given the service hint.
    pub fn delay_for_retry(&self, retry: u32, hint: Option<Duration>) -> Duration {
        if self.honor_retry_after
            && let Some(hint) = hint
        {
            return hint.min(self.max_retry_after);
        }

        let base = self.base_delay.as_secs_f64() * self.multiplier.powi(retry as i32);
        let capped = base.min(self.max_delay.as_secs_f64()).max(0.0);

        if self.jitter {
            // Fixed per-attempt factors keep the schedule reproducible.
            let jitter_factor = match retry % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Backoff for network timeouts and empty responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutPolicy {
    /// Total requests allowed while timing out, including the first.
    pub max_attempts: u32,
    /// Linear step: retry `n` (0-indexed) waits `n * step`.
    #[serde(with = "millis", rename = "step_ms")]
    pub step: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            step: Duration::from_secs(5),
        }
    }
}

impl TimeoutPolicy {
    /// The first retry is immediate; later ones wait one more step each.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.step * retry
    }
}

/// Full retry configuration for one completion request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub rate_limit: RateLimitPolicy,
    pub timeout: TimeoutPolicy,
}

impl RetryPolicy {
    /// Set the attempt ceiling of both sub-policies.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.rate_limit.max_attempts = attempts;
        self.timeout.max_attempts = attempts;
        self
    }

    /// A policy that never waits. Useful in tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            rate_limit: RateLimitPolicy {
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                honor_retry_after: false,
                ..Default::default()
            },
            timeout: TimeoutPolicy {
                step: Duration::ZERO,
                ..Default::default()
            },
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug)]
pub enum RetryDecision {
    /// Wait this long, then send the request again.
    Retry(Duration),
    /// Give up; surface this error.
    GiveUp(CompletionError),
}

/// Per-request retry bookkeeping. Created fresh for each request and
/// dropped when it succeeds or gives up.
#[derive(Debug, Default, Clone)]
pub struct RetryState {
    /// Requests sent so far.
    pub attempts: u32,
    pub rate_limit_failures: u32,
    pub timeout_failures: u32,
    pub last_error: Option<ServiceErrorKind>,
    /// Delay chosen after the most recent failure.
    pub last_delay: Option<Duration>,
    /// Sum of all delays chosen so far.
    pub total_delay: Duration,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request being sent.
    pub fn begin_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Record a failure and decide whether to retry.
    pub fn on_failure(&mut self, error: &ServiceError, policy: &RetryPolicy) -> RetryDecision {
        let kind = error.kind();
        self.last_error = Some(kind);

        if !kind.is_transient() {
            return RetryDecision::GiveUp(CompletionError::Fatal {
                kind,
                message: error.to_string(),
            });
        }

        let delay = match kind {
            ServiceErrorKind::RateLimited => {
                self.rate_limit_failures += 1;
                if self.rate_limit_failures >= policy.rate_limit.max_attempts {
                    return RetryDecision::GiveUp(CompletionError::RateLimitExhausted {
                        attempts: self.rate_limit_failures,
                        message: error.to_string(),
                    });
                }
                policy
                    .rate_limit
                    .delay_for_retry(self.rate_limit_failures - 1, error.retry_after())
            }
            // Timeouts and empty responses share one budget.
            _ => {
                self.timeout_failures += 1;
                if self.timeout_failures >= policy.timeout.max_attempts {
                    return RetryDecision::GiveUp(CompletionError::TimeoutExhausted {
                        attempts: self.timeout_failures,
                        message: error.to_string(),
                    });
                }
                policy.timeout.delay_for_retry(self.timeout_failures - 1)
            }
        };

        self.last_delay = Some(delay);
        self.total_delay += delay;
        RetryDecision::Retry(delay)
    }

    /// Number of retries performed (attempts beyond the first).
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

// ── Service hints ──────────────────────────────────────────────────

/// Parse a `Retry-After` HTTP header value: integer seconds or an HTTP date.
pub fn parse_retry_after_header(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.signed_duration_since(chrono::Utc::now());
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// Parse a `retry-after-ms` header value.
pub fn parse_retry_after_ms_header(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_millis)
}

/// Extract a "Please retry after N" hint from a response body.
pub fn retry_hint_from_body(body: &str) -> Option<Duration> {
    let caps = RETRY_AFTER_BODY_REGEX.captures(body)?;
    let amount: u64 = caps.get(1)?.as_str().parse().ok()?;
    if caps.get(2).is_some() {
        Some(Duration::from_millis(amount))
    } else {
        Some(Duration::from_secs(amount))
    }
}

/// Longest assistant message still treated as a possible quota notice.
const INLINE_NOTICE_MAX_CHARS: usize = 500;

/// Whether an error body describes a rate-limit condition.
pub fn is_rate_limit_message(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("exceeded token rate limit")
        || lower.contains("rate limit exceeded")
        || lower.contains("too many requests")
}

/// Whether a successful completion's text is really Azure's quota notice
/// ("exceeded token rate limit ... Please retry after N seconds") rather
/// than a summary. Only short messages carrying a retry hint qualify.
pub fn is_inline_rate_limit_notice(content: &str) -> bool {
    content.chars().count() <= INLINE_NOTICE_MAX_CHARS
        && content.to_lowercase().contains("exceeded token rate limit")
        && retry_hint_from_body(content).is_some()
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_limited(hint: Option<Duration>) -> ServiceError {
        ServiceError::RateLimited {
            retry_after: hint,
            message: "HTTP 429".into(),
        }
    }

    #[test]
    fn exponential_delay_without_hint() {
        let policy = RateLimitPolicy::default();
        assert_eq!(policy.delay_for_retry(0, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for_retry(1, None), Duration::from_secs(4));
        assert_eq!(policy.delay_for_retry(2, None), Duration::from_secs(8));
    }

    #[test]
    fn exponential_delay_capped_at_max() {
        let policy = RateLimitPolicy {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(policy.delay_for_retry(10, None), Duration::from_secs(10));
    }

    #[test]
    fn service_hint_wins_and_is_capped() {
        let policy = RateLimitPolicy::default();
        assert_eq!(
            policy.delay_for_retry(3, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert_eq!(
            policy.delay_for_retry(0, Some(Duration::from_secs(900))),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn hint_ignored_when_disabled() {
        let policy = RateLimitPolicy {
            honor_retry_after: false,
            ..Default::default()
        };
        assert_eq!(
            policy.delay_for_retry(0, Some(Duration::from_secs(30))),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn jitter_reduces_delay() {
        let plain = RateLimitPolicy::default();
        let jittered = RateLimitPolicy {
            jitter: true,
            ..Default::default()
        };
        assert!(jittered.delay_for_retry(2, None) < plain.delay_for_retry(2, None));
    }

    #[test]
    fn timeout_backoff_is_immediate_then_linear() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.delay_for_retry(0), Duration::ZERO);
        assert_eq!(policy.delay_for_retry(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for_retry(2), Duration::from_secs(10));
    }

    #[test]
    fn two_rate_limits_give_two_delays() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::new();
        for expected in [2, 4] {
            state.begin_attempt();
            match state.on_failure(&rate_limited(None), &policy) {
                RetryDecision::Retry(d) => assert_eq!(d, Duration::from_secs(expected)),
                RetryDecision::GiveUp(e) => panic!("unexpected give-up: {e}"),
            }
        }
        state.begin_attempt();
        assert_eq!(state.attempts, 3);
        assert_eq!(state.retries(), 2);
        assert_eq!(state.total_delay, Duration::from_secs(6));
    }

    #[test]
    fn rate_limit_exhaustion_at_max_attempts() {
        let policy = RetryPolicy::default().with_max_attempts(3);
        let mut state = RetryState::new();
        let mut decisions = Vec::new();
        for _ in 0..3 {
            state.begin_attempt();
            decisions.push(state.on_failure(&rate_limited(None), &policy));
        }
        assert!(matches!(decisions[0], RetryDecision::Retry(_)));
        assert!(matches!(decisions[1], RetryDecision::Retry(_)));
        match &decisions[2] {
            RetryDecision::GiveUp(CompletionError::RateLimitExhausted { attempts, .. }) => {
                assert_eq!(*attempts, 3)
            }
            other => panic!("expected RateLimitExhausted, got {other:?}"),
        }
    }

    #[test]
    fn timeout_exhaustion() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::new();
        let err = ServiceError::timeout("timed out");
        assert!(matches!(state.on_failure(&err, &policy), RetryDecision::Retry(d) if d.is_zero()));
        assert!(matches!(state.on_failure(&err, &policy), RetryDecision::Retry(_)));
        assert!(matches!(
            state.on_failure(&err, &policy),
            RetryDecision::GiveUp(CompletionError::TimeoutExhausted { attempts: 3, .. })
        ));
    }

    #[test]
    fn fatal_errors_never_retry() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::new();
        let err = ServiceError::Auth {
            status: 401,
            message: "nope".into(),
        };
        match state.on_failure(&err, &policy) {
            RetryDecision::GiveUp(CompletionError::Fatal { kind, .. }) => {
                assert_eq!(kind, ServiceErrorKind::Auth)
            }
            other => panic!("expected Fatal, got {other:?}"),
        }
        assert_eq!(state.total_delay, Duration::ZERO);
    }

    #[test]
    fn retry_after_header_seconds_and_dates() {
        assert_eq!(parse_retry_after_header("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after_header(" 3 "), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after_header("soon"), None);
        assert_eq!(
            parse_retry_after_header("Thu, 01 Jan 1970 00:00:00 GMT"),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after_ms_header("250"), Some(Duration::from_millis(250)));
    }

    #[test]
    fn retry_hint_from_azure_style_body() {
        let body = "Requests to the ChatCompletions_Create Operation have exceeded token rate \
                    limit of your current tier. Please retry after 23 seconds.";
        assert!(is_rate_limit_message(body));
        assert_eq!(retry_hint_from_body(body), Some(Duration::from_secs(23)));
        assert_eq!(
            retry_hint_from_body("retry after 500 ms"),
            Some(Duration::from_millis(500))
        );
        assert_eq!(retry_hint_from_body("no hint here"), None);
    }

    #[test]
    fn quota_notice_needs_azure_phrase_and_hint() {
        assert!(is_inline_rate_limit_notice(
            "Requests have exceeded token rate limit of your current tier. Please retry after 4 seconds."
        ));
        // Summaries about HTTP APIs mention the generic phrases.
        assert!(!is_inline_rate_limit_notice(
            "The API returns HTTP 429 Too Many Requests when clients exceed quotas; \
             clients should back off once the rate limit exceeded error appears."
        ));
        assert!(!is_inline_rate_limit_notice(
            "The gateway logs 'exceeded token rate limit' but gives no wait time."
        ));
        let long = format!(
            "{} The tenant exceeded token rate limit. Please retry after 4 seconds.",
            "Quota handling is described in detail. ".repeat(20)
        );
        assert!(!is_inline_rate_limit_notice(&long));
    }

    #[test]
    fn negative_multiplier_never_yields_negative_delay() {
        let policy = RateLimitPolicy {
            multiplier: -2.0,
            ..Default::default()
        };
        assert_eq!(policy.delay_for_retry(0, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for_retry(1, None), Duration::ZERO);
        assert_eq!(policy.delay_for_retry(2, None), Duration::from_secs(8));
    }

    #[test]
    fn policy_deserializes_from_millis() {
        let policy: RetryPolicy = serde_json::from_str(
            r#"{"rate_limit": {"max_attempts": 2, "base_delay_ms": 100}, "timeout": {"step_ms": 50}}"#,
        )
        .unwrap();
        assert_eq!(policy.rate_limit.max_attempts, 2);
        assert_eq!(policy.rate_limit.base_delay, Duration::from_millis(100));
        assert_eq!(policy.rate_limit.max_delay, Duration::from_secs(60));
        assert_eq!(policy.timeout.step, Duration::from_millis(50));
        assert_eq!(policy.timeout.max_attempts, 3);
    }
}
