//! Completion-service boundary and retry policy.
//!
//! - [`service`]: the [`CompletionService`] trait every backend implements,
//!   plus the structured [`ServiceError`] it reports. The error kind decides
//!   whether a request is retried.
//! - [`retry`]: [`RetryPolicy`] with separate rate-limit (exponential or
//!   service-suggested) and timeout (immediate, then linear) schedules, and
//!   parsers for `Retry-After` hints.

pub mod retry;
pub mod service;

pub use retry::{RetryPolicy, RetryState};
pub use service::{CompletionService, ServiceError, ServiceErrorKind, ServiceResponse};
