//! Retry controller with bounded exponential backoff
//!
//! The controller is an explicit state machine:
//!
//! ```text
//! Idle -> Attempting -> Succeeded
//!             |  ^   -> FailedFatal
//!             v  |   -> FailedExhausted
//!          BackingOff
//! ```
//!
//! Only one attempt is in flight at a time. [`BackoffState`] is plain data
//! so the attempt count and delays can be inspected without timers.

use crate::{attempt::AttemptOutcome, config::UploadConfig, ConfigError, UploadError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Ceiling for any single delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            multiplier: 2.0,
        }
    }
}

impl TryFrom<&UploadConfig> for RetryPolicy {
    type Error = ConfigError;

    fn try_from(config: &UploadConfig) -> Result<Self, Self::Error> {
        RetryPolicy::new(
            config.max_attempts,
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.backoff_multiplier,
        )
    }
}

impl RetryPolicy {
    /// Creates a validated policy. A delay above the ceiling is clamped.
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    ) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::InvalidRetryPolicy(
                "at least one attempt is required".to_string(),
            ));
        }
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::InvalidRetryPolicy(format!(
                "backoff multiplier must be >= 1.0, got {}",
                multiplier
            )));
        }

        Ok(Self {
            max_attempts,
            initial_delay: initial_delay.min(max_delay),
            max_delay,
            multiplier,
        })
    }

    /// A policy that never retries
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Same policy with a different attempt budget
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// Attempt counter and the delay to wait before the next attempt
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffState {
    attempt_number: u32,
    current_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    multiplier: f64,
}

impl BackoffState {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt_number: 1,
            current_delay: policy.initial_delay.min(policy.max_delay),
            max_delay: policy.max_delay,
            max_attempts: policy.max_attempts,
            multiplier: policy.multiplier,
        }
    }

    /// 1-based number of the current attempt
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    /// Delay to wait if the current attempt fails
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after the current one
    pub fn has_remaining(&self) -> bool {
        self.attempt_number < self.max_attempts
    }

    /// Move to the next attempt and grow the delay, capped at the ceiling
    pub fn advance(&mut self) {
        self.attempt_number += 1;
        let scaled = (self.current_delay.as_secs_f64() * self.multiplier)
            .min(self.max_delay.as_secs_f64());
        self.current_delay = Duration::from_secs_f64(scaled).max(self.current_delay);
    }
}

/// Controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting,
    BackingOff,
    Succeeded,
    FailedFatal,
    FailedExhausted,
}

impl RetryState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::FailedFatal | Self::FailedExhausted
        )
    }
}

/// Diagnostic emitted on every transition into `BackingOff`
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffRecord {
    /// Attempt that failed
    pub attempt: u32,
    /// Delay before the next attempt
    pub delay: Duration,
    /// Display form of the failure
    pub cause: String,
}

/// What the controller wants after an outcome
#[derive(Debug)]
pub enum Step<T> {
    /// Wait this long, then [`resume`](RetryController::resume)
    Retry(Duration),
    /// Terminal
    Finished(Result<T, UploadError>),
}

/// One unit of retryable work
#[async_trait]
pub trait Attempt: Send {
    type Output: Send;

    async fn attempt(&mut self, number: u32) -> AttemptOutcome<Self::Output>;
}

/// Drives attempts under a [`RetryPolicy`]
#[derive(Debug)]
pub struct RetryController {
    backoff: BackoffState,
    state: RetryState,
    history: Vec<BackoffRecord>,
}

impl RetryController {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            backoff: BackoffState::new(policy),
            state: RetryState::Idle,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn backoff(&self) -> &BackoffState {
        &self.backoff
    }

    /// Every backoff taken so far
    pub fn history(&self) -> &[BackoffRecord] {
        &self.history
    }

    /// Attempts started so far
    pub fn attempts(&self) -> u32 {
        match self.state {
            RetryState::Idle => 0,
            _ => self.backoff.attempt_number(),
        }
    }

    /// `Idle -> Attempting`
    pub fn start(&mut self) {
        debug_assert_eq!(self.state, RetryState::Idle);
        self.state = RetryState::Attempting;
    }

    /// Feed the outcome of the current attempt
    pub fn record<T>(&mut self, outcome: AttemptOutcome<T>) -> Step<T> {
        debug_assert_eq!(self.state, RetryState::Attempting);
        let attempt = self.backoff.attempt_number();

        match outcome {
            AttemptOutcome::Success(value) => {
                self.state = RetryState::Succeeded;
                Step::Finished(Ok(value))
            }
            AttemptOutcome::Fatal(error) => {
                debug!(attempt, error = %error, "Upload attempt failed fatally");
                self.state = RetryState::FailedFatal;
                Step::Finished(Err(error))
            }
            AttemptOutcome::Retryable(cause) if self.backoff.has_remaining() => {
                let delay = self.backoff.current_delay();
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %cause,
                    "Upload attempt failed, retrying"
                );
                self.history.push(BackoffRecord {
                    attempt,
                    delay,
                    cause: cause.to_string(),
                });
                self.state = RetryState::BackingOff;
                Step::Retry(delay)
            }
            AttemptOutcome::Retryable(cause) => {
                debug!(attempt, error = %cause, "Upload attempts exhausted");
                self.state = RetryState::FailedExhausted;
                Step::Finished(Err(UploadError::Exhausted {
                    attempts: attempt,
                    source: cause,
                }))
            }
        }
    }

    /// `BackingOff -> Attempting`, once the delay has elapsed
    pub fn resume(&mut self) {
        debug_assert_eq!(self.state, RetryState::BackingOff);
        self.backoff.advance();
        self.state = RetryState::Attempting;
    }

    /// Run attempts until one succeeds, one fails fatally, or the budget is spent
    pub async fn run<A>(&mut self, work: &mut A) -> Result<A::Output, UploadError>
    where
        A: Attempt + ?Sized,
    {
        self.start();
        loop {
            let outcome = work.attempt(self.backoff.attempt_number()).await;
            match self.record(outcome) {
                Step::Retry(delay) => {
                    tokio::time::sleep(delay).await;
                    self.resume();
                }
                Step::Finished(result) => return result,
            }
        }
    }
}
