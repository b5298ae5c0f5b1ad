//! Automatic reconnection with pluggable backoff
//!
//! [`AutoReconnect`] owns the retry countdown of a login. How long to wait
//! before each retry is decided by a [`ReconnectPolicy`]; the bundled
//! [`ExponentialBackoff`] grows the delay geometrically up to a cap.

use std::time::{Duration, Instant};

use tracing::debug;

/// Configuration for automatic reconnection behavior
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReconnectionPolicy {
    /// Base interval in seconds for exponential backoff
    #[serde(default = "default_base_interval")]
    pub base_interval_secs: u32,

    /// Multiplier for exponential backoff (typically 2)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,

    /// Maximum interval in seconds (cap for exponential growth)
    #[serde(default = "default_max_interval")]
    pub max_interval_secs: u32,

    /// Delay before reconnecting after the network configuration changed
    #[serde(default = "default_network_change_delay")]
    pub network_change_delay_secs: u32,
}

fn default_base_interval() -> u32 {
    5
}
fn default_backoff_multiplier() -> u32 {
    2
}
fn default_max_interval() -> u32 {
    1800
}
fn default_network_change_delay() -> u32 {
    1
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            base_interval_secs: default_base_interval(),
            backoff_multiplier: default_backoff_multiplier(),
            max_interval_secs: default_max_interval(),
            network_change_delay_secs: default_network_change_delay(),
        }
    }
}

impl ReconnectionPolicy {
    /// Validate the entire policy
    ///
    /// Returns the first validation error encountered.
    pub fn validate(&self) -> Result<(), PolicyValidationError> {
        self.validate_base_interval()?;
        self.validate_backoff_multiplier()?;
        self.validate_max_interval()?;
        self.validate_network_change_delay()?;
        Ok(())
    }

    /// Validate base_interval_secs is within range 1-300
    fn validate_base_interval(&self) -> Result<(), PolicyValidationError> {
        if self.base_interval_secs < 1 || self.base_interval_secs > 300 {
            Err(PolicyValidationError::InvalidBaseInterval(
                self.base_interval_secs,
            ))
        } else {
            Ok(())
        }
    }

    /// Validate backoff_multiplier is within range 1-10
    fn validate_backoff_multiplier(&self) -> Result<(), PolicyValidationError> {
        if self.backoff_multiplier < 1 || self.backoff_multiplier > 10 {
            Err(PolicyValidationError::InvalidBackoffMultiplier(
                self.backoff_multiplier,
            ))
        } else {
            Ok(())
        }
    }

    /// Validate max_interval_secs is >= base_interval_secs
    fn validate_max_interval(&self) -> Result<(), PolicyValidationError> {
        if self.max_interval_secs < self.base_interval_secs {
            Err(PolicyValidationError::MaxIntervalLessThanBase(
                self.max_interval_secs,
                self.base_interval_secs,
            ))
        } else {
            Ok(())
        }
    }

    /// Validate network_change_delay_secs is within range 0-60
    fn validate_network_change_delay(&self) -> Result<(), PolicyValidationError> {
        if self.network_change_delay_secs > 60 {
            Err(PolicyValidationError::InvalidNetworkChangeDelay(
                self.network_change_delay_secs,
            ))
        } else {
            Ok(())
        }
    }

    pub fn network_change_delay(&self) -> Duration {
        Duration::from_secs(self.network_change_delay_secs as u64)
    }
}

/// Validation errors for ReconnectionPolicy
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyValidationError {
    #[error("base_interval_secs must be between 1 and 300, got: {0}")]
    InvalidBaseInterval(u32),

    #[error("backoff_multiplier must be between 1 and 10, got: {0}")]
    InvalidBackoffMultiplier(u32),

    #[error("max_interval_secs ({0}) must be >= base_interval_secs ({1})")]
    MaxIntervalLessThanBase(u32, u32),

    #[error("network_change_delay_secs must be at most 60, got: {0}")]
    InvalidNetworkChangeDelay(u32),
}

/// Decides how long to wait before each retry
pub trait ReconnectPolicy: std::fmt::Debug + Send {
    /// Delay before retry number `attempt` (1-indexed)
    fn delay(&self, attempt: u32) -> Duration;

    /// Delay before reconnecting after a network change
    fn network_change_delay(&self) -> Duration;
}

/// base_interval × multiplier^(attempt-1), capped at max_interval
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    policy: ReconnectionPolicy,
}

impl ExponentialBackoff {
    pub fn new(policy: ReconnectionPolicy) -> Self {
        Self { policy }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(ReconnectionPolicy::default())
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.policy.base_interval_secs as u64;
        let multiplier = self.policy.backoff_multiplier as u64;
        let max = self.policy.max_interval_secs as u64;

        let exponent = attempt.saturating_sub(1);
        let interval_secs = multiplier
            .checked_pow(exponent)
            .and_then(|factor| base.checked_mul(factor))
            .unwrap_or(u64::MAX);

        Duration::from_secs(interval_secs.min(max))
    }

    fn network_change_delay(&self) -> Duration {
        self.policy.network_change_delay()
    }
}

/// Retry countdown of one login
#[derive(Debug)]
pub struct AutoReconnect {
    policy: Box<dyn ReconnectPolicy>,
    /// Retries scheduled since the last successful session
    attempts: u32,
    deadline: Option<Instant>,
}

impl AutoReconnect {
    pub fn new(policy: Box<dyn ReconnectPolicy>) -> Self {
        Self {
            policy,
            attempts: 0,
            deadline: None,
        }
    }

    /// Schedule the next backoff retry and return its delay
    pub fn schedule(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        let delay = self.policy.delay(self.attempts);
        debug!(attempt = self.attempts, ?delay, "Scheduling reconnect");
        self.deadline = Some(Instant::now() + delay);
        delay
    }

    /// Schedule a reconnect after a network change, without backoff
    pub fn schedule_network_change(&mut self) -> Duration {
        let delay = self.policy.network_change_delay();
        self.deadline = Some(Instant::now() + delay);
        delay
    }

    /// Drop the countdown
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// The countdown elapsed
    pub fn fired(&mut self) {
        self.deadline = None;
    }

    /// Forget the backoff history after a successful session
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.deadline = None;
    }

    pub fn is_retrying(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whole seconds left until the retry, rounded up
    pub fn seconds_until_reconnect(&self) -> Option<u64> {
        self.deadline.map(|deadline| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let secs = remaining.as_secs();
            if remaining.subsec_nanos() > 0 {
                secs + 1
            } else {
                secs
            }
        })
    }
}

impl Default for AutoReconnect {
    fn default() -> Self {
        Self::new(Box::new(ExponentialBackoff::default()))
    }
}
