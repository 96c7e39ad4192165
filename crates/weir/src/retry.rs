/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Retry policies for flush attempts.
//!
//! A [`RetryPolicy`] controls how many times a failed flush is reattempted,
//! how long to back off between attempts, and which failures qualify for a
//! retry at all. The default is three attempts with exponential backoff
//! (base 2, initial delay 1s, capped at 30s) and no jitter; jitter can be
//! enabled for deployments where synchronized retries are a concern.
//!
//! # Example
//!
//! ```rust,ignore
//! use weir::retry::{BackoffStrategy, RetryCondition, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::builder()
//!     .max_attempts(5)
//!     .initial_delay(Duration::from_millis(100))
//!     .backoff_strategy(BackoffStrategy::Exponential { base: 2.0, multiplier: 1.0 })
//!     .retry_condition(RetryCondition::TransientOnly)
//!     .build();
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SinkError;

/// How the delay between retry attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// Every delay equals the initial delay.
    Fixed,
    /// Delay grows linearly with the attempt number.
    Linear { multiplier: f64 },
    /// Delay grows as `base^(attempt-1)`, scaled by `multiplier`.
    Exponential { base: f64, multiplier: f64 },
}

/// A condition that must hold for a failed attempt to be retried.
///
/// All conditions on a policy must be satisfied for a retry to happen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryCondition {
    /// Never retry.
    Never,
    /// Retry any failure.
    AllErrors,
    /// Retry only failures the sink classified as transient.
    TransientOnly,
    /// Retry failures whose message contains one of the given patterns
    /// (case-insensitive).
    ErrorPattern { patterns: Vec<String> },
}

/// Retry behavior for a flush: attempt budget, backoff shape, and the
/// conditions under which a failure qualifies for another attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: i32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound applied to every computed delay.
    pub max_delay: Duration,
    /// How delays grow across attempts.
    pub backoff_strategy: BackoffStrategy,
    /// Conditions that must all hold for a retry.
    pub retry_conditions: Vec<RetryCondition>,
    /// Whether to randomize delays. When enabled each delay is scaled by a
    /// uniform factor in `[0.5, 1.0]`, which breaks retry synchronization
    /// but keeps delays under the computed bound.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicyBuilder::default().build()
    }
}

impl RetryPolicy {
    /// Creates a policy builder with default values.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Computes the backoff delay after the given failed attempt (1-based).
    ///
    /// Delays are capped at `max_delay`. With jitter disabled, delays are
    /// non-decreasing across attempts for every strategy.
    pub fn calculate_delay(&self, attempt: i32) -> Duration {
        let attempt = attempt.max(1);
        let factor = match self.backoff_strategy {
            BackoffStrategy::Fixed => 1.0,
            BackoffStrategy::Linear { multiplier } => multiplier * attempt as f64,
            BackoffStrategy::Exponential { base, multiplier } => {
                multiplier * base.powi(attempt - 1)
            }
        };

        let capped = (self.initial_delay.as_secs_f64() * factor.max(0.0))
            .min(self.max_delay.as_secs_f64());
        let delay = Duration::from_secs_f64(capped);

        if self.jitter && delay > Duration::ZERO {
            use rand::Rng;
            delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
        } else {
            delay
        }
    }

    /// Whether a failure on the given attempt (1-based) should be retried.
    ///
    /// Checks the attempt budget first, then requires every retry condition
    /// to be satisfied.
    pub fn should_retry(&self, attempt: i32, error: &SinkError) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }

        self.retry_conditions.iter().all(|condition| match condition {
            RetryCondition::Never => false,
            RetryCondition::AllErrors => true,
            RetryCondition::TransientOnly => error.is_transient(),
            RetryCondition::ErrorPattern { patterns } => {
                let message = error.to_string().to_lowercase();
                patterns
                    .iter()
                    .any(|pattern| message.contains(&pattern.to_lowercase()))
            }
        })
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self {
            policy: RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1000),
                max_delay: Duration::from_millis(30000),
                backoff_strategy: BackoffStrategy::Exponential {
                    base: 2.0,
                    multiplier: 1.0,
                },
                retry_conditions: vec![RetryCondition::AllErrors],
                jitter: false,
            },
        }
    }
}

impl RetryPolicyBuilder {
    /// Sets the maximum number of attempts, including the first.
    pub fn max_attempts(mut self, value: i32) -> Self {
        self.policy.max_attempts = value;
        self
    }

    /// Sets the delay after the first failed attempt.
    pub fn initial_delay(mut self, value: Duration) -> Self {
        self.policy.initial_delay = value;
        self
    }

    /// Sets the upper bound applied to every computed delay.
    pub fn max_delay(mut self, value: Duration) -> Self {
        self.policy.max_delay = value;
        self
    }

    /// Sets the backoff strategy.
    pub fn backoff_strategy(mut self, value: BackoffStrategy) -> Self {
        self.policy.backoff_strategy = value;
        self
    }

    /// Replaces the retry conditions with a single condition.
    pub fn retry_condition(mut self, value: RetryCondition) -> Self {
        self.policy.retry_conditions = vec![value];
        self
    }

    /// Replaces the full set of retry conditions.
    pub fn retry_conditions(mut self, value: Vec<RetryCondition>) -> Self {
        self.policy.retry_conditions = value;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, value: bool) -> Self {
        self.policy.jitter = value;
        self
    }

    /// Builds the policy.
    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}
