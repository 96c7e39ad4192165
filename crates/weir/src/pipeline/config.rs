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

//! Configuration types for the batch pipeline.
//!
//! This module contains the configuration struct and builder for
//! configuring the pipeline's batching, dispatch, and resilience behavior.

use serde::Serialize;
use std::time::Duration;

use crate::circuit::CircuitBreakerConfig;
use crate::error::PipelineError;
use crate::retry::RetryPolicy;

/// How flushes are dispatched by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlushMode {
    /// The consumer awaits each flush before accumulating further. Sink
    /// ordering matches enqueue ordering exactly.
    Inline,
    /// Flushes run on spawned workers, bounded by
    /// `max_in_flight_flushes`, while the consumer keeps accumulating the
    /// next batch. Batches are dispatched in FIFO order, but completions may
    /// interleave when more than one flush slot is configured.
    Background,
}

/// What happens to an in-flight flush when the pipeline shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShutdownPolicy {
    /// The flush runs to completion, except that any pending backoff sleep
    /// is skipped in favor of one immediate final attempt.
    CompleteInFlight,
    /// The flush gives up at the next backoff point and reports
    /// [`FlushError::ShuttingDown`](crate::error::FlushError::ShuttingDown).
    AbortInFlight,
}

/// Configuration for a [`BatchPipeline`](crate::pipeline::BatchPipeline).
///
/// # Construction
///
/// Use [`PipelineConfig::builder()`] to create a configuration:
///
/// ```rust,ignore
/// let config = PipelineConfig::builder()
///     .max_batch_size(64)
///     .max_batch_wait(Duration::from_millis(250))
///     .build();
/// ```
///
/// Or use the default configuration:
///
/// ```rust,ignore
/// let config = PipelineConfig::default();
/// ```
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub struct PipelineConfig {
    max_batch_size: usize,
    max_batch_wait: Duration,
    queue_capacity: Option<usize>,
    flush_mode: FlushMode,
    max_in_flight_flushes: usize,
    shutdown_policy: ShutdownPolicy,
    event_buffer_size: usize,
    retry_policy: RetryPolicy,
    circuit: CircuitBreakerConfig,
}

impl PipelineConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Batch size at which the size trigger fires.
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Maximum time a non-empty batch waits before the time trigger fires.
    pub fn max_batch_wait(&self) -> Duration {
        self.max_batch_wait
    }

    /// Queue capacity; `None` means unbounded.
    pub fn queue_capacity(&self) -> Option<usize> {
        self.queue_capacity
    }

    /// Whether flushes run inline or on background workers.
    pub fn flush_mode(&self) -> FlushMode {
        self.flush_mode
    }

    /// Maximum concurrent in-flight flushes in background mode.
    pub fn max_in_flight_flushes(&self) -> usize {
        self.max_in_flight_flushes
    }

    /// Fate of an in-flight flush on shutdown.
    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        self.shutdown_policy
    }

    /// Buffer capacity of the observability event channel.
    pub fn event_buffer_size(&self) -> usize {
        self.event_buffer_size
    }

    /// Retry policy applied to flush attempts.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Circuit breaker configuration.
    pub fn circuit(&self) -> CircuitBreakerConfig {
        self.circuit
    }

    pub(crate) fn validate(&self) -> Result<(), PipelineError> {
        if self.max_batch_size == 0 {
            return Err(PipelineError::Configuration {
                message: "max_batch_size must be at least 1".to_string(),
            });
        }
        if self.max_in_flight_flushes == 0 {
            return Err(PipelineError::Configuration {
                message: "max_in_flight_flushes must be at least 1".to_string(),
            });
        }
        if self.event_buffer_size == 0 {
            return Err(PipelineError::Configuration {
                message: "event_buffer_size must be at least 1".to_string(),
            });
        }
        if self.retry_policy.max_attempts < 1 {
            return Err(PipelineError::Configuration {
                message: "retry_policy.max_attempts must be at least 1".to_string(),
            });
        }
        if self.circuit.failure_threshold == 0 {
            return Err(PipelineError::Configuration {
                message: "circuit.failure_threshold must be at least 1".to_string(),
            });
        }
        if let Some(capacity) = self.queue_capacity {
            if capacity == 0 {
                return Err(PipelineError::Configuration {
                    message: "queue_capacity must be at least 1 when bounded".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfigBuilder::default().build()
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self {
            config: PipelineConfig {
                max_batch_size: 100,
                max_batch_wait: Duration::from_secs(1),
                queue_capacity: None,
                flush_mode: FlushMode::Inline,
                max_in_flight_flushes: 1,
                shutdown_policy: ShutdownPolicy::CompleteInFlight,
                event_buffer_size: 256,
                retry_policy: RetryPolicy::default(),
                circuit: CircuitBreakerConfig::default(),
            },
        }
    }
}

impl PipelineConfigBuilder {
    /// Sets the batch size trigger.
    pub fn max_batch_size(mut self, value: usize) -> Self {
        self.config.max_batch_size = value;
        self
    }

    /// Sets the batch wait (time) trigger.
    pub fn max_batch_wait(mut self, value: Duration) -> Self {
        self.config.max_batch_wait = value;
        self
    }

    /// Sets the queue capacity; `None` for unbounded.
    pub fn queue_capacity(mut self, value: Option<usize>) -> Self {
        self.config.queue_capacity = value;
        self
    }

    /// Sets the flush dispatch mode.
    pub fn flush_mode(mut self, value: FlushMode) -> Self {
        self.config.flush_mode = value;
        self
    }

    /// Sets the maximum concurrent in-flight flushes for background mode.
    pub fn max_in_flight_flushes(mut self, value: usize) -> Self {
        self.config.max_in_flight_flushes = value;
        self
    }

    /// Sets the shutdown policy for in-flight flushes.
    pub fn shutdown_policy(mut self, value: ShutdownPolicy) -> Self {
        self.config.shutdown_policy = value;
        self
    }

    /// Sets the event channel buffer capacity.
    pub fn event_buffer_size(mut self, value: usize) -> Self {
        self.config.event_buffer_size = value;
        self
    }

    /// Sets the retry policy for flush attempts.
    pub fn retry_policy(mut self, value: RetryPolicy) -> Self {
        self.config.retry_policy = value;
        self
    }

    /// Sets the circuit breaker configuration.
    pub fn circuit(mut self, value: CircuitBreakerConfig) -> Self {
        self.config.circuit = value;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}
