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

//! The sink seam and its resilient wrapper.
//!
//! [`BatchSink`] is the narrow interface to the downstream operation (a
//! database upsert, an HTTP call); the pipeline treats it as opaque.
//! [`ResilientSink`] wraps a sink with per-attempt retry and a shared
//! circuit breaker:
//!
//! - every attempt is gated by the breaker; an open circuit rejects the
//!   flush without contacting the sink
//! - failed attempts back off per the [`RetryPolicy`](crate::retry::RetryPolicy),
//!   and backoff sleeps abort promptly on shutdown
//! - delivery is at-least-once from the accumulator's perspective; the sink
//!   is assumed (not verified) to be idempotent downstream
//!
//! A batch retried after backoff is passed unchanged: original items,
//! original order.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::circuit::{Admission, CircuitBreaker, CircuitState};
use crate::error::{FlushError, SinkError};
use crate::events::{EventSender, PipelineEvent};
use crate::item::Batch;
use crate::retry::RetryPolicy;

/// The downstream operation that durably consumes a batch.
///
/// Implementations report failure through [`SinkError`], classifying it as
/// transient or permanent so retry conditions can act on it.
#[async_trait]
pub trait BatchSink<T>: Send + Sync {
    /// Writes a batch downstream.
    async fn write(&self, batch: &Batch<T>) -> Result<(), SinkError>;
}

/// Receipt for a successful flush.
#[derive(Debug, Clone, Copy)]
pub struct FlushReceipt {
    /// Number of sink attempts made, including the successful one.
    pub attempts: i32,
    /// Time from the first attempt to success, backoff included.
    pub latency: Duration,
}

/// A [`BatchSink`] hardened with retry and a circuit breaker.
pub struct ResilientSink<T> {
    sink: Arc<dyn BatchSink<T>>,
    retry_policy: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    shutdown: watch::Receiver<bool>,
    abort_on_shutdown: bool,
    events: Option<EventSender>,
    // Keeps the standalone shutdown channel alive so waits never error.
    _shutdown_guard: Option<watch::Sender<bool>>,
}

impl<T> ResilientSink<T>
where
    T: Send + Sync + 'static,
{
    /// Wraps a sink with the given retry policy and breaker.
    ///
    /// A sink created this way has no external shutdown signal; use
    /// [`with_shutdown`](Self::with_shutdown) to attach one.
    pub fn new(
        sink: Arc<dyn BatchSink<T>>,
        retry_policy: RetryPolicy,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        let (guard, shutdown) = watch::channel(false);
        Self {
            sink,
            retry_policy,
            breaker,
            shutdown,
            abort_on_shutdown: false,
            events: None,
            _shutdown_guard: Some(guard),
        }
    }

    /// Attaches a shutdown signal.
    ///
    /// When the signal fires during a backoff sleep, the sleep is cut short:
    /// with `abort_on_shutdown` the flush returns
    /// [`FlushError::ShuttingDown`]; otherwise one immediate final attempt
    /// is made in place of the remaining backoff.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>, abort_on_shutdown: bool) -> Self {
        self.shutdown = shutdown;
        self.abort_on_shutdown = abort_on_shutdown;
        self._shutdown_guard = None;
        self
    }

    /// Attaches an event sender for retry notifications.
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Current circuit state, for callers deciding whether to flush at all.
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// The shared breaker.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Flushes a batch through the retry loop and circuit breaker.
    ///
    /// Returns a [`FlushReceipt`] on success. Failure kinds are
    /// discriminated: [`FlushError::CircuitOpen`] means the sink was never
    /// contacted; [`FlushError::CircuitTripped`] and
    /// [`FlushError::RetriesExhausted`] carry the attempt count and the last
    /// sink failure.
    pub async fn flush(&self, batch: &Batch<T>) -> Result<FlushReceipt, FlushError> {
        let started = Instant::now();
        let mut shutdown = self.shutdown.clone();
        let mut attempts: i32 = 0;
        let mut last_error: Option<SinkError> = None;
        let mut final_attempt = false;

        loop {
            let probe = match self.breaker.try_acquire() {
                Admission::Reject => {
                    return Err(match last_error.take() {
                        None => FlushError::CircuitOpen,
                        Some(last_error) => FlushError::CircuitTripped {
                            attempts,
                            last_error,
                        },
                    });
                }
                Admission::Probe => true,
                Admission::Allow => false,
            };

            attempts += 1;
            match self.sink.write(batch).await {
                Ok(()) => {
                    self.breaker.on_success();
                    return Ok(FlushReceipt {
                        attempts,
                        latency: started.elapsed(),
                    });
                }
                Err(error) => {
                    self.breaker.on_failure();
                    metrics::counter!("weir_sink_failures_total").increment(1);
                    warn!(
                        attempt = attempts,
                        batch_size = batch.len(),
                        error = %error,
                        "sink write failed"
                    );

                    if probe {
                        // The half-open state admits exactly one probe.
                        return Err(FlushError::CircuitTripped {
                            attempts,
                            last_error: error,
                        });
                    }
                    if final_attempt || !self.retry_policy.should_retry(attempts, &error) {
                        return Err(FlushError::RetriesExhausted {
                            attempts,
                            last_error: error,
                        });
                    }

                    let delay = self.retry_policy.calculate_delay(attempts);
                    metrics::counter!("weir_retries_total").increment(1);
                    if let Some(events) = &self.events {
                        events.send(PipelineEvent::RetryScheduled {
                            attempt: attempts + 1,
                            delay,
                        });
                    }
                    debug!(
                        next_attempt = attempts + 1,
                        delay_ms = delay.as_millis() as u64,
                        "backing off before retry"
                    );
                    last_error = Some(error);

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.wait_for(|stop| *stop) => {
                            if self.abort_on_shutdown {
                                return Err(FlushError::ShuttingDown { attempts });
                            }
                            debug!("shutdown during backoff; making one final attempt immediately");
                            final_attempt = true;
                        }
                    }
                }
            }
        }
    }
}
