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

//! Circuit breaker for the downstream sink.
//!
//! The breaker tracks consecutive sink failures and stops calling a failing
//! dependency for a cooldown period:
//!
//! - `Closed -> Open` after `failure_threshold` consecutive failures
//! - `Open -> HalfOpen` once `reset_timeout` has elapsed since the last
//!   failure; exactly one probe request is admitted
//! - `HalfOpen -> Closed` when the probe succeeds (failure count resets)
//! - `HalfOpen -> Open` when the probe fails (cooldown restarts)
//!
//! Transitions are not commutative, so all state access is serialized behind
//! a mutex; two concurrent failure observations can never double-count past
//! the threshold in a way that skips states.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::events::{EventSender, PipelineEvent};

/// State of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Requests pass through normally.
    Closed,
    /// Requests are rejected immediately; no attempt is made.
    Open,
    /// A single probe request is allowed through.
    HalfOpen,
}

impl CircuitState {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures required to open the circuit.
    pub failure_threshold: u32,
    /// Cooldown after the last failure before a probe is admitted.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// The breaker's decision for a flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed; the attempt proceeds normally.
    Allow,
    /// Cooldown elapsed; the attempt proceeds as the single half-open probe.
    Probe,
    /// Circuit open (or a probe is already in flight); no attempt is made.
    Reject,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
}

/// Circuit breaker with mutex-serialized state transitions.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    events: Option<EventSender>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
            }),
            events: None,
        }
    }

    /// Attaches an event sender for transition notifications.
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Current consecutive-failure count.
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Decides whether a flush attempt may proceed, transitioning
    /// `Open -> HalfOpen` when the cooldown has elapsed.
    pub fn try_acquire(&self) -> Admission {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Admission::Allow,
            // A probe is already in flight; only one is admitted.
            CircuitState::HalfOpen => Admission::Reject,
            CircuitState::Open => {
                let cooled = inner
                    .last_failure_at
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if cooled {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    Admission::Probe
                } else {
                    Admission::Reject
                }
            }
        }
    }

    /// Read-only check for the orchestrator: `true` when an attempt would
    /// certainly be rejected right now. Never consumes the probe admission.
    pub fn would_reject(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => false,
            CircuitState::HalfOpen => true,
            CircuitState::Open => inner
                .last_failure_at
                .map(|at| at.elapsed() < self.config.reset_timeout)
                .unwrap_or(false),
        }
    }

    /// Records a successful sink call.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.consecutive_failures = 0;
                self.transition(&mut inner, CircuitState::Closed);
            }
            // Late success from a call already in flight when the circuit
            // opened; the probe still decides recovery.
            CircuitState::Open => {}
        }
    }

    /// Records a failed sink call, restarting the cooldown.
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure_at = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        failures = inner.consecutive_failures,
                        "consecutive failure threshold reached; opening circuit"
                    );
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                warn!("probe failed; reopening circuit");
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {
                inner.consecutive_failures += 1;
            }
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        info!("circuit state change: {:?} -> {:?}", from, to);
        metrics::counter!("weir_circuit_transitions_total", "to" => to.as_str()).increment(1);
        if let Some(events) = &self.events {
            events.send(PipelineEvent::CircuitTransition { from, to });
        }
    }
}
