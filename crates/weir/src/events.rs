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

//! Observability side-channel.
//!
//! Pipeline components publish [`PipelineEvent`]s through an [`EventSender`],
//! which never blocks: when the subscriber falls behind, events are dropped
//! and counted. Correctness-relevant reporting (permanently failed batches)
//! does not travel this channel; it goes through the
//! [`FailureHandler`](crate::failure::FailureHandler) instead.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::circuit::CircuitState;

/// An observability event emitted by the pipeline.
#[derive(Debug, Clone, Serialize)]
pub enum PipelineEvent {
    /// A batch was written to the sink.
    BatchFlushed {
        batch_size: usize,
        attempts: i32,
        latency: Duration,
    },
    /// A flush was rejected by the open circuit without contacting the sink.
    FlushRejected { batch_size: usize },
    /// A flush failed permanently.
    FlushFailed {
        batch_size: usize,
        attempts: i32,
        error: String,
    },
    /// A retry was scheduled after a failed attempt.
    RetryScheduled { attempt: i32, delay: Duration },
    /// The circuit breaker changed state.
    CircuitTransition {
        from: CircuitState,
        to: CircuitState,
    },
}

/// Non-blocking, lossy publisher half of the event channel.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<PipelineEvent>,
}

impl EventSender {
    /// Creates an event channel with the given buffer capacity.
    pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<PipelineEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (EventSender { tx }, rx)
    }

    /// Publishes an event without blocking.
    ///
    /// Events are dropped (and counted) when the buffer is full, and
    /// discarded silently once the receiver is gone.
    pub fn send(&self, event: PipelineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                metrics::counter!("weir_events_dropped_total").increment(1);
                debug!(?event, "event buffer full; dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
