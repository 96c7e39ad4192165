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

//! Error types for the weir pipeline.
//!
//! Failures are represented as discriminated enums rather than exceptions or
//! logged-and-swallowed conditions, so callers are forced to handle the
//! failure path explicitly:
//!
//! - [`EnqueueError`] - producer-side rejection once the queue is closed
//! - [`SinkError`] - failures returned by a [`BatchSink`](crate::sink::BatchSink)
//!   implementation, classified as transient or permanent
//! - [`FlushError`] - the outcome of a failed flush, distinguishing "didn't
//!   even try" (circuit open) from "tried and failed" (retries exhausted)
//! - [`PipelineError`] - configuration and lifecycle errors

use std::fmt;
use thiserror::Error;

/// Error returned when enqueueing into a queue that has been closed.
///
/// Carries the rejected payload back to the producer so it is never silently
/// dropped during shutdown. Implemented by hand, like the channel send
/// errors it mirrors, so the payload type needs no extra bounds.
pub struct EnqueueError<T> {
    /// The payload that was rejected.
    pub item: T,
}

impl<T> fmt::Debug for EnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnqueueError").finish_non_exhaustive()
    }
}

impl<T> fmt::Display for EnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "work queue is closed; enqueue rejected")
    }
}

impl<T> std::error::Error for EnqueueError<T> {}

/// Failure returned by a sink implementation.
///
/// The transient/permanent split feeds the retry conditions of
/// [`RetryPolicy`](crate::retry::RetryPolicy): a `TransientOnly` policy will
/// retry `Transient` failures and give up immediately on `Permanent` ones.
#[derive(Debug, Error)]
pub enum SinkError {
    /// A failure that may succeed on retry (timeout, connection loss,
    /// temporary unavailability).
    #[error("transient sink failure: {message}")]
    Transient { message: String },

    /// A failure that will not succeed on retry (malformed batch, rejected
    /// payload, permission denied).
    #[error("permanent sink failure: {message}")]
    Permanent { message: String },
}

impl SinkError {
    /// Creates a transient failure from any displayable message.
    pub fn transient(message: impl Into<String>) -> Self {
        SinkError::Transient {
            message: message.into(),
        }
    }

    /// Creates a permanent failure from any displayable message.
    pub fn permanent(message: impl Into<String>) -> Self {
        SinkError::Permanent {
            message: message.into(),
        }
    }

    /// Whether this failure is potentially retryable.
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transient { .. })
    }
}

/// The outcome of a flush that did not succeed.
///
/// A circuit-open rejection is a distinct kind from a real sink failure so
/// callers can distinguish "didn't even try" from "tried and failed".
#[derive(Debug, Error)]
pub enum FlushError {
    /// The circuit breaker was open; the flush was rejected without
    /// contacting the sink.
    #[error("circuit breaker open; flush rejected without contacting the sink")]
    CircuitOpen,

    /// The sink was attempted, but the circuit breaker opened mid-flush and
    /// cut the retry loop short.
    #[error("flush failed after {attempts} attempt(s); circuit breaker opened: {last_error}")]
    CircuitTripped {
        /// Number of sink attempts made before the breaker tripped.
        attempts: i32,
        /// The failure observed on the final attempt.
        last_error: SinkError,
    },

    /// All retry attempts were exhausted (or the retry conditions declined to
    /// retry). This is a permanent failure for the batch.
    #[error("flush failed permanently after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        /// Number of sink attempts made.
        attempts: i32,
        /// The failure observed on the final attempt.
        last_error: SinkError,
    },

    /// The flush was aborted by pipeline shutdown before it could complete.
    #[error("flush aborted by pipeline shutdown after {attempts} attempt(s)")]
    ShuttingDown {
        /// Number of sink attempts made before the abort.
        attempts: i32,
    },
}

/// Configuration and lifecycle errors for the pipeline orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid configuration supplied to the builder.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// The pipeline has already been shut down.
    #[error("pipeline has already been shut down")]
    AlreadyShutdown,

    /// The flush-slot semaphore was closed while acquiring a slot.
    #[error("flush slot acquisition failed: {0}")]
    SlotAcquire(#[from] tokio::sync::AcquireError),

    /// The consumer task panicked or was cancelled out from under us.
    #[error("consumer task failed: {message}")]
    ConsumerTask { message: String },
}
