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

//! # Weir
//!
//! A Rust library for bounded batch-flush pipelines with retry and
//! circuit-breaker resilience.
//!
//! Weir accumulates units of work behind a dual trigger — a size threshold
//! or a wait deadline, whichever fires first — and spills them downstream in
//! batches through a sink hardened with exponential-backoff retry and a
//! circuit breaker. Like its namesake, it pools the stream upstream and
//! releases it in controlled spills.
//!
//! ## Components
//!
//! - [`queue::WorkQueue`] - multi-producer, single-consumer FIFO with
//!   close-then-drain semantics; no accepted item is dropped on close
//! - [`accumulator::BatchAccumulator`] - buffers items and triggers a flush
//!   at `max_batch_size` items or `max_batch_wait` after the first item,
//!   first-true-wins; empty batches never flush
//! - [`sink::ResilientSink`] - wraps the caller's [`sink::BatchSink`] with
//!   per-attempt retry ([`retry::RetryPolicy`]) and a shared
//!   [`circuit::CircuitBreaker`]
//! - [`pipeline::BatchPipeline`] - wires the above together, dispatches
//!   flushes inline or on bounded background workers, and shuts down with a
//!   forced flush of any partial batch
//!
//! ## Guarantees
//!
//! - Items preserve producer-enqueue order within and across batches;
//!   batches are dispatched FIFO, and a retried batch keeps its original
//!   items in their original order.
//! - Delivery to the sink is at-least-once; downstream idempotency is the
//!   sink's contract, not enforced here.
//! - Every permanently failed batch is reported — to the configured
//!   [`failure::FailureHandler`] with the batch and its
//!   [`error::FlushError`] — never silently swallowed.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use weir::{BatchPipeline, PipelineConfig};
//!
//! let pipeline = BatchPipeline::builder()
//!     .sink(MyDatabaseSink::connect(url).await?)
//!     .with_config(
//!         PipelineConfig::builder()
//!             .max_batch_size(64)
//!             .max_batch_wait(Duration::from_millis(250))
//!             .build(),
//!     )
//!     .build()?;
//!
//! for document in documents {
//!     pipeline.enqueue(document).await?;
//! }
//! pipeline.shutdown().await?;
//! ```

pub mod accumulator;
pub mod circuit;
pub mod error;
pub mod events;
pub mod failure;
pub mod item;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod sink;

// Re-export main types for convenience
pub use accumulator::BatchAccumulator;
pub use circuit::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::{EnqueueError, FlushError, PipelineError, SinkError};
pub use events::{EventSender, PipelineEvent};
pub use failure::{DeadLetterChannel, FailureHandler, LogAndDrop};
pub use item::{Batch, WorkItem};
pub use pipeline::{
    BatchPipeline, BatchPipelineBuilder, FlushMode, PipelineConfig, PipelineConfigBuilder,
    ShutdownPolicy,
};
pub use queue::{QueueProducer, WorkQueue};
pub use retry::{BackoffStrategy, RetryCondition, RetryPolicy, RetryPolicyBuilder};
pub use sink::{BatchSink, FlushReceipt, ResilientSink};
