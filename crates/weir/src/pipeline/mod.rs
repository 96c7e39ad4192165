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

//! Pipeline Orchestrator Module
//!
//! This module wires the queue, accumulator, and resilient sink into a
//! running pipeline. The orchestrator is responsible for:
//! - Driving the single consumer loop over the work queue
//! - Flushing batches on the size/time dual trigger
//! - Dispatching flushes inline or onto bounded background workers
//! - Routing permanently failed batches to the failure handler
//! - Propagating shutdown into in-flight flushes and forcing a final
//!   partial-batch flush before terminating
//!
//! # Example
//!
//! ```rust,ignore
//! use weir::{BatchPipeline, PipelineConfig};
//! use std::time::Duration;
//!
//! let pipeline = BatchPipeline::builder()
//!     .sink(MySink::new())
//!     .with_config(
//!         PipelineConfig::builder()
//!             .max_batch_size(64)
//!             .max_batch_wait(Duration::from_millis(250))
//!             .build(),
//!     )
//!     .build()?;
//!
//! pipeline.enqueue(document).await?;
//! // ...
//! pipeline.shutdown().await?;
//! ```

mod config;

pub use config::{FlushMode, PipelineConfig, PipelineConfigBuilder, ShutdownPolicy};

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info};
use uuid::Uuid;

use crate::accumulator::BatchAccumulator;
use crate::circuit::CircuitBreaker;
use crate::error::{EnqueueError, FlushError, PipelineError};
use crate::events::{EventSender, PipelineEvent};
use crate::failure::{FailureHandler, LogAndDrop};
use crate::item::Batch;
use crate::queue::{QueueProducer, WorkQueue};
use crate::sink::{BatchSink, ResilientSink};

/// A running batch-flush pipeline.
///
/// Producers enqueue payloads through [`producer`](Self::producer) handles
/// (or the [`enqueue`](Self::enqueue) convenience); a single consumer task
/// accumulates them into batches and flushes through the resilient sink.
/// The pipeline runs until [`shutdown`](Self::shutdown).
pub struct BatchPipeline<T> {
    producer: QueueProducer<T>,
    breaker: Arc<CircuitBreaker>,
    config: PipelineConfig,
    instance_id: Uuid,
    shutdown_tx: watch::Sender<bool>,
    consumer_handle: tokio::sync::Mutex<Option<JoinHandle<Result<(), PipelineError>>>>,
    events_rx: parking_lot::Mutex<Option<mpsc::Receiver<PipelineEvent>>>,
}

impl<T> BatchPipeline<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a new pipeline builder.
    pub fn builder() -> BatchPipelineBuilder<T> {
        BatchPipelineBuilder::new()
    }

    /// A cloneable producer handle for enqueueing from other tasks.
    pub fn producer(&self) -> QueueProducer<T> {
        self.producer.clone()
    }

    /// Enqueues a payload on the pipeline's own producer handle.
    pub async fn enqueue(&self, payload: T) -> Result<(), EnqueueError<T>> {
        self.producer.enqueue(payload).await
    }

    /// Current circuit breaker state.
    pub fn circuit_state(&self) -> crate::circuit::CircuitState {
        self.breaker.state()
    }

    /// The pipeline's configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Unique identifier of this pipeline instance, used in logs.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Takes the observability event receiver. Returns `None` after the
    /// first call.
    pub fn take_event_receiver(&self) -> Option<mpsc::Receiver<PipelineEvent>> {
        self.events_rx.lock().take()
    }

    /// Shuts the pipeline down.
    ///
    /// Closes the queue (further enqueues fail), signals cancellation into
    /// any in-flight backoff waits, drains the items already accepted,
    /// force-flushes a non-empty partial batch exactly once, and returns
    /// when the consumer and all flush workers have stopped.
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        info!(instance = %self.instance_id, "shutting down batch pipeline");
        self.producer.close();
        let _ = self.shutdown_tx.send(true);

        let handle = self.consumer_handle.lock().await.take();
        match handle {
            Some(handle) => handle.await.map_err(|err| PipelineError::ConsumerTask {
                message: err.to_string(),
            })?,
            None => Err(PipelineError::AlreadyShutdown),
        }
    }
}

/// Builder for [`BatchPipeline`].
///
/// The sink is required; everything else defaults: [`LogAndDrop`] failure
/// handling and [`PipelineConfig::default()`].
pub struct BatchPipelineBuilder<T> {
    sink: Option<Arc<dyn BatchSink<T>>>,
    failure_handler: Arc<dyn FailureHandler<T>>,
    config: PipelineConfig,
}

impl<T> BatchPipelineBuilder<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self {
            sink: None,
            failure_handler: Arc::new(LogAndDrop),
            config: PipelineConfig::default(),
        }
    }

    /// Sets the downstream sink.
    pub fn sink<S>(mut self, sink: S) -> Self
    where
        S: BatchSink<T> + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Sets the downstream sink from a shared handle.
    pub fn shared_sink(mut self, sink: Arc<dyn BatchSink<T>>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the handler for permanently failed batches.
    pub fn failure_handler<H>(mut self, handler: H) -> Self
    where
        H: FailureHandler<T> + 'static,
    {
        self.failure_handler = Arc::new(handler);
        self
    }

    /// Sets the full configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the pipeline and spawns its consumer task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn build(self) -> Result<BatchPipeline<T>, PipelineError> {
        let sink = self.sink.ok_or_else(|| PipelineError::Configuration {
            message: "a batch sink is required".to_string(),
        })?;
        self.config.validate()?;

        let (events_tx, events_rx) = EventSender::channel(self.config.event_buffer_size());
        let breaker =
            Arc::new(CircuitBreaker::new(self.config.circuit()).with_events(events_tx.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let abort_in_flight =
            self.config.shutdown_policy() == ShutdownPolicy::AbortInFlight;
        let resilient = ResilientSink::new(
            sink,
            self.config.retry_policy().clone(),
            Arc::clone(&breaker),
        )
        .with_shutdown(shutdown_rx, abort_in_flight)
        .with_events(events_tx.clone());

        let (producer, queue) = match self.config.queue_capacity() {
            Some(capacity) => WorkQueue::bounded(capacity),
            None => WorkQueue::unbounded(),
        };

        let instance_id = Uuid::new_v4();
        let consumer = Consumer {
            queue,
            accumulator: BatchAccumulator::new(
                self.config.max_batch_size(),
                self.config.max_batch_wait(),
            ),
            sink: Arc::new(resilient),
            failure_handler: self.failure_handler,
            events: events_tx,
            breaker: Arc::clone(&breaker),
            flush_mode: self.config.flush_mode(),
            flush_slots: Arc::new(Semaphore::new(self.config.max_in_flight_flushes())),
            workers: JoinSet::new(),
            instance_id,
        };
        let consumer_handle = tokio::spawn(consumer.run());

        Ok(BatchPipeline {
            producer,
            breaker,
            config: self.config,
            instance_id,
            shutdown_tx,
            consumer_handle: tokio::sync::Mutex::new(Some(consumer_handle)),
            events_rx: parking_lot::Mutex::new(Some(events_rx)),
        })
    }
}

impl<T> Default for BatchPipelineBuilder<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// The single consumer task driving queue -> accumulator -> sink.
struct Consumer<T> {
    queue: WorkQueue<T>,
    accumulator: BatchAccumulator<T>,
    sink: Arc<ResilientSink<T>>,
    failure_handler: Arc<dyn FailureHandler<T>>,
    events: EventSender,
    breaker: Arc<CircuitBreaker>,
    flush_mode: FlushMode,
    flush_slots: Arc<Semaphore>,
    workers: JoinSet<()>,
    instance_id: Uuid,
}

impl<T> Consumer<T>
where
    T: Send + Sync + 'static,
{
    async fn run(mut self) -> Result<(), PipelineError> {
        info!(instance = %self.instance_id, "batch pipeline consumer started");

        loop {
            let deadline = self.accumulator.deadline();
            tokio::select! {
                maybe_item = self.queue.dequeue() => {
                    match maybe_item {
                        Some(item) => {
                            if self.accumulator.offer(item) {
                                debug!(
                                    batch_size = self.accumulator.len(),
                                    "size trigger reached"
                                );
                                let batch = self.accumulator.take_batch();
                                self.dispatch(batch).await?;
                            }
                        }
                        // Queue closed and drained
                        None => break,
                    }
                }
                _ = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                }, if deadline.is_some() => {
                    if !self.accumulator.is_empty() {
                        debug!(
                            batch_size = self.accumulator.len(),
                            "wait trigger reached"
                        );
                        let batch = self.accumulator.take_batch();
                        self.dispatch(batch).await?;
                    }
                }
            }
        }

        // Stream ended: force-flush any non-empty partial batch exactly once.
        if !self.accumulator.is_empty() {
            info!(
                instance = %self.instance_id,
                batch_size = self.accumulator.len(),
                "stream ended; flushing final partial batch"
            );
            let batch = self.accumulator.take_batch();
            self.dispatch(batch).await?;
        }

        while self.workers.join_next().await.is_some() {}
        info!(instance = %self.instance_id, "batch pipeline consumer stopped");
        Ok(())
    }

    /// Hands a triggered batch to the sink, inline or on a bounded worker.
    ///
    /// Batches are dispatched in FIFO order; a worker slot is acquired
    /// before spawning, so background dispatch never starts out of order.
    async fn dispatch(&mut self, batch: Batch<T>) -> Result<(), PipelineError> {
        // Reap finished workers so the set does not grow without bound.
        while self.workers.try_join_next().is_some() {}

        // Orchestrator-side read of the breaker: skip dispatch entirely when
        // rejection is certain, without consuming the probe admission.
        if self.breaker.would_reject() {
            let batch_size = batch.len();
            debug!(batch_size, "circuit open; flush rejected without dispatch");
            self.events
                .send(PipelineEvent::FlushRejected { batch_size });
            metrics::counter!("weir_flushes_rejected_total").increment(1);
            self.failure_handler
                .on_flush_failure(batch, FlushError::CircuitOpen)
                .await;
            return Ok(());
        }

        match self.flush_mode {
            FlushMode::Inline => {
                run_flush(batch, &self.sink, &self.failure_handler, &self.events).await;
            }
            FlushMode::Background => {
                let permit = self.flush_slots.clone().acquire_owned().await?;
                let sink = Arc::clone(&self.sink);
                let failure_handler = Arc::clone(&self.failure_handler);
                let events = self.events.clone();
                self.workers.spawn(async move {
                    let _permit = permit;
                    run_flush(batch, &sink, &failure_handler, &events).await;
                });
            }
        }
        Ok(())
    }
}

/// Runs one flush to completion and reports its outcome.
async fn run_flush<T>(
    batch: Batch<T>,
    sink: &ResilientSink<T>,
    failure_handler: &Arc<dyn FailureHandler<T>>,
    events: &EventSender,
) where
    T: Send + Sync + 'static,
{
    let batch_size = batch.len();
    match sink.flush(&batch).await {
        Ok(receipt) => {
            info!(
                batch_size,
                attempts = receipt.attempts,
                latency_ms = receipt.latency.as_millis() as u64,
                "batch flushed"
            );
            events.send(PipelineEvent::BatchFlushed {
                batch_size,
                attempts: receipt.attempts,
                latency: receipt.latency,
            });
            metrics::counter!("weir_flushes_total").increment(1);
            metrics::histogram!("weir_flush_batch_size").record(batch_size as f64);
            metrics::histogram!("weir_flush_latency_seconds").record(receipt.latency.as_secs_f64());
        }
        Err(error) => {
            match &error {
                FlushError::CircuitOpen => {
                    events.send(PipelineEvent::FlushRejected { batch_size });
                    metrics::counter!("weir_flushes_rejected_total").increment(1);
                }
                FlushError::CircuitTripped { attempts, .. }
                | FlushError::RetriesExhausted { attempts, .. }
                | FlushError::ShuttingDown { attempts } => {
                    events.send(PipelineEvent::FlushFailed {
                        batch_size,
                        attempts: *attempts,
                        error: error.to_string(),
                    });
                    metrics::counter!("weir_flushes_failed_total").increment(1);
                }
            }
            failure_handler.on_flush_failure(batch, error).await;
        }
    }
}
