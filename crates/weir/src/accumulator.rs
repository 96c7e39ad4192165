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

//! Batch accumulation with a size/time dual trigger.
//!
//! The accumulator buffers work items into an in-progress batch and reports
//! when the batch should be flushed, first-true-wins:
//!
//! - size trigger: the batch has reached `max_batch_size` items
//! - time trigger: `max_wait` has elapsed since the first item of the
//!   current batch was offered
//!
//! The wait timer starts only when an item begins a new batch; an empty
//! batch has no pending deadline, so an idle accumulator never flushes.

use std::time::Duration;
use tokio::time::Instant;

use crate::item::{Batch, WorkItem};

/// Accumulates work items into batches under a size/time dual trigger.
pub struct BatchAccumulator<T> {
    batch: Batch<T>,
    max_batch_size: usize,
    max_wait: Duration,
    started_at: Option<Instant>,
}

impl<T> BatchAccumulator<T> {
    /// Creates an accumulator that triggers at `max_batch_size` items or
    /// `max_wait` after the first item of a batch, whichever comes first.
    pub fn new(max_batch_size: usize, max_wait: Duration) -> Self {
        Self {
            batch: Batch::with_capacity(max_batch_size),
            max_batch_size,
            max_wait,
            started_at: None,
        }
    }

    /// Appends an item to the in-progress batch.
    ///
    /// Starts the wait timer when the item begins a new batch. Returns `true`
    /// when the size trigger has been reached and the batch should be taken.
    pub fn offer(&mut self, item: WorkItem<T>) -> bool {
        if self.batch.is_empty() {
            self.started_at = Some(Instant::now());
        }
        self.batch.push(item);
        self.batch.len() >= self.max_batch_size
    }

    /// The instant at which the time trigger fires, if a batch is in
    /// progress. An empty batch has no deadline.
    pub fn deadline(&self) -> Option<Instant> {
        self.started_at.map(|started| started + self.max_wait)
    }

    /// Whether either trigger has fired. Empty batches are never ready.
    pub fn is_ready(&self) -> bool {
        if self.batch.is_empty() {
            return false;
        }
        if self.batch.len() >= self.max_batch_size {
            return true;
        }
        match self.started_at {
            Some(started) => started.elapsed() >= self.max_wait,
            None => false,
        }
    }

    /// Takes the in-progress batch, resetting the accumulator.
    ///
    /// The wait timer rearms only when the next item starts a new batch.
    pub fn take_batch(&mut self) -> Batch<T> {
        self.started_at = None;
        std::mem::replace(&mut self.batch, Batch::with_capacity(self.max_batch_size))
    }

    /// Number of items currently buffered.
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Whether no items are buffered.
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}
