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

//! Work items and batches.
//!
//! A [`WorkItem`] wraps an opaque payload with its enqueue timestamp and is
//! immutable once enqueued. A [`Batch`] is an insertion-ordered sequence of
//! work items: created empty, grown by append, and taken atomically on flush.
//! An item belongs to at most one batch at a time, and the pipeline never
//! re-enqueues an item once its batch has been flushed or permanently failed.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A unit of work owned by the pipeline from enqueue until flush.
#[derive(Debug, Clone, Serialize)]
pub struct WorkItem<T> {
    payload: T,
    enqueued_at: DateTime<Utc>,
}

impl<T> WorkItem<T> {
    /// Wraps a payload, stamping it with the current wall-clock time.
    ///
    /// The timestamp is informational (diagnostics, dead-letter records);
    /// batch wait deadlines use the runtime's monotonic clock instead.
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            enqueued_at: Utc::now(),
        }
    }

    /// The wrapped payload.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Consumes the item, returning the payload.
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Wall-clock time at which the item was enqueued.
    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }
}

/// An ordered group of work items flushed together to the sink.
#[derive(Debug, Serialize)]
pub struct Batch<T> {
    items: Vec<WorkItem<T>>,
}

impl<T> Batch<T> {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Creates an empty batch with room for `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Appends an item, preserving insertion order.
    pub fn push(&mut self, item: WorkItem<T>) {
        self.items.push(item);
    }

    /// The batched items, in insertion order.
    pub fn items(&self) -> &[WorkItem<T>] {
        &self.items
    }

    /// Consumes the batch, returning its items in insertion order.
    pub fn into_items(self) -> Vec<WorkItem<T>> {
        self.items
    }

    /// Iterates over the payloads in insertion order.
    pub fn payloads(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|item| item.payload())
    }

    /// Number of items in the batch.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch contains no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Enqueue time of the oldest item, if any.
    pub fn first_enqueued_at(&self) -> Option<DateTime<Utc>> {
        self.items.first().map(|item| item.enqueued_at())
    }
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self::new()
    }
}
