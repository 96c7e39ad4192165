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

//! Multi-producer, single-consumer work queue with close-then-drain semantics.
//!
//! Producers hold cloneable [`QueueProducer`] handles and enqueue payloads;
//! exactly one consumer owns the [`WorkQueue`] and drains it. Closing the
//! queue is idempotent: enqueues after close fail with
//! [`EnqueueError`](crate::error::EnqueueError), while the consumer drains
//! every item that was accepted before the close and only then observes
//! end-of-stream. No accepted item is ever dropped by a close.
//!
//! A bounded queue applies backpressure by suspending producers when full;
//! an unbounded queue never suspends producers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::EnqueueError;
use crate::item::WorkItem;

enum SenderChan<T> {
    Bounded(mpsc::Sender<WorkItem<T>>),
    Unbounded(mpsc::UnboundedSender<WorkItem<T>>),
}

impl<T> Clone for SenderChan<T> {
    fn clone(&self) -> Self {
        match self {
            SenderChan::Bounded(tx) => SenderChan::Bounded(tx.clone()),
            SenderChan::Unbounded(tx) => SenderChan::Unbounded(tx.clone()),
        }
    }
}

enum ReceiverChan<T> {
    Bounded(mpsc::Receiver<WorkItem<T>>),
    Unbounded(mpsc::UnboundedReceiver<WorkItem<T>>),
}

impl<T> ReceiverChan<T> {
    async fn recv(&mut self) -> Option<WorkItem<T>> {
        match self {
            ReceiverChan::Bounded(rx) => rx.recv().await,
            ReceiverChan::Unbounded(rx) => rx.recv().await,
        }
    }

    fn close(&mut self) {
        match self {
            ReceiverChan::Bounded(rx) => rx.close(),
            ReceiverChan::Unbounded(rx) => rx.close(),
        }
    }
}

/// Cloneable producer handle for a [`WorkQueue`].
pub struct QueueProducer<T> {
    sender: SenderChan<T>,
    closed: Arc<AtomicBool>,
    close_signal: Arc<Notify>,
}

impl<T> Clone for QueueProducer<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            closed: Arc::clone(&self.closed),
            close_signal: Arc::clone(&self.close_signal),
        }
    }
}

impl<T> QueueProducer<T> {
    /// Enqueues a payload.
    ///
    /// On a bounded queue this suspends while the queue is full. Fails with
    /// [`EnqueueError`] carrying the payload back once the queue has been
    /// closed.
    pub async fn enqueue(&self, payload: T) -> Result<(), EnqueueError<T>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EnqueueError { item: payload });
        }

        let item = WorkItem::new(payload);
        match &self.sender {
            SenderChan::Bounded(tx) => tx
                .send(item)
                .await
                .map_err(|err| EnqueueError {
                    item: err.0.into_payload(),
                }),
            SenderChan::Unbounded(tx) => tx.send(item).map_err(|err| EnqueueError {
                item: err.0.into_payload(),
            }),
        }
    }

    /// Closes the queue. Idempotent.
    ///
    /// Subsequent enqueues fail; the consumer drains everything accepted
    /// before the close and then observes end-of-stream.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("work queue closed; remaining items will be drained");
            self.close_signal.notify_one();
        }
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Consumer side of the work queue.
pub struct WorkQueue<T> {
    receiver: ReceiverChan<T>,
    closed: Arc<AtomicBool>,
    close_signal: Arc<Notify>,
    close_applied: bool,
}

impl<T> WorkQueue<T> {
    /// Creates a bounded queue; producers suspend when `capacity` items are
    /// buffered.
    pub fn bounded(capacity: usize) -> (QueueProducer<T>, WorkQueue<T>) {
        let (tx, rx) = mpsc::channel(capacity);
        Self::build(SenderChan::Bounded(tx), ReceiverChan::Bounded(rx))
    }

    /// Creates an unbounded queue; enqueues never suspend.
    pub fn unbounded() -> (QueueProducer<T>, WorkQueue<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::build(SenderChan::Unbounded(tx), ReceiverChan::Unbounded(rx))
    }

    fn build(sender: SenderChan<T>, receiver: ReceiverChan<T>) -> (QueueProducer<T>, WorkQueue<T>) {
        let closed = Arc::new(AtomicBool::new(false));
        let close_signal = Arc::new(Notify::new());

        let producer = QueueProducer {
            sender,
            closed: Arc::clone(&closed),
            close_signal: Arc::clone(&close_signal),
        };
        let queue = WorkQueue {
            receiver,
            closed,
            close_signal,
            close_applied: false,
        };
        (producer, queue)
    }

    /// Dequeues the next item.
    ///
    /// Suspends while the queue is empty. After a close, drains the remaining
    /// buffered items and then returns `None` (end-of-stream). Cancel-safe:
    /// dropping the future never loses an item.
    pub async fn dequeue(&mut self) -> Option<WorkItem<T>> {
        loop {
            if self.closed.load(Ordering::Acquire) && !self.close_applied {
                self.apply_close();
            }
            if self.close_applied {
                // Drains buffered items, then yields None once empty.
                return self.receiver.recv().await;
            }

            tokio::select! {
                item = self.receiver.recv() => return item,
                _ = self.close_signal.notified() => {
                    self.apply_close();
                }
            }
        }
    }

    // Stops the channel accepting new sends while keeping buffered items
    // receivable.
    fn apply_close(&mut self) {
        self.receiver.close();
        self.close_applied = true;
    }
}
