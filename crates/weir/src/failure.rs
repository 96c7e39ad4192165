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

//! Strategies for batches that could not be flushed.
//!
//! The pipeline never re-enqueues a failed batch and never swallows one
//! silently: every permanently failed batch is handed to the configured
//! [`FailureHandler`] together with the [`FlushError`] that ended it. What
//! happens next — drop, dead-letter, alert — is the caller's policy.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::error;

use crate::error::FlushError;
use crate::item::Batch;

/// Caller-supplied policy for permanently failed batches.
#[async_trait]
pub trait FailureHandler<T>: Send + Sync {
    /// Receives a batch whose flush failed permanently, along with the
    /// failure kind. The batch is owned: the handler decides its fate.
    async fn on_flush_failure(&self, batch: Batch<T>, error: FlushError);
}

/// Default handler: log the loss at error level and drop the batch.
pub struct LogAndDrop;

#[async_trait]
impl<T> FailureHandler<T> for LogAndDrop
where
    T: Send + Sync + 'static,
{
    async fn on_flush_failure(&self, batch: Batch<T>, error: FlushError) {
        error!(
            batch_size = batch.len(),
            error = %error,
            "batch flush failed permanently; dropping batch"
        );
    }
}

/// Handler that forwards failed batches to a channel for dead-lettering.
///
/// The receiving half is returned from [`DeadLetterChannel::new`]; drain it
/// to persist or inspect failed batches.
pub struct DeadLetterChannel<T> {
    tx: mpsc::UnboundedSender<(Batch<T>, FlushError)>,
}

impl<T> DeadLetterChannel<T> {
    /// Creates the handler and its receiving half.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(Batch<T>, FlushError)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl<T> FailureHandler<T> for DeadLetterChannel<T>
where
    T: Send + Sync + 'static,
{
    async fn on_flush_failure(&self, batch: Batch<T>, error: FlushError) {
        if let Err(unsent) = self.tx.send((batch, error)) {
            let (batch, error) = unsent.0;
            error!(
                batch_size = batch.len(),
                error = %error,
                "dead letter receiver dropped; batch lost"
            );
        }
    }
}
