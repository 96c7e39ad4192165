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

//! Circuit breaker behavior through the full pipeline: opening on
//! consecutive failures, rejecting without contacting the sink, and
//! recovering through a half-open probe.

use std::time::Duration;
use weir::{
    BatchPipeline, CircuitBreakerConfig, CircuitState, DeadLetterChannel, FlushError,
    PipelineConfig, RetryPolicy,
};

use crate::fixtures::{settle, ScriptedSink};

/// One sink attempt per flush, threshold 5, cooldown 30s.
fn breaker_config() -> PipelineConfig {
    PipelineConfig::builder()
        .max_batch_size(1)
        .max_batch_wait(Duration::from_secs(60))
        .retry_policy(RetryPolicy::builder().max_attempts(1).build())
        .circuit(CircuitBreakerConfig {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        })
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_circuit_opens_after_threshold_and_rejects_without_sink_calls() {
    let sink = ScriptedSink::<u32>::broken();
    let probe = sink.probe();
    let (dead_letter, mut failed) = DeadLetterChannel::new();
    let pipeline = BatchPipeline::builder()
        .sink(sink)
        .failure_handler(dead_letter)
        .with_config(breaker_config())
        .build()
        .unwrap();

    // Five consecutive failing flushes open the circuit.
    for i in 0..5u32 {
        pipeline.enqueue(i).await.unwrap();
        settle().await;
    }
    assert_eq!(probe.calls(), 5);
    assert_eq!(pipeline.circuit_state(), CircuitState::Open);

    // A flush one second later is rejected without touching the sink.
    tokio::time::sleep(Duration::from_secs(1)).await;
    pipeline.enqueue(5u32).await.unwrap();
    settle().await;
    assert_eq!(probe.calls(), 5);

    // The five real failures plus the rejection all surfaced.
    let mut outcomes = Vec::new();
    for _ in 0..6 {
        let (batch, error) = failed.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
        outcomes.push(error);
    }
    assert!(outcomes[..5]
        .iter()
        .all(|error| matches!(error, FlushError::RetriesExhausted { attempts: 1, .. })));
    assert!(matches!(outcomes[5], FlushError::CircuitOpen));

    pipeline.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_flush_after_cooldown_reaches_sink_as_probe() {
    let sink = ScriptedSink::<u32>::broken();
    let probe = sink.probe();
    let pipeline = BatchPipeline::builder()
        .sink(sink)
        .with_config(breaker_config())
        .build()
        .unwrap();

    for i in 0..5u32 {
        pipeline.enqueue(i).await.unwrap();
        settle().await;
    }
    assert_eq!(pipeline.circuit_state(), CircuitState::Open);

    // Past the cooldown the next flush is admitted as the half-open probe.
    tokio::time::sleep(Duration::from_secs(31)).await;
    pipeline.enqueue(5u32).await.unwrap();
    settle().await;

    assert_eq!(probe.calls(), 6);
    // The probe failed, so the circuit reopened.
    assert_eq!(pipeline.circuit_state(), CircuitState::Open);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_successful_probe_closes_circuit_and_resumes_flushing() {
    // Fails the first five writes, then recovers.
    let sink = ScriptedSink::new(5);
    let probe = sink.probe();
    let pipeline = BatchPipeline::builder()
        .sink(sink)
        .with_config(breaker_config())
        .build()
        .unwrap();

    for i in 0..5u32 {
        pipeline.enqueue(i).await.unwrap();
        settle().await;
    }
    assert_eq!(pipeline.circuit_state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_secs(31)).await;
    pipeline.enqueue(100u32).await.unwrap();
    settle().await;

    // Probe succeeded: circuit closed, batch flushed.
    assert_eq!(pipeline.circuit_state(), CircuitState::Closed);
    assert_eq!(probe.batches(), vec![vec![100]]);

    // Normal operation resumes.
    pipeline.enqueue(101u32).await.unwrap();
    settle().await;
    assert_eq!(probe.batches(), vec![vec![100], vec![101]]);

    pipeline.shutdown().await.unwrap();
}
