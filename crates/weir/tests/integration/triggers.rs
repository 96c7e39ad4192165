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

//! Dual-trigger behavior under the paused clock: size trigger, time
//! trigger, empty-batch edge cases, and retry backoff pacing.

use std::time::Duration;
use weir::{BackoffStrategy, BatchPipeline, PipelineConfig, PipelineEvent, RetryPolicy};

use crate::fixtures::{settle, ScriptedSink};

fn two_second_window() -> PipelineConfig {
    PipelineConfig::builder()
        .max_batch_size(3)
        .max_batch_wait(Duration::from_secs(2))
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_size_trigger_flushes_immediately_then_time_trigger_takes_partial() {
    let sink = ScriptedSink::reliable();
    let probe = sink.probe();
    let pipeline = BatchPipeline::builder()
        .sink(sink)
        .with_config(two_second_window())
        .build()
        .unwrap();

    // A and B at t=0
    pipeline.enqueue("A").await.unwrap();
    pipeline.enqueue("B").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(probe.batches().is_empty());

    // C at t=0.1s fires the size trigger immediately
    pipeline.enqueue("C").await.unwrap();
    settle().await;
    assert_eq!(probe.batches(), vec![vec!["A", "B", "C"]]);

    // D alone at t=1s flushes on the time trigger at t=3s
    tokio::time::sleep(Duration::from_millis(900)).await;
    pipeline.enqueue("D").await.unwrap();

    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert_eq!(probe.batches().len(), 1, "flushed before the wait elapsed");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(probe.batches(), vec![vec!["A", "B", "C"], vec!["D"]]);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_idle_pipeline_never_flushes_empty_batches() {
    let sink = ScriptedSink::<u32>::reliable();
    let probe = sink.probe();
    let pipeline = BatchPipeline::builder()
        .sink(sink)
        .with_config(
            PipelineConfig::builder()
                .max_batch_size(10)
                .max_batch_wait(Duration::from_millis(5))
                .build(),
        )
        .build()
        .unwrap();

    // Many wait windows pass with nothing buffered.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(probe.batches().is_empty());
    assert_eq!(probe.calls(), 0);

    pipeline.shutdown().await.unwrap();
    assert_eq!(probe.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_timer_starts_at_first_item_of_each_batch() {
    let sink = ScriptedSink::reliable();
    let probe = sink.probe();
    let pipeline = BatchPipeline::builder()
        .sink(sink)
        .with_config(two_second_window())
        .build()
        .unwrap();

    pipeline.enqueue(1u32).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(probe.batches(), vec![vec![1]]);

    // The timer rearmed only when the next item arrived.
    tokio::time::sleep(Duration::from_secs(5)).await;
    pipeline.enqueue(2u32).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert_eq!(probe.batches().len(), 1);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(probe.batches(), vec![vec![1], vec![2]]);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_backoff_gaps_are_non_decreasing_and_bounded_by_max_attempts() {
    let sink = ScriptedSink::new(3);
    let probe = sink.probe();
    let pipeline = BatchPipeline::builder()
        .sink(sink)
        .with_config(
            PipelineConfig::builder()
                .max_batch_size(1)
                .max_batch_wait(Duration::from_secs(60))
                .retry_policy(
                    RetryPolicy::builder()
                        .max_attempts(4)
                        .initial_delay(Duration::from_millis(100))
                        .backoff_strategy(BackoffStrategy::Exponential {
                            base: 2.0,
                            multiplier: 1.0,
                        })
                        .build(),
                )
                .build(),
        )
        .build()
        .unwrap();

    pipeline.enqueue(1u32).await.unwrap();
    // Virtual time covers the full backoff schedule (100 + 200 + 400 ms).
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(probe.calls(), 4);
    assert_eq!(probe.batches(), vec![vec![1]]);

    let gaps = probe.call_gaps();
    assert_eq!(gaps.len(), 3);
    assert!(gaps[0] >= Duration::from_millis(100));
    assert!(gaps[1] >= gaps[0]);
    assert!(gaps[2] >= gaps[1]);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_stop_at_max_attempts() {
    let sink = ScriptedSink::<u32>::broken();
    let probe = sink.probe();
    let pipeline = BatchPipeline::builder()
        .sink(sink)
        .with_config(
            PipelineConfig::builder()
                .max_batch_size(1)
                .max_batch_wait(Duration::from_secs(60))
                .retry_policy(
                    RetryPolicy::builder()
                        .max_attempts(3)
                        .initial_delay(Duration::from_millis(10))
                        .build(),
                )
                .build(),
        )
        .build()
        .unwrap();

    pipeline.enqueue(1u32).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(probe.calls(), 3);
    assert!(probe.batches().is_empty());

    pipeline.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_flush_events_are_published() {
    let sink = ScriptedSink::reliable();
    let pipeline = BatchPipeline::builder()
        .sink(sink)
        .with_config(
            PipelineConfig::builder()
                .max_batch_size(2)
                .max_batch_wait(Duration::from_secs(60))
                .build(),
        )
        .build()
        .unwrap();
    let mut events = pipeline.take_event_receiver().unwrap();
    assert!(pipeline.take_event_receiver().is_none());

    pipeline.enqueue(1u32).await.unwrap();
    pipeline.enqueue(2u32).await.unwrap();
    settle().await;
    pipeline.shutdown().await.unwrap();

    let event = events.recv().await.unwrap();
    match event {
        PipelineEvent::BatchFlushed {
            batch_size,
            attempts,
            ..
        } => {
            assert_eq!(batch_size, 2);
            assert_eq!(attempts, 1);
        }
        other => panic!("expected BatchFlushed, got {:?}", other),
    }
}
