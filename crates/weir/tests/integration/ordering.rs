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

//! Ordering and completeness properties: the concatenation of flushed
//! batches equals the enqueue order, with no loss or duplication.

use std::time::Duration;
use weir::{BatchPipeline, FlushMode, PipelineConfig};

use crate::fixtures::{settle, ScriptedSink};

#[tokio::test(start_paused = true)]
async fn test_flushed_concatenation_preserves_enqueue_order() {
    let sink = ScriptedSink::reliable();
    let probe = sink.probe();
    let pipeline = BatchPipeline::builder()
        .sink(sink)
        .with_config(
            PipelineConfig::builder()
                .max_batch_size(7)
                .max_batch_wait(Duration::from_millis(50))
                .build(),
        )
        .build()
        .unwrap();

    for i in 0..100u32 {
        pipeline.enqueue(i).await.unwrap();
    }
    pipeline.shutdown().await.unwrap();

    let flushed = probe.flushed_payloads();
    assert_eq!(flushed, (0..100).collect::<Vec<_>>());

    // 100 items in batches of 7: fourteen full batches and a final partial.
    let batches = probe.batches();
    assert_eq!(batches.len(), 15);
    assert!(batches[..14].iter().all(|batch| batch.len() == 7));
    assert_eq!(batches[14].len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_multiple_producers_lose_nothing_and_keep_per_producer_order() {
    let sink = ScriptedSink::reliable();
    let probe = sink.probe();
    let pipeline = BatchPipeline::builder()
        .sink(sink)
        .with_config(
            PipelineConfig::builder()
                .max_batch_size(10)
                .max_batch_wait(Duration::from_millis(20))
                .build(),
        )
        .build()
        .unwrap();

    let mut handles = Vec::new();
    for producer_id in 0..3u32 {
        let producer = pipeline.producer();
        handles.push(tokio::spawn(async move {
            for i in 0..50u32 {
                producer.enqueue((producer_id, i)).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    pipeline.shutdown().await.unwrap();

    let flushed = probe.flushed_payloads();
    assert_eq!(flushed.len(), 150);

    // Every item exactly once, and each producer's subsequence in order.
    for producer_id in 0..3u32 {
        let sequence: Vec<u32> = flushed
            .iter()
            .filter(|(id, _)| *id == producer_id)
            .map(|(_, i)| *i)
            .collect();
        assert_eq!(sequence, (0..50).collect::<Vec<_>>());
    }
}

#[tokio::test(start_paused = true)]
async fn test_background_mode_flushes_everything() {
    let sink = ScriptedSink::reliable();
    let probe = sink.probe();
    let pipeline = BatchPipeline::builder()
        .sink(sink)
        .with_config(
            PipelineConfig::builder()
                .max_batch_size(5)
                .max_batch_wait(Duration::from_millis(20))
                .flush_mode(FlushMode::Background)
                .max_in_flight_flushes(2)
                .build(),
        )
        .build()
        .unwrap();

    for i in 0..42u32 {
        pipeline.enqueue(i).await.unwrap();
    }
    pipeline.shutdown().await.unwrap();

    let mut flushed = probe.flushed_payloads();
    flushed.sort_unstable();
    assert_eq!(flushed, (0..42).collect::<Vec<_>>());

    // Items inside each batch stay in enqueue order even if batch
    // completions interleave.
    for batch in probe.batches() {
        let mut sorted = batch.clone();
        sorted.sort_unstable();
        assert_eq!(batch, sorted);
    }
}

#[tokio::test(start_paused = true)]
async fn test_single_flush_slot_preserves_cross_batch_order() {
    let sink = ScriptedSink::reliable();
    let probe = sink.probe();
    let pipeline = BatchPipeline::builder()
        .sink(sink)
        .with_config(
            PipelineConfig::builder()
                .max_batch_size(3)
                .max_batch_wait(Duration::from_secs(60))
                .flush_mode(FlushMode::Background)
                .max_in_flight_flushes(1)
                .build(),
        )
        .build()
        .unwrap();

    for i in 0..30u32 {
        pipeline.enqueue(i).await.unwrap();
    }
    settle().await;
    pipeline.shutdown().await.unwrap();

    assert_eq!(probe.flushed_payloads(), (0..30).collect::<Vec<_>>());
}
