// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Back-pressure admission wired into pipeline dispatch.

use command_pipeline::{BackPressureConfig, OverflowStrategy, Pipeline, PipelineOptions};
use command_pipeline_domain::{Command, FnHandler, PipelineError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

struct Blocking {
    release: Option<oneshot::Receiver<()>>,
}

impl Command for Blocking {
    type Output = &'static str;

    fn name() -> &'static str {
        "Blocking"
    }
}

fn gated_pipeline(strategy: OverflowStrategy, max_outstanding: usize) -> Pipeline<Blocking> {
    Pipeline::with_options(
        FnHandler::new(|mut cmd: Blocking| async move {
            if let Some(release) = cmd.release.take() {
                let _ = release.await;
            }
            Ok("done")
        }),
        PipelineOptions {
            use_context_pool: false,
            back_pressure: Some(
                BackPressureConfig::new(1)
                    .with_max_outstanding(max_outstanding)
                    .with_strategy(strategy),
            ),
            ..PipelineOptions::default()
        },
    )
    .unwrap()
}

#[tokio::test]
async fn drop_newest_rejects_second_submission_and_first_completes() {
    let pipeline = Arc::new(gated_pipeline(OverflowStrategy::DropNewest, 1));
    let (tx, rx) = oneshot::channel();

    let first = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.execute(Blocking { release: Some(rx) }).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    // The first submission holds the only permit; the second is rejected
    // before any middleware runs.
    let err = pipeline.execute(Blocking { release: None }).await.unwrap_err();
    assert!(matches!(err, PipelineError::BackPressureFull(_)));

    tx.send(()).unwrap();
    assert_eq!(first.await.unwrap().unwrap(), "done");
}

#[tokio::test]
async fn suspend_strategy_queues_and_preserves_fifo() {
    let pipeline = Arc::new(Pipeline::with_options(
        FnHandler::new(|cmd: Order| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(cmd.0)
        }),
        PipelineOptions {
            use_context_pool: false,
            back_pressure: Some(BackPressureConfig::new(1)),
            ..PipelineOptions::default()
        },
    )
    .unwrap());

    let mut handles = Vec::new();
    for i in 0..5u32 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move { pipeline.execute(Order(i)).await }));
        // Stagger so queue order matches submission order.
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    let mut outputs = Vec::new();
    for handle in handles {
        outputs.push(handle.await.unwrap().unwrap());
    }
    assert_eq!(outputs, vec![0, 1, 2, 3, 4]);

    let semaphore = pipeline.back_pressure().unwrap();
    let stats = semaphore.statistics();
    assert_eq!(stats.acquires, 5);
    assert_eq!(stats.releases, 5);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.queued, 0);
}

struct Order(u32);

impl Command for Order {
    type Output = u32;

    fn name() -> &'static str {
        "Order"
    }
}

#[tokio::test]
async fn concurrency_cap_holds_across_pipeline_executions() {
    let pipeline = Arc::new(Pipeline::with_options(
        FnHandler::new(|_cmd: Order| async move {
            tokio::time::sleep(Duration::from_millis(3)).await;
            Ok(0)
        }),
        PipelineOptions {
            use_context_pool: false,
            back_pressure: Some(BackPressureConfig::new(2)),
            ..PipelineOptions::default()
        },
    )
    .unwrap());

    let mut handles = Vec::new();
    for _ in 0..20 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move { pipeline.execute(Order(0)).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stats = pipeline.back_pressure().unwrap().statistics();
    assert!(stats.peak_active <= 2);
    assert_eq!(stats.acquires, 20);
    assert_eq!(stats.releases, 20);
}

#[tokio::test]
async fn error_strategy_surfaces_queue_full_through_pipeline() {
    let pipeline = Arc::new(gated_pipeline(OverflowStrategy::Error, 1));
    let (tx, rx) = oneshot::channel();

    let first = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.execute(Blocking { release: Some(rx) }).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    let err = pipeline.execute(Blocking { release: None }).await.unwrap_err();
    assert!(matches!(err, PipelineError::QueueFull(_)));

    tx.send(()).unwrap();
    first.await.unwrap().unwrap();
}
