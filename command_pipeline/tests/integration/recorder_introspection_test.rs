// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Execution recording and pipeline introspection through real dispatches.

use crate::common::{upper_pipeline, Append, Transform};
use command_pipeline::{
    compare_descriptions, ExecutionRecorder, Pipeline, PipelineOptions, RecorderConfig,
};
use command_pipeline_domain::{FnHandler, PipelineError};

#[tokio::test]
async fn recorder_captures_dispatch_outcomes() {
    let recorder = ExecutionRecorder::with_config(RecorderConfig { max_records: 10 }).unwrap();
    let pipeline = Pipeline::with_options(
        FnHandler::new(|cmd: Transform| async move {
            if cmd.0.is_empty() {
                Err(PipelineError::handler_error("empty payload"))
            } else {
                Ok(cmd.0.to_uppercase())
            }
        }),
        PipelineOptions {
            use_context_pool: false,
            ..PipelineOptions::default()
        },
    )
    .unwrap()
    .with_recorder(recorder.clone());
    pipeline.add_middleware(Append::custom("!")).unwrap();

    pipeline.execute(Transform("ok".into())).await.unwrap();
    let _ = pipeline.execute(Transform(String::new())).await;

    assert_eq!(recorder.len(), 2);
    let stats = recorder.statistics();
    assert_eq!(stats.lifetime_recorded, 2);
    assert_eq!(stats.lifetime_failures, 1);
    assert_eq!(stats.command_type_count, 1);

    let success = &recorder.successes(1)[0];
    assert_eq!(success.command_type(), "Transform");
    assert_eq!(success.middleware_trace(), ["Append".to_string()]);

    let failure = &recorder.failures(1)[0];
    assert_eq!(failure.error_kind(), Some("handler_error"));
    assert!(failure.error_message().unwrap().contains("empty payload"));
}

#[tokio::test]
async fn recorder_bound_holds_across_many_dispatches() {
    let recorder = ExecutionRecorder::with_config(RecorderConfig { max_records: 5 }).unwrap();
    let pipeline = Pipeline::with_options(
        FnHandler::new(|cmd: Transform| async move { Ok(cmd.0) }),
        PipelineOptions {
            use_context_pool: false,
            ..PipelineOptions::default()
        },
    )
    .unwrap()
    .with_recorder(recorder.clone());

    for i in 0..25 {
        pipeline.execute(Transform(format!("m{}", i))).await.unwrap();
    }
    assert_eq!(recorder.len(), 5);
    assert_eq!(recorder.statistics().lifetime_recorded, 25);
}

#[tokio::test]
async fn describe_reflects_composition_and_stays_idempotent() {
    let pipeline = upper_pipeline();
    pipeline.add_middleware(Append::at("a", 100)).unwrap();
    pipeline.add_middleware(Append::at("b", 800)).unwrap();
    pipeline.add_interceptor(command_pipeline_domain::FnInterceptor::new(|cmd: Transform| cmd));

    let description = pipeline.describe();
    assert_eq!(description.command_type, "Transform");
    assert_eq!(description.interceptor_count, 1);
    assert_eq!(description.middleware_count(), 2);
    assert_eq!(description.middlewares[0].priority.value(), 100);
    assert_eq!(description.middlewares[1].priority.value(), 800);

    // Idempotent on an unmodified pipeline.
    assert_eq!(pipeline.describe(), description);

    // Snapshots serialize for export.
    let json = serde_json::to_string(&description).unwrap();
    assert!(json.contains("\"Transform\""));
}

#[tokio::test]
async fn description_diff_tracks_structural_changes() {
    let pipeline = upper_pipeline();
    pipeline.add_middleware(Append::at("a", 100)).unwrap();
    let before = pipeline.describe();

    pipeline.add_middleware(crate::common::EventLogger {
        label: "logger",
        priority: command_pipeline_domain::value_objects::MiddlewarePriority::POST_PROCESSING,
        events: std::sync::Arc::new(parking_lot::Mutex::new(Vec::new())),
    })
    .unwrap();
    let after = pipeline.describe();

    let diff = compare_descriptions(&before, &after);
    assert_eq!(diff.middleware_count_delta, 1);
    assert_eq!(diff.added, vec!["EventLogger".to_string()]);
    assert!(diff.removed.is_empty());
    assert!(!diff.reordered);
    assert!(!diff.is_unchanged());
}

#[tokio::test]
async fn correlation_id_flows_from_context_to_recorder() {
    let recorder = ExecutionRecorder::new();
    let pipeline = Pipeline::with_options(
        FnHandler::new(|cmd: Transform| async move { Ok(cmd.0) }),
        PipelineOptions {
            use_context_pool: false,
            ..PipelineOptions::default()
        },
    )
    .unwrap()
    .with_recorder(recorder.clone());

    let metadata = command_pipeline_domain::CommandMetadata::new().with_correlation_id("corr-xyz");
    let context = command_pipeline_domain::CommandContext::new(metadata);
    pipeline
        .execute_with_context(Transform("x".into()), context)
        .await
        .unwrap();

    let hits = recorder.with_correlation_id("corr-xyz");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].command_type(), "Transform");
}
