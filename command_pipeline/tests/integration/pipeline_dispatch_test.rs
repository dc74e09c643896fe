// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Typed pipeline dispatch: chain semantics, priority ordering, depth
//! limits, interceptors, and conditional activation.

use crate::common::{pipeline_with, upper_pipeline, Append, EventLogger, Transform};
use async_trait::async_trait;
use command_pipeline::PipelineOptions;
use command_pipeline_domain::entities::ContextKey;
use command_pipeline_domain::value_objects::MiddlewarePriority;
use command_pipeline_domain::{
    ActivationKind, Command, CommandContext, FnInterceptor, Middleware, Next, PipelineError,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[tokio::test]
async fn basic_chain_appends_in_onion_order() {
    crate::common::init_tracing();
    // Two middleware at the custom band: insertion order is the tiebreak,
    // so "!" wraps "?" and appends last.
    let pipeline = upper_pipeline();
    pipeline.add_middleware(Append::custom("!")).unwrap();
    pipeline.add_middleware(Append::custom("?")).unwrap();

    let result = pipeline.execute(Transform("hello".into())).await.unwrap();
    assert_eq!(result, "HELLO?!");
}

#[tokio::test]
async fn priority_decides_nesting_regardless_of_insertion() {
    let pipeline = upper_pipeline();
    pipeline.add_middleware(Append::at("3", 500)).unwrap();
    pipeline.add_middleware(Append::at("1", 100)).unwrap();
    pipeline.add_middleware(Append::at("2", 300)).unwrap();

    // Priority 100 is outermost and appends last; 500 is innermost and
    // appends first.
    let result = pipeline.execute(Transform("hello".into())).await.unwrap();
    assert_eq!(result, "HELLO321");
}

#[tokio::test]
async fn lower_priority_enters_first_and_exits_last() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let pipeline = upper_pipeline();
    pipeline
        .add_middleware(EventLogger {
            label: "inner",
            priority: MiddlewarePriority::POST_PROCESSING,
            events: events.clone(),
        })
        .unwrap();
    pipeline
        .add_middleware(EventLogger {
            label: "outer",
            priority: MiddlewarePriority::AUTHENTICATION,
            events: events.clone(),
        })
        .unwrap();

    pipeline.execute(Transform("x".into())).await.unwrap();

    assert_eq!(
        *events.lock(),
        vec![
            "enter:outer".to_string(),
            "enter:inner".to_string(),
            "exit:inner".to_string(),
            "exit:outer".to_string(),
        ]
    );
}

#[tokio::test]
async fn max_depth_rejects_the_overflowing_middleware() {
    let pipeline = pipeline_with(PipelineOptions {
        max_depth: 2,
        use_context_pool: false,
        ..PipelineOptions::default()
    });

    pipeline.add_middleware(Append::custom("a")).unwrap();
    pipeline.add_middleware(Append::custom("b")).unwrap();
    let err = pipeline.add_middleware(Append::custom("c")).unwrap_err();
    assert!(matches!(err, PipelineError::MaxDepthExceeded(_)));
    assert_eq!(pipeline.middleware_count(), 2);
}

#[tokio::test]
async fn interceptor_transforms_before_handler() {
    let pipeline = upper_pipeline();
    pipeline.add_interceptor(FnInterceptor::new(|cmd: Transform| Transform(cmd.0.trim().to_string())));

    let result = pipeline.execute(Transform("  hi  ".into())).await.unwrap();
    assert_eq!(result, "HI");
}

#[tokio::test]
async fn interceptors_apply_in_insertion_order() {
    let pipeline = upper_pipeline();
    pipeline.add_interceptor(FnInterceptor::new(|cmd: Transform| Transform(format!("{}-a", cmd.0))));
    pipeline.add_interceptor(FnInterceptor::new(|cmd: Transform| Transform(format!("{}-b", cmd.0))));

    let result = pipeline.execute(Transform("x".into())).await.unwrap();
    assert_eq!(result, "X-A-B");
}

struct MarkerKey;

impl ContextKey for MarkerKey {
    type Value = bool;

    fn name() -> &'static str {
        "marker"
    }
}

/// Conditional middleware that marks the context when it runs, activating
/// only for commands with even payload length.
struct EvenOnly;

#[async_trait]
impl Middleware<Transform> for EvenOnly {
    fn activation(&self) -> ActivationKind {
        ActivationKind::Conditional
    }

    fn should_activate(&self, command: &Transform, _context: &CommandContext) -> bool {
        command.0.len() % 2 == 0
    }

    async fn handle(
        &self,
        command: Transform,
        context: CommandContext,
        next: Next<Transform>,
    ) -> Result<String, PipelineError> {
        context.set::<MarkerKey>(true);
        next.run(command, context).await
    }
}

#[tokio::test]
async fn inactive_conditional_middleware_has_no_observable_effect() {
    let pipeline = upper_pipeline();
    pipeline.add_middleware(EvenOnly).unwrap();

    let context = CommandContext::new(command_pipeline_domain::CommandMetadata::new());
    pipeline
        .execute_with_context(Transform("abc".into()), context.clone())
        .await
        .unwrap();
    assert_eq!(context.get::<MarkerKey>(), None);

    let context = CommandContext::new(command_pipeline_domain::CommandMetadata::new());
    pipeline
        .execute_with_context(Transform("abcd".into()), context.clone())
        .await
        .unwrap();
    assert_eq!(context.get::<MarkerKey>(), Some(true));
}

#[tokio::test]
async fn errors_unwind_through_outer_middleware() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let pipeline = command_pipeline::Pipeline::with_options(
        command_pipeline_domain::FnHandler::new(|_cmd: Transform| async move {
            Err::<String, _>(PipelineError::handler_error("refused"))
        }),
        PipelineOptions {
            use_context_pool: false,
            ..PipelineOptions::default()
        },
    )
    .unwrap();
    pipeline
        .add_middleware(EventLogger {
            label: "observer",
            priority: MiddlewarePriority::AUTHENTICATION,
            events: events.clone(),
        })
        .unwrap();

    let err = pipeline.execute(Transform("x".into())).await.unwrap_err();
    assert!(matches!(err, PipelineError::HandlerError(_)));
    // The outer middleware's trailing code observed the failure pass by.
    assert_eq!(
        *events.lock(),
        vec!["enter:observer".to_string(), "exit:observer".to_string()]
    );
}

#[tokio::test]
async fn concurrent_executions_share_one_chain() {
    let pipeline = Arc::new(upper_pipeline());
    pipeline.add_middleware(Append::custom("!")).unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline.execute(Transform(format!("msg{}", i))).await
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap().unwrap(), format!("MSG{}!", i));
    }
    // One composition, one generation: nothing was rebuilt mid-flight.
    assert_eq!(pipeline.generation(), 1);
}
