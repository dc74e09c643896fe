// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Scoped middleware activation by capability tag.

use crate::common::{SecureCommand, Transform};
use async_trait::async_trait;
use command_pipeline::{Pipeline, PipelineOptions};
use command_pipeline_domain::entities::ContextKey;
use command_pipeline_domain::value_objects::RequiresEncryption;
use command_pipeline_domain::{
    Command, CommandContext, CommandMetadata, FnHandler, Middleware, Next, PipelineError, ScopedMiddleware,
};

struct EncryptionMarkerKey;

impl ContextKey for EncryptionMarkerKey {
    type Value = &'static str;

    fn name() -> &'static str {
        "encryption_marker"
    }
}

/// Stands in for an encryption body: marks the context so tests can
/// observe whether the layer ran.
struct MarkEncrypted;

#[async_trait]
impl<C: Command> Middleware<C> for MarkEncrypted {
    fn name(&self) -> &'static str {
        "MarkEncrypted"
    }

    async fn handle(&self, command: C, context: CommandContext, next: Next<C>) -> Result<C::Output, PipelineError> {
        context.set::<EncryptionMarkerKey>("encrypted");
        next.run(command, context).await
    }
}

fn echo_pipeline<C>() -> Pipeline<C>
where
    C: Command<Output = String>,
    C: Into<String>,
{
    Pipeline::with_options(
        FnHandler::new(|cmd: C| async move { Ok(cmd.into()) }),
        PipelineOptions {
            use_context_pool: false,
            ..PipelineOptions::default()
        },
    )
    .unwrap()
}

impl From<SecureCommand> for String {
    fn from(cmd: SecureCommand) -> Self {
        cmd.0
    }
}

impl From<Transform> for String {
    fn from(cmd: Transform) -> Self {
        cmd.0
    }
}

#[tokio::test]
async fn scoped_middleware_runs_for_tagged_command() {
    let pipeline = echo_pipeline::<SecureCommand>();
    pipeline
        .add_middleware(ScopedMiddleware::<RequiresEncryption, _>::new(MarkEncrypted))
        .unwrap();

    let context = CommandContext::new(CommandMetadata::new());
    pipeline
        .execute_with_context(SecureCommand("payload".into()), context.clone())
        .await
        .unwrap();

    assert_eq!(context.get::<EncryptionMarkerKey>(), Some("encrypted"));
}

#[tokio::test]
async fn scoped_middleware_skips_untagged_command() {
    let pipeline = echo_pipeline::<Transform>();
    pipeline
        .add_middleware(ScopedMiddleware::<RequiresEncryption, _>::new(MarkEncrypted))
        .unwrap();

    let context = CommandContext::new(CommandMetadata::new());
    pipeline
        .execute_with_context(Transform("payload".into()), context.clone())
        .await
        .unwrap();

    // The marker is absent: the scoped layer was bypassed entirely.
    assert_eq!(context.get::<EncryptionMarkerKey>(), None);
}

#[tokio::test]
async fn trace_reports_scoped_activation_without_executing() {
    let tagged = echo_pipeline::<SecureCommand>();
    tagged
        .add_middleware(ScopedMiddleware::<RequiresEncryption, _>::new(MarkEncrypted))
        .unwrap();
    let trace = tagged.trace_command(&SecureCommand("p".into()));
    assert_eq!(trace.active, vec!["MarkEncrypted".to_string()]);
    assert!(trace.skipped.is_empty());

    let untagged = echo_pipeline::<Transform>();
    untagged
        .add_middleware(ScopedMiddleware::<RequiresEncryption, _>::new(MarkEncrypted))
        .unwrap();
    let trace = untagged.trace_command(&Transform("p".into()));
    assert!(trace.active.is_empty());
    assert_eq!(trace.skipped, vec!["MarkEncrypted".to_string()]);
}
