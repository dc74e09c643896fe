// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Dynamic routing through the command bus.

use async_trait::async_trait;
use command_pipeline::{AnyCommand, CommandBus, DynMiddleware, DynNext, TypedInterceptor};
use command_pipeline_domain::value_objects::RequiresEncryption;
use command_pipeline_domain::{CapabilitySet, Command, CommandContext, FnHandler, PipelineError};

struct Echo(String);

impl Command for Echo {
    type Output = String;

    fn name() -> &'static str {
        "Echo"
    }
}

struct Sum(Vec<i64>);

impl Command for Sum {
    type Output = i64;

    fn name() -> &'static str {
        "Sum"
    }
}

struct Secret(String);

impl Command for Secret {
    type Output = String;

    fn name() -> &'static str {
        "Secret"
    }

    fn capabilities() -> CapabilitySet {
        CapabilitySet::new().with::<RequiresEncryption>()
    }
}

#[tokio::test]
async fn register_once_conflict_then_overwrite() {
    let bus = CommandBus::new();
    bus.register(FnHandler::new(|cmd: Echo| async move { Ok(format!("A:{}", cmd.0)) }));

    // register_once on an occupied slot fails.
    let err = bus
        .register_once(FnHandler::new(|cmd: Echo| async move { Ok(format!("B:{}", cmd.0)) }))
        .unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyRegistered(_)));

    // A plain register overwrites, and the overwrite serves traffic.
    bus.register(FnHandler::new(|cmd: Echo| async move { Ok(format!("B:{}", cmd.0)) }));
    assert_eq!(bus.send(Echo("x".into())).await.unwrap(), "B:x");
}

#[tokio::test]
async fn routes_by_runtime_type() {
    let bus = CommandBus::new();
    bus.register(FnHandler::new(|cmd: Echo| async move { Ok(cmd.0) }));
    bus.register(FnHandler::new(|cmd: Sum| async move { Ok(cmd.0.iter().sum()) }));

    assert_eq!(bus.send(Echo("hello".into())).await.unwrap(), "hello");
    assert_eq!(bus.send(Sum(vec![1, 2, 3])).await.unwrap(), 6);

    let err = bus.send(Secret("k".into())).await.unwrap_err();
    assert!(matches!(err, PipelineError::NoHandler(_)));
}

/// Scoped-by-capability bus middleware: wraps only envelopes whose command
/// type carries the encryption tag.
struct SealOutput;

#[async_trait]
impl DynMiddleware for SealOutput {
    fn name(&self) -> &'static str {
        "SealOutput"
    }

    fn should_activate(&self, command: &AnyCommand, _context: &CommandContext) -> bool {
        command.capabilities().contains::<RequiresEncryption>()
    }

    async fn handle(
        &self,
        command: AnyCommand,
        context: CommandContext,
        next: DynNext,
    ) -> Result<Box<dyn std::any::Any + Send>, PipelineError> {
        let output = next.run(command, context).await?;
        match output.downcast::<String>() {
            Ok(text) => Ok(Box::new(format!("sealed({})", text))),
            Err(other) => Ok(other),
        }
    }
}

#[tokio::test]
async fn shared_middleware_respects_envelope_capabilities() {
    let bus = CommandBus::new();
    bus.register(FnHandler::new(|cmd: Echo| async move { Ok(cmd.0) }));
    bus.register(FnHandler::new(|cmd: Secret| async move { Ok(cmd.0) }));
    bus.add_middleware(SealOutput);

    assert_eq!(bus.send(Secret("k".into())).await.unwrap(), "sealed(k)");
    assert_eq!(bus.send(Echo("k".into())).await.unwrap(), "k");
}

#[tokio::test]
async fn typed_interceptor_only_touches_its_type() {
    let bus = CommandBus::new();
    bus.register(FnHandler::new(|cmd: Echo| async move { Ok(cmd.0) }));
    bus.register(FnHandler::new(|cmd: Sum| async move { Ok(cmd.0.iter().sum()) }));
    bus.add_interceptor(TypedInterceptor::new(|cmd: Echo| Echo(cmd.0.trim().to_string())));

    assert_eq!(bus.send(Echo("  hi  ".into())).await.unwrap(), "hi");
    assert_eq!(bus.send(Sum(vec![4, 4])).await.unwrap(), 8);
}

#[tokio::test]
async fn unregister_returns_routing_to_no_handler() {
    let bus = CommandBus::new();
    bus.register(FnHandler::new(|cmd: Echo| async move { Ok(cmd.0) }));
    assert!(bus.is_registered::<Echo>());
    assert_eq!(bus.registration_count(), 1);

    assert!(bus.unregister::<Echo>());
    assert_eq!(bus.registration_count(), 0);
    let err = bus.send(Echo("x".into())).await.unwrap_err();
    assert!(matches!(err, PipelineError::NoHandler(_)));
}
