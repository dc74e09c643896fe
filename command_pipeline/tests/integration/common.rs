// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Common Test Helpers
//!
//! Shared command types, middleware, and recorders for the integration
//! suite.

use async_trait::async_trait;
use command_pipeline::{Pipeline, PipelineOptions};
use command_pipeline_domain::value_objects::{CapabilitySet, MiddlewarePriority, RequiresEncryption};
use command_pipeline_domain::{Command, CommandContext, FnHandler, Middleware, Next, PipelineError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::Once;

static TRACING: Once = Once::new();

/// Installs a test subscriber once per process so failing runs can be
/// diagnosed with `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// A string-transforming command handled by an uppercasing handler.
pub struct Transform(pub String);

impl Command for Transform {
    type Output = String;

    fn name() -> &'static str {
        "Transform"
    }
}

/// A command type carrying the encryption capability tag.
pub struct SecureCommand(pub String);

impl Command for SecureCommand {
    type Output = String;

    fn name() -> &'static str {
        "SecureCommand"
    }

    fn capabilities() -> CapabilitySet {
        CapabilitySet::new().with::<RequiresEncryption>()
    }
}

/// Middleware appending a suffix to a string result on the way out.
pub struct Append {
    pub suffix: &'static str,
    pub priority: MiddlewarePriority,
}

impl Append {
    pub fn custom(suffix: &'static str) -> Self {
        Self {
            suffix,
            priority: MiddlewarePriority::CUSTOM,
        }
    }

    pub fn at(suffix: &'static str, priority: u32) -> Self {
        Self {
            suffix,
            priority: MiddlewarePriority::new(priority),
        }
    }
}

#[async_trait]
impl<C> Middleware<C> for Append
where
    C: Command<Output = String>,
{
    fn priority(&self) -> MiddlewarePriority {
        self.priority
    }

    fn name(&self) -> &'static str {
        "Append"
    }

    async fn handle(&self, command: C, context: CommandContext, next: Next<C>) -> Result<String, PipelineError> {
        let result = next.run(command, context).await?;
        Ok(format!("{}{}", result, self.suffix))
    }
}

/// Middleware recording enter/exit events into a shared log, for ordering
/// assertions.
pub struct EventLogger {
    pub label: &'static str,
    pub priority: MiddlewarePriority,
    pub events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl<C: Command> Middleware<C> for EventLogger {
    fn priority(&self) -> MiddlewarePriority {
        self.priority
    }

    fn name(&self) -> &'static str {
        "EventLogger"
    }

    async fn handle(&self, command: C, context: CommandContext, next: Next<C>) -> Result<C::Output, PipelineError> {
        self.events.lock().push(format!("enter:{}", self.label));
        let result = next.run(command, context).await;
        self.events.lock().push(format!("exit:{}", self.label));
        result
    }
}

/// An uppercasing pipeline for [`Transform`] without a context pool, so
/// tests that do not exercise pooling stay off the global registry.
pub fn upper_pipeline() -> Pipeline<Transform> {
    pipeline_with(PipelineOptions {
        use_context_pool: false,
        ..PipelineOptions::default()
    })
}

/// An uppercasing [`Transform`] pipeline with explicit options.
pub fn pipeline_with(options: PipelineOptions) -> Pipeline<Transform> {
    Pipeline::with_options(
        FnHandler::new(|cmd: Transform| async move { Ok(cmd.0.to_uppercase()) }),
        options,
    )
    .unwrap()
}
