// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Timeout Middleware
//!
//! Timeouts are a middleware, not a dispatch primitive: wrapping the
//! remainder of the chain keeps the deadline composable (it can sit inside
//! or outside retry layers, per its priority) and keeps the dispatch core
//! free of time policy.
//!
//! On expiry the inner future is dropped (cooperative cancellation is
//! observed at its next await point) and the execution fails with
//! `PipelineError::Timeout`.

use async_trait::async_trait;
use command_pipeline_domain::value_objects::MiddlewarePriority;
use command_pipeline_domain::{Command, CommandContext, Middleware, Next, PipelineError};
use std::time::Duration;

/// Fails executions that outlive a deadline.
///
/// Generic over the command type: one instance type serves any pipeline.
///
/// ## Usage Examples
///
/// ```ignore
/// pipeline.add_middleware(TimeoutMiddleware::new(Duration::from_secs(2)))?;
/// ```
pub struct TimeoutMiddleware {
    duration: Duration,
    priority: MiddlewarePriority,
}

impl TimeoutMiddleware {
    /// Creates a timeout at the pre-processing band (outside most
    /// application middleware).
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            priority: MiddlewarePriority::PRE_PROCESSING,
        }
    }

    /// Overrides the priority band.
    pub fn with_priority(mut self, priority: MiddlewarePriority) -> Self {
        self.priority = priority;
        self
    }

    /// The configured deadline.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[async_trait]
impl<C: Command> Middleware<C> for TimeoutMiddleware {
    fn priority(&self) -> MiddlewarePriority {
        self.priority
    }

    fn name(&self) -> &'static str {
        "TimeoutMiddleware"
    }

    async fn handle(&self, command: C, context: CommandContext, next: Next<C>) -> Result<C::Output, PipelineError> {
        match tokio::time::timeout(self.duration, next.run(command, context)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::timeout(format!(
                "{} exceeded the {:?} deadline",
                C::name(),
                self.duration
            ))),
        }
    }
}
