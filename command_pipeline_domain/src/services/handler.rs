// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Handler Trait
//!
//! The terminal async processor for a command type. The handler sits at the
//! center of the middleware onion: the chain fold terminates in a call to
//! `handle`, and whatever it returns (or fails with) propagates back out
//! through every middleware layer.
//!
//! Handlers report domain failures as `PipelineError::HandlerError`;
//! framework infrastructure errors (back-pressure, type mismatches,
//! cancellation) are produced by the dispatch engine, never by handlers, so
//! the two remain distinguishable by variant.
//!
//! [`FnHandler`] adapts a plain async closure, which keeps tests and small
//! registrations free of one-off handler structs.

use crate::error::PipelineError;
use crate::services::Command;
use async_trait::async_trait;
use std::future::Future;

/// Terminal async processor for commands of type `C`.
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    /// Processes the command, producing its typed output.
    async fn handle(&self, command: C) -> Result<C::Output, PipelineError>;

    /// Handler type name for introspection output
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Adapts an async closure into a [`CommandHandler`].
///
/// ## Usage Examples
///
/// ```
/// use command_pipeline_domain::error::PipelineError;
/// use command_pipeline_domain::services::{Command, CommandHandler, FnHandler};
///
/// struct Upper(String);
///
/// impl Command for Upper {
///     type Output = String;
/// }
///
/// let handler = FnHandler::new(|cmd: Upper| async move {
///     Ok::<_, PipelineError>(cmd.0.to_uppercase())
/// });
/// # let _ = handler;
/// ```
pub struct FnHandler<F> {
    func: F,
}

impl<F> FnHandler<F> {
    /// Wraps the closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<C, F, Fut> CommandHandler<C> for FnHandler<F>
where
    C: Command,
    F: Fn(C) -> Fut + Send + Sync,
    Fut: Future<Output = Result<C::Output, PipelineError>> + Send + 'static,
{
    async fn handle(&self, command: C) -> Result<C::Output, PipelineError> {
        (self.func)(command).await
    }
}
