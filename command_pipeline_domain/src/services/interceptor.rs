// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Interceptors
//!
//! An interceptor purely transforms a command before any middleware runs.
//! It cannot short-circuit the execution, observe the result, or touch the
//! context: the signature `C -> C` makes all three impossible by
//! construction.
//!
//! Interceptors registered on a pipeline are applied in insertion order, on
//! every invocation, before the middleware chain is entered.
//!
//! Typical uses: trimming and normalizing payloads, stamping defaults,
//! redacting fields before they enter middleware that logs.

use crate::services::Command;

/// Pre-middleware transformer of commands.
pub trait CommandInterceptor<C: Command>: Send + Sync {
    /// Transforms the command. Must be pure with respect to execution
    /// control flow: the returned command continues through the chain.
    fn intercept(&self, command: C) -> C;

    /// Interceptor name for introspection output
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Adapts a plain closure into a [`CommandInterceptor`].
///
/// ## Usage Examples
///
/// ```
/// use command_pipeline_domain::services::{Command, CommandInterceptor, FnInterceptor};
///
/// struct Say(String);
///
/// impl Command for Say {
///     type Output = String;
/// }
///
/// let trim = FnInterceptor::new(|cmd: Say| Say(cmd.0.trim().to_string()));
/// let out = trim.intercept(Say("  hi  ".into()));
/// assert_eq!(out.0, "hi");
/// ```
pub struct FnInterceptor<F> {
    func: F,
}

impl<F> FnInterceptor<F> {
    /// Wraps the closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<C, F> CommandInterceptor<C> for FnInterceptor<F>
where
    C: Command,
    F: Fn(C) -> C + Send + Sync,
{
    fn intercept(&self, command: C) -> C {
        (self.func)(command)
    }
}
