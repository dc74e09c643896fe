// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Middleware Protocol
//!
//! This module defines the execution-stage contract that ALL cross-cutting
//! behaviors implement, whether shipped with the framework (timeout) or
//! user-defined (authentication, validation, rate limiting, audit).
//!
//! ## Overview
//!
//! A middleware wraps the remainder of the chain: it receives the command,
//! the shared context, and a [`Next`] continuation, and decides what happens
//! around (and whether to invoke) everything downstream of it.
//!
//! - **Ordering**: middleware execute in ascending [`MiddlewarePriority`]
//!   order on the way in and reverse order on the way out (the standard
//!   onion model); equal priorities keep insertion order
//! - **Activation**: unconditional middleware always run; conditional
//!   middleware run iff `should_activate` returns true; scoped middleware
//!   are conditional middleware whose predicate is membership of a
//!   capability tag in the command type's declared set
//! - **Error flow**: errors from inner layers propagate outward through the
//!   chain, giving each outer middleware a chance to observe or transform
//!   them in its trailing code
//!
//! ## Why One Unified Trait?
//!
//! Separate traits for unconditional, conditional, and scoped middleware
//! would force the dispatch engine into three storage and fold paths. The
//! unified trait keeps one chain representation; refinements override
//! `should_activate` and report their [`ActivationKind`] for introspection,
//! and [`ScopedMiddleware`] packages the tag-membership predicate as a
//! reusable wrapper.
//!
//! ## Usage Examples
//!
//! ```
//! use async_trait::async_trait;
//! use command_pipeline_domain::entities::CommandContext;
//! use command_pipeline_domain::error::PipelineError;
//! use command_pipeline_domain::services::{Command, Middleware, Next};
//! use command_pipeline_domain::value_objects::MiddlewarePriority;
//!
//! struct Exclaim;
//!
//! #[async_trait]
//! impl<C> Middleware<C> for Exclaim
//! where
//!     C: Command<Output = String>,
//! {
//!     fn priority(&self) -> MiddlewarePriority {
//!         MiddlewarePriority::CUSTOM
//!     }
//!
//!     async fn handle(
//!         &self,
//!         command: C,
//!         context: CommandContext,
//!         next: Next<C>,
//!     ) -> Result<String, PipelineError> {
//!         let result = next.run(command, context).await?;
//!         Ok(format!("{}!", result))
//!     }
//! }
//! ```

use crate::entities::CommandContext;
use crate::error::PipelineError;
use crate::services::Command;
use crate::value_objects::{Capability, MiddlewarePriority};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

/// How a middleware decides whether to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationKind {
    /// Runs on every execution
    Always,
    /// Runs iff `should_activate(command, context)` returns true
    Conditional,
    /// Runs iff the command type carries the middleware's capability tag
    Scoped,
}

/// Future type produced by one link of a middleware chain.
pub type ChainFuture<C> = BoxFuture<'static, Result<<C as Command>::Output, PipelineError>>;

/// One link of a folded middleware chain: a callable from `(command,
/// context)` to the eventual result. Chains are built by folding the sorted
/// middleware list from last to first over the terminal handler call.
pub type ChainFn<C> = dyn Fn(C, CommandContext) -> ChainFuture<C> + Send + Sync;

/// Continuation handed to a middleware: the remainder of the chain.
///
/// Consuming `run` enforces at the type level that a middleware invokes the
/// remainder at most once per execution.
pub struct Next<C: Command> {
    chain: Arc<ChainFn<C>>,
}

impl<C: Command> Next<C> {
    /// Wraps a chain link as a continuation.
    pub fn new(chain: Arc<ChainFn<C>>) -> Self {
        Self { chain }
    }

    /// Invokes the remainder of the chain.
    pub async fn run(self, command: C, context: CommandContext) -> Result<C::Output, PipelineError> {
        (self.chain)(command, context).await
    }
}

/// Composable async wrapper around handler execution.
///
/// Implementations must be cancellation-aware at their await points:
/// cancellation is observed at the next await, and any trailing cleanup
/// should be drop-safe.
#[async_trait]
pub trait Middleware<C: Command>: Send + Sync {
    /// Execution priority; lower values run earlier (outermost).
    fn priority(&self) -> MiddlewarePriority {
        MiddlewarePriority::CUSTOM
    }

    /// Middleware name for introspection, traces, and records
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// How this middleware activates; feeds introspection only.
    fn activation(&self) -> ActivationKind {
        ActivationKind::Always
    }

    /// Activation predicate, consulted before `handle` on every execution.
    /// Inactive middleware are bypassed entirely: the engine routes straight
    /// to the next link, and `handle` is never entered.
    fn should_activate(&self, _command: &C, _context: &CommandContext) -> bool {
        true
    }

    /// Wraps the remainder of the chain.
    async fn handle(&self, command: C, context: CommandContext, next: Next<C>) -> Result<C::Output, PipelineError>;
}

/// Restricts an inner middleware to commands carrying the capability tag
/// `Tag`.
///
/// A scoped middleware is a conditional middleware whose predicate is tag
/// membership: for command types without the tag it is bypassed without any
/// observable effect.
///
/// ## Usage Examples
///
/// ```ignore
/// let encryption_only = ScopedMiddleware::<RequiresEncryption, _>::new(EncryptBody::default());
/// pipeline.add_middleware(Arc::new(encryption_only))?;
/// ```
pub struct ScopedMiddleware<Tag, M> {
    inner: M,
    _scope: PhantomData<fn() -> Tag>,
}

impl<Tag: Capability, M> ScopedMiddleware<Tag, M> {
    /// Wraps `inner`, scoping it to commands carrying `Tag`.
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            _scope: PhantomData,
        }
    }

    /// The capability tag name this middleware is scoped to.
    pub fn scope_name(&self) -> &'static str {
        Tag::name()
    }
}

#[async_trait]
impl<C, Tag, M> Middleware<C> for ScopedMiddleware<Tag, M>
where
    C: Command,
    Tag: Capability,
    M: Middleware<C>,
{
    fn priority(&self) -> MiddlewarePriority {
        self.inner.priority()
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn activation(&self) -> ActivationKind {
        ActivationKind::Scoped
    }

    fn should_activate(&self, command: &C, context: &CommandContext) -> bool {
        C::capabilities().contains::<Tag>() && self.inner.should_activate(command, context)
    }

    async fn handle(&self, command: C, context: CommandContext, next: Next<C>) -> Result<C::Output, PipelineError> {
        self.inner.handle(command, context, next).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::CommandMetadata;
    use crate::value_objects::{CapabilitySet, RequiresEncryption};

    struct Plain(String);

    impl Command for Plain {
        type Output = String;
    }

    struct Secure(String);

    impl Command for Secure {
        type Output = String;

        fn capabilities() -> CapabilitySet {
            CapabilitySet::new().with::<RequiresEncryption>()
        }
    }

    struct Suffix(&'static str);

    #[async_trait]
    impl<C> Middleware<C> for Suffix
    where
        C: Command<Output = String>,
    {
        async fn handle(&self, command: C, context: CommandContext, next: Next<C>) -> Result<String, PipelineError> {
            let result = next.run(command, context).await?;
            Ok(format!("{}{}", result, self.0))
        }
    }

    fn terminal<C: Command<Output = String>>(output: &'static str) -> Arc<ChainFn<C>> {
        Arc::new(move |_cmd, _ctx| Box::pin(async move { Ok(output.to_string()) }))
    }

    #[tokio::test]
    async fn test_next_invokes_chain() {
        let next = Next::new(terminal::<Plain>("base"));
        let ctx = CommandContext::new(CommandMetadata::new());
        let out = next.run(Plain("x".into()), ctx).await.unwrap();
        assert_eq!(out, "base");
    }

    #[tokio::test]
    async fn test_middleware_wraps_next() {
        let mw = Suffix("!");
        let ctx = CommandContext::new(CommandMetadata::new());
        let out = mw
            .handle(Plain("x".into()), ctx, Next::new(terminal::<Plain>("base")))
            .await
            .unwrap();
        assert_eq!(out, "base!");
    }

    #[test]
    fn test_scoped_activation_follows_tag_membership() {
        let scoped = ScopedMiddleware::<RequiresEncryption, _>::new(Suffix("!"));
        let ctx = CommandContext::new(CommandMetadata::new());

        assert!(scoped.should_activate(&Secure("s".into()), &ctx));

        let scoped_plain = ScopedMiddleware::<RequiresEncryption, _>::new(Suffix("!"));
        assert!(!scoped_plain.should_activate(&Plain("p".into()), &ctx));
    }

    #[test]
    fn test_scoped_reports_kind_and_scope() {
        let scoped = ScopedMiddleware::<RequiresEncryption, _>::new(Suffix("!"));
        assert_eq!(
            <ScopedMiddleware<RequiresEncryption, Suffix> as Middleware<Secure>>::activation(&scoped),
            ActivationKind::Scoped
        );
        assert_eq!(scoped.scope_name(), "requires_encryption");
    }

    #[test]
    fn test_default_activation_is_always() {
        let mw = Suffix("!");
        assert_eq!(<Suffix as Middleware<Plain>>::activation(&mw), ActivationKind::Always);
        let ctx = CommandContext::new(CommandMetadata::new());
        assert!(mw.should_activate(&Plain("p".into()), &ctx));
    }
}
