// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dynamic Command Bus
//!
//! This module provides the multiplexed dispatch shape: one bus, many
//! command types, routed by runtime type identity.
//!
//! ## Type Erasure
//!
//! The registry maps `TypeId → ErasedHandler`. A monomorphic wrapper is
//! installed at registration time; it downcasts the envelope exactly once
//! at its boundary (`InvalidCommandType` if a foreign payload somehow
//! reaches it) and re-boxes the typed output (`InvalidResultType` if the
//! caller's expected output type disagrees). Callers of [`CommandBus::send`]
//! see fully typed inputs and outputs; the erasure is an implementation
//! detail of the registry.
//!
//! ## Shared Middleware & Interceptors
//!
//! Because the bus carries many command types, its middleware operate on
//! the type-erased [`AnyCommand`] envelope via [`DynMiddleware`], sorted
//! and folded exactly like a typed pipeline's chain and cached by the same
//! generation scheme. [`TypedInterceptor`] adapts a typed transform into a
//! bus interceptor that touches only its own command type and passes every
//! other envelope through unchanged.

use chrono::Utc;
use command_pipeline_domain::entities::StartTimeKey;
use command_pipeline_domain::value_objects::{CapabilitySet, MiddlewarePriority};
use command_pipeline_domain::{
    ActivationKind, Command, CommandContext, CommandHandler, CommandMetadata, PipelineError,
};
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Type-erased command envelope flowing through the bus.
///
/// Carries the payload plus everything the erased layers need without
/// downcasting: the command's type identity and name, its capability set,
/// and the submission metadata.
pub struct AnyCommand {
    payload: Box<dyn Any + Send>,
    payload_type: TypeId,
    type_name: &'static str,
    capabilities: CapabilitySet,
    metadata: CommandMetadata,
}

impl AnyCommand {
    /// Wraps a typed command with fresh submission metadata.
    pub fn of<C: Command>(command: C) -> Self {
        Self::with_metadata(command, CommandMetadata::new())
    }

    /// Wraps a typed command with explicit submission metadata.
    pub fn with_metadata<C: Command>(command: C, metadata: CommandMetadata) -> Self {
        Self {
            payload: Box::new(command),
            payload_type: TypeId::of::<C>(),
            type_name: C::name(),
            capabilities: C::capabilities(),
            metadata,
        }
    }

    /// The wrapped command's type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The wrapped command's type identity.
    pub fn command_type_id(&self) -> TypeId {
        self.payload_type
    }

    /// The wrapped command type's capability tags.
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// The submission metadata.
    pub fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }

    /// Whether the payload is a `C`.
    pub fn is<C: Command>(&self) -> bool {
        self.payload_type == TypeId::of::<C>()
    }

    /// Borrows the payload as a `C`, when it is one.
    pub fn downcast_ref<C: Command>(&self) -> Option<&C> {
        self.payload.downcast_ref::<C>()
    }

    /// Unwraps the payload as a `C`; hands the envelope back intact on a
    /// type mismatch.
    pub fn downcast<C: Command>(self) -> Result<C, AnyCommand> {
        let Self {
            payload,
            payload_type,
            type_name,
            capabilities,
            metadata,
        } = self;
        match payload.downcast::<C>() {
            Ok(command) => Ok(*command),
            Err(payload) => Err(Self {
                payload,
                payload_type,
                type_name,
                capabilities,
                metadata,
            }),
        }
    }

    /// Applies a typed transform when the payload is a `C`, preserving the
    /// envelope's metadata; other payloads pass through unchanged.
    pub fn map_typed<C: Command>(self, transform: impl FnOnce(C) -> C) -> AnyCommand {
        let metadata = self.metadata.clone();
        match self.downcast::<C>() {
            Ok(command) => AnyCommand::with_metadata(transform(command), metadata),
            Err(envelope) => envelope,
        }
    }
}

impl std::fmt::Debug for AnyCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyCommand")
            .field("type_name", &self.type_name)
            .field("capabilities", &self.capabilities.names())
            .finish_non_exhaustive()
    }
}

/// Type-erased output produced by an erased handler.
pub type DynOutput = Box<dyn Any + Send>;

/// Future type produced by one link of the bus chain.
pub type DynChainFuture = BoxFuture<'static, Result<DynOutput, PipelineError>>;

/// One link of the folded bus chain.
pub type DynChainFn = dyn Fn(AnyCommand, CommandContext) -> DynChainFuture + Send + Sync;

/// Continuation handed to a bus middleware: the remainder of the chain.
pub struct DynNext {
    chain: Arc<DynChainFn>,
}

impl DynNext {
    /// Wraps a chain link as a continuation.
    pub fn new(chain: Arc<DynChainFn>) -> Self {
        Self { chain }
    }

    /// Invokes the remainder of the chain.
    pub async fn run(self, command: AnyCommand, context: CommandContext) -> Result<DynOutput, PipelineError> {
        (self.chain)(command, context).await
    }
}

/// Composable async wrapper shared by every command type the bus routes.
///
/// The bus-level twin of the typed `Middleware` trait: same priority and
/// activation semantics, operating on the erased envelope. Scoping is
/// expressed through the envelope's capability set
/// (`command.capabilities().contains::<Tag>()`).
#[async_trait]
pub trait DynMiddleware: Send + Sync {
    /// Execution priority; lower values run earlier (outermost).
    fn priority(&self) -> MiddlewarePriority {
        MiddlewarePriority::CUSTOM
    }

    /// Middleware name for logs and introspection
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// How this middleware activates; feeds introspection only.
    fn activation(&self) -> ActivationKind {
        ActivationKind::Always
    }

    /// Activation predicate, consulted before `handle` on every dispatch.
    fn should_activate(&self, _command: &AnyCommand, _context: &CommandContext) -> bool {
        true
    }

    /// Wraps the remainder of the chain.
    async fn handle(
        &self,
        command: AnyCommand,
        context: CommandContext,
        next: DynNext,
    ) -> Result<DynOutput, PipelineError>;
}

/// Pre-middleware transformer of bus envelopes.
pub trait BusInterceptor: Send + Sync {
    /// Transforms the envelope; must pass foreign command types through
    /// unchanged.
    fn intercept(&self, command: AnyCommand) -> AnyCommand;

    /// Interceptor name for introspection output
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Adapts a typed `C -> C` transform into a [`BusInterceptor`] that
/// activates only for commands of type `C` and passes every other envelope
/// through unchanged.
pub struct TypedInterceptor<C, F> {
    transform: F,
    _command: PhantomData<fn() -> C>,
}

impl<C, F> TypedInterceptor<C, F>
where
    C: Command,
    F: Fn(C) -> C + Send + Sync,
{
    /// Wraps the transform.
    pub fn new(transform: F) -> Self {
        Self {
            transform,
            _command: PhantomData,
        }
    }
}

impl<C, F> BusInterceptor for TypedInterceptor<C, F>
where
    C: Command,
    F: Fn(C) -> C + Send + Sync,
{
    fn intercept(&self, command: AnyCommand) -> AnyCommand {
        command.map_typed::<C>(|typed| (self.transform)(typed))
    }
}

type ErasedHandler = Arc<dyn Fn(AnyCommand, CommandContext) -> DynChainFuture + Send + Sync>;

struct Registration {
    command_type: &'static str,
    handler_name: &'static str,
    invoke: ErasedHandler,
}

struct DynEntry {
    middleware: Arc<dyn DynMiddleware>,
    type_id: TypeId,
    priority: MiddlewarePriority,
}

struct BusComposition {
    entries: Vec<DynEntry>,
    interceptors: Vec<Arc<dyn BusInterceptor>>,
    generation: u64,
    cached: Option<(u64, Arc<DynChainFn>)>,
}

struct BusCore {
    handlers: Mutex<HashMap<TypeId, Registration>>,
    composition: Mutex<BusComposition>,
}

/// Dynamic pipeline multiplexing many command types through one shared
/// middleware chain. Cheap to clone; clones share state.
///
/// ## Usage Examples
///
/// ```ignore
/// let bus = CommandBus::new();
/// bus.register(FnHandler::new(|cmd: Echo| async move { Ok(cmd.0) }));
///
/// let reply: String = bus.send(Echo("ping".into())).await?;
/// ```
#[derive(Clone)]
pub struct CommandBus {
    core: Arc<BusCore>,
}

impl CommandBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            core: Arc::new(BusCore {
                handlers: Mutex::new(HashMap::new()),
                composition: Mutex::new(BusComposition {
                    entries: Vec::new(),
                    interceptors: Vec::new(),
                    generation: 0,
                    cached: None,
                }),
            }),
        }
    }

    fn erase<C: Command>(handler: Arc<dyn CommandHandler<C>>) -> ErasedHandler {
        Arc::new(move |envelope: AnyCommand, _context: CommandContext| {
            let handler = handler.clone();
            Box::pin(async move {
                let received = envelope.type_name();
                let command = envelope.downcast::<C>().map_err(|_| {
                    PipelineError::invalid_command_type(format!(
                        "handler for {} received a {} payload",
                        C::name(),
                        received
                    ))
                })?;
                let output = handler.handle(command).await?;
                Ok(Box::new(output) as DynOutput)
            })
        })
    }

    /// Registers (or overwrites) the handler for command type `C`.
    pub fn register<C: Command>(&self, handler: impl CommandHandler<C> + 'static) {
        let handler: Arc<dyn CommandHandler<C>> = Arc::new(handler);
        let registration = Registration {
            command_type: C::name(),
            handler_name: handler.name(),
            invoke: Self::erase(handler),
        };
        self.core.handlers.lock().insert(TypeId::of::<C>(), registration);
        debug!(command = C::name(), "handler registered");
    }

    /// Registers the handler for command type `C`, failing with
    /// `AlreadyRegistered` when one exists.
    pub fn register_once<C: Command>(&self, handler: impl CommandHandler<C> + 'static) -> Result<(), PipelineError> {
        let mut handlers = self.core.handlers.lock();
        if handlers.contains_key(&TypeId::of::<C>()) {
            return Err(PipelineError::already_registered(C::name()));
        }
        let handler: Arc<dyn CommandHandler<C>> = Arc::new(handler);
        handlers.insert(
            TypeId::of::<C>(),
            Registration {
                command_type: C::name(),
                handler_name: handler.name(),
                invoke: Self::erase(handler),
            },
        );
        Ok(())
    }

    /// Removes the handler for command type `C`. Returns whether one was
    /// registered.
    pub fn unregister<C: Command>(&self) -> bool {
        self.core.handlers.lock().remove(&TypeId::of::<C>()).is_some()
    }

    /// Whether a handler is registered for command type `C`.
    pub fn is_registered<C: Command>(&self) -> bool {
        self.core.handlers.lock().contains_key(&TypeId::of::<C>())
    }

    /// Number of registered command types.
    pub fn registration_count(&self) -> usize {
        self.core.handlers.lock().len()
    }

    /// Removes every registration.
    pub fn clear(&self) {
        self.core.handlers.lock().clear();
    }

    /// The registered `(command type, handler type)` pairs.
    pub fn registrations(&self) -> Vec<(&'static str, &'static str)> {
        self.core
            .handlers
            .lock()
            .values()
            .map(|registration| (registration.command_type, registration.handler_name))
            .collect()
    }

    /// Adds a shared middleware at its sorted position (stable on ties).
    /// Bumps the generation and invalidates the cached chain.
    pub fn add_middleware<M: DynMiddleware + 'static>(&self, middleware: M) {
        let mut composition = self.core.composition.lock();
        let priority = middleware.priority();
        let index = composition.entries.partition_point(|entry| entry.priority <= priority);
        composition.entries.insert(
            index,
            DynEntry {
                middleware: Arc::new(middleware),
                type_id: TypeId::of::<M>(),
                priority,
            },
        );
        composition.generation += 1;
        composition.cached = None;
    }

    /// Removes every shared middleware of concrete type `M`, returning the
    /// count.
    pub fn remove_middleware_of_type<M: 'static>(&self) -> usize {
        let mut composition = self.core.composition.lock();
        let before = composition.entries.len();
        let target = TypeId::of::<M>();
        composition.entries.retain(|entry| entry.type_id != target);
        let removed = before - composition.entries.len();
        if removed > 0 {
            composition.generation += 1;
            composition.cached = None;
        }
        removed
    }

    /// Number of shared middleware.
    pub fn middleware_count(&self) -> usize {
        self.core.composition.lock().entries.len()
    }

    /// Appends a bus interceptor (applied in insertion order).
    pub fn add_interceptor<I: BusInterceptor + 'static>(&self, interceptor: I) {
        let mut composition = self.core.composition.lock();
        composition.interceptors.push(Arc::new(interceptor));
        composition.generation += 1;
    }

    /// Current composition generation.
    pub fn generation(&self) -> u64 {
        self.core.composition.lock().generation
    }

    /// Dispatches a command to its registered handler through the shared
    /// middleware chain.
    ///
    /// Fails with `NoHandler` when no handler is registered for `C`, with
    /// `InvalidResultType` when the produced output cannot be restored to
    /// `C::Output` (a handler registration raced the send).
    #[tracing::instrument(skip_all, fields(command = C::name()))]
    pub async fn send<C: Command>(&self, command: C) -> Result<C::Output, PipelineError> {
        if !self.is_registered::<C>() {
            return Err(PipelineError::no_handler(C::name()));
        }

        let interceptors = self.core.composition.lock().interceptors.clone();
        let mut envelope = AnyCommand::of(command);
        for interceptor in &interceptors {
            envelope = interceptor.intercept(envelope);
        }

        let context = CommandContext::new(envelope.metadata().clone());
        context.set::<StartTimeKey>(Utc::now());

        let chain = self.chain_snapshot();
        let output = (chain)(envelope, context).await?;
        output
            .downcast::<C::Output>()
            .map(|boxed| *boxed)
            .map_err(|_| {
                PipelineError::invalid_result_type(format!(
                    "handler for {} produced an unexpected output type",
                    C::name()
                ))
            })
    }

    fn chain_snapshot(&self) -> Arc<DynChainFn> {
        let mut composition = self.core.composition.lock();
        if let Some((generation, chain)) = &composition.cached {
            if *generation == composition.generation {
                return chain.clone();
            }
        }
        let chain = Self::build_chain(Arc::downgrade(&self.core), &composition.entries);
        composition.cached = Some((composition.generation, chain.clone()));
        chain
    }

    /// Folds the shared middleware over the terminal registry dispatch.
    /// The terminal holds a weak core reference: the cached chain must not
    /// keep the bus alive through its own composition cache.
    fn build_chain(core: Weak<BusCore>, entries: &[DynEntry]) -> Arc<DynChainFn> {
        let mut chain: Arc<DynChainFn> = Arc::new(move |envelope: AnyCommand, context: CommandContext| {
            let core = core.clone();
            Box::pin(async move {
                let invoke = core.upgrade().and_then(|core| {
                    core.handlers
                        .lock()
                        .get(&envelope.command_type_id())
                        .map(|registration| registration.invoke.clone())
                });
                match invoke {
                    Some(invoke) => invoke(envelope, context).await,
                    None => Err(PipelineError::no_handler(envelope.type_name())),
                }
            })
        });
        for entry in entries.iter().rev() {
            let middleware = entry.middleware.clone();
            let inner = chain;
            chain = Arc::new(move |envelope: AnyCommand, context: CommandContext| {
                let middleware = middleware.clone();
                let next = DynNext::new(inner.clone());
                Box::pin(async move {
                    if middleware.should_activate(&envelope, &context) {
                        middleware.handle(envelope, context, next).await
                    } else {
                        next.run(envelope, context).await
                    }
                })
            });
        }
        chain
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBus")
            .field("registrations", &self.registration_count())
            .field("middleware_count", &self.middleware_count())
            .finish_non_exhaustive()
    }
}
