// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Typed Pipeline
//!
//! This module provides the typed dispatch engine: one command type, one
//! terminal handler, an ordered middleware list, an interceptor chain, and
//! the concurrency substrate wired around them (back-pressure admission,
//! pooled contexts, execution recording).
//!
//! ## Execution Flow
//!
//! 1. Acquire a back-pressure token when admission control is configured;
//!    rejected submissions fail fast before any middleware runs
//! 2. Apply interceptors to the command, in insertion order
//! 3. Borrow a context from the context pool (or use the caller's), seeding
//!    the request-id and start-time inline slots
//! 4. Take the cached middleware chain (rebuilt only when the composition
//!    generation changed)
//! 5. Run the chain; the handler sits at its center
//! 6. Feed the outcome to the execution recorder when one is attached
//! 7. Release the token and return the pooled context via RAII, on success,
//!    error, and cancellation paths alike
//!
//! ## Chain Cache
//!
//! The executable chain is the sorted middleware list folded from last to
//! first over the terminal handler call. The fold result is memoized keyed
//! by a generation counter; every structural mutation (add, remove, clear)
//! bumps the generation and invalidates the cache, so no execution ever
//! runs a chain built from a prior composition. Execution holds the
//! composition lock only long enough to clone the snapshot, never across
//! an await.
//!
//! ## Re-entrancy
//!
//! The folded chain is a plain `Arc` callable: any number of executions run
//! it concurrently, each with its own command, context, and token.
//!
//! ## Type Safety
//!
//! `Pipeline<C>` is statically typed, so a mismatched command type is a
//! compile error rather than a runtime `InvalidCommandType`; that error
//! kind belongs to the dynamic [`CommandBus`](super::command_bus::CommandBus)
//! boundary where type identity is only known at runtime.

use crate::application::services::introspection::{
    ExecutionTrace, MiddlewareDescriptor, PipelineDescription,
};
use crate::infrastructure::runtime::back_pressure::{BackPressureConfig, BackPressureSemaphore};
use crate::infrastructure::runtime::object_pool::{ObjectPool, PoolConfig, PoolStatistics};
use crate::infrastructure::metrics::execution_recorder::ExecutionRecorder;
use chrono::Utc;
use command_pipeline_domain::entities::{ContextKey, StartTimeKey};
use command_pipeline_domain::value_objects::MiddlewarePriority;
use command_pipeline_domain::{
    ActivationKind, ChainFn, Command, CommandContext, CommandHandler, CommandInterceptor, CommandMetadata,
    ExecutionRecord, Middleware, Next, PipelineError,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::sync::Arc;
use tracing::debug;

/// Crate-internal context key carrying the names of middleware entered
/// during one execution. Installed only when a recorder is attached.
pub(crate) struct MiddlewareTraceKey;

impl ContextKey for MiddlewareTraceKey {
    type Value = Vec<String>;

    fn name() -> &'static str {
        "middleware_trace"
    }
}

/// Construction knobs for [`Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Maximum middleware per pipeline.
    pub max_depth: usize,
    /// Whether contexts are borrowed from a pool instead of allocated per
    /// execution.
    pub use_context_pool: bool,
    /// Context pool capacity (when pooling is enabled).
    pub context_pool_size: usize,
    /// Admission control; `None` disables back-pressure.
    pub back_pressure: Option<BackPressureConfig>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_depth: 100,
            use_context_pool: true,
            context_pool_size: 50,
            back_pressure: None,
        }
    }
}

impl PipelineOptions {
    /// Validates construction invariants.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_depth == 0 {
            return Err(PipelineError::invalid_config("max_depth must be positive"));
        }
        if self.use_context_pool && self.context_pool_size == 0 {
            return Err(PipelineError::invalid_config(
                "context_pool_size must be positive when the context pool is enabled",
            ));
        }
        if let Some(back_pressure) = &self.back_pressure {
            back_pressure.validate()?;
        }
        Ok(())
    }
}

struct MiddlewareEntry<C: Command> {
    middleware: Arc<dyn Middleware<C>>,
    type_id: TypeId,
    priority: MiddlewarePriority,
}

struct Composition<C: Command> {
    entries: Vec<MiddlewareEntry<C>>,
    interceptors: Vec<Arc<dyn CommandInterceptor<C>>>,
    generation: u64,
    cached: Option<(u64, Arc<ChainFn<C>>)>,
}

/// Typed dispatch engine for commands of type `C`.
///
/// Composition mutations are serialized behind an internal lock and bump a
/// generation counter; execution is lock-free apart from taking snapshots.
/// Share across tasks with `Arc<Pipeline<C>>`.
///
/// ## Usage Examples
///
/// ```ignore
/// let pipeline = Pipeline::new(FnHandler::new(|cmd: Transform| async move {
///     Ok(cmd.0.to_uppercase())
/// }))?;
/// pipeline.add_middleware(TimeoutMiddleware::new(Duration::from_secs(2)))?;
///
/// let result = pipeline.execute(Transform("hello".into())).await?;
/// ```
pub struct Pipeline<C: Command> {
    handler: Arc<dyn CommandHandler<C>>,
    options: PipelineOptions,
    back_pressure: Option<BackPressureSemaphore>,
    context_pool: Option<ObjectPool<CommandContext>>,
    recorder: Option<ExecutionRecorder>,
    composition: Mutex<Composition<C>>,
}

impl<C: Command> Pipeline<C> {
    /// Creates a pipeline with default options.
    pub fn new(handler: impl CommandHandler<C> + 'static) -> Result<Self, PipelineError> {
        Self::with_options(handler, PipelineOptions::default())
    }

    /// Creates a pipeline with explicit options.
    pub fn with_options(handler: impl CommandHandler<C> + 'static, options: PipelineOptions) -> Result<Self, PipelineError> {
        options.validate()?;

        let back_pressure = match &options.back_pressure {
            Some(config) => Some(BackPressureSemaphore::new(config.clone())?),
            None => None,
        };

        let context_pool = if options.use_context_pool {
            Some(ObjectPool::new(
                format!("{}-context-pool", C::name()),
                PoolConfig::with_max_size(options.context_pool_size),
                || CommandContext::new(CommandMetadata::new()),
                |context| context.clear(),
            )?)
        } else {
            None
        };

        Ok(Self {
            handler: Arc::new(handler),
            options,
            back_pressure,
            context_pool,
            recorder: None,
            composition: Mutex::new(Composition {
                entries: Vec::new(),
                interceptors: Vec::new(),
                generation: 0,
                cached: None,
            }),
        })
    }

    /// Attaches an execution recorder; every execution feeds it a record.
    pub fn with_recorder(mut self, recorder: ExecutionRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Adds a middleware at its sorted position (stable on priority ties).
    ///
    /// Fails with `MaxDepthExceeded` when the pipeline already holds
    /// `max_depth` middleware. Bumps the composition generation and
    /// invalidates the cached chain.
    pub fn add_middleware<M: Middleware<C> + 'static>(&self, middleware: M) -> Result<(), PipelineError> {
        let mut composition = self.composition.lock();
        if composition.entries.len() >= self.options.max_depth {
            return Err(PipelineError::max_depth_exceeded(format!(
                "pipeline for {} already holds {} middleware",
                C::name(),
                self.options.max_depth
            )));
        }
        let priority = middleware.priority();
        // Insert after every entry of lower-or-equal priority: stable
        // insertion order among equals.
        let index = composition.entries.partition_point(|entry| entry.priority <= priority);
        composition.entries.insert(
            index,
            MiddlewareEntry {
                middleware: Arc::new(middleware),
                type_id: TypeId::of::<M>(),
                priority,
            },
        );
        composition.generation += 1;
        composition.cached = None;
        debug!(
            command = C::name(),
            priority = priority.value(),
            generation = composition.generation,
            "middleware added"
        );
        Ok(())
    }

    /// Removes every middleware of concrete type `M`, returning the count.
    /// Bumps the generation when anything was removed.
    pub fn remove_middleware_of_type<M: 'static>(&self) -> usize {
        let mut composition = self.composition.lock();
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

    /// Removes every middleware, returning the count.
    pub fn clear_middlewares(&self) -> usize {
        let mut composition = self.composition.lock();
        let removed = composition.entries.len();
        if removed > 0 {
            composition.entries.clear();
            composition.generation += 1;
            composition.cached = None;
        }
        removed
    }

    /// Number of middleware currently composed.
    pub fn middleware_count(&self) -> usize {
        self.composition.lock().entries.len()
    }

    /// Appends an interceptor (applied in insertion order).
    pub fn add_interceptor<I: CommandInterceptor<C> + 'static>(&self, interceptor: I) {
        let mut composition = self.composition.lock();
        composition.interceptors.push(Arc::new(interceptor));
        composition.generation += 1;
    }

    /// Number of interceptors.
    pub fn interceptor_count(&self) -> usize {
        self.composition.lock().interceptors.len()
    }

    /// Current composition generation (bumped by every structural
    /// mutation).
    pub fn generation(&self) -> u64 {
        self.composition.lock().generation
    }

    /// Executes a command with a zero byte weight.
    pub async fn execute(&self, command: C) -> Result<C::Output, PipelineError> {
        self.execute_inner(command, None, 0).await
    }

    /// Executes a command whose queued weight is `size` bytes (consulted by
    /// byte-bounded back-pressure queues).
    pub async fn execute_sized(&self, command: C, size: usize) -> Result<C::Output, PipelineError> {
        self.execute_inner(command, None, size).await
    }

    /// Executes a command with a caller-supplied context (the context pool
    /// is bypassed).
    pub async fn execute_with_context(&self, command: C, context: CommandContext) -> Result<C::Output, PipelineError> {
        self.execute_inner(command, Some(context), 0).await
    }

    #[tracing::instrument(skip_all, fields(command = C::name()))]
    async fn execute_inner(
        &self,
        command: C,
        context: Option<CommandContext>,
        size: usize,
    ) -> Result<C::Output, PipelineError> {
        // Admission control happens before any middleware; rejections fail
        // fast with a typed error.
        let _token = match &self.back_pressure {
            Some(semaphore) => Some(semaphore.acquire_weighted(size).await?),
            None => None,
        };

        let interceptors = self.composition.lock().interceptors.clone();
        let mut command = command;
        for interceptor in &interceptors {
            command = interceptor.intercept(command);
        }

        let metadata = match &context {
            Some(existing) => existing.metadata(),
            None => CommandMetadata::new(),
        };

        // The pooled guard returns the context at scope exit on every path,
        // including cancellation.
        let mut _pooled_guard = None;
        let context = match context {
            Some(existing) => existing,
            None => match &self.context_pool {
                Some(pool) => {
                    let pooled = pool.acquire_pooled().await?;
                    pooled.reset_for_reuse(metadata.clone());
                    let handle = (*pooled).clone();
                    _pooled_guard = Some(pooled);
                    handle
                }
                None => CommandContext::new(metadata.clone()),
            },
        };
        context.set::<StartTimeKey>(Utc::now());
        if self.recorder.is_some() {
            context.set::<MiddlewareTraceKey>(Vec::new());
        }

        let chain = self.chain_snapshot();
        let started_at = Utc::now();
        let result = (chain)(command, context.clone()).await;

        if let Some(recorder) = &self.recorder {
            let completed_at = Utc::now();
            let trace = context.get::<MiddlewareTraceKey>().unwrap_or_default();
            let correlation = metadata.correlation_id().map(str::to_owned);
            let record = match &result {
                Ok(_) => ExecutionRecord::success(C::name(), metadata.id(), correlation, started_at, completed_at, trace),
                Err(error) => {
                    ExecutionRecord::failure(C::name(), metadata.id(), correlation, started_at, completed_at, trace, error)
                }
            };
            recorder.record(record);
        }

        result
    }

    /// Clones the cached chain, rebuilding it first when the generation
    /// moved since the last build.
    fn chain_snapshot(&self) -> Arc<ChainFn<C>> {
        let mut composition = self.composition.lock();
        if let Some((generation, chain)) = &composition.cached {
            if *generation == composition.generation {
                return chain.clone();
            }
        }
        debug!(
            command = C::name(),
            generation = composition.generation,
            middleware = composition.entries.len(),
            "rebuilding middleware chain"
        );
        let chain = Self::build_chain(self.handler.clone(), &composition.entries);
        composition.cached = Some((composition.generation, chain.clone()));
        chain
    }

    /// Folds the sorted middleware list from last to first over the
    /// terminal handler call. Inactive conditional/scoped middleware route
    /// straight to the next link.
    fn build_chain(handler: Arc<dyn CommandHandler<C>>, entries: &[MiddlewareEntry<C>]) -> Arc<ChainFn<C>> {
        let mut chain: Arc<ChainFn<C>> = Arc::new(move |command, _context| {
            let handler = handler.clone();
            Box::pin(async move { handler.handle(command).await })
        });
        for entry in entries.iter().rev() {
            let middleware = entry.middleware.clone();
            let inner = chain;
            chain = Arc::new(move |command: C, context: CommandContext| {
                let middleware = middleware.clone();
                let next = Next::new(inner.clone());
                Box::pin(async move {
                    if middleware.should_activate(&command, &context) {
                        if let Some(mut trace) = context.get::<MiddlewareTraceKey>() {
                            trace.push(middleware.name().to_string());
                            context.set::<MiddlewareTraceKey>(trace);
                        }
                        middleware.handle(command, context, next).await
                    } else {
                        next.run(command, context).await
                    }
                })
            });
        }
        chain
    }

    /// Structural description: command/handler types, interceptor count,
    /// middleware in execution order.
    pub fn describe(&self) -> PipelineDescription {
        let composition = self.composition.lock();
        PipelineDescription {
            command_type: C::name().to_string(),
            handler_type: self.handler.name().to_string(),
            interceptor_count: composition.interceptors.len(),
            middlewares: composition
                .entries
                .iter()
                .map(|entry| MiddlewareDescriptor {
                    name: entry.middleware.name().to_string(),
                    priority: entry.priority,
                    activation: entry.middleware.activation(),
                })
                .collect(),
        }
    }

    /// Activation plan for a concrete command, without executing anything.
    pub fn trace_command(&self, command: &C) -> ExecutionTrace {
        let composition = self.composition.lock();
        let probe = CommandContext::new(CommandMetadata::new());
        let mut active = Vec::new();
        let mut conditional = Vec::new();
        let mut skipped = Vec::new();
        for entry in &composition.entries {
            let name = entry.middleware.name().to_string();
            match entry.middleware.activation() {
                ActivationKind::Always => active.push(name),
                // The predicate may depend on execution-time context, so it
                // is reported, not evaluated.
                ActivationKind::Conditional => conditional.push(name),
                ActivationKind::Scoped => {
                    if entry.middleware.should_activate(command, &probe) {
                        active.push(name);
                    } else {
                        skipped.push(name);
                    }
                }
            }
        }
        ExecutionTrace {
            active,
            conditional,
            skipped,
            handler: self.handler.name().to_string(),
            interceptor_count: composition.interceptors.len(),
        }
    }

    /// The admission-control semaphore, when configured.
    pub fn back_pressure(&self) -> Option<&BackPressureSemaphore> {
        self.back_pressure.as_ref()
    }

    /// Context pool statistics, when pooling is enabled.
    pub fn context_pool_statistics(&self) -> Option<PoolStatistics> {
        self.context_pool.as_ref().map(ObjectPool::statistics)
    }

    /// The construction options.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }
}

impl<C: Command> std::fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("command", &C::name())
            .field("middleware_count", &self.middleware_count())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}
