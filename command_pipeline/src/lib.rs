// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib checked separately from tests - tests may use unwrap/expect)

//! # Command Pipeline
//!
//! A typed, concurrent command-processing framework built with Rust:
//! composable middleware pipelines over a shared concurrency substrate of
//! admission control, object pooling, memory-pressure handling, and
//! execution introspection.
//!
//! ## Architecture Overview
//!
//! The framework follows Clean Architecture and Domain-Driven Design
//! principles across two crates:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Application Layer                          │
//! │  (Typed Pipeline, Command Bus, Introspection, Timeout)      │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │             Domain Layer (command-pipeline-domain)          │
//! │  (Command, Handler, Middleware, Interceptor, Context)       │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Infrastructure Layer                         │
//! │  (Back-Pressure, Object Pools, Registry, Recorder)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Concepts
//!
//! ### Commands and Handlers
//! A command is a typed request value; its handler is the terminal async
//! processor producing the command's output type. The typed
//! [`Pipeline`](application::services::Pipeline) serves one command type;
//! the [`CommandBus`](application::services::CommandBus) multiplexes many
//! by runtime type identity.
//!
//! ### Middleware
//! Cross-cutting behaviors wrap handler execution in priority order
//! (authentication before authorization before validation, and so on),
//! entering in ascending order and unwinding in reverse. Conditional and
//! scoped middleware activate per command; scoped activation keys off the
//! capability tags a command type declares.
//!
//! ### The Concurrency Substrate
//! Every execution flows through the same substrate: a back-pressure
//! semaphore bounding concurrency, outstanding work, and queued bytes; a
//! context pool recycling per-invocation state; a process-wide pool
//! registry that shrinks pools under memory pressure; and a bounded
//! execution recorder answering history queries.
//!
//! ## Quick Start
//!
//! ```ignore
//! use command_pipeline::application::services::Pipeline;
//! use command_pipeline_domain::{Command, FnHandler};
//!
//! struct Greet(String);
//!
//! impl Command for Greet {
//!     type Output = String;
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), command_pipeline_domain::PipelineError> {
//!     let pipeline = Pipeline::new(FnHandler::new(|cmd: Greet| async move {
//!         Ok(format!("hello, {}", cmd.0))
//!     }))?;
//!     let reply = pipeline.execute(Greet("world".into())).await?;
//!     assert_eq!(reply, "hello, world");
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns `Result<_, PipelineError>`. Framework
//! infrastructure errors (back-pressure rejections, registry misses, type
//! mismatches, timeouts, cancellation) are distinct variants from the
//! domain failures handlers and middleware raise, so callers can branch on
//! kind without string matching.
//!
//! ## Concurrency Model
//!
//! Cooperative async tasks on a multi-threaded tokio runtime. Each
//! pipeline, pool, registry, semaphore, recorder, and context is
//! individually thread-safe; cross-component calls require no external
//! locking. Composition mutations are serialized per pipeline and bump a
//! chain generation; execution runs on an atomic snapshot and never holds
//! composition locks across awaits.

pub mod application;
pub mod infrastructure;

// Re-export the domain crate so applications depend on one crate.
pub use command_pipeline_domain as domain;

// Re-export the primary surface at the crate root
pub use application::middleware::TimeoutMiddleware;
pub use application::services::{
    compare_descriptions, AnyCommand, BusInterceptor, CommandBus, DescriptionDiff, DynMiddleware, DynNext,
    ExecutionTrace, MiddlewareDescriptor, Pipeline, PipelineDescription, PipelineOptions, TypedInterceptor,
};
pub use infrastructure::metrics::{ExecutionRecorder, RecorderConfig, RecorderStatistics};
pub use infrastructure::runtime::{
    BackPressureConfig, BackPressureSemaphore, BackPressureStatistics, BackPressureToken, ManagedPool,
    MemoryPressureDetector, MemoryPressureLevel, ObjectPool, OverflowStrategy, PoolConfig, PoolRegistry,
    PoolStatistics, PooledObject, RegistryConfig,
};
