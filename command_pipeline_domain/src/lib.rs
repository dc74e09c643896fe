// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Pipeline Domain
//!
//! The domain layer of the command pipeline framework: the core contracts
//! and state carriers that the dispatch engine is built against. It is
//! completely independent of the async runtime, logging, and every other
//! infrastructure concern.
//!
//! ## Domain-Driven Design Concepts
//!
//! ### Entities
//! Objects with a distinct identity that runs through time:
//!
//! - [`CommandMetadata`](entities::CommandMetadata): immutable identity of
//!   one command submission
//! - [`CommandContext`](entities::CommandContext): mutable, thread-safe
//!   per-invocation typed key/value state
//! - [`ExecutionRecord`](entities::ExecutionRecord): immutable record of one
//!   completed dispatch
//!
//! ### Value Objects
//! Immutable objects defined by their attributes:
//!
//! - [`MiddlewarePriority`](value_objects::MiddlewarePriority): execution
//!   ordering with canonical bands
//! - [`CapabilitySet`](value_objects::CapabilitySet): the tags a command
//!   type carries, driving scoped middleware activation
//! - [`ExecutionId`](value_objects::ExecutionId) /
//!   [`PoolId`](value_objects::PoolId): ULID-backed typed identifiers
//!
//! ### Domain Services
//! Contracts the engine folds into executable chains:
//!
//! - [`Command`](services::Command): a request value with a typed output and
//!   a capability declaration
//! - [`CommandHandler`](services::CommandHandler): the terminal async
//!   processor
//! - [`Middleware`](services::Middleware): composable async wrapper around
//!   handler execution, with conditional and scoped refinements
//! - [`CommandInterceptor`](services::CommandInterceptor): pre-middleware
//!   transformer of commands
//!
//! ## Business Rules and Invariants
//!
//! - Middleware run in ascending priority order in, reverse order out;
//!   equal priorities keep insertion order
//! - A conditional middleware whose predicate rejects has zero observable
//!   effect on the execution
//! - Context metadata is immutable after initialization; pooled reuse
//!   installs fresh metadata through a dedicated reset
//! - Handler failures and middleware failures stay distinguishable from
//!   framework infrastructure errors by error variant

pub mod entities;
pub mod error;
pub mod services;
pub mod value_objects;

// Re-export commonly used types at the crate root
pub use entities::{CommandContext, CommandMetadata, ContextKey, ContextSnapshot, ExecutionRecord};
pub use error::PipelineError;
pub use services::{
    ActivationKind, ChainFn, ChainFuture, Command, CommandHandler, CommandInterceptor, FnHandler, FnInterceptor,
    Middleware, Next, ScopedMiddleware,
};
pub use value_objects::{
    Auditable, Capability, CapabilitySet, ExecutionId, MiddlewarePriority, PoolId, RequiresEncryption,
    RequiresValidation,
};
