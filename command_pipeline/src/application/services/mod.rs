// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Services
//!
//! The dispatch engines and their introspection surface:
//!
//! - [`pipeline`]: typed pipeline (one command type, one handler)
//! - [`command_bus`]: dynamic pipeline multiplexed by command type
//! - [`introspection`]: structural descriptions, activation traces, diffs

pub mod command_bus;
pub mod introspection;
pub mod pipeline;

pub use command_bus::{
    AnyCommand, BusInterceptor, CommandBus, DynChainFn, DynChainFuture, DynMiddleware, DynNext, DynOutput,
    TypedInterceptor,
};
pub use introspection::{
    compare_descriptions, DescriptionDiff, ExecutionTrace, MiddlewareDescriptor, PipelineDescription,
};
pub use pipeline::{Pipeline, PipelineOptions};
