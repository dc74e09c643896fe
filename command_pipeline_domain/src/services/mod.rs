// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Service Traits
//!
//! This module defines the contracts the dispatch engine is built against.
//! Following Domain-Driven Design and Clean Architecture principles:
//!
//! - **Domain Layer**: defines [`Command`], [`CommandHandler`],
//!   [`Middleware`], and [`CommandInterceptor`] (this module)
//! - **Engine Layer**: folds these contracts into executable chains and
//!   implements concrete cross-cutting behaviors
//! - **Dependency Inversion**: the domain defines interfaces; applications
//!   and the engine implement them

mod command;
mod handler;
mod interceptor;
mod middleware;

pub use command::Command;
pub use handler::{CommandHandler, FnHandler};
pub use interceptor::{CommandInterceptor, FnInterceptor};
pub use middleware::{ActivationKind, ChainFn, ChainFuture, Middleware, Next, ScopedMiddleware};
