// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the hierarchical error system for the command
//! pipeline domain. It categorizes failures, provides actionable error
//! messages, and supports both automated error recovery and human-readable
//! diagnostics.
//!
//! ## Overview
//!
//! The error system is designed around Domain-Driven Design principles:
//!
//! - **Domain-Specific**: Errors are tailored to command dispatch concepts
//! - **Hierarchical**: Errors are organized into logical categories for
//!   systematic handling
//! - **Actionable**: Each error provides sufficient context for debugging and
//!   recovery
//! - **Type-Safe**: Rust's type system ensures comprehensive error handling
//!
//! ## Error Architecture
//!
//! ### Dispatch Errors
//! - **InvalidCommandType** / **InvalidResultType**: Type mismatch at the
//!   dynamic dispatch boundary
//! - **MaxDepthExceeded**: Middleware depth violation on a pipeline
//! - **NoHandler** / **AlreadyRegistered**: Dynamic registry failures
//!
//! ### Back-Pressure Errors
//! - **BackPressureFull**: Bounded queue rejected a new submission
//!   (drop-newest strategy)
//! - **QueueFull**: Deterministic rejection under the error strategy
//! - **BackPressureDropped**: A queued waiter was evicted under the
//!   drop-oldest strategy
//!
//! ### Cancellation & Timeouts
//! - **Cancelled**: Cooperative cancellation observed at an await point
//! - **Timeout**: Emitted by timeout middleware when the inner future is
//!   cancelled
//!
//! ### Domain Bubbles
//! - **HandlerError**: Domain failure bubbled from a command handler
//! - **MiddlewareError**: Domain failure bubbled from a middleware body
//!
//! ### Resource & System Errors
//! - **PoolExhausted**: A pool declined to create more objects
//! - **InvalidConfiguration**: Invariant violation at construction
//! - **InternalError**: Unexpected system failures
//!
//! ## Error Recovery Strategies
//!
//! Some errors indicate temporary conditions that can be retried:
//! back-pressure rejections and timeouts are transient by nature, while
//! configuration and registration errors are permanent and require caller
//! intervention. Use [`PipelineError::is_transient`] to branch.
//!
//! Handlers see pure domain failures; framework infrastructure errors are
//! distinct variants and are always distinguishable by type.

use thiserror::Error;

/// Domain-specific errors for the command pipeline framework.
///
/// This enum represents all possible errors that can occur within the
/// framework. Each variant includes a descriptive message and is designed to
/// provide clear information about what went wrong and potentially how to fix
/// it.
///
/// ## Design Principles
///
/// - **Specific**: Each error type represents a specific failure mode
/// - **Actionable**: Error messages provide enough context for debugging
/// - **Categorized**: Errors are grouped by type for systematic handling
/// - **Distinguishable**: Infrastructure failures never masquerade as domain
///   failures
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid command type: {0}")]
    InvalidCommandType(String),

    #[error("Invalid result type: {0}")]
    InvalidResultType(String),

    #[error("Middleware depth exceeded: {0}")]
    MaxDepthExceeded(String),

    #[error("No handler registered: {0}")]
    NoHandler(String),

    #[error("Handler already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Back-pressure full: {0}")]
    BackPressureFull(String),

    #[error("Queue full: {0}")]
    QueueFull(String),

    #[error("Back-pressure dropped: {0}")]
    BackPressureDropped(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Handler error: {0}")]
    HandlerError(String),

    #[error("Middleware error: {0}")]
    MiddlewareError(String),

    #[error("Pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl PipelineError {
    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new invalid-command-type error
    pub fn invalid_command_type(msg: impl Into<String>) -> Self {
        Self::InvalidCommandType(msg.into())
    }

    /// Creates a new invalid-result-type error
    pub fn invalid_result_type(msg: impl Into<String>) -> Self {
        Self::InvalidResultType(msg.into())
    }

    /// Creates a new max-depth-exceeded error
    pub fn max_depth_exceeded(msg: impl Into<String>) -> Self {
        Self::MaxDepthExceeded(msg.into())
    }

    /// Creates a new no-handler error
    pub fn no_handler(msg: impl Into<String>) -> Self {
        Self::NoHandler(msg.into())
    }

    /// Creates a new already-registered error
    pub fn already_registered(msg: impl Into<String>) -> Self {
        Self::AlreadyRegistered(msg.into())
    }

    /// Creates a new back-pressure-full rejection
    pub fn back_pressure_full(msg: impl Into<String>) -> Self {
        Self::BackPressureFull(msg.into())
    }

    /// Creates a new queue-full rejection
    pub fn queue_full(msg: impl Into<String>) -> Self {
        Self::QueueFull(msg.into())
    }

    /// Creates a new back-pressure-dropped failure
    pub fn back_pressure_dropped(msg: impl Into<String>) -> Self {
        Self::BackPressureDropped(msg.into())
    }

    /// Creates a new cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Creates a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates a new handler domain error
    pub fn handler_error(msg: impl Into<String>) -> Self {
        Self::HandlerError(msg.into())
    }

    /// Creates a new middleware domain error
    pub fn middleware_error(msg: impl Into<String>) -> Self {
        Self::MiddlewareError(msg.into())
    }

    /// Creates a new pool-exhausted error
    pub fn pool_exhausted(msg: impl Into<String>) -> Self {
        Self::PoolExhausted(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Checks if the error is a back-pressure rejection
    pub fn is_back_pressure(&self) -> bool {
        matches!(
            self,
            PipelineError::BackPressureFull(_) | PipelineError::QueueFull(_) | PipelineError::BackPressureDropped(_)
        )
    }

    /// Checks if the error is a cooperative cancellation
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PipelineError::Cancelled(_))
    }

    /// Checks if the error indicates a retryable condition
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::BackPressureFull(_)
                | PipelineError::QueueFull(_)
                | PipelineError::BackPressureDropped(_)
                | PipelineError::Timeout(_)
                | PipelineError::PoolExhausted(_)
        )
    }

    /// Checks if the error is a domain failure bubbled from user code
    /// (as opposed to a framework infrastructure failure)
    pub fn is_domain_error(&self) -> bool {
        matches!(self, PipelineError::HandlerError(_) | PipelineError::MiddlewareError(_))
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::InvalidConfiguration(_) => "configuration",
            PipelineError::InvalidCommandType(_) => "dispatch",
            PipelineError::InvalidResultType(_) => "dispatch",
            PipelineError::MaxDepthExceeded(_) => "dispatch",
            PipelineError::NoHandler(_) => "registry",
            PipelineError::AlreadyRegistered(_) => "registry",
            PipelineError::BackPressureFull(_) => "back_pressure",
            PipelineError::QueueFull(_) => "back_pressure",
            PipelineError::BackPressureDropped(_) => "back_pressure",
            PipelineError::Cancelled(_) => "cancellation",
            PipelineError::Timeout(_) => "timeout",
            PipelineError::HandlerError(_) => "domain",
            PipelineError::MiddlewareError(_) => "domain",
            PipelineError::PoolExhausted(_) => "resource",
            PipelineError::InternalError(_) => "internal",
        }
    }

    /// Gets the error kind name (stable identifier for records and metrics)
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidConfiguration(_) => "invalid_configuration",
            PipelineError::InvalidCommandType(_) => "invalid_command_type",
            PipelineError::InvalidResultType(_) => "invalid_result_type",
            PipelineError::MaxDepthExceeded(_) => "max_depth_exceeded",
            PipelineError::NoHandler(_) => "no_handler",
            PipelineError::AlreadyRegistered(_) => "already_registered",
            PipelineError::BackPressureFull(_) => "back_pressure_full",
            PipelineError::QueueFull(_) => "queue_full",
            PipelineError::BackPressureDropped(_) => "back_pressure_dropped",
            PipelineError::Cancelled(_) => "cancelled",
            PipelineError::Timeout(_) => "timeout",
            PipelineError::HandlerError(_) => "handler_error",
            PipelineError::MiddlewareError(_) => "middleware_error",
            PipelineError::PoolExhausted(_) => "pool_exhausted",
            PipelineError::InternalError(_) => "internal_error",
        }
    }
}
