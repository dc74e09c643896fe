// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error Module
//!
//! This module provides the error types for the domain layer, implementing a
//! structured error handling approach that categorizes all possible failure
//! scenarios in the command pipeline framework.
//!
//! ## Overview
//!
//! The error module defines domain-specific errors that:
//!
//! - **Express Dispatch Failures**: Type mismatches, registry misses, depth
//!   violations
//! - **Surface Back-Pressure**: Typed rejections from the admission-control
//!   layer
//! - **Carry Domain Bubbles**: Handler and middleware failures, clearly
//!   distinguished from framework infrastructure errors
//! - **Support Error Recovery**: Categorization enables appropriate recovery
//!   strategies
//!
//! ## Best Practices
//!
//! - **Be Specific**: Use specific error variants for different failure
//!   scenarios
//! - **Include Context**: Always include relevant context in error messages
//! - **Document Errors**: Document which errors can be returned from functions
//! - **Test Error Paths**: Ensure error handling paths are tested

mod pipeline_error;

pub use pipeline_error::PipelineError;
