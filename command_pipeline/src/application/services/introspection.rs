// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Introspection
//!
//! Structural description of a pipeline, activation tracing for a concrete
//! command, and structural comparison between two descriptions.
//!
//! Descriptions are immutable value snapshots: two consecutive `describe()`
//! calls on an unmodified pipeline return equal values, and a description
//! never changes after it is produced.

use command_pipeline_domain::value_objects::MiddlewarePriority;
use command_pipeline_domain::ActivationKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One middleware as seen by introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiddlewareDescriptor {
    pub name: String,
    pub priority: MiddlewarePriority,
    pub activation: ActivationKind,
}

/// Structural snapshot of a pipeline: command/handler types, interceptor
/// count, and the middleware list in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDescription {
    pub command_type: String,
    pub handler_type: String,
    pub interceptor_count: usize,
    pub middlewares: Vec<MiddlewareDescriptor>,
}

impl PipelineDescription {
    /// Number of middleware in the pipeline.
    pub fn middleware_count(&self) -> usize {
        self.middlewares.len()
    }
}

/// Activation plan for one concrete command, computed without executing.
///
/// Unconditional middleware are always `active`; conditional middleware are
/// listed as `conditional` without running their predicate (the predicate
/// may depend on execution-time context); scoped middleware land in
/// `active` or `skipped` by the command type's tag set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub active: Vec<String>,
    pub conditional: Vec<String>,
    pub skipped: Vec<String>,
    pub handler: String,
    pub interceptor_count: usize,
}

/// Structural difference between two pipeline descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionDiff {
    /// `after` middleware count minus `before` middleware count
    pub middleware_count_delta: i64,
    /// Middleware names present only in `after`
    pub added: Vec<String>,
    /// Middleware names present only in `before`
    pub removed: Vec<String>,
    /// Whether the shared middleware run in a different relative order
    pub reordered: bool,
}

impl DescriptionDiff {
    /// Whether the two descriptions are structurally identical.
    pub fn is_unchanged(&self) -> bool {
        self.middleware_count_delta == 0 && self.added.is_empty() && self.removed.is_empty() && !self.reordered
    }
}

/// Structurally compares two descriptions: count delta, set difference of
/// middleware names, and relative ordering of the shared names.
pub fn compare_descriptions(before: &PipelineDescription, after: &PipelineDescription) -> DescriptionDiff {
    let before_names: Vec<&str> = before.middlewares.iter().map(|m| m.name.as_str()).collect();
    let after_names: Vec<&str> = after.middlewares.iter().map(|m| m.name.as_str()).collect();
    let before_set: HashSet<&str> = before_names.iter().copied().collect();
    let after_set: HashSet<&str> = after_names.iter().copied().collect();

    let added = after_names
        .iter()
        .filter(|name| !before_set.contains(*name))
        .map(|name| name.to_string())
        .collect();
    let removed = before_names
        .iter()
        .filter(|name| !after_set.contains(*name))
        .map(|name| name.to_string())
        .collect();

    let shared_before: Vec<&str> = before_names.iter().copied().filter(|n| after_set.contains(n)).collect();
    let shared_after: Vec<&str> = after_names.iter().copied().filter(|n| before_set.contains(n)).collect();

    DescriptionDiff {
        middleware_count_delta: after.middlewares.len() as i64 - before.middlewares.len() as i64,
        added,
        removed,
        reordered: shared_before != shared_after,
    }
}
