// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Execution Record Entity
//!
//! An immutable record of one dispatch through a pipeline: what command ran,
//! when, whether it succeeded, which middleware layers were entered, and the
//! correlation identity needed to stitch it to neighboring systems.
//!
//! Records are produced by the dispatch engine at the end of every execution
//! and consumed by the bounded execution recorder, which indexes them by
//! command type, failure state, correlation id, and time range.

use crate::error::PipelineError;
use crate::value_objects::ExecutionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Immutable record of one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    // Identity fields (always first)
    id: ExecutionId,

    // Core business fields
    command_type: String,
    command_id: Uuid,
    correlation_id: Option<String>,
    success: bool,
    error_kind: Option<String>,
    error_message: Option<String>,
    middleware_trace: Vec<String>,
    metadata: HashMap<String, String>,

    // Metadata fields (always last)
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
}

impl ExecutionRecord {
    /// Creates a record for a successful execution.
    pub fn success(
        command_type: impl Into<String>,
        command_id: Uuid,
        correlation_id: Option<String>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        middleware_trace: Vec<String>,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            command_type: command_type.into(),
            command_id,
            correlation_id,
            success: true,
            error_kind: None,
            error_message: None,
            middleware_trace,
            metadata: HashMap::new(),
            started_at,
            completed_at,
        }
    }

    /// Creates a record for a failed execution, capturing the error kind and
    /// message from the pipeline error.
    pub fn failure(
        command_type: impl Into<String>,
        command_id: Uuid,
        correlation_id: Option<String>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        middleware_trace: Vec<String>,
        error: &PipelineError,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            command_type: command_type.into(),
            command_id,
            correlation_id,
            success: false,
            error_kind: Some(error.kind().to_string()),
            error_message: Some(error.to_string()),
            middleware_trace,
            metadata: HashMap::new(),
            started_at,
            completed_at,
        }
    }

    /// Attaches a metadata annotation.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Gets the unique record id (time-ordered).
    pub fn id(&self) -> &ExecutionId {
        &self.id
    }

    /// Gets the command type name.
    pub fn command_type(&self) -> &str {
        &self.command_type
    }

    /// Gets the submission id of the command.
    pub fn command_id(&self) -> Uuid {
        self.command_id
    }

    /// Gets the correlation id, if the submission carried one.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Whether the execution completed without error.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Gets the stable error kind identifier, for failed executions.
    pub fn error_kind(&self) -> Option<&str> {
        self.error_kind.as_deref()
    }

    /// Gets the human-readable error message, for failed executions.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Gets the names of the middleware layers entered, in execution order.
    pub fn middleware_trace(&self) -> &[String] {
        &self.middleware_trace
    }

    /// Gets the metadata annotations.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// When the execution started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the execution completed.
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Wall-clock duration of the execution. Zero if the clock went
    /// backwards between the two stamps.
    pub fn duration(&self) -> Duration {
        (self.completed_at - self.started_at).to_std().unwrap_or(Duration::ZERO)
    }
}
