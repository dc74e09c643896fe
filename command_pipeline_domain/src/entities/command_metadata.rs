// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Metadata
//!
//! Immutable identity and provenance for one command submission: a unique
//! request id, the submitting user (when known), a correlation id for
//! cross-service tracing, and the submission timestamp.
//!
//! Metadata is created once per submission and never mutated afterwards;
//! the command context exposes it read-only for the lifetime of the
//! execution. Pooled contexts receive fresh metadata on reuse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable per-submission identity.
///
/// ## Usage Examples
///
/// ```
/// use command_pipeline_domain::entities::CommandMetadata;
///
/// let metadata = CommandMetadata::new()
///     .with_user_id("alice")
///     .with_correlation_id("req-9f3c");
///
/// assert_eq!(metadata.user_id(), Some("alice"));
/// assert_eq!(metadata.correlation_id(), Some("req-9f3c"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMetadata {
    // Identity fields (always first)
    id: Uuid,

    // Core business fields
    user_id: Option<String>,
    correlation_id: Option<String>,

    // Metadata fields (always last)
    timestamp: DateTime<Utc>,
}

impl CommandMetadata {
    /// Creates metadata with a fresh random id and the current timestamp.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: None,
            correlation_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Sets the submitting user.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the correlation id used to stitch executions across services.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Gets the unique submission id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Gets the submitting user, if known.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Gets the correlation id, if set.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Gets the submission timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Default for CommandMetadata {
    fn default() -> Self {
        Self::new()
    }
}
