// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Capability Tags
//!
//! This module provides the capability tag system that drives scoped
//! middleware activation. A command type declares zero or more capability
//! tags; a scoped middleware activates exactly when the command carries its
//! tag.
//!
//! ## Overview
//!
//! - **Tags are marker types**: zero-sized structs implementing
//!   [`Capability`]; they exist only as type identities
//! - **Sets are value objects**: [`CapabilitySet`] is an immutable small set
//!   of `TypeId`s with human-readable names, built fluently at command
//!   declaration time
//! - **Matching is by type identity**: membership checks compare `TypeId`s,
//!   never strings, so tags from different modules can share display names
//!   without colliding
//!
//! ## Built-in Tags
//!
//! The framework ships the three tags its canonical middleware bands key
//! off: [`RequiresEncryption`], [`RequiresValidation`], and [`Auditable`].
//! Applications define further tags by implementing [`Capability`] on their
//! own marker types.
//!
//! ## Usage
//!
//! ```
//! use command_pipeline_domain::value_objects::{Capability, CapabilitySet, RequiresEncryption};
//!
//! let caps = CapabilitySet::new().with::<RequiresEncryption>();
//! assert!(caps.contains::<RequiresEncryption>());
//! assert_eq!(caps.names(), vec!["requires_encryption"]);
//! ```

use std::any::TypeId;

/// Marker trait for capability tags.
///
/// Implement on a zero-sized struct to declare a new capability. The name is
/// used only for introspection output; identity is the `TypeId`.
pub trait Capability: Send + Sync + 'static {
    /// Human-readable tag name for introspection and traces
    fn name() -> &'static str;
}

/// The command's payload must be encrypted before leaving the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiresEncryption;

impl Capability for RequiresEncryption {
    fn name() -> &'static str {
        "requires_encryption"
    }
}

/// The command's payload must pass validation middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiresValidation;

impl Capability for RequiresValidation {
    fn name() -> &'static str {
        "requires_validation"
    }
}

/// Executions of the command must be audit-logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Auditable;

impl Capability for Auditable {
    fn name() -> &'static str {
        "auditable"
    }
}

/// Immutable set of capability tags carried by a command type.
///
/// Declared once per command type (via `Command::capabilities()`) and
/// consulted by scoped middleware and the introspection trace. The set is
/// tiny in practice (0–3 tags), so a linear scan over a `Vec` beats a hash
/// set on both memory and lookup cost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    entries: Vec<(TypeId, &'static str)>,
}

impl CapabilitySet {
    /// Creates an empty capability set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tag, returning the extended set. Adding a tag twice is a no-op.
    pub fn with<T: Capability>(mut self) -> Self {
        let id = TypeId::of::<T>();
        if !self.entries.iter().any(|(existing, _)| *existing == id) {
            self.entries.push((id, T::name()));
        }
        self
    }

    /// Checks whether the set carries the given tag.
    pub fn contains<T: Capability>(&self) -> bool {
        let id = TypeId::of::<T>();
        self.entries.iter().any(|(existing, _)| *existing == id)
    }

    /// Checks membership by raw type identity (for type-erased dispatch).
    pub fn contains_id(&self, id: TypeId) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == id)
    }

    /// Gets the tag names, in declaration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(_, name)| *name).collect()
    }

    /// Number of tags in the set.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
