// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Generic ID Value Object
//!
//! This module provides a generic, type-safe ID value object system for the
//! command pipeline framework. It uses ULID (Universally Unique
//! Lexicographically Sortable Identifier) with phantom types to create
//! type-safe, category-specific identifiers.
//!
//! ## Overview
//!
//! The generic ID system provides:
//!
//! - **Type Safety**: Compile-time enforcement of ID categories: an
//!   `ExecutionId` can never be passed where a `PoolId` is expected
//! - **ULID-Based**: Sortable, unique, compact 26-character identifiers
//! - **Zero-Cost Abstractions**: Phantom types with no runtime overhead
//! - **Serialization**: Plain ULID string representation for persistence and
//!   transmission
//!
//! ## ULID Properties
//!
//! ```text
//! 01AN4Z07BY      79KA1307SR9X4MV3
//! |----------|    |----------------|
//!  Timestamp          Randomness
//!    48bits             80bits
//! ```
//!
//! - **Sortable**: Lexicographically sortable by timestamp
//! - **Unique**: 80 bits of randomness ensure uniqueness
//! - **URL-Safe**: Safe for use in URLs without encoding
//!
//! ## ID Categories
//!
//! - **ExecutionIdCategory**: Identifies one dispatch through a pipeline;
//!   the timestamp component gives execution records a natural sort order.
//! - **PoolIdCategory**: Identifies an object pool in the process-wide
//!   registry.
//!
//! Custom categories are created by implementing the [`IdCategory`] trait.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use ulid::Ulid;

/// Trait for ID category validation and behavior.
///
/// Each ID category implements this trait to provide category-specific
/// naming and validation. The default validation rejects nil ULIDs.
pub trait IdCategory {
    /// Gets the category name for this ID type
    fn category_name() -> &'static str;

    /// Validates category-specific constraints
    fn validate_id(ulid: &Ulid) -> Result<(), PipelineError> {
        if *ulid == Ulid::nil() {
            return Err(PipelineError::InvalidConfiguration(format!(
                "{} ID cannot be nil",
                Self::category_name()
            )));
        }
        Ok(())
    }
}

/// Generic identifier value object for framework entities.
///
/// Provides the foundational ID implementation that the specific ID types
/// (`ExecutionId`, `PoolId`) build upon. The phantom type parameter prevents
/// mixing ID categories at compile time while adding no runtime cost.
#[derive(Debug, Clone)]
pub struct GenericId<T: IdCategory> {
    value: Ulid,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: IdCategory> PartialEq for GenericId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: IdCategory> Eq for GenericId<T> {}

impl<T: IdCategory> PartialOrd for GenericId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdCategory> Ord for GenericId<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

// Custom serialization to use simple string format instead of JSON object
impl<T: IdCategory> Serialize for GenericId<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.value.to_string().serialize(serializer)
    }
}

impl<'de, T: IdCategory> Deserialize<'de> for GenericId<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ulid = Ulid::from_string(&s).map_err(|e| serde::de::Error::custom(e.to_string()))?;
        Ok(Self {
            value: ulid,
            _phantom: std::marker::PhantomData,
        })
    }
}

impl<T: IdCategory> GenericId<T> {
    /// Creates a new time-ordered entity ID.
    ///
    /// ULIDs are naturally sorted by creation time, which keeps execution
    /// records and registry entries in chronological order without a
    /// separate sequence counter.
    pub fn new() -> Self {
        Self {
            value: Ulid::new(),
            _phantom: std::marker::PhantomData,
        }
    }

    /// Creates an entity ID from an existing ULID with validation.
    pub fn from_ulid(ulid: Ulid) -> Result<Self, PipelineError> {
        T::validate_id(&ulid)?;
        Ok(Self {
            value: ulid,
            _phantom: std::marker::PhantomData,
        })
    }

    /// Creates an entity ID from a timestamp (useful for range queries and
    /// tests that need deterministic ordering).
    pub fn from_timestamp_ms(timestamp_ms: u64) -> Result<Self, PipelineError> {
        let random = rand::random::<u128>() & ((1u128 << 80) - 1); // Mask to 80 bits
        let ulid = Ulid::from_parts(timestamp_ms, random);
        T::validate_id(&ulid)?;
        Ok(Self {
            value: ulid,
            _phantom: std::marker::PhantomData,
        })
    }

    /// Creates an entity ID from a string representation.
    ///
    /// Accepts standard ULID string format (26 characters, base32 encoded),
    /// e.g. `"01ARZ3NDEKTSV4RRFFQ69G5FAV"`.
    pub fn from_string(s: &str) -> Result<Self, PipelineError> {
        let ulid = Ulid::from_str(s)
            .map_err(|e| PipelineError::InvalidConfiguration(format!("Invalid entity ID format: {}", e)))?;
        Self::from_ulid(ulid)
    }

    /// Gets the underlying ULID value.
    pub fn as_ulid(&self) -> Ulid {
        self.value
    }

    /// Gets the timestamp component as milliseconds since the Unix epoch.
    pub fn timestamp_ms(&self) -> u64 {
        self.value.timestamp_ms()
    }

    /// Gets the creation time as a DateTime.
    pub fn datetime(&self) -> chrono::DateTime<chrono::Utc> {
        let timestamp_ms = self.timestamp_ms();
        chrono::DateTime::from_timestamp_millis(timestamp_ms as i64).unwrap_or_else(chrono::Utc::now)
    }

    /// Gets the ID category name.
    pub fn category(&self) -> &'static str {
        T::category_name()
    }

    /// Checks if this is a nil (zero) ULID.
    pub fn is_nil(&self) -> bool {
        self.value == Ulid::nil()
    }
}

impl<T: IdCategory> Default for GenericId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IdCategory> Display for GenericId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T: IdCategory> Hash for GenericId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: IdCategory> FromStr for GenericId<T> {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl<T: IdCategory> From<GenericId<T>> for Ulid {
    fn from(id: GenericId<T>) -> Self {
        id.value
    }
}

impl<T: IdCategory> AsRef<Ulid> for GenericId<T> {
    fn as_ref(&self) -> &Ulid {
        &self.value
    }
}

/// Category marker for pipeline execution identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionIdCategory;

impl IdCategory for ExecutionIdCategory {
    fn category_name() -> &'static str {
        "execution"
    }
}

/// Category marker for object pool identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolIdCategory;

impl IdCategory for PoolIdCategory {
    fn category_name() -> &'static str {
        "pool"
    }
}

/// Identifies one dispatch through a pipeline.
pub type ExecutionId = GenericId<ExecutionIdCategory>;

/// Identifies an object pool in the process-wide registry.
pub type PoolId = GenericId<PoolIdCategory>;
