// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Middleware Priority Value Object
//!
//! This module provides the ordering value object for middleware execution.
//! A lower numeric value means earlier execution; middleware with equal
//! priorities run in insertion order (stable sort).
//!
//! ## Canonical Bands
//!
//! The framework defines canonical priority bands that cross-cutting
//! behaviors slot into:
//!
//! | Band | Value | Typical use |
//! |---|---|---|
//! | `AUTHENTICATION` | 100 | Identity establishment |
//! | `AUTHORIZATION` | 200 | Permission checks |
//! | `VALIDATION` | 300 | Input validation |
//! | `PRE_PROCESSING` | 500 | Request shaping, enrichment |
//! | `POST_PROCESSING` | 800 | Response shaping, audit |
//! | `CUSTOM` | 1000 | Everything else (default) |
//!
//! Arbitrary values between bands are permitted; the bands are a convention,
//! not an enum.
//!
//! ## Value Object Characteristics
//!
//! - **Immutability**: A priority never changes after construction
//! - **Total Order**: Priorities sort numerically, ascending
//! - **Self-Describing**: [`MiddlewarePriority::band`] names the band a value
//!   falls into, for introspection output

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Execution priority of a middleware within a pipeline.
///
/// Lower values execute earlier (outermost in the onion model): a middleware
/// with priority 100 is entered before, and exited after, one with
/// priority 300.
///
/// # Examples
///
/// ```
/// use command_pipeline_domain::value_objects::MiddlewarePriority;
///
/// let auth = MiddlewarePriority::AUTHENTICATION;
/// let custom = MiddlewarePriority::CUSTOM;
/// assert!(auth < custom);
/// assert_eq!(MiddlewarePriority::new(250).band(), "authorization");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MiddlewarePriority(u32);

impl MiddlewarePriority {
    /// Identity establishment runs first.
    pub const AUTHENTICATION: Self = Self(100);
    /// Permission checks run after identity is known.
    pub const AUTHORIZATION: Self = Self(200);
    /// Input validation runs on authorized requests only.
    pub const VALIDATION: Self = Self(300);
    /// Request shaping and enrichment.
    pub const PRE_PROCESSING: Self = Self(500);
    /// Response shaping and audit.
    pub const POST_PROCESSING: Self = Self(800);
    /// Default band for application middleware.
    pub const CUSTOM: Self = Self(1000);

    /// Creates a priority with an arbitrary numeric value.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Gets the numeric value.
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Names the canonical band this value falls into.
    ///
    /// Values between bands report the band they would execute within, i.e.
    /// the nearest band at or above them.
    pub fn band(&self) -> &'static str {
        match self.0 {
            0..=100 => "authentication",
            101..=200 => "authorization",
            201..=300 => "validation",
            301..=500 => "pre_processing",
            501..=800 => "post_processing",
            _ => "custom",
        }
    }
}

impl Default for MiddlewarePriority {
    fn default() -> Self {
        Self::CUSTOM
    }
}

impl Display for MiddlewarePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for MiddlewarePriority {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<MiddlewarePriority> for u32 {
    fn from(priority: MiddlewarePriority) -> Self {
        priority.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_band_ordering() {
        assert!(MiddlewarePriority::AUTHENTICATION < MiddlewarePriority::AUTHORIZATION);
        assert!(MiddlewarePriority::AUTHORIZATION < MiddlewarePriority::VALIDATION);
        assert!(MiddlewarePriority::VALIDATION < MiddlewarePriority::PRE_PROCESSING);
        assert!(MiddlewarePriority::PRE_PROCESSING < MiddlewarePriority::POST_PROCESSING);
        assert!(MiddlewarePriority::POST_PROCESSING < MiddlewarePriority::CUSTOM);
    }

    #[test]
    fn test_band_names() {
        assert_eq!(MiddlewarePriority::AUTHENTICATION.band(), "authentication");
        assert_eq!(MiddlewarePriority::new(150).band(), "authorization");
        assert_eq!(MiddlewarePriority::new(300).band(), "validation");
        assert_eq!(MiddlewarePriority::new(9999).band(), "custom");
    }

    #[test]
    fn test_default_is_custom() {
        assert_eq!(MiddlewarePriority::default(), MiddlewarePriority::CUSTOM);
    }

    #[test]
    fn test_display_and_conversions() {
        let p = MiddlewarePriority::new(42);
        assert_eq!(p.to_string(), "42");
        assert_eq!(u32::from(p), 42);
        assert_eq!(MiddlewarePriority::from(42u32), p);
    }

    #[test]
    fn test_serde_round_trip() {
        let p = MiddlewarePriority::VALIDATION;
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "300");
        let back: MiddlewarePriority = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
