// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Trait
//!
//! This module defines the contract every dispatchable request implements.
//! A command is a plain value carrying a request payload; its associated
//! `Output` type is what the terminal handler produces, and its capability
//! set opts it into scoped middleware.
//!
//! ## Design
//!
//! - **Typed result**: `Output` is an associated type, so the typed pipeline
//!   and the dynamic bus both return the concrete result without casts at
//!   the call site
//! - **Static capability declaration**: capabilities are a property of the
//!   command *type*, declared once in `capabilities()`; scoped middleware
//!   consult the declaration, never per-instance state
//! - **Name by type**: `name()` defaults to the Rust type name and feeds
//!   introspection, traces, and execution records
//!
//! ## Usage Examples
//!
//! ```
//! use command_pipeline_domain::services::Command;
//! use command_pipeline_domain::value_objects::{Auditable, CapabilitySet};
//!
//! struct TransferFunds {
//!     amount_cents: u64,
//! }
//!
//! impl Command for TransferFunds {
//!     type Output = u64;
//!
//!     fn name() -> &'static str {
//!         "TransferFunds"
//!     }
//!
//!     fn capabilities() -> CapabilitySet {
//!         CapabilitySet::new().with::<Auditable>()
//!     }
//! }
//! ```

use crate::value_objects::CapabilitySet;

/// A request value dispatched through a pipeline.
///
/// Commands move by value through interceptors and middleware and are
/// consumed by the terminal handler, which produces `Output`.
pub trait Command: Send + 'static {
    /// The result type the handler produces for this command
    type Output: Send + 'static;

    /// Type name used in introspection, traces, and execution records
    fn name() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }

    /// Capability tags this command type carries. Scoped middleware
    /// activate exactly when their tag is in this set.
    fn capabilities() -> CapabilitySet
    where
        Self: Sized,
    {
        CapabilitySet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::{Auditable, RequiresEncryption};

    struct Plain(#[allow(dead_code)] String);

    impl Command for Plain {
        type Output = String;
    }

    struct Secure;

    impl Command for Secure {
        type Output = ();

        fn name() -> &'static str {
            "Secure"
        }

        fn capabilities() -> CapabilitySet {
            CapabilitySet::new().with::<RequiresEncryption>()
        }
    }

    #[test]
    fn test_default_name_is_type_name() {
        assert!(Plain::name().contains("Plain"));
        assert_eq!(Secure::name(), "Secure");
    }

    #[test]
    fn test_default_capabilities_empty() {
        assert!(Plain::capabilities().is_empty());
    }

    #[test]
    fn test_declared_capabilities() {
        let caps = Secure::capabilities();
        assert!(caps.contains::<RequiresEncryption>());
        assert!(!caps.contains::<Auditable>());
    }
}
