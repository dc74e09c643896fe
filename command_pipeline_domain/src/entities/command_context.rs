// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Context Entity
//!
//! The `CommandContext` entity maintains runtime state throughout one
//! pipeline execution. It is a thread-safe, typed key/value bag that travels
//! with the command through interceptors, middleware, and the handler,
//! carrying immutable submission metadata plus arbitrary typed values that
//! middleware layers deposit for each other.
//!
//! ## Overview
//!
//! The context provides:
//!
//! - **Typed Access**: Values are stored and retrieved through [`ContextKey`]
//!   types; a key's type identity carries its value type, so lookups never
//!   need runtime casts at the call site
//! - **Inline Fast Path**: The five hottest keys observed in middleware
//!   chains (request id, user id, start time, correlation id, trace id) live
//!   in dedicated struct fields and bypass the map entirely
//! - **Lazy Cold Path**: The backing map is allocated on first cold-key
//!   write, so executions that only touch hot keys never allocate it
//! - **Snapshots**: [`CommandContext::snapshot`] produces an immutable value
//!   copy for cross-task handoff
//!
//! ## Concurrency
//!
//! All operations are linearizable behind a `parking_lot::Mutex`. The source
//! system had two competing context variants (actor-isolated and lock-based);
//! they share one external contract, and this implementation realizes the
//! lock-based one. The handle is `Clone` (shared interior), so middleware
//! layers and spawned subtasks can hold the same context without external
//! locking.
//!
//! ## Lifecycle
//!
//! Created per execution, optionally borrowed from a context pool, and
//! returned on drop. Pooled reuse goes through `reset_for_reuse`, which
//! zeros storage while preserving map capacity.

use crate::entities::CommandMetadata;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// A process-unique typed key into the command context.
///
/// The key type itself is the identity; its associated `Value` type is what
/// gets stored. Define keys as zero-sized structs:
///
/// ```
/// use command_pipeline_domain::entities::ContextKey;
///
/// struct RetryBudget;
///
/// impl ContextKey for RetryBudget {
///     type Value = u32;
///     fn name() -> &'static str {
///         "retry_budget"
///     }
/// }
/// ```
pub trait ContextKey: 'static {
    /// The value type stored under this key
    type Value: Clone + Send + Sync + 'static;

    /// Human-readable key name for `keys()` output and traces
    fn name() -> &'static str;
}

/// Well-known key: the unique id of this submission (inline slot).
pub struct RequestIdKey;

impl ContextKey for RequestIdKey {
    type Value = uuid::Uuid;

    fn name() -> &'static str {
        "request_id"
    }
}

/// Well-known key: the submitting user (inline slot).
pub struct UserIdKey;

impl ContextKey for UserIdKey {
    type Value = String;

    fn name() -> &'static str {
        "user_id"
    }
}

/// Well-known key: when the pipeline started executing (inline slot).
pub struct StartTimeKey;

impl ContextKey for StartTimeKey {
    type Value = chrono::DateTime<chrono::Utc>;

    fn name() -> &'static str {
        "start_time"
    }
}

/// Well-known key: cross-service correlation id (inline slot).
pub struct CorrelationIdKey;

impl ContextKey for CorrelationIdKey {
    type Value = String;

    fn name() -> &'static str {
        "correlation_id"
    }
}

/// Well-known key: distributed trace id (inline slot).
pub struct TraceIdKey;

impl ContextKey for TraceIdKey {
    type Value = String;

    fn name() -> &'static str {
        "trace_id"
    }
}

/// One cold-path entry: the erased value plus its key name for `keys()`.
#[derive(Clone)]
struct StoredEntry {
    value: Arc<dyn Any + Send + Sync>,
    name: &'static str,
}

/// Interior state. All access goes through the handle's mutex.
struct ContextInner {
    metadata: CommandMetadata,

    // Inline fast-path slots. Checked by key type identity before any map
    // lookup; eliminates map overhead for the five hottest keys.
    request_id: Option<uuid::Uuid>,
    user_id: Option<String>,
    start_time: Option<chrono::DateTime<chrono::Utc>>,
    correlation_id: Option<String>,
    trace_id: Option<String>,

    // Cold path, lazily allocated on first non-inline write.
    storage: Option<HashMap<TypeId, StoredEntry>>,
}

impl ContextInner {
    fn seeded(metadata: CommandMetadata) -> Self {
        let request_id = Some(metadata.id());
        let user_id = metadata.user_id().map(str::to_owned);
        let correlation_id = metadata.correlation_id().map(str::to_owned);
        Self {
            metadata,
            request_id,
            user_id,
            start_time: None,
            correlation_id,
            trace_id: None,
            storage: None,
        }
    }
}

/// Per-invocation, thread-safe, typed key/value state carrier.
///
/// The handle is cheap to clone (shared `Arc` interior); every clone
/// addresses the same state. See the module documentation for the storage
/// model.
///
/// ## Usage Examples
///
/// ```
/// use command_pipeline_domain::entities::{CommandContext, CommandMetadata, ContextKey, UserIdKey};
///
/// let context = CommandContext::new(CommandMetadata::new().with_user_id("alice"));
///
/// // Inline slot, seeded from metadata:
/// assert_eq!(context.get::<UserIdKey>(), Some("alice".to_string()));
///
/// // Cold-path typed storage:
/// struct Attempts;
/// impl ContextKey for Attempts {
///     type Value = u32;
///     fn name() -> &'static str {
///         "attempts"
///     }
/// }
/// context.set::<Attempts>(3);
/// assert_eq!(context.get::<Attempts>(), Some(3));
/// ```
#[derive(Clone)]
pub struct CommandContext {
    inner: Arc<Mutex<ContextInner>>,
}

/// Moves a concrete value into an inline slot of type `T`, when the key's
/// value type is `T`. Only called after a `TypeId` match, so the downcast
/// cannot fail in practice.
fn into_slot<T: 'static, V: 'static>(value: V) -> Option<T> {
    (Box::new(value) as Box<dyn Any>).downcast::<T>().ok().map(|v| *v)
}

/// Reads an inline slot of type `T` back out as the key's value type.
fn from_slot<K: ContextKey, T: Clone + 'static>(slot: &Option<T>) -> Option<K::Value> {
    slot.as_ref()
        .and_then(|value| (value as &dyn Any).downcast_ref::<K::Value>().cloned())
}

impl CommandContext {
    /// Creates a context with empty storage, seeding the inline slots from
    /// the metadata (request id always; user id and correlation id when
    /// present).
    pub fn new(metadata: CommandMetadata) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ContextInner::seeded(metadata))),
        }
    }

    /// Gets the immutable submission metadata.
    pub fn metadata(&self) -> CommandMetadata {
        self.inner.lock().metadata.clone()
    }

    /// Gets the value stored under `K`, if any.
    ///
    /// The five well-known keys are resolved from their inline slots by key
    /// type identity; every other key falls back to the map.
    pub fn get<K: ContextKey>(&self) -> Option<K::Value> {
        let inner = self.inner.lock();
        let key = TypeId::of::<K>();
        if key == TypeId::of::<RequestIdKey>() {
            return from_slot::<K, _>(&inner.request_id);
        }
        if key == TypeId::of::<UserIdKey>() {
            return from_slot::<K, _>(&inner.user_id);
        }
        if key == TypeId::of::<StartTimeKey>() {
            return from_slot::<K, _>(&inner.start_time);
        }
        if key == TypeId::of::<CorrelationIdKey>() {
            return from_slot::<K, _>(&inner.correlation_id);
        }
        if key == TypeId::of::<TraceIdKey>() {
            return from_slot::<K, _>(&inner.trace_id);
        }
        inner
            .storage
            .as_ref()?
            .get(&key)
            .and_then(|entry| entry.value.downcast_ref::<K::Value>().cloned())
    }

    /// Stores `value` under `K`, replacing any previous value.
    pub fn set<K: ContextKey>(&self, value: K::Value) {
        let mut inner = self.inner.lock();
        let key = TypeId::of::<K>();
        if key == TypeId::of::<RequestIdKey>() {
            inner.request_id = into_slot(value);
            return;
        }
        if key == TypeId::of::<UserIdKey>() {
            inner.user_id = into_slot(value);
            return;
        }
        if key == TypeId::of::<StartTimeKey>() {
            inner.start_time = into_slot(value);
            return;
        }
        if key == TypeId::of::<CorrelationIdKey>() {
            inner.correlation_id = into_slot(value);
            return;
        }
        if key == TypeId::of::<TraceIdKey>() {
            inner.trace_id = into_slot(value);
            return;
        }
        inner.storage.get_or_insert_with(HashMap::new).insert(
            key,
            StoredEntry {
                value: Arc::new(value),
                name: K::name(),
            },
        );
    }

    /// Removes the value stored under `K`, returning it if present.
    pub fn remove<K: ContextKey>(&self) -> Option<K::Value> {
        let mut inner = self.inner.lock();
        let key = TypeId::of::<K>();
        if key == TypeId::of::<RequestIdKey>() {
            let taken = inner.request_id.take();
            return from_slot::<K, _>(&taken);
        }
        if key == TypeId::of::<UserIdKey>() {
            let taken = inner.user_id.take();
            return from_slot::<K, _>(&taken);
        }
        if key == TypeId::of::<StartTimeKey>() {
            let taken = inner.start_time.take();
            return from_slot::<K, _>(&taken);
        }
        if key == TypeId::of::<CorrelationIdKey>() {
            let taken = inner.correlation_id.take();
            return from_slot::<K, _>(&taken);
        }
        if key == TypeId::of::<TraceIdKey>() {
            let taken = inner.trace_id.take();
            return from_slot::<K, _>(&taken);
        }
        inner
            .storage
            .as_mut()?
            .remove(&key)
            .and_then(|entry| entry.value.downcast_ref::<K::Value>().cloned())
    }

    /// Replaces the storage wholesale with an empty one, preserving the
    /// metadata. Inline slots are re-seeded from the metadata afterwards,
    /// matching a freshly constructed context.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let metadata = inner.metadata.clone();
        *inner = ContextInner::seeded(metadata);
    }

    /// Gets the names of all populated keys: set inline slots plus map keys.
    pub fn keys(&self) -> Vec<&'static str> {
        let inner = self.inner.lock();
        let mut names = Vec::new();
        if inner.request_id.is_some() {
            names.push(RequestIdKey::name());
        }
        if inner.user_id.is_some() {
            names.push(UserIdKey::name());
        }
        if inner.start_time.is_some() {
            names.push(StartTimeKey::name());
        }
        if inner.correlation_id.is_some() {
            names.push(CorrelationIdKey::name());
        }
        if inner.trace_id.is_some() {
            names.push(TraceIdKey::name());
        }
        if let Some(storage) = &inner.storage {
            names.extend(storage.values().map(|entry| entry.name));
        }
        names
    }

    /// Returns an immutable value copy for cross-task handoff.
    ///
    /// The snapshot shares the stored values (they are `Arc`-held), so it is
    /// cheap regardless of payload sizes, and later mutations of the live
    /// context are not visible through it.
    pub fn snapshot(&self) -> ContextSnapshot {
        let inner = self.inner.lock();
        ContextSnapshot {
            metadata: inner.metadata.clone(),
            request_id: inner.request_id,
            user_id: inner.user_id.clone(),
            start_time: inner.start_time,
            correlation_id: inner.correlation_id.clone(),
            trace_id: inner.trace_id.clone(),
            entries: inner.storage.clone().unwrap_or_default(),
        }
    }

    /// Zeros storage for pooled reuse, preserving cold-map capacity, and
    /// installs the metadata of the next execution. Inline slots are seeded
    /// from the new metadata.
    pub fn reset_for_reuse(&self, metadata: CommandMetadata) {
        let mut inner = self.inner.lock();
        inner.request_id = Some(metadata.id());
        inner.user_id = metadata.user_id().map(str::to_owned);
        inner.correlation_id = metadata.correlation_id().map(str::to_owned);
        inner.start_time = None;
        inner.trace_id = None;
        inner.metadata = metadata;
        if let Some(storage) = &mut inner.storage {
            storage.clear();
        }
    }
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CommandContext")
            .field("metadata", &inner.metadata)
            .field("cold_entries", &inner.storage.as_ref().map_or(0, HashMap::len))
            .finish_non_exhaustive()
    }
}

/// Immutable value copy of a context at one point in time.
///
/// Safe to hand to a spawned task: it no longer aliases the live context.
#[derive(Clone)]
pub struct ContextSnapshot {
    metadata: CommandMetadata,
    request_id: Option<uuid::Uuid>,
    user_id: Option<String>,
    start_time: Option<chrono::DateTime<chrono::Utc>>,
    correlation_id: Option<String>,
    trace_id: Option<String>,
    entries: HashMap<TypeId, StoredEntry>,
}

impl ContextSnapshot {
    /// Gets the submission metadata at snapshot time.
    pub fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }

    /// Gets the value stored under `K` at snapshot time.
    pub fn get<K: ContextKey>(&self) -> Option<K::Value> {
        let key = TypeId::of::<K>();
        if key == TypeId::of::<RequestIdKey>() {
            return from_slot::<K, _>(&self.request_id);
        }
        if key == TypeId::of::<UserIdKey>() {
            return from_slot::<K, _>(&self.user_id);
        }
        if key == TypeId::of::<StartTimeKey>() {
            return from_slot::<K, _>(&self.start_time);
        }
        if key == TypeId::of::<CorrelationIdKey>() {
            return from_slot::<K, _>(&self.correlation_id);
        }
        if key == TypeId::of::<TraceIdKey>() {
            return from_slot::<K, _>(&self.trace_id);
        }
        self.entries
            .get(&key)
            .and_then(|entry| entry.value.downcast_ref::<K::Value>().cloned())
    }
}

impl std::fmt::Debug for ContextSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSnapshot")
            .field("metadata", &self.metadata)
            .field("cold_entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}
