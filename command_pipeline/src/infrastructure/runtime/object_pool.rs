// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Object Pool
//!
//! This module provides a bounded pool of reusable objects with RAII
//! return, hit/miss statistics, water marks, and memory-pressure-driven
//! shrinking.
//!
//! ## Overview
//!
//! - **Bounded circulation**: a `tokio::sync::Semaphore` caps the number of
//!   objects simultaneously handed out at `max_size`; callers suspend in
//!   FIFO order when the pool is fully in circulation
//! - **LIFO hand-outs**: available objects are a stack, so the most
//!   recently returned (cache-warm) object goes out first
//! - **RAII return**: [`PooledObject`] returns its value to the pool on
//!   drop, exactly once, even on panic paths; a `Weak` back-reference
//!   prevents pool/object reference cycles
//! - **Water marks**: `low_water ≤ high_water ≤ max_size` bound the targets
//!   of intelligent shrinking under memory pressure
//! - **Shrink throttling**: non-forced shrink requests within the
//!   registry's minimum interval are counted and dropped
//!
//! ## Capacity Invariants
//!
//! `available + in_use ≤ max_size` at all times, and
//! `in_use = max_size − semaphore permits`. The permit is *forgotten* on
//! acquire and re-added on release, so it travels with the object rather
//! than with a guard lifetime.
//!
//! ## Statistics
//!
//! `hit_rate = hits / acquisitions`. `efficiency = acquisitions /
//! allocations`: the average number of uses each allocated object has
//! served, which is the reuse measure the registry aggregates.

use crate::infrastructure::runtime::memory_pressure::MemoryPressureLevel;
use crate::infrastructure::runtime::pool_registry::{PoolRegistry, RegistryCore};
use command_pipeline_domain::value_objects::PoolId;
use command_pipeline_domain::PipelineError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::debug;

/// Construction inputs for [`ObjectPool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum objects in circulation (handed out + pooled). Must be
    /// positive.
    pub max_size: usize,
    /// Upper shrink target for intelligent shrinking.
    pub high_water: usize,
    /// Lower shrink target for intelligent shrinking.
    pub low_water: usize,
    /// Whether hit/miss/eviction counters are updated.
    pub track_statistics: bool,
    /// Whether the pool participates in registry-driven pressure shrinks.
    pub memory_pressure_handling: bool,
}

impl PoolConfig {
    /// Creates a config sized to `max_size` with water marks at the
    /// canonical 80% / 20% of capacity.
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size,
            high_water: (max_size * 8) / 10,
            low_water: (max_size * 2) / 10,
            track_statistics: true,
            memory_pressure_handling: true,
        }
    }

    /// Validates construction invariants:
    /// `max_size > 0` and `0 ≤ low_water ≤ high_water ≤ max_size`.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_size == 0 {
            return Err(PipelineError::invalid_config("pool max_size must be positive"));
        }
        if self.low_water > self.high_water {
            return Err(PipelineError::invalid_config(format!(
                "low_water ({}) must not exceed high_water ({})",
                self.low_water, self.high_water
            )));
        }
        if self.high_water > self.max_size {
            return Err(PipelineError::invalid_config(format!(
                "high_water ({}) must not exceed max_size ({})",
                self.high_water, self.max_size
            )));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::with_max_size(100)
    }
}

/// Immutable statistics snapshot of an [`ObjectPool`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStatistics {
    pub name: String,
    pub total_allocated: u64,
    pub currently_available: usize,
    pub currently_in_use: usize,
    pub max_size: usize,
    pub acquisitions: u64,
    pub releases: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub peak_usage: usize,
    pub hit_rate: f64,
    pub efficiency: f64,
    pub throttled_shrinks: u64,
}

#[derive(Default)]
struct PoolCounters {
    allocated: AtomicU64,
    acquisitions: AtomicU64,
    releases: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    in_use: AtomicUsize,
    peak_in_use: AtomicUsize,
    // Peak in-use since the last intelligent shrink; the demand history
    // that shrink targets are derived from.
    recent_peak: AtomicUsize,
}

impl PoolCounters {
    fn update_peaks(&self, in_use: usize) {
        self.peak_in_use.fetch_max(in_use, Ordering::Relaxed);
        self.recent_peak.fetch_max(in_use, Ordering::Relaxed);
    }
}

/// Object-safe view of a pool, as held (weakly) by the registry and driven
/// by memory-pressure shrinking.
pub trait ManagedPool: Send + Sync {
    /// Unique pool id
    fn pool_id(&self) -> PoolId;
    /// Pool name for registry lookups and logs
    fn pool_name(&self) -> &str;
    /// Immutable statistics snapshot
    fn statistics(&self) -> PoolStatistics;
    /// Shrinks the available stack down to `target`; throttled unless
    /// forced. Returns objects removed.
    fn shrink(&self, target: usize, force: bool) -> usize;
    /// Shrinks to a fraction of `max_size` (`percentage` clamped to [0, 1]).
    fn shrink_percentage(&self, percentage: f64, force: bool) -> usize;
    /// Picks a shrink target from recent demand and the pressure level.
    fn shrink_intelligent(&self, level: MemoryPressureLevel, force: bool) -> usize;
    /// Whether this pool opted into pressure-driven shrinking.
    fn handles_memory_pressure(&self) -> bool;
}

pub(crate) struct PoolShared<T> {
    name: String,
    id: PoolId,
    config: PoolConfig,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    reset: Box<dyn Fn(&mut T) + Send + Sync>,
    available: Mutex<Vec<T>>,
    // Bounds in-circulation count; permits are forgotten on acquire and
    // re-added on release.
    slots: Semaphore,
    counters: PoolCounters,
    last_shrink: Mutex<Option<Instant>>,
    throttled_shrinks: AtomicU64,
    registry: Mutex<Weak<RegistryCore>>,
}

impl<T: Send + 'static> PoolShared<T> {
    fn take_or_create(&self) -> T {
        let popped = self.available.lock().pop();
        let in_use = self.counters.in_use.fetch_add(1, Ordering::Relaxed) + 1;
        self.counters.update_peaks(in_use);
        if self.config.track_statistics {
            self.counters.acquisitions.fetch_add(1, Ordering::Relaxed);
        }
        match popped {
            Some(value) => {
                if self.config.track_statistics {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                }
                value
            }
            None => {
                if self.config.track_statistics {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                }
                self.counters.allocated.fetch_add(1, Ordering::Relaxed);
                (self.factory)()
            }
        }
    }

    fn release_value(&self, mut value: T) {
        (self.reset)(&mut value);
        {
            let mut available = self.available.lock();
            if available.len() < self.config.max_size {
                available.push(value);
            } else if self.config.track_statistics {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.counters.in_use.fetch_sub(1, Ordering::Relaxed);
        if self.config.track_statistics {
            self.counters.releases.fetch_add(1, Ordering::Relaxed);
        }
        self.slots.add_permits(1);
    }

    fn min_shrink_interval(&self) -> Duration {
        self.registry
            .lock()
            .upgrade()
            .map(|core| core.min_shrink_interval())
            .unwrap_or(Duration::from_secs(10))
    }

    fn shrink_with_policy(&self, target: usize, force: bool) -> usize {
        {
            let mut last = self.last_shrink.lock();
            if !force {
                if let Some(previous) = *last {
                    if previous.elapsed() < self.min_shrink_interval() {
                        self.throttled_shrinks.fetch_add(1, Ordering::Relaxed);
                        debug!(pool = %self.name, target, "shrink request throttled");
                        return 0;
                    }
                }
            }
            *last = Some(Instant::now());
        }

        let removed = {
            let mut available = self.available.lock();
            let before = available.len();
            available.truncate(target.min(before));
            before - available.len()
        };
        if removed > 0 {
            if self.config.track_statistics {
                self.counters.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            }
            debug!(pool = %self.name, target, removed, "pool shrunk");
        }
        removed
    }
}

impl<T: Send + 'static> ManagedPool for PoolShared<T> {
    fn pool_id(&self) -> PoolId {
        self.id.clone()
    }

    fn pool_name(&self) -> &str {
        &self.name
    }

    fn statistics(&self) -> PoolStatistics {
        let acquisitions = self.counters.acquisitions.load(Ordering::Relaxed);
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let allocated = self.counters.allocated.load(Ordering::Relaxed);
        PoolStatistics {
            name: self.name.clone(),
            total_allocated: allocated,
            currently_available: self.available.lock().len(),
            currently_in_use: self.counters.in_use.load(Ordering::Relaxed),
            max_size: self.config.max_size,
            acquisitions,
            releases: self.counters.releases.load(Ordering::Relaxed),
            hits,
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            peak_usage: self.counters.peak_in_use.load(Ordering::Relaxed),
            hit_rate: if acquisitions > 0 {
                hits as f64 / acquisitions as f64
            } else {
                0.0
            },
            efficiency: if allocated > 0 {
                acquisitions as f64 / allocated as f64
            } else {
                0.0
            },
            throttled_shrinks: self.throttled_shrinks.load(Ordering::Relaxed),
        }
    }

    fn shrink(&self, target: usize, force: bool) -> usize {
        self.shrink_with_policy(target, force)
    }

    fn shrink_percentage(&self, percentage: f64, force: bool) -> usize {
        let fraction = percentage.clamp(0.0, 1.0);
        let target = (self.config.max_size as f64 * fraction).floor() as usize;
        self.shrink_with_policy(target, force)
    }

    fn shrink_intelligent(&self, level: MemoryPressureLevel, force: bool) -> usize {
        if level == MemoryPressureLevel::Normal {
            return 0;
        }
        let has_history = self.counters.acquisitions.load(Ordering::Relaxed) > 0;
        let target = if has_history {
            let demand = self.counters.recent_peak.swap(
                self.counters.in_use.load(Ordering::Relaxed),
                Ordering::Relaxed,
            );
            match level {
                MemoryPressureLevel::Normal => self.config.max_size,
                MemoryPressureLevel::Warning => demand.clamp(self.config.low_water, self.config.high_water),
                MemoryPressureLevel::Critical => self.config.low_water,
            }
        } else {
            // No demand history: fixed percentage fallback.
            let fraction = match level {
                MemoryPressureLevel::Normal => 1.0,
                MemoryPressureLevel::Warning => 0.6,
                MemoryPressureLevel::Critical => 0.25,
            };
            (self.config.max_size as f64 * fraction).floor() as usize
        };
        self.shrink_with_policy(target, force)
    }

    fn handles_memory_pressure(&self) -> bool {
        self.config.memory_pressure_handling
    }
}

impl<T> Drop for PoolShared<T> {
    fn drop(&mut self) {
        if let Some(core) = self.registry.lock().upgrade() {
            core.unregister_id(&self.id);
        }
    }
}

/// Bounded reservoir of reusable objects. Cheap to clone; clones share
/// state.
///
/// ## Usage Examples
///
/// ```ignore
/// let pool = ObjectPool::new(
///     "frame-buffers",
///     PoolConfig::with_max_size(32),
///     || Vec::<u8>::with_capacity(4096),
///     |buf| buf.clear(),
/// )?;
///
/// let buffer = pool.acquire_pooled().await?;
/// // ... use *buffer ...
/// // dropped here: the buffer returns to the pool
/// ```
pub struct ObjectPool<T: Send + 'static> {
    inner: Arc<PoolShared<T>>,
}

impl<T: Send + 'static> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> ObjectPool<T> {
    /// Creates a pool registered with the process-wide registry.
    pub fn new(
        name: impl Into<String>,
        config: PoolConfig,
        factory: impl Fn() -> T + Send + Sync + 'static,
        reset: impl Fn(&mut T) + Send + Sync + 'static,
    ) -> Result<Self, PipelineError> {
        let pool = Self::detached(name, config, factory, reset)?;
        PoolRegistry::global().register(&pool);
        Ok(pool)
    }

    /// Creates a pool registered with a specific registry (tests, embedded
    /// setups).
    pub fn with_registry(
        name: impl Into<String>,
        config: PoolConfig,
        factory: impl Fn() -> T + Send + Sync + 'static,
        reset: impl Fn(&mut T) + Send + Sync + 'static,
        registry: &PoolRegistry,
    ) -> Result<Self, PipelineError> {
        let pool = Self::detached(name, config, factory, reset)?;
        registry.register(&pool);
        Ok(pool)
    }

    /// Creates an unregistered pool.
    pub fn detached(
        name: impl Into<String>,
        config: PoolConfig,
        factory: impl Fn() -> T + Send + Sync + 'static,
        reset: impl Fn(&mut T) + Send + Sync + 'static,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let max_size = config.max_size;
        Ok(Self {
            inner: Arc::new(PoolShared {
                name: name.into(),
                id: PoolId::new(),
                config,
                factory: Box::new(factory),
                reset: Box::new(reset),
                available: Mutex::new(Vec::new()),
                slots: Semaphore::new(max_size),
                counters: PoolCounters::default(),
                last_shrink: Mutex::new(None),
                throttled_shrinks: AtomicU64::new(0),
                registry: Mutex::new(Weak::new()),
            }),
        })
    }

    /// Acquires an object, suspending while the pool is fully in
    /// circulation. Pops the most recently returned object (hit) or creates
    /// a fresh one (miss).
    pub async fn acquire(&self) -> Result<T, PipelineError> {
        let permit = self
            .inner
            .slots
            .acquire()
            .await
            .map_err(|_| PipelineError::internal_error("pool semaphore closed"))?;
        // The permit travels with the object: re-added on release.
        permit.forget();
        Ok(self.inner.take_or_create())
    }

    /// Acquires without waiting; fails with `PoolExhausted` when the pool
    /// declines to hand out more objects.
    pub fn try_acquire(&self) -> Result<T, PipelineError> {
        match self.inner.slots.try_acquire() {
            Ok(permit) => {
                permit.forget();
                Ok(self.inner.take_or_create())
            }
            Err(_) => Err(PipelineError::pool_exhausted(format!(
                "pool '{}' has all {} objects in circulation",
                self.inner.name, self.inner.config.max_size
            ))),
        }
    }

    /// Returns a previously acquired object to the pool: resets it, pushes
    /// it onto the available stack (or evicts when the stack is full), and
    /// frees the circulation slot.
    pub fn release(&self, value: T) {
        self.inner.release_value(value);
    }

    /// Acquires an object wrapped for RAII return.
    pub async fn acquire_pooled(&self) -> Result<PooledObject<T>, PipelineError> {
        let value = self.acquire().await?;
        Ok(PooledObject {
            value: Some(value),
            pool: Arc::downgrade(&self.inner),
            returned: AtomicBool::new(false),
        })
    }

    /// Populates the available stack with up to `count` objects, bounded by
    /// capacity not currently in circulation.
    pub fn preallocate(&self, count: usize) {
        let mut available = self.inner.available.lock();
        let free_slots = self.inner.slots.available_permits();
        let target = count.min(self.inner.config.max_size).min(free_slots);
        while available.len() < target {
            available.push((self.inner.factory)());
            self.inner.counters.allocated.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Shrinks the available stack to `target` objects, subject to the
    /// registry's shrink throttle. Returns objects removed (0 when
    /// throttled).
    pub fn shrink_to(&self, target: usize) -> usize {
        self.inner.shrink_with_policy(target, false)
    }

    /// Shrinks to a fraction of capacity, subject to the shrink throttle.
    pub fn shrink_to_percentage(&self, percentage: f64) -> usize {
        self.inner.shrink_percentage(percentage, false)
    }

    /// Empties the available stack. Lifetime statistics are preserved;
    /// objects in circulation are unaffected.
    pub fn clear(&self) {
        self.inner.available.lock().clear();
    }

    /// Immutable statistics snapshot.
    pub fn statistics(&self) -> PoolStatistics {
        self.inner.statistics()
    }

    /// Pool name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Unique pool id.
    pub fn id(&self) -> PoolId {
        self.inner.id.clone()
    }

    /// The construction configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Objects currently on the available stack.
    pub fn available_count(&self) -> usize {
        self.inner.available.lock().len()
    }

    /// Objects currently in circulation.
    pub fn in_use_count(&self) -> usize {
        self.inner.counters.in_use.load(Ordering::Relaxed)
    }

    pub(crate) fn bind_registry(&self, core: &Arc<RegistryCore>) {
        *self.inner.registry.lock() = Arc::downgrade(core);
    }

    pub(crate) fn as_managed(&self) -> Weak<dyn ManagedPool> {
        let dyn_arc: Arc<dyn ManagedPool> = self.inner.clone();
        let weak: Weak<dyn ManagedPool> = Arc::downgrade(&dyn_arc);
        weak
    }
}

impl<T: Send + 'static> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("name", &self.inner.name)
            .field("max_size", &self.inner.config.max_size)
            .field("available", &self.available_count())
            .field("in_use", &self.in_use_count())
            .finish_non_exhaustive()
    }
}

/// RAII wrapper owning an object on loan from a pool.
///
/// On drop the object is returned to the pool at most once (a monotonic
/// compare-and-set guards the return), including on panic unwinds. If the
/// pool has already been destroyed, the object is simply dropped; the
/// `Weak` back-reference never keeps a pool alive.
pub struct PooledObject<T: Send + 'static> {
    value: Option<T>,
    pool: Weak<PoolShared<T>>,
    returned: AtomicBool,
}

impl<T: Send + 'static> PooledObject<T> {
    /// Whether the object has already been returned to its pool.
    pub fn is_returned(&self) -> bool {
        self.returned.load(Ordering::Acquire)
    }
}

impl<T: Send + 'static> Deref for PooledObject<T> {
    type Target = T;

    // The value is present from construction until drop; is_returned only
    // flips inside drop.
    #[allow(clippy::expect_used)]
    fn deref(&self) -> &T {
        self.value.as_ref().expect("pooled object accessed after return")
    }
}

impl<T: Send + 'static> DerefMut for PooledObject<T> {
    #[allow(clippy::expect_used)]
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("pooled object accessed after return")
    }
}

impl<T: Send + 'static> Drop for PooledObject<T> {
    fn drop(&mut self) {
        if self
            .returned
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        if let Some(value) = self.value.take() {
            if let Some(pool) = self.pool.upgrade() {
                pool.release_value(value);
            }
            // Pool already destroyed: the value is dropped on the floor.
        }
    }
}
