// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pool Registry
//!
//! This module provides the process-wide registry of object pools: weakly
//! held handles, aggregate statistics, a periodic sweeper for dead entries,
//! and coordinated (throttled, optionally intelligent) shrinking across all
//! registered pools.
//!
//! ## Overview
//!
//! - **Weak handles**: the registry never extends a pool's lifetime;
//!   dropping the last pool handle makes its entry sweepable, and the
//!   pool's destructor also unregisters eagerly
//! - **Process-wide instance**: [`PoolRegistry::global`] is the default
//!   registration target; tests and embedded setups construct their own
//!   with [`PoolRegistry::with_config`]
//! - **Configuration**: the knobs are process-wide and stored as atomics so
//!   they can be adjusted at runtime without locking registrants
//! - **Sweeper**: `start_maintenance` spawns a supervised background task
//!   that removes dead entries every `cleanup_interval`; `shutdown` cancels
//!   it
//! - **Shrinking**: shrink requests fan out to every live pool; each pool
//!   enforces the `min_shrink_interval` throttle unless `force` is set, and
//!   throttled requests are counted and silently dropped
//! - **Memory pressure**: `enable_memory_pressure_handling` subscribes the
//!   registry to the pressure detector; on `Warning`/`Critical` the
//!   registry shrinks every participating pool intelligently

use crate::infrastructure::runtime::memory_pressure::{MemoryPressureDetector, MemoryPressureLevel};
use crate::infrastructure::runtime::object_pool::{ManagedPool, ObjectPool, PoolStatistics};
use crate::infrastructure::runtime::supervisor::spawn_supervised;
use command_pipeline_domain::value_objects::PoolId;
use command_pipeline_domain::PipelineError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Process-wide registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Default for pools that inherit their statistics toggle from the
    /// registry (see [`PoolRegistry::default_pool_config`]).
    pub metrics_enabled_by_default: bool,
    /// How often the sweeper removes dead entries.
    pub cleanup_interval: Duration,
    /// Minimum interval between non-forced shrinks of any one pool.
    pub min_shrink_interval: Duration,
    /// Whether intelligent (demand-history) shrinking is used for pressure
    /// events; when disabled, fixed percentages apply.
    pub intelligent_shrinking_enabled: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            metrics_enabled_by_default: false,
            cleanup_interval: Duration::from_secs(30),
            min_shrink_interval: Duration::from_secs(10),
            intelligent_shrinking_enabled: true,
        }
    }
}

impl RegistryConfig {
    /// Validates construction invariants.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.cleanup_interval.is_zero() {
            return Err(PipelineError::invalid_config("cleanup_interval must be positive"));
        }
        if self.min_shrink_interval.is_zero() {
            return Err(PipelineError::invalid_config("min_shrink_interval must be positive"));
        }
        Ok(())
    }
}

/// Aggregate statistics across every live registered pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPoolStatistics {
    pub pool_count: usize,
    pub total_allocated: u64,
    pub total_available: usize,
    pub total_in_use: usize,
    pub total_acquisitions: u64,
    pub total_hits: u64,
    pub total_misses: u64,
    pub overall_hit_rate: f64,
}

struct RegisteredPool {
    name: String,
    handle: Weak<dyn ManagedPool>,
}

pub(crate) struct RegistryCore {
    pools: Mutex<HashMap<PoolId, RegisteredPool>>,
    metrics_enabled: AtomicBool,
    cleanup_interval_ms: AtomicU64,
    min_shrink_interval_ms: AtomicU64,
    intelligent_enabled: AtomicBool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    pressure_registration: Mutex<Option<(Uuid, MemoryPressureDetector)>>,
}

impl RegistryCore {
    pub(crate) fn min_shrink_interval(&self) -> Duration {
        Duration::from_millis(self.min_shrink_interval_ms.load(Ordering::Relaxed))
    }

    pub(crate) fn unregister_id(&self, id: &PoolId) -> bool {
        self.pools.lock().remove(id).is_some()
    }

    fn live_pools(&self) -> Vec<Arc<dyn ManagedPool>> {
        self.pools
            .lock()
            .values()
            .filter_map(|entry| entry.handle.upgrade())
            .collect()
    }

    fn sweep_dead(&self) -> usize {
        let mut pools = self.pools.lock();
        let before = pools.len();
        pools.retain(|_, entry| entry.handle.strong_count() > 0);
        let removed = before - pools.len();
        if removed > 0 {
            debug!(removed, "registry swept dead pool entries");
        }
        removed
    }

    fn shrink_all_intelligently(&self, level: MemoryPressureLevel, force: bool) -> usize {
        let intelligent = self.intelligent_enabled.load(Ordering::Relaxed);
        let mut removed = 0;
        for pool in self.live_pools() {
            if !pool.handles_memory_pressure() {
                continue;
            }
            removed += if intelligent {
                pool.shrink_intelligent(level, force)
            } else {
                let fraction = match level {
                    MemoryPressureLevel::Normal => 1.0,
                    MemoryPressureLevel::Warning => 0.6,
                    MemoryPressureLevel::Critical => 0.25,
                };
                pool.shrink_percentage(fraction, force)
            };
        }
        if removed > 0 {
            info!(level = level.as_str(), removed, "pressure-driven pool shrink");
        }
        removed
    }
}

/// Process-wide weak map of object pools with coordinated shrinking.
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PoolRegistry {
    core: Arc<RegistryCore>,
}

static GLOBAL_REGISTRY: LazyLock<PoolRegistry> = LazyLock::new(|| {
    // The default configuration is always valid.
    PoolRegistry::from_core(RegistryConfig::default())
});

impl PoolRegistry {
    fn from_core(config: RegistryConfig) -> Self {
        Self {
            core: Arc::new(RegistryCore {
                pools: Mutex::new(HashMap::new()),
                metrics_enabled: AtomicBool::new(config.metrics_enabled_by_default),
                cleanup_interval_ms: AtomicU64::new(config.cleanup_interval.as_millis() as u64),
                min_shrink_interval_ms: AtomicU64::new(config.min_shrink_interval.as_millis() as u64),
                intelligent_enabled: AtomicBool::new(config.intelligent_shrinking_enabled),
                sweeper: Mutex::new(None),
                pressure_registration: Mutex::new(None),
            }),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static PoolRegistry {
        &GLOBAL_REGISTRY
    }

    /// Creates a detached registry with the given configuration (tests,
    /// embedded setups).
    pub fn with_config(config: RegistryConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self::from_core(config))
    }

    /// Registers a pool. The registry holds only a weak handle; the pool's
    /// destructor unregisters eagerly, and the sweeper catches the rest.
    pub fn register<T: Send + 'static>(&self, pool: &ObjectPool<T>) {
        pool.bind_registry(&self.core);
        self.core.pools.lock().insert(
            pool.id(),
            RegisteredPool {
                name: pool.name().to_string(),
                handle: pool.as_managed(),
            },
        );
        debug!(pool = pool.name(), id = %pool.id(), "pool registered");
    }

    /// Removes a pool entry by id. Safe to call from destructors.
    pub fn unregister(&self, id: &PoolId) -> bool {
        self.core.unregister_id(id)
    }

    /// Number of registry entries (live and not-yet-swept).
    pub fn pool_count(&self) -> usize {
        self.core.pools.lock().len()
    }

    /// Statistics for every live pool.
    pub fn all_statistics(&self) -> Vec<PoolStatistics> {
        self.core.live_pools().iter().map(|pool| pool.statistics()).collect()
    }

    /// Aggregated statistics across every live pool.
    pub fn aggregated_statistics(&self) -> AggregatedPoolStatistics {
        let all = self.all_statistics();
        let total_acquisitions: u64 = all.iter().map(|s| s.acquisitions).sum();
        let total_hits: u64 = all.iter().map(|s| s.hits).sum();
        AggregatedPoolStatistics {
            pool_count: all.len(),
            total_allocated: all.iter().map(|s| s.total_allocated).sum(),
            total_available: all.iter().map(|s| s.currently_available).sum(),
            total_in_use: all.iter().map(|s| s.currently_in_use).sum(),
            total_acquisitions,
            total_hits,
            total_misses: all.iter().map(|s| s.misses).sum(),
            overall_hit_rate: if total_acquisitions > 0 {
                total_hits as f64 / total_acquisitions as f64
            } else {
                0.0
            },
        }
    }

    /// Shrinks every live pool to a fraction of its capacity. Individual
    /// pools may throttle unless `force` is set. Returns objects removed.
    pub fn shrink_all_to_percentage(&self, percentage: f64, force: bool) -> usize {
        self.core
            .live_pools()
            .iter()
            .map(|pool| pool.shrink_percentage(percentage, force))
            .sum()
    }

    /// Shrinks the named pool to `target` available objects. Returns the
    /// number removed, or `None` when no live pool has that name.
    pub fn shrink_pool(&self, name: &str, target: usize, force: bool) -> Option<usize> {
        let handle = {
            let pools = self.core.pools.lock();
            pools
                .values()
                .find(|entry| entry.name == name)
                .and_then(|entry| entry.handle.upgrade())
        };
        handle.map(|pool| pool.shrink(target, force))
    }

    /// Shrinks every pressure-participating pool based on demand history
    /// (or fixed percentages when intelligent shrinking is disabled).
    pub fn shrink_all_intelligently(&self, level: MemoryPressureLevel, force: bool) -> usize {
        self.core.shrink_all_intelligently(level, force)
    }

    /// Removes registry entries whose pools have been dropped. The sweeper
    /// calls this periodically; exposed for deterministic tests.
    pub fn sweep_dead(&self) -> usize {
        self.core.sweep_dead()
    }

    /// Starts the background sweeper (idempotent). Must be called from
    /// within a tokio runtime.
    pub fn start_maintenance(&self) {
        let mut sweeper = self.core.sweeper.lock();
        if sweeper.is_some() {
            return;
        }
        let core = self.core.clone();
        *sweeper = Some(spawn_supervised("pool-registry-sweeper", async move {
            loop {
                let interval = Duration::from_millis(core.cleanup_interval_ms.load(Ordering::Relaxed));
                tokio::time::sleep(interval).await;
                core.sweep_dead();
            }
        }));
        debug!("pool registry sweeper started");
    }

    /// Cancels the sweeper and detaches from the pressure detector.
    pub fn shutdown(&self) {
        if let Some(handle) = self.core.sweeper.lock().take() {
            handle.abort();
            debug!("pool registry sweeper stopped");
        }
        if let Some((id, detector)) = self.core.pressure_registration.lock().take() {
            detector.unregister(id);
        }
    }

    /// Subscribes this registry to the process-wide memory-pressure
    /// detector: `Warning` and `Critical` levels trigger an intelligent
    /// shrink of every participating pool. Idempotent.
    pub fn enable_memory_pressure_handling(&self) -> Uuid {
        self.enable_memory_pressure_handling_with(MemoryPressureDetector::global())
    }

    /// Subscribes to a specific detector (tests, embedded setups).
    pub fn enable_memory_pressure_handling_with(&self, detector: &MemoryPressureDetector) -> Uuid {
        let mut registration = self.core.pressure_registration.lock();
        if let Some((id, _)) = registration.as_ref() {
            return *id;
        }
        let core = self.core.clone();
        let id = detector.register(move |level| {
            let core = core.clone();
            async move {
                core.shrink_all_intelligently(level, false);
            }
        });
        *registration = Some((id, detector.clone()));
        id
    }

    /// Whether per-pool metrics default to enabled for inherited configs.
    pub fn metrics_enabled_by_default(&self) -> bool {
        self.core.metrics_enabled.load(Ordering::Relaxed)
    }

    /// Adjusts the metrics default for inherited configs.
    pub fn set_metrics_enabled_by_default(&self, enabled: bool) {
        self.core.metrics_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Adjusts the sweeper interval (takes effect on the next tick).
    pub fn set_cleanup_interval(&self, interval: Duration) {
        self.core
            .cleanup_interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }

    /// Adjusts the per-pool shrink throttle interval.
    pub fn set_min_shrink_interval(&self, interval: Duration) {
        self.core
            .min_shrink_interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }

    /// Toggles intelligent shrinking.
    pub fn set_intelligent_shrinking_enabled(&self, enabled: bool) {
        self.core.intelligent_enabled.store(enabled, Ordering::Relaxed);
    }

    /// A pool config inheriting this registry's statistics default.
    pub fn default_pool_config(&self, max_size: usize) -> crate::infrastructure::runtime::object_pool::PoolConfig {
        let mut config = crate::infrastructure::runtime::object_pool::PoolConfig::with_max_size(max_size);
        config.track_statistics = self.metrics_enabled_by_default();
        config
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pool_count", &self.pool_count())
            .finish_non_exhaustive()
    }
}
