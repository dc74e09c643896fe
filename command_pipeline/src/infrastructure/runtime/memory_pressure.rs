// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Memory-Pressure Detector
//!
//! This module distributes memory-pressure signals to interested components.
//! Clients register async handlers and receive every level transition; the
//! pool registry uses this to shrink pools, and recorders can use it to log
//! pressure events.
//!
//! ## Overview
//!
//! - **Levels**: [`MemoryPressureLevel`] is `Normal`, `Warning`, or
//!   `Critical`
//! - **Registration**: `register` returns a `Uuid`; `unregister` removes the
//!   handler
//! - **Fan-out**: `report` records the new level and invokes every handler
//!   as a detached supervised task. The detector never waits on handler
//!   completion, so a slow handler cannot block the notification path
//! - **Idempotence contract**: the same level may be reported repeatedly
//!   (OS notifications are edge- and level-triggered on different
//!   platforms), so handlers must be idempotent
//!
//! ## Signal Sources
//!
//! `report` is the single entry point for both real and simulated pressure.
//! Wiring an OS notification source (e.g. a cgroup PSI watcher or a
//! dispatch-source equivalent) is an integration concern: the embedding
//! application observes its platform and calls `report`.
//!
//! ## Usage
//!
//! ```ignore
//! let detector = MemoryPressureDetector::global();
//! let id = detector.register(|level| async move {
//!     tracing::warn!(?level, "memory pressure changed");
//! });
//! detector.report(MemoryPressureLevel::Warning);
//! detector.unregister(id);
//! ```

use crate::infrastructure::runtime::supervisor::spawn_detached;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Memory pressure severity reported by the platform (or simulated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MemoryPressureLevel {
    /// No pressure; pools may run at full size
    Normal,
    /// Elevated pressure; shed excess capacity
    Warning,
    /// Severe pressure; shed aggressively
    Critical,
}

impl MemoryPressureLevel {
    /// Stable lowercase name for logs and records.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryPressureLevel::Normal => "normal",
            MemoryPressureLevel::Warning => "warning",
            MemoryPressureLevel::Critical => "critical",
        }
    }
}

type PressureHandler = Arc<dyn Fn(MemoryPressureLevel) -> BoxFuture<'static, ()> + Send + Sync>;

struct DetectorInner {
    level: Mutex<MemoryPressureLevel>,
    handlers: Mutex<HashMap<Uuid, PressureHandler>>,
}

/// Distributes memory-pressure level changes to registered async handlers.
///
/// A process-wide instance is available via [`MemoryPressureDetector::global`];
/// tests construct their own with [`MemoryPressureDetector::new`] to avoid
/// cross-test interference.
#[derive(Clone)]
pub struct MemoryPressureDetector {
    inner: Arc<DetectorInner>,
}

static GLOBAL_DETECTOR: LazyLock<MemoryPressureDetector> = LazyLock::new(MemoryPressureDetector::new);

impl MemoryPressureDetector {
    /// Creates a detached detector instance (level starts at `Normal`).
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DetectorInner {
                level: Mutex::new(MemoryPressureLevel::Normal),
                handlers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The process-wide detector.
    pub fn global() -> &'static MemoryPressureDetector {
        &GLOBAL_DETECTOR
    }

    /// The most recently reported level.
    pub fn current_level(&self) -> MemoryPressureLevel {
        *self.inner.level.lock()
    }

    /// Registers an async handler, returning its registration id.
    ///
    /// The handler is invoked on every `report`, including repeats of the
    /// current level, and must therefore be idempotent.
    pub fn register<F, Fut>(&self, handler: F) -> Uuid
    where
        F: Fn(MemoryPressureLevel) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let erased: PressureHandler = Arc::new(move |level| Box::pin(handler(level)));
        self.inner.handlers.lock().insert(id, erased);
        debug!(handler_id = %id, "memory-pressure handler registered");
        id
    }

    /// Removes a handler by registration id. Returns whether it was present.
    pub fn unregister(&self, id: Uuid) -> bool {
        let removed = self.inner.handlers.lock().remove(&id).is_some();
        if removed {
            debug!(handler_id = %id, "memory-pressure handler unregistered");
        }
        removed
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.lock().len()
    }

    /// Records a pressure level and fans it out to every handler without
    /// waiting on their completion.
    ///
    /// Must be called from within a tokio runtime (handlers are spawned).
    pub fn report(&self, level: MemoryPressureLevel) {
        let previous = {
            let mut current = self.inner.level.lock();
            std::mem::replace(&mut *current, level)
        };

        if previous != level {
            warn!(
                from = previous.as_str(),
                to = level.as_str(),
                "memory pressure transition"
            );
        }

        let handlers: Vec<PressureHandler> = self.inner.handlers.lock().values().cloned().collect();
        for handler in handlers {
            spawn_detached("memory-pressure-handler", handler(level));
        }
    }
}

impl Default for MemoryPressureDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_report_updates_level() {
        let detector = MemoryPressureDetector::new();
        assert_eq!(detector.current_level(), MemoryPressureLevel::Normal);

        detector.report(MemoryPressureLevel::Critical);
        assert_eq!(detector.current_level(), MemoryPressureLevel::Critical);
    }

    #[tokio::test]
    async fn test_handlers_receive_level() {
        let detector = MemoryPressureDetector::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        detector.register(move |level| {
            let seen = seen_clone.clone();
            async move {
                seen.lock().push(level);
            }
        });

        detector.report(MemoryPressureLevel::Warning);
        detector.report(MemoryPressureLevel::Warning);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let seen = seen.lock();
        // Repeated reports of the same level still fan out
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|l| *l == MemoryPressureLevel::Warning));
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery() {
        let detector = MemoryPressureDetector::new();
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = count.clone();
        let id = detector.register(move |_| {
            let count = count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert!(detector.unregister(id));
        assert!(!detector.unregister(id));

        detector.report(MemoryPressureLevel::Critical);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slow_handler_does_not_block_report() {
        let detector = MemoryPressureDetector::new();
        detector.register(|_| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let started = std::time::Instant::now();
        detector.report(MemoryPressureLevel::Warning);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_level_names() {
        assert_eq!(MemoryPressureLevel::Normal.as_str(), "normal");
        assert_eq!(MemoryPressureLevel::Warning.as_str(), "warning");
        assert_eq!(MemoryPressureLevel::Critical.as_str(), "critical");
    }
}
