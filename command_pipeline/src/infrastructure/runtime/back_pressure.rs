// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Back-Pressure Semaphore
//!
//! This module regulates concurrent pipeline executions while providing an
//! overflow policy for submissions that arrive when the system is saturated.
//!
//! ## Overview
//!
//! The semaphore bounds three quantities:
//!
//! - **Concurrency**: at most `max_concurrency` tokens are outstanding
//! - **Outstanding**: active + queued submissions stay within
//!   `max_outstanding` (when set)
//! - **Queue memory**: the sum of queued token sizes stays within
//!   `max_queue_memory` bytes (when set)
//!
//! When a submission cannot start immediately, the configured
//! [`OverflowStrategy`] decides its fate: wait in FIFO order (`Suspend`),
//! reject it (`DropNewest` → `BackPressureFull`, `Error` → `QueueFull`), or
//! evict the oldest waiter to make room (`DropOldest` → the evicted waiter
//! fails with `BackPressureDropped`).
//!
//! ## Why Not `tokio::sync::Semaphore`?
//!
//! Tokio's semaphore provides FIFO permits but cannot express drop-oldest
//! eviction or byte-weighted queue accounting. This implementation keeps an
//! explicit waiter queue under a `parking_lot` mutex; each waiter is a
//! shared node with a small phase state machine, so cancellation flips a
//! flag in O(1) instead of scanning the queue, and a permit granted to a
//! waiter that was concurrently cancelled is recovered, never leaked.
//!
//! ## Fairness
//!
//! Wakeups are strict FIFO across all strategies: the order of suspensions
//! equals the order of grants. Pool-style barging is intentionally absent.
//!
//! ## Token Lifecycle
//!
//! [`BackPressureToken`] releases its permit exactly once, on drop or via
//! the explicit `release`. A second release is idempotent by construction
//! (the permit handle is consumed on first release).

use command_pipeline_domain::PipelineError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use tracing::{debug, warn};

/// Policy applied when a submission arrives while the semaphore is
/// saturated and the bounded queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowStrategy {
    /// Queue the caller and suspend it until a permit frees up. The
    /// outstanding/memory bounds do not reject under this strategy; they
    /// govern the rejecting strategies below.
    Suspend,
    /// Evict the oldest waiter (it fails with `BackPressureDropped`) and
    /// queue the caller in its place.
    DropOldest,
    /// Reject the caller with `BackPressureFull`.
    DropNewest,
    /// Reject the caller with `QueueFull`. Semantically identical to
    /// `DropNewest` but surfaces the deterministic queue-bound error kind.
    Error,
}

/// Construction inputs for [`BackPressureSemaphore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackPressureConfig {
    /// Maximum concurrently held tokens. Must be positive.
    pub max_concurrency: usize,
    /// Cap on active + queued submissions; `None` means unbounded queue.
    pub max_outstanding: Option<usize>,
    /// Cap on the sum of queued token sizes in bytes; `None` means no
    /// memory accounting.
    pub max_queue_memory: Option<usize>,
    /// Overflow policy for saturated submissions.
    pub strategy: OverflowStrategy,
}

impl BackPressureConfig {
    /// Creates a suspend-strategy config with the given concurrency bound.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            max_outstanding: None,
            max_queue_memory: None,
            strategy: OverflowStrategy::Suspend,
        }
    }

    /// Bounds active + queued submissions.
    pub fn with_max_outstanding(mut self, max_outstanding: usize) -> Self {
        self.max_outstanding = Some(max_outstanding);
        self
    }

    /// Bounds queued token memory in bytes.
    pub fn with_max_queue_memory(mut self, max_queue_memory: usize) -> Self {
        self.max_queue_memory = Some(max_queue_memory);
        self
    }

    /// Sets the overflow strategy.
    pub fn with_strategy(mut self, strategy: OverflowStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Validates construction invariants.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_concurrency == 0 {
            return Err(PipelineError::invalid_config("max_concurrency must be positive"));
        }
        if let Some(outstanding) = self.max_outstanding {
            if outstanding < self.max_concurrency {
                return Err(PipelineError::invalid_config(format!(
                    "max_outstanding ({}) must be at least max_concurrency ({})",
                    outstanding, self.max_concurrency
                )));
            }
        }
        if self.max_queue_memory == Some(0) {
            return Err(PipelineError::invalid_config("max_queue_memory must be positive"));
        }
        Ok(())
    }
}

/// Waiter lifecycle. Transitions are guarded by the semaphore state lock
/// (never by the entry lock alone), except `Granted -> Finished` which the
/// waiter performs on itself when it resolves.
enum Phase {
    /// In the queue, waiting for a grant
    Waiting,
    /// Popped and handed a permit; the waiter resolves with a token
    Granted,
    /// Evicted under drop-oldest; the waiter resolves with this error
    Evicted(PipelineError),
    /// The waiter's future was dropped before resolution
    Cancelled,
    /// Terminal: the waiter has consumed its outcome
    Finished,
}

struct EntryState {
    phase: Phase,
    waker: Option<Waker>,
}

struct WaitEntry {
    size: usize,
    state: Mutex<EntryState>,
}

struct SemState {
    active: usize,
    queued_live: usize,
    queued_bytes: usize,
    peak_active: usize,
    queue: VecDeque<Arc<WaitEntry>>,
}

struct SemaphoreInner {
    config: BackPressureConfig,
    state: Mutex<SemState>,
    acquires: AtomicU64,
    releases: AtomicU64,
    rejections: AtomicU64,
    drops: AtomicU64,
    cancellations: AtomicU64,
}

impl SemaphoreInner {
    /// Grants freed capacity to queued waiters in FIFO order, skipping
    /// cancelled ghosts. Caller holds the state lock.
    fn wake_waiters(&self, state: &mut SemState) {
        while state.active < self.config.max_concurrency {
            let Some(entry) = state.queue.pop_front() else {
                break;
            };
            let mut entry_state = entry.state.lock();
            match entry_state.phase {
                Phase::Waiting => {
                    entry_state.phase = Phase::Granted;
                    state.active += 1;
                    state.peak_active = state.peak_active.max(state.active);
                    state.queued_live -= 1;
                    state.queued_bytes -= entry.size;
                    if let Some(waker) = entry_state.waker.take() {
                        waker.wake();
                    }
                }
                // Cancelled entries already surrendered their accounting;
                // discard and keep looking.
                _ => continue,
            }
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.active -= 1;
        self.releases.fetch_add(1, Ordering::Relaxed);
        self.wake_waiters(&mut state);
    }
}

/// RAII permit for one execution admitted by the semaphore.
///
/// Dropping the token releases the permit and wakes the next waiter in FIFO
/// order. Release happens exactly once: the explicit [`release`] consumes
/// the permit handle, making a subsequent drop a no-op.
///
/// [`release`]: BackPressureToken::release
pub struct BackPressureToken {
    inner: Option<Arc<SemaphoreInner>>,
    size: usize,
}

impl BackPressureToken {
    fn new(inner: Arc<SemaphoreInner>, size: usize) -> Self {
        Self {
            inner: Some(inner),
            size,
        }
    }

    /// The byte weight this token was acquired with.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Releases the permit now instead of at drop.
    pub fn release(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release();
        }
    }
}

impl Drop for BackPressureToken {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release();
        }
    }
}

impl std::fmt::Debug for BackPressureToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackPressureToken")
            .field("size", &self.size)
            .field("released", &self.inner.is_none())
            .finish()
    }
}

/// Future of a queued submission. Resolves when granted a permit or
/// evicted; dropping it before resolution cancels the wait and returns any
/// concurrently granted permit.
struct AcquireFuture {
    inner: Arc<SemaphoreInner>,
    entry: Arc<WaitEntry>,
    completed: bool,
}

impl Future for AcquireFuture {
    type Output = Result<BackPressureToken, PipelineError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut entry_state = this.entry.state.lock();
        match std::mem::replace(&mut entry_state.phase, Phase::Finished) {
            Phase::Waiting => {
                entry_state.phase = Phase::Waiting;
                entry_state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
            Phase::Granted => {
                drop(entry_state);
                this.completed = true;
                this.inner.acquires.fetch_add(1, Ordering::Relaxed);
                Poll::Ready(Ok(BackPressureToken::new(this.inner.clone(), this.entry.size)))
            }
            Phase::Evicted(error) => {
                drop(entry_state);
                this.completed = true;
                Poll::Ready(Err(error))
            }
            // Finished/Cancelled cannot be observed by a live poll
            other => {
                entry_state.phase = other;
                Poll::Ready(Err(PipelineError::internal_error(
                    "back-pressure waiter polled after completion",
                )))
            }
        }
    }
}

impl Drop for AcquireFuture {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        // Lock order: semaphore state first, then entry state.
        let mut state = self.inner.state.lock();
        let mut entry_state = self.entry.state.lock();
        match entry_state.phase {
            Phase::Waiting => {
                entry_state.phase = Phase::Cancelled;
                state.queued_live -= 1;
                state.queued_bytes -= self.entry.size;
                self.inner.cancellations.fetch_add(1, Ordering::Relaxed);
            }
            Phase::Granted => {
                // A permit was handed over concurrently with cancellation;
                // hand it back so nothing leaks.
                entry_state.phase = Phase::Finished;
                drop(entry_state);
                state.active -= 1;
                self.inner.cancellations.fetch_add(1, Ordering::Relaxed);
                self.inner.wake_waiters(&mut state);
            }
            _ => {}
        }
    }
}

/// Immutable statistics snapshot of a [`BackPressureSemaphore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackPressureStatistics {
    pub max_concurrency: usize,
    pub active: usize,
    pub queued: usize,
    pub queued_bytes: usize,
    pub peak_active: usize,
    pub acquires: u64,
    pub releases: u64,
    pub rejections: u64,
    pub drops: u64,
    pub cancellations: u64,
}

/// Bounded-concurrency admission controller with overflow strategies and
/// fair FIFO wakeups. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct BackPressureSemaphore {
    inner: Arc<SemaphoreInner>,
}

impl BackPressureSemaphore {
    /// Creates a semaphore from a validated configuration.
    pub fn new(config: BackPressureConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(SemaphoreInner {
                config,
                state: Mutex::new(SemState {
                    active: 0,
                    queued_live: 0,
                    queued_bytes: 0,
                    peak_active: 0,
                    queue: VecDeque::new(),
                }),
                acquires: AtomicU64::new(0),
                releases: AtomicU64::new(0),
                rejections: AtomicU64::new(0),
                drops: AtomicU64::new(0),
                cancellations: AtomicU64::new(0),
            }),
        })
    }

    /// Acquires a permit with zero byte weight.
    pub async fn acquire(&self) -> Result<BackPressureToken, PipelineError> {
        self.acquire_weighted(0).await
    }

    /// Acquires a permit for a submission of `size` bytes.
    ///
    /// Returns immediately with a token when concurrency is available.
    /// Otherwise the outcome depends on the configured limits and strategy;
    /// see the module documentation. Dropping the returned future while it
    /// is queued removes the waiter atomically; no permit is leaked.
    pub async fn acquire_weighted(&self, size: usize) -> Result<BackPressureToken, PipelineError> {
        let entry = {
            let mut state = self.inner.state.lock();

            if state.active < self.inner.config.max_concurrency {
                state.active += 1;
                state.peak_active = state.peak_active.max(state.active);
                self.inner.acquires.fetch_add(1, Ordering::Relaxed);
                return Ok(BackPressureToken::new(self.inner.clone(), size));
            }

            let over_outstanding = self
                .inner
                .config
                .max_outstanding
                .is_some_and(|cap| state.active + state.queued_live + 1 > cap);
            let over_memory = self
                .inner
                .config
                .max_queue_memory
                .is_some_and(|cap| state.queued_bytes + size > cap);

            if over_outstanding || over_memory {
                match self.inner.config.strategy {
                    OverflowStrategy::Suspend => {
                        // Limits bound the rejecting strategies only; the
                        // caller queues and waits.
                    }
                    OverflowStrategy::DropNewest => {
                        self.inner.rejections.fetch_add(1, Ordering::Relaxed);
                        debug!(size, "submission rejected (drop-newest)");
                        return Err(PipelineError::back_pressure_full(format!(
                            "{} active, {} queued; submission rejected",
                            state.active, state.queued_live
                        )));
                    }
                    OverflowStrategy::Error => {
                        self.inner.rejections.fetch_add(1, Ordering::Relaxed);
                        return Err(PipelineError::queue_full(format!(
                            "queue bound reached with {} queued submissions",
                            state.queued_live
                        )));
                    }
                    OverflowStrategy::DropOldest => {
                        if !self.evict_for(&mut state, size) {
                            // Nothing to evict: fall back to rejecting the
                            // newcomer so the bounds hold.
                            self.inner.rejections.fetch_add(1, Ordering::Relaxed);
                            return Err(PipelineError::back_pressure_full(
                                "queue bound reached and no waiter is evictable",
                            ));
                        }
                    }
                }
            }

            let entry = Arc::new(WaitEntry {
                size,
                state: Mutex::new(EntryState {
                    phase: Phase::Waiting,
                    waker: None,
                }),
            });
            state.queue.push_back(entry.clone());
            state.queued_live += 1;
            state.queued_bytes += size;
            entry
        };

        AcquireFuture {
            inner: self.inner.clone(),
            entry,
            completed: false,
        }
        .await
    }

    /// Evicts live waiters from the queue front until a submission of
    /// `size` bytes fits within the limits. Returns false if the limits
    /// still cannot be met after the queue runs out of live waiters.
    /// Caller holds the state lock.
    fn evict_for(&self, state: &mut SemState, size: usize) -> bool {
        loop {
            let fits_outstanding = self
                .inner
                .config
                .max_outstanding
                .is_none_or(|cap| state.active + state.queued_live + 1 <= cap);
            let fits_memory = self
                .inner
                .config
                .max_queue_memory
                .is_none_or(|cap| state.queued_bytes + size <= cap);
            if fits_outstanding && fits_memory {
                return true;
            }

            // Find the oldest live waiter, discarding cancelled ghosts.
            let victim = loop {
                match state.queue.pop_front() {
                    Some(entry) => {
                        if matches!(entry.state.lock().phase, Phase::Waiting) {
                            break Some(entry);
                        }
                    }
                    None => break None,
                }
            };

            let Some(victim) = victim else {
                return false;
            };

            let mut victim_state = victim.state.lock();
            victim_state.phase = Phase::Evicted(PipelineError::back_pressure_dropped(
                "evicted from the wait queue by a newer submission",
            ));
            state.queued_live -= 1;
            state.queued_bytes -= victim.size;
            self.inner.drops.fetch_add(1, Ordering::Relaxed);
            warn!(victim_size = victim.size, "oldest waiter dropped under back-pressure");
            if let Some(waker) = victim_state.waker.take() {
                waker.wake();
            }
        }
    }

    /// Currently held tokens.
    pub fn active(&self) -> usize {
        self.inner.state.lock().active
    }

    /// Currently queued (live) waiters.
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queued_live
    }

    /// Sum of queued token sizes in bytes.
    pub fn queued_bytes(&self) -> usize {
        self.inner.state.lock().queued_bytes
    }

    /// Permits still available before saturation.
    pub fn available(&self) -> usize {
        let state = self.inner.state.lock();
        self.inner.config.max_concurrency - state.active
    }

    /// The construction configuration.
    pub fn config(&self) -> &BackPressureConfig {
        &self.inner.config
    }

    /// Immutable statistics snapshot.
    pub fn statistics(&self) -> BackPressureStatistics {
        let state = self.inner.state.lock();
        BackPressureStatistics {
            max_concurrency: self.inner.config.max_concurrency,
            active: state.active,
            queued: state.queued_live,
            queued_bytes: state.queued_bytes,
            peak_active: state.peak_active,
            acquires: self.inner.acquires.load(Ordering::Relaxed),
            releases: self.inner.releases.load(Ordering::Relaxed),
            rejections: self.inner.rejections.load(Ordering::Relaxed),
            drops: self.inner.drops.load(Ordering::Relaxed),
            cancellations: self.inner.cancellations.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for BackPressureSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.statistics();
        f.debug_struct("BackPressureSemaphore")
            .field("max_concurrency", &stats.max_concurrency)
            .field("active", &stats.active)
            .field("queued", &stats.queued)
            .finish_non_exhaustive()
    }
}
