// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Execution Recorder
//!
//! This module keeps a bounded in-memory history of pipeline executions and
//! answers queries over it: by command type, by correlation id, by time
//! range, by success flag, and by record id.
//!
//! ## Overview
//!
//! - **Bounded ring**: at most `max_records` records are retained; when the
//!   bound is exceeded the oldest record is trimmed first (FIFO), along
//!   with its index entries
//! - **Indexes**: a per-command-type index and a failed-id set keep the
//!   common queries off the main ring
//! - **Lifetime counters**: totals survive `clear()` (which drops the
//!   retained records only) and are zeroed by `reset()`
//! - **Exporter hook**: async subscribers registered by UUID receive a
//!   statistics snapshot after each recorded execution, fanned out without
//!   blocking the recording path
//!
//! ## Concurrency
//!
//! The ring and indexes live behind one `parking_lot::Mutex`; records are
//! `Arc`-shared so queries return cheap clones without copying payloads.

use crate::infrastructure::runtime::supervisor::spawn_detached;
use chrono::{DateTime, Utc};
use command_pipeline_domain::value_objects::ExecutionId;
use command_pipeline_domain::{ExecutionRecord, PipelineError};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Construction inputs for [`ExecutionRecorder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Maximum retained records. Must be positive.
    pub max_records: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self { max_records: 1000 }
    }
}

impl RecorderConfig {
    /// Validates construction invariants.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_records == 0 {
            return Err(PipelineError::invalid_config("max_records must be positive"));
        }
        Ok(())
    }
}

/// Immutable statistics snapshot of an [`ExecutionRecorder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderStatistics {
    /// Records currently retained
    pub current_records: usize,
    /// Records ever recorded (survives `clear`, reset by `reset`)
    pub lifetime_recorded: u64,
    /// Failures ever recorded (survives `clear`, reset by `reset`)
    pub lifetime_failures: u64,
    /// Successes / lifetime recorded (1.0 when nothing recorded)
    pub success_rate: f64,
    /// Failures / lifetime recorded
    pub failure_rate: f64,
    /// Distinct command types among retained records
    pub command_type_count: usize,
    /// Mean duration of retained records, in milliseconds
    pub average_duration_ms: f64,
}

type ExporterFn = Arc<dyn Fn(RecorderStatistics) -> BoxFuture<'static, ()> + Send + Sync>;

struct RecorderState {
    records: VecDeque<Arc<ExecutionRecord>>,
    by_type: HashMap<String, VecDeque<Arc<ExecutionRecord>>>,
    failed_ids: HashSet<ExecutionId>,
}

impl RecorderState {
    fn empty() -> Self {
        Self {
            records: VecDeque::new(),
            by_type: HashMap::new(),
            failed_ids: HashSet::new(),
        }
    }

    fn trim_oldest(&mut self) {
        let Some(oldest) = self.records.pop_front() else {
            return;
        };
        if let Some(per_type) = self.by_type.get_mut(oldest.command_type()) {
            if let Some(position) = per_type.iter().position(|r| r.id() == oldest.id()) {
                per_type.remove(position);
            }
            if per_type.is_empty() {
                self.by_type.remove(oldest.command_type());
            }
        }
        self.failed_ids.remove(oldest.id());
    }
}

struct RecorderInner {
    config: RecorderConfig,
    state: Mutex<RecorderState>,
    lifetime_recorded: AtomicU64,
    lifetime_failures: AtomicU64,
    exporters: Mutex<HashMap<Uuid, ExporterFn>>,
}

/// Bounded in-memory execution history with typed queries. Cheap to clone;
/// clones share state.
#[derive(Clone)]
pub struct ExecutionRecorder {
    inner: Arc<RecorderInner>,
}

impl ExecutionRecorder {
    /// Creates a recorder with the default bound (1000 records).
    pub fn new() -> Self {
        Self::build(RecorderConfig::default())
    }

    /// Creates a recorder from a validated configuration.
    pub fn with_config(config: RecorderConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: RecorderConfig) -> Self {
        Self {
            inner: Arc::new(RecorderInner {
                config,
                state: Mutex::new(RecorderState::empty()),
                lifetime_recorded: AtomicU64::new(0),
                lifetime_failures: AtomicU64::new(0),
                exporters: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Appends a record, trimming the oldest when the bound is exceeded,
    /// and fans the updated statistics out to registered exporters.
    pub fn record(&self, record: ExecutionRecord) {
        let record = Arc::new(record);
        {
            let mut state = self.inner.state.lock();
            state
                .by_type
                .entry(record.command_type().to_string())
                .or_default()
                .push_back(record.clone());
            if !record.is_success() {
                state.failed_ids.insert(record.id().clone());
            }
            state.records.push_back(record.clone());
            while state.records.len() > self.inner.config.max_records {
                state.trim_oldest();
            }
        }
        self.inner.lifetime_recorded.fetch_add(1, Ordering::Relaxed);
        if !record.is_success() {
            self.inner.lifetime_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.notify_exporters();
    }

    /// The `count` newest records, newest first.
    pub fn recent(&self, count: usize) -> Vec<Arc<ExecutionRecord>> {
        let state = self.inner.state.lock();
        state.records.iter().rev().take(count).cloned().collect()
    }

    /// Every retained record, oldest first.
    pub fn all(&self) -> Vec<Arc<ExecutionRecord>> {
        let state = self.inner.state.lock();
        state.records.iter().cloned().collect()
    }

    /// The `count` newest records of one command type, newest first.
    pub fn for_command_type(&self, command_type: &str, count: usize) -> Vec<Arc<ExecutionRecord>> {
        let state = self.inner.state.lock();
        state
            .by_type
            .get(command_type)
            .map(|records| records.iter().rev().take(count).cloned().collect())
            .unwrap_or_default()
    }

    /// The `count` newest failed records, newest first.
    pub fn failures(&self, count: usize) -> Vec<Arc<ExecutionRecord>> {
        let state = self.inner.state.lock();
        state
            .records
            .iter()
            .rev()
            .filter(|record| !record.is_success())
            .take(count)
            .cloned()
            .collect()
    }

    /// The `count` newest successful records, newest first.
    pub fn successes(&self, count: usize) -> Vec<Arc<ExecutionRecord>> {
        let state = self.inner.state.lock();
        state
            .records
            .iter()
            .rev()
            .filter(|record| record.is_success())
            .take(count)
            .cloned()
            .collect()
    }

    /// Records whose start time falls within `[from, to]`, oldest first.
    pub fn in_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Arc<ExecutionRecord>> {
        let state = self.inner.state.lock();
        state
            .records
            .iter()
            .filter(|record| record.started_at() >= from && record.started_at() <= to)
            .cloned()
            .collect()
    }

    /// Records carrying the given correlation id, oldest first.
    pub fn with_correlation_id(&self, correlation_id: &str) -> Vec<Arc<ExecutionRecord>> {
        let state = self.inner.state.lock();
        state
            .records
            .iter()
            .filter(|record| record.correlation_id() == Some(correlation_id))
            .cloned()
            .collect()
    }

    /// The record with the given id, if retained.
    pub fn by_id(&self, id: &ExecutionId) -> Option<Arc<ExecutionRecord>> {
        let state = self.inner.state.lock();
        state.records.iter().find(|record| record.id() == id).cloned()
    }

    /// Records currently retained.
    pub fn len(&self) -> usize {
        self.inner.state.lock().records.len()
    }

    /// Whether no records are retained.
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().records.is_empty()
    }

    /// Immutable statistics snapshot.
    pub fn statistics(&self) -> RecorderStatistics {
        let state = self.inner.state.lock();
        let lifetime_recorded = self.inner.lifetime_recorded.load(Ordering::Relaxed);
        let lifetime_failures = self.inner.lifetime_failures.load(Ordering::Relaxed);
        let total_duration_ms: f64 = state
            .records
            .iter()
            .map(|record| record.duration().as_secs_f64() * 1000.0)
            .sum();
        RecorderStatistics {
            current_records: state.records.len(),
            lifetime_recorded,
            lifetime_failures,
            success_rate: if lifetime_recorded > 0 {
                (lifetime_recorded - lifetime_failures) as f64 / lifetime_recorded as f64
            } else {
                1.0
            },
            failure_rate: if lifetime_recorded > 0 {
                lifetime_failures as f64 / lifetime_recorded as f64
            } else {
                0.0
            },
            command_type_count: state.by_type.len(),
            average_duration_ms: if state.records.is_empty() {
                0.0
            } else {
                total_duration_ms / state.records.len() as f64
            },
        }
    }

    /// Drops the retained records and indexes, preserving lifetime
    /// counters.
    pub fn clear(&self) {
        *self.inner.state.lock() = RecorderState::empty();
    }

    /// Drops everything, including lifetime counters.
    pub fn reset(&self) {
        *self.inner.state.lock() = RecorderState::empty();
        self.inner.lifetime_recorded.store(0, Ordering::Relaxed);
        self.inner.lifetime_failures.store(0, Ordering::Relaxed);
    }

    /// Registers an async exporter receiving a statistics snapshot after
    /// each recorded execution. Returns its registration id.
    ///
    /// Exporters run as detached tasks; recording never waits on them.
    /// Requires a tokio runtime at recording time.
    pub fn register_exporter<F, Fut>(&self, exporter: F) -> Uuid
    where
        F: Fn(RecorderStatistics) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let erased: ExporterFn = Arc::new(move |snapshot| Box::pin(exporter(snapshot)));
        self.inner.exporters.lock().insert(id, erased);
        id
    }

    /// Removes an exporter by registration id. Returns whether it was
    /// present.
    pub fn unregister_exporter(&self, id: Uuid) -> bool {
        self.inner.exporters.lock().remove(&id).is_some()
    }

    fn notify_exporters(&self) {
        let exporters: Vec<ExporterFn> = {
            let exporters = self.inner.exporters.lock();
            if exporters.is_empty() {
                return;
            }
            exporters.values().cloned().collect()
        };
        let snapshot = self.statistics();
        for exporter in exporters {
            spawn_detached("recorder-exporter", exporter(snapshot.clone()));
        }
    }
}

impl Default for ExecutionRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutionRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRecorder")
            .field("current_records", &self.len())
            .field("max_records", &self.inner.config.max_records)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn success_record(command_type: &str) -> ExecutionRecord {
        let now = Utc::now();
        ExecutionRecord::success(command_type, Uuid::new_v4(), None, now, now, Vec::new())
    }

    fn failure_record(command_type: &str) -> ExecutionRecord {
        let now = Utc::now();
        ExecutionRecord::failure(
            command_type,
            Uuid::new_v4(),
            None,
            now,
            now,
            Vec::new(),
            &PipelineError::handler_error("boom"),
        )
    }

    #[test]
    fn test_config_validation() {
        assert!(RecorderConfig { max_records: 0 }.validate().is_err());
        assert!(RecorderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_record_and_query_order() {
        let recorder = ExecutionRecorder::new();
        recorder.record(success_record("A"));
        recorder.record(success_record("B"));
        recorder.record(success_record("A"));

        let all = recorder.all();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].command_type(), "A"); // oldest first

        let recent = recorder.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].command_type(), "A"); // newest first
        assert_eq!(recent[1].command_type(), "B");

        assert_eq!(recorder.for_command_type("A", 10).len(), 2);
        assert_eq!(recorder.for_command_type("missing", 10).len(), 0);
    }

    #[test]
    fn test_bound_trims_oldest_first() {
        let recorder = ExecutionRecorder::with_config(RecorderConfig { max_records: 3 }).unwrap();
        for name in ["a", "b", "c", "d", "e"] {
            recorder.record(success_record(name));
        }
        assert_eq!(recorder.len(), 3);
        let all = recorder.all();
        let names: Vec<&str> = all.iter().map(|r| r.command_type()).collect();
        assert_eq!(names, vec!["c", "d", "e"]);
        // Trimmed types leave the index entirely
        assert_eq!(recorder.for_command_type("a", 10).len(), 0);
        assert_eq!(recorder.statistics().command_type_count, 3);
    }

    #[test]
    fn test_failures_and_successes() {
        let recorder = ExecutionRecorder::new();
        recorder.record(success_record("A"));
        recorder.record(failure_record("A"));
        recorder.record(failure_record("B"));

        assert_eq!(recorder.failures(10).len(), 2);
        assert_eq!(recorder.successes(10).len(), 1);
        assert_eq!(recorder.failures(1).len(), 1);
        assert_eq!(recorder.failures(1)[0].command_type(), "B"); // newest first
    }

    #[test]
    fn test_correlation_and_id_lookup() {
        let recorder = ExecutionRecorder::new();
        let now = Utc::now();
        let record = ExecutionRecord::success("A", Uuid::new_v4(), Some("corr-9".into()), now, now, Vec::new());
        let id = record.id().clone();
        recorder.record(record);
        recorder.record(success_record("B"));

        assert_eq!(recorder.with_correlation_id("corr-9").len(), 1);
        assert_eq!(recorder.with_correlation_id("other").len(), 0);
        assert!(recorder.by_id(&id).is_some());
        assert!(recorder.by_id(&ExecutionId::new()).is_none());
    }

    #[test]
    fn test_time_range_query() {
        let recorder = ExecutionRecorder::new();
        let base = Utc::now();
        for offset in [0, 10, 20] {
            let started = base + chrono::Duration::seconds(offset);
            recorder.record(ExecutionRecord::success(
                "A",
                Uuid::new_v4(),
                None,
                started,
                started,
                Vec::new(),
            ));
        }
        let hits = recorder.in_range(base + chrono::Duration::seconds(5), base + chrono::Duration::seconds(15));
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_statistics() {
        let recorder = ExecutionRecorder::new();
        recorder.record(success_record("A"));
        recorder.record(success_record("B"));
        recorder.record(failure_record("B"));

        let stats = recorder.statistics();
        assert_eq!(stats.current_records, 3);
        assert_eq!(stats.lifetime_recorded, 3);
        assert_eq!(stats.lifetime_failures, 1);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.command_type_count, 2);
    }

    #[test]
    fn test_clear_preserves_lifetime_counters() {
        let recorder = ExecutionRecorder::new();
        recorder.record(success_record("A"));
        recorder.record(failure_record("A"));

        recorder.clear();
        assert!(recorder.is_empty());
        let stats = recorder.statistics();
        assert_eq!(stats.lifetime_recorded, 2);
        assert_eq!(stats.lifetime_failures, 1);

        recorder.reset();
        let stats = recorder.statistics();
        assert_eq!(stats.lifetime_recorded, 0);
        assert_eq!(stats.lifetime_failures, 0);
    }

    #[tokio::test]
    async fn test_exporter_receives_snapshots() {
        let recorder = ExecutionRecorder::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        let id = recorder.register_exporter(move |snapshot| {
            let seen = seen_clone.clone();
            async move {
                seen.lock().push(snapshot.lifetime_recorded);
            }
        });

        recorder.record(success_record("A"));
        recorder.record(success_record("A"));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        {
            let mut seen = seen.lock();
            seen.sort_unstable();
            assert_eq!(*seen, vec![1, 2]);
        }

        assert!(recorder.unregister_exporter(id));
        recorder.record(success_record("A"));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(seen.lock().len(), 2);
    }

    proptest! {
        #[test]
        fn prop_record_bound_always_holds(max in 1usize..20, count in 0usize..60) {
            let recorder = ExecutionRecorder::with_config(RecorderConfig { max_records: max }).unwrap();
            for i in 0..count {
                recorder.record(success_record(&format!("T{}", i % 5)));
            }
            prop_assert!(recorder.len() <= max);
            prop_assert_eq!(recorder.statistics().lifetime_recorded, count as u64);
        }
    }
}
