// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Background Task Supervision
//!
//! Spawn helpers for the two background shapes the framework runs:
//!
//! - [`spawn_supervised`]: a long-running maintenance task (the registry
//!   sweeper) whose handle is retained solely to abort it at shutdown.
//!   The framework never joins these tasks, so the outcome is consumed
//!   here: success and failure both land in the logs
//! - [`spawn_detached`]: fire-and-forget fan-out work (memory-pressure
//!   handlers, recorder exporters) where not even an abort handle is kept
//!
//! Either way a background failure is visible in the logs instead of
//! vanishing with the task.

use command_pipeline_domain::PipelineError;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Spawns a named maintenance task, logging its lifecycle and consuming
/// its outcome.
///
/// The returned handle exists for shutdown: callers store it and `abort()`
/// it when tearing down (see `PoolRegistry::shutdown`). Because nothing
/// joins the task, a failing future is not propagated; it is logged at
/// error level and the task ends.
///
/// ## Example
///
/// ```ignore
/// let sweeper = spawn_supervised("pool-registry-sweeper", async move {
///     loop {
///         tokio::time::sleep(interval).await;
///         core.sweep_dead();
///     }
/// });
/// // later, at shutdown:
/// sweeper.abort();
/// ```
pub fn spawn_supervised<F>(name: &'static str, fut: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), PipelineError>> + Send + 'static,
{
    debug!(task = name, "background task starting");

    tokio::spawn(async move {
        match fut.await {
            Ok(()) => debug!(task = name, "background task finished"),
            Err(error) => error!(task = name, error = %error, "background task failed"),
        }
    })
}

/// Spawns a fire-and-forget task whose completion is logged but whose
/// handle is discarded.
///
/// This is the sanctioned escape hatch for fan-out paths that must not
/// block the notifier (memory-pressure handlers, metrics exporters). The
/// task's lifecycle is still visible in the logs.
pub fn spawn_detached<F>(name: &'static str, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        debug!(task = name, "detached task starting");
        fut.await;
        debug!(task = name, "detached task finished");
    });
}
