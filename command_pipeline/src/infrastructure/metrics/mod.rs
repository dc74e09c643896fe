// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Infrastructure
//!
//! Execution history and observability surfaces:
//!
//! - [`execution_recorder`]: bounded in-memory execution history with
//!   typed queries, lifetime counters, and the async exporter hook

pub mod execution_recorder;

pub use execution_recorder::{ExecutionRecorder, RecorderConfig, RecorderStatistics};
