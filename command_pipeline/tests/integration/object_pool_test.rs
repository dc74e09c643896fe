// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Object pool lifecycle through the registry and memory-pressure path.

use command_pipeline::{
    MemoryPressureDetector, MemoryPressureLevel, ObjectPool, PoolConfig, PoolRegistry, RegistryConfig,
};
use std::time::Duration;

struct Buf {
    data: Vec<u8>,
}

fn buffer_pool(registry: &PoolRegistry, name: &str, max: usize) -> ObjectPool<Buf> {
    ObjectPool::with_registry(
        name,
        PoolConfig::with_max_size(max),
        || Buf {
            data: Vec::with_capacity(1024),
        },
        |buf| buf.data.clear(),
        registry,
    )
    .unwrap()
}

#[tokio::test]
async fn raii_return_increments_available() {
    let registry = PoolRegistry::with_config(RegistryConfig::default()).unwrap();
    let pool = buffer_pool(&registry, "bufs", 8);

    let before = pool.statistics().currently_available;
    {
        let mut buf = pool.acquire_pooled().await.unwrap();
        buf.data.extend_from_slice(b"scratch");
    }
    let after = pool.statistics().currently_available;
    assert_eq!(after, before + 1);

    // The returned buffer was reset on the way back.
    let buf = pool.acquire_pooled().await.unwrap();
    assert!(buf.data.is_empty());
}

#[tokio::test]
async fn fairness_waiters_resume_in_fifo_order() {
    let registry = PoolRegistry::with_config(RegistryConfig::default()).unwrap();
    let pool = buffer_pool(&registry, "contended", 1);

    let held = pool.acquire().await.unwrap();
    let order = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..3u32 {
        let pool = pool.clone();
        let order = order.clone();
        handles.push(tokio::spawn(async move {
            let buf = pool.acquire().await.unwrap();
            order.lock().push(i);
            pool.release(buf);
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    pool.release(held);
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[tokio::test]
async fn registry_aggregates_across_pools() {
    let registry = PoolRegistry::with_config(RegistryConfig::default()).unwrap();
    let small = buffer_pool(&registry, "small", 2);
    let large = buffer_pool(&registry, "large", 16);

    let a = small.acquire().await.unwrap();
    small.release(a);
    let a = small.acquire().await.unwrap();
    small.release(a);
    let b = large.acquire().await.unwrap();
    large.release(b);

    let aggregated = registry.aggregated_statistics();
    assert_eq!(aggregated.pool_count, 2);
    assert_eq!(aggregated.total_acquisitions, 3);
    assert_eq!(aggregated.total_allocated, 2);
    assert_eq!(aggregated.total_in_use, 0);
}

#[tokio::test]
async fn pressure_event_shrinks_pools_end_to_end() {
    let registry = PoolRegistry::with_config(RegistryConfig::default()).unwrap();
    let detector = MemoryPressureDetector::new();
    registry.enable_memory_pressure_handling_with(&detector);

    let pool = buffer_pool(&registry, "pressured", 20);
    pool.preallocate(20);
    assert_eq!(pool.available_count(), 20);

    detector.report(MemoryPressureLevel::Critical);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // No demand history: critical falls back to 25% of capacity.
    assert_eq!(pool.available_count(), 5);

    registry.shutdown();
}

#[tokio::test]
async fn throttled_shrinks_are_counted_and_dropped() {
    let registry = PoolRegistry::with_config(RegistryConfig {
        min_shrink_interval: Duration::from_secs(120),
        ..RegistryConfig::default()
    })
    .unwrap();
    let pool = buffer_pool(&registry, "throttled", 10);
    pool.preallocate(10);

    assert_eq!(pool.shrink_to(6), 4);
    assert_eq!(pool.shrink_to(2), 0); // throttled
    assert_eq!(pool.available_count(), 6);
    assert_eq!(pool.statistics().throttled_shrinks, 1);

    // Registry-forced shrinks bypass the throttle.
    assert_eq!(registry.shrink_pool("throttled", 2, true), Some(4));
    assert_eq!(pool.available_count(), 2);
}
