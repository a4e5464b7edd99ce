use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::EventStage;

#[tokio::test]
async fn acquire_release_cycle() {
    let pool = EventPool::new(4);
    assert_eq!(pool.capacity(), 4);
    assert_eq!(pool.free_count(), 4);

    let e = pool.acquire().await.unwrap();
    assert_eq!(pool.free_count(), 3);

    pool.release(e);
    assert_eq!(pool.free_count(), 4);
    assert!(pool.is_full());
}

#[tokio::test]
async fn try_acquire_signals_saturation() {
    let pool = EventPool::new(2);
    let a = pool.try_acquire().unwrap();
    let b = pool.try_acquire().unwrap();
    assert!(pool.try_acquire().is_none());

    pool.release(a);
    assert!(pool.try_acquire().is_some());
    drop(b);
}

#[tokio::test]
async fn acquire_blocks_until_release() {
    let pool = Arc::new(EventPool::new(1));
    let held = pool.acquire().await.unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire().await })
    };

    // The waiter must not complete while the pool is empty.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    pool.release(held);
    let woken = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter should wake after release")
        .unwrap();
    assert!(woken.is_some());
}

#[tokio::test]
async fn release_wakes_exactly_one_waiter() {
    let pool = Arc::new(EventPool::new(1));
    let held = pool.acquire().await.unwrap();

    let mut waiters = Vec::new();
    for _ in 0..2 {
        let pool = Arc::clone(&pool);
        waiters.push(tokio::spawn(async move { pool.acquire().await }));
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    pool.release(held);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let finished = waiters.iter().filter(|w| w.is_finished()).count();
    assert_eq!(finished, 1);

    pool.close();
    for w in waiters {
        let _ = w.await;
    }
}

#[tokio::test]
async fn close_unblocks_acquirers() {
    let pool = Arc::new(EventPool::new(1));
    let _held = pool.acquire().await.unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    pool.close();
    let result = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("close should wake the waiter")
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn released_events_are_reset() {
    let pool = EventPool::new(1);
    let mut e = pool.acquire().await.unwrap();
    e.assign(9, 1, Arc::from("s"), 5, 10);
    e.set_root(serde_json::json!({"x": 1}));
    pool.release(e);

    let e = pool.acquire().await.unwrap();
    assert_eq!(e.seq(), 0);
    assert!(e.root().is_null());
    assert_eq!(e.stage(), EventStage::Free);
}
