use std::sync::Arc;
use std::time::Duration;

use sluice_event::EventPool;

use super::*;

fn event(pool: &EventPool, source_id: u64, name: &str, offset: i64) -> Box<Event> {
    let mut e = pool.try_acquire().expect("pool exhausted in test");
    e.assign(offset as u64, source_id, Arc::from(name), offset, 10);
    e
}

#[test]
fn streams_are_created_lazily_and_cached() {
    let streams = StreamPool::new();
    let a = streams.get_or_create(1, "a");
    let again = streams.get_or_create(1, "a");
    let b = streams.get_or_create(1, "b");

    assert!(Arc::ptr_eq(&a, &again));
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(streams.stream_count(), 2);
}

#[test]
fn push_interns_the_stream_name() {
    let pool = EventPool::new(4);
    let streams = StreamPool::new();
    streams.push(event(&pool, 1, "a", 10));
    streams.push(event(&pool, 1, "a", 20));

    assert_eq!(streams.stream_count(), 1);
    assert_eq!(streams.total_queued(), 2);
}

#[tokio::test]
async fn next_ready_returns_pushed_stream() {
    let pool = EventPool::new(4);
    let streams = StreamPool::new();
    streams.push(event(&pool, 1, "a", 10));

    let stream = streams.next_ready().await;
    assert_eq!(stream.name().as_ref(), "a");
    assert_eq!(stream.pop_head().unwrap().offset(), 10);
    streams.release(stream);
}

#[tokio::test]
async fn ready_queue_is_fifo_across_streams() {
    let pool = EventPool::new(8);
    let streams = StreamPool::new();
    streams.push(event(&pool, 1, "a", 10));
    streams.push(event(&pool, 1, "b", 15));
    streams.push(event(&pool, 1, "c", 17));

    let first = streams.next_ready().await;
    let second = streams.next_ready().await;
    let third = streams.next_ready().await;
    assert_eq!(first.name().as_ref(), "a");
    assert_eq!(second.name().as_ref(), "b");
    assert_eq!(third.name().as_ref(), "c");
}

#[tokio::test]
async fn busy_stream_requeues_behind_others() {
    let pool = EventPool::new(8);
    let streams = StreamPool::new();
    streams.push(event(&pool, 1, "loud", 10));
    streams.push(event(&pool, 1, "loud", 20));
    streams.push(event(&pool, 1, "quiet", 15));

    let loud = streams.next_ready().await;
    assert_eq!(loud.name().as_ref(), "loud");
    let _ = loud.pop_head();
    streams.release(loud);

    // "quiet" was already queued, so it goes first; "loud" re-entered
    // at the tail.
    let next = streams.next_ready().await;
    assert_eq!(next.name().as_ref(), "quiet");
    let after = streams.next_ready().await;
    assert_eq!(after.name().as_ref(), "loud");
}

#[tokio::test]
async fn next_ready_waits_for_work() {
    let pool = EventPool::new(4);
    let streams = Arc::new(StreamPool::new());

    let waiter = {
        let streams = Arc::clone(&streams);
        tokio::spawn(async move { streams.next_ready().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    streams.push(event(&pool, 1, "a", 10));
    let stream = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("push should wake the waiter")
        .unwrap();
    assert_eq!(stream.name().as_ref(), "a");
}

#[test]
fn ack_routes_to_the_right_stream() {
    let pool = EventPool::new(8);
    let streams = StreamPool::new();
    streams.push(event(&pool, 1, "a", 10));
    streams.push(event(&pool, 1, "b", 15));

    assert_eq!(streams.ack(1, "a", 10), vec![10]);
    assert_eq!(streams.ack(1, "b", 15), vec![15]);
    assert!(streams.ack(9, "ghost", 1).is_empty());
}

#[test]
fn drain_accounting_spans_streams() {
    let pool = EventPool::new(8);
    let streams = StreamPool::new();
    assert!(streams.is_drained());

    streams.push(event(&pool, 1, "a", 10));
    streams.push(event(&pool, 2, "b", 20));
    assert_eq!(streams.total_queued(), 2);
    assert_eq!(streams.total_inflight(), 2);
    assert!(!streams.is_drained());
}
