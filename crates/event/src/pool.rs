//! EventPool - bounded free list of recyclable events
//!
//! The pool is the pipeline's primary backpressure mechanism: it holds
//! exactly `capacity` events, `acquire` suspends when all of them are in
//! flight, and `release` wakes one waiter. An input that awaits
//! `acquire` is therefore throttled to the speed of the slowest
//! downstream component.

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::event::Event;

#[cfg(test)]
#[path = "pool_test.rs"]
mod tests;

/// Bounded pool of preallocated events.
///
/// # Concurrency
///
/// `acquire` may be called from any number of tasks; a `tokio`
/// semaphore tracks free slots and the free list itself sits behind a
/// short-lived mutex. Closing the pool wakes every blocked acquirer
/// with `None`, which is how shutdown unblocks a stalled input.
pub struct EventPool {
    capacity: usize,
    slots: Semaphore,
    free: Mutex<Vec<Box<Event>>>,
}

impl EventPool {
    /// Preallocate `capacity` events.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "event pool capacity must be positive");
        let free = (0..capacity).map(|_| Box::new(Event::blank())).collect();
        Self {
            capacity,
            slots: Semaphore::new(capacity),
            free: Mutex::new(free),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events currently in the free list.
    #[inline]
    pub fn free_count(&self) -> usize {
        self.slots.available_permits()
    }

    /// True when every event is back in the free list.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.free_count() == self.capacity
    }

    /// Take an event, suspending while the pool is empty.
    ///
    /// Returns `None` only after [`EventPool::close`], so callers can
    /// use it as their shutdown signal.
    pub async fn acquire(&self) -> Option<Box<Event>> {
        let permit = self.slots.acquire().await.ok()?;
        permit.forget();
        Some(self.take_free())
    }

    /// Non-blocking acquire; `None` signals saturation (or a closed
    /// pool), which the caller must treat as "stop reading".
    pub fn try_acquire(&self) -> Option<Box<Event>> {
        let permit = self.slots.try_acquire().ok()?;
        permit.forget();
        Some(self.take_free())
    }

    /// Reset an event and return it to the free list, waking one
    /// blocked acquirer.
    pub fn release(&self, mut event: Box<Event>) {
        event.reset();
        self.free.lock().push(event);
        self.slots.add_permits(1);
    }

    /// Wake all blocked acquirers with `None`. Released events are
    /// still accepted afterwards so a draining pipeline can refill the
    /// pool.
    pub fn close(&self) {
        self.slots.close();
    }

    /// Restore one slot with a fresh event after a live one was lost
    /// inside a panicking action (the unwind consumed it).
    pub fn replenish(&self) {
        self.free.lock().push(Box::new(Event::blank()));
        self.slots.add_permits(1);
    }

    fn take_free(&self) -> Box<Event> {
        self.free
            .lock()
            .pop()
            .expect("semaphore permit held without a free event")
    }
}

impl std::fmt::Debug for EventPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPool")
            .field("capacity", &self.capacity)
            .field("free", &self.free_count())
            .finish()
    }
}
