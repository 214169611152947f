//! Outstanding-work barrier
//!
//! The count is incremented when an item is enqueued and decremented only
//! once the item has been fully processed, including any items it enqueued
//! itself. The queue can look empty while a worker still holds the last
//! item, so completion is decided by the count, never by queue emptiness.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Outcome of waiting on a barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierWait {
    /// The outstanding count reached zero
    Drained,
    /// The barrier was interrupted before draining
    Interrupted,
    /// The timeout elapsed with work still outstanding
    Pending,
}

/// Counts enqueued-but-unfinished work and lets a waiter block until it drains
#[derive(Debug, Default)]
pub struct CompletionBarrier {
    outstanding: AtomicUsize,
    interrupted: AtomicBool,
    lock: Mutex<()>,
    drained: Condvar,
}

impl CompletionBarrier {
    /// Create a drained barrier
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `n` new outstanding items
    ///
    /// Must be called before the items become visible to workers.
    pub fn add(&self, n: usize) {
        self.outstanding.fetch_add(n, Ordering::SeqCst);
    }

    /// Mark one item as fully processed
    pub fn complete(&self) {
        let previous = self.outstanding.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "barrier completed more items than were added");
        if previous == 1 {
            self.notify();
        }
    }

    /// Number of items still outstanding
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Wake every waiter and make further waits return `Interrupted`
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.notify();
    }

    /// Whether [`CompletionBarrier::interrupt`] was called
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Block until the count reaches zero or the barrier is interrupted
    pub fn wait(&self) -> BarrierWait {
        let mut guard = self.lock.lock();
        loop {
            if let Some(state) = self.settled() {
                return state;
            }
            self.drained.wait(&mut guard);
        }
    }

    /// Like [`CompletionBarrier::wait`], but gives up after `timeout`
    pub fn wait_for(&self, timeout: Duration) -> BarrierWait {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock.lock();
        loop {
            if let Some(state) = self.settled() {
                return state;
            }
            if self.drained.wait_until(&mut guard, deadline).timed_out() {
                return self.settled().unwrap_or(BarrierWait::Pending);
            }
        }
    }

    fn settled(&self) -> Option<BarrierWait> {
        if self.is_interrupted() {
            Some(BarrierWait::Interrupted)
        } else if self.outstanding() == 0 {
            Some(BarrierWait::Drained)
        } else {
            None
        }
    }

    // Taking the lock orders the notification after any waiter's check.
    fn notify(&self) {
        let _guard = self.lock.lock();
        self.drained.notify_all();
    }
}
