//! Work queue paired with a completion barrier
//!
//! Every item pushed onto a [`WorkQueue`] is counted by the queue's
//! [`CompletionBarrier`] before it is sent, and stays counted until the
//! [`Claimed`] handle a worker received for it is dropped.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::barrier::CompletionBarrier;

/// Message travelling through the channel
enum Task<T> {
    Work(T),
    Stop,
}

/// Statistics for a work queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total items enqueued
    pub enqueued: AtomicU64,
    /// Total items fully processed
    pub completed: AtomicU64,
}

impl QueueStats {
    /// Items enqueued so far
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Items processed so far
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Unbounded FIFO of pending work with an outstanding-count barrier
#[derive(Debug)]
pub struct WorkQueue<T> {
    sender: Sender<Task<T>>,
    receiver: Receiver<Task<T>>,
    barrier: CompletionBarrier,
    stats: QueueStats,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            barrier: CompletionBarrier::new(),
            stats: QueueStats::default(),
        }
    }

    /// Enqueue one item, counting it as outstanding first
    pub fn push(&self, item: T) {
        self.barrier.add(1);
        if self.sender.send(Task::Work(item)).is_err() {
            // The queue owns its receiver, so this only happens during teardown
            self.barrier.complete();
            return;
        }
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Enqueue every item of `items`
    pub fn push_all(&self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.push(item);
        }
    }

    /// Block until an item is available
    ///
    /// Returns `None` once a stop message is received.
    pub fn pop(&self) -> Option<Claimed<'_, T>> {
        match self.receiver.recv() {
            Ok(Task::Work(item)) => Some(Claimed { item, queue: self }),
            Ok(Task::Stop) | Err(_) => None,
        }
    }

    /// Ask `workers` consumers to exit once they reach the stop message
    pub fn stop(&self, workers: usize) {
        for _ in 0..workers {
            // Cannot fail: the queue holds its own receiver
            let _ = self.sender.send(Task::Stop);
        }
    }

    /// Drop every item still queued, completing each one
    ///
    /// Returns the number of items discarded.
    pub fn discard_pending(&self) -> usize {
        let mut discarded = 0;
        while let Ok(task) = self.receiver.try_recv() {
            if let Task::Work(_) = task {
                self.finish_one();
                discarded += 1;
            }
        }
        discarded
    }

    /// The queue's completion barrier
    pub fn barrier(&self) -> &CompletionBarrier {
        &self.barrier
    }

    /// Items enqueued but not yet fully processed
    pub fn outstanding(&self) -> usize {
        self.barrier.outstanding()
    }

    /// Queue statistics
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Number of messages waiting in the channel
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Whether no messages are waiting in the channel
    ///
    /// This says nothing about completion: a worker may hold the last item.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    fn finish_one(&self) {
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        self.barrier.complete();
    }
}

/// An item taken from a [`WorkQueue`]
///
/// The item stays outstanding until this handle is dropped, so anything the
/// worker enqueues while holding it is registered before the count can fall.
pub struct Claimed<'a, T> {
    item: T,
    queue: &'a WorkQueue<T>,
}

impl<T> Claimed<'_, T> {
    /// Borrow the claimed item
    pub fn item(&self) -> &T {
        &self.item
    }
}

impl<T> Deref for Claimed<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item()
    }
}

impl<T> Drop for Claimed<'_, T> {
    fn drop(&mut self) {
        self.queue.finish_one();
    }
}
