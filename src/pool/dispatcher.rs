//! Batch dispatcher.
//!
//! The dispatcher owns a fixed-capacity slot buffer, three batch counters
//! and the persistent worker threads. Producers fill a batch with
//! [`Dispatcher::enqueue`], then [`Dispatcher::run`] wakes the workers,
//! blocks until every item has been processed and resets the counters so the
//! same pool can take the next batch.
//!
//! The hot path is lock-free: `total` and `claimed` share one atomic word so
//! a worker's claim is a single bounded compare-and-swap that can never move
//! `claimed` past `total`, and `completed` is a plain atomic counter. The
//! mutex and the two condvars (`request` for idle workers, `response` for
//! the `run` caller) are used only for sleeping, waking and the batch reset.

use crate::pool::Worker;
use crate::{ErrorKind, Result};
use std::cell::UnsafeCell;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

/// Increment for the `total` half of the packed counter word.
const TOTAL_UNIT: u64 = 1 << 32;

fn total_of(word: u64) -> usize {
    (word >> 32) as usize
}

fn claimed_of(word: u64) -> usize {
    (word & (TOTAL_UNIT - 1)) as usize
}

/// State shared between the dispatcher handle and its worker threads.
///
/// * `running` - cleared once by `shutdown`, never set again
/// * `queue`   - slot storage, written once per slot per batch
/// * `state`   - packed word: `total` (high half), `claimed` (low half)
/// * `reserved`- producer-side slot cursor, runs ahead of `total`
/// * `completed` - items fully processed this batch
/// * `request` - condvar idle workers sleep on
/// * `response`- condvar the `run` caller sleeps on
struct Shared<T> {
    running: AtomicBool,
    queue: Vec<UnsafeCell<T>>,
    state: AtomicU64,
    reserved: AtomicUsize,
    completed: AtomicUsize,
    mutex: Mutex<()>,
    request: Condvar,
    response: Condvar,
}

// Slot access is disjoint by construction: a producer writes queue[i] only
// while holding the reservation for i and before publishing it via `total`;
// the one worker whose claim returned i reads it only after that publish.
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    /// Reserve the next free slot for a producer, or `None` when the batch
    /// is full. Reservations are exclusive even under concurrent producers.
    fn reserve(&self) -> Option<usize> {
        let mut slot = self.reserved.load(Ordering::SeqCst);
        loop {
            if slot == self.queue.len() {
                return None;
            }
            match self.reserved.compare_exchange_weak(
                slot,
                slot + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Some(slot),
                Err(cur) => slot = cur,
            }
        }
    }

    /// Publish a written slot by advancing `total` past it, in reservation
    /// order. A worker that observes the new `total` is guaranteed to see
    /// the fully written slot.
    fn publish(&self, slot: usize) {
        while total_of(self.state.load(Ordering::SeqCst)) != slot {
            std::hint::spin_loop();
        }
        self.state.fetch_add(TOTAL_UNIT, Ordering::SeqCst);
    }

    /// Claim the next unclaimed slot index, or `None` when the batch has no
    /// unclaimed work. `total` and `claimed` live in one word, so the claim
    /// validates `claimed < total` and advances `claimed` in a single
    /// compare-and-swap: `claimed` can never move past `total`, and a stale
    /// claim attempt spanning a batch reset fails because the word changed.
    fn claim(&self) -> Option<usize> {
        let mut word = self.state.load(Ordering::SeqCst);
        loop {
            if claimed_of(word) >= total_of(word) {
                return None;
            }
            match self.state.compare_exchange_weak(
                word,
                word + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Some(claimed_of(word)),
                Err(cur) => word = cur,
            }
        }
    }

    /// Count one item as processed; wake the `run` caller on the last one.
    fn complete(&self) {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if completed == total_of(self.state.load(Ordering::SeqCst)) {
            // take the lock so the wakeup cannot slip between run()'s
            // predicate check and its wait
            let _guard = self.mutex.lock().unwrap();
            self.response.notify_one();
        }
    }

    /// Sleep until there is unclaimed work or the pool shuts down. Spurious
    /// wakeups are fine: the predicate is re-checked under the mutex.
    fn sleep(&self) {
        let mut guard = self.mutex.lock().unwrap();
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            let word = self.state.load(Ordering::SeqCst);
            if claimed_of(word) < total_of(word) {
                return;
            }
            guard = self.request.wait(guard).unwrap();
        }
    }
}

/// Increments `completed` when dropped, so an item counts as processed even
/// if the worker panics out of `process` and the thread unwinds.
struct CompletionGuard<'a, T>(&'a Shared<T>);

impl<T> Drop for CompletionGuard<'_, T> {
    fn drop(&mut self) {
        self.0.complete();
    }
}

/// Persistent per-thread mainloop: claim and process items while there is
/// unclaimed work, sleep otherwise, exit when the pool shuts down. The
/// factory runs once here, so the worker instance lives and dies on this
/// thread and its state never has to cross threads.
fn mainloop<T, W, F>(id: usize, shared: &Shared<T>, factory: &F)
where
    W: Worker<T>,
    F: Fn() -> W,
{
    let mut worker = factory();
    log::debug!("worker-{}: started", id);

    while shared.running.load(Ordering::SeqCst) {
        match shared.claim() {
            Some(index) => {
                log::trace!("worker-{}: workitem={}", id, index);
                // Exclusive: no other thread touches this slot until the
                // batch resets, and the reset waits on `complete` below.
                let item = unsafe { &mut *shared.queue[index].get() };
                let completion = CompletionGuard(shared);
                worker.process(item);
                drop(completion);
            }
            None => shared.sleep(),
        }
    }

    log::debug!("worker-{}: exited", id);
}

struct WorkerThread {
    id: usize,
    handle: Option<thread::JoinHandle<()>>,
}

impl WorkerThread {
    fn spawn<T, W, F>(id: usize, shared: Arc<Shared<T>>, factory: Arc<F>) -> io::Result<Self>
    where
        T: Send + 'static,
        W: Worker<T> + 'static,
        F: Fn() -> W + Send + Sync + 'static,
    {
        let handle = thread::Builder::new()
            .name(format!("workpool-{}", id))
            .spawn(move || mainloop(id, &shared, &*factory))?;
        Ok(Self {
            id,
            handle: Some(handle),
        })
    }
}

/// Fixed-size, reusable worker pool over items of type `T`.
///
/// Items are processed exactly once each, in unspecified order, by whichever
/// worker thread claims them. [`run`](Dispatcher::run) is a barrier, not a
/// sequencer: it returns only after every enqueued item has completed.
pub struct Dispatcher<T> {
    shared: Arc<Shared<T>>,
    workers: Vec<WorkerThread>,
}

impl<T: Default + Send + 'static> Dispatcher<T> {
    /// Create a pool with `threads` worker threads and a pre-allocated queue
    /// of `capacity` item slots. Each thread calls `factory` exactly once to
    /// obtain its own [`Worker`] instance.
    ///
    /// A pool with zero threads or zero capacity is degenerate but safe:
    /// enqueues beyond capacity fail and [`run`](Dispatcher::run) returns
    /// immediately instead of deadlocking.
    ///
    /// # Errors
    ///
    /// Returns an error if `capacity` exceeds `u32::MAX` or if a thread
    /// fails to spawn. All previously-spawned threads are signalled and
    /// joined before the error is returned.
    pub fn new<W, F>(threads: usize, capacity: usize, factory: F) -> Result<Self>
    where
        W: Worker<T> + 'static,
        F: Fn() -> W + Send + Sync + 'static,
    {
        if capacity > u32::MAX as usize {
            return Err(ErrorKind::CapacityTooLarge(capacity));
        }

        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            queue: (0..capacity).map(|_| UnsafeCell::new(T::default())).collect(),
            state: AtomicU64::new(0),
            reserved: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            mutex: Mutex::new(()),
            request: Condvar::new(),
            response: Condvar::new(),
        });

        let factory = Arc::new(factory);
        let mut workers = Vec::with_capacity(threads);
        for id in 0..threads {
            match WorkerThread::spawn(id, Arc::clone(&shared), Arc::clone(&factory)) {
                Ok(worker) => workers.push(worker),
                Err(err) => {
                    let mut pool = Dispatcher { shared, workers };
                    pool.shutdown();
                    return Err(err.into());
                }
            }
        }

        Ok(Self { shared, workers })
    }
}

impl<T> Dispatcher<T> {
    /// Append one item to the current batch.
    ///
    /// Returns `false` when the batch is full or the pool has been shut
    /// down; the caller can retry after a [`run`](Dispatcher::run) cycle.
    /// Safe under concurrent producers: each successful call owns a distinct
    /// slot. An idle worker may start on the item before `run` is called.
    pub fn enqueue(&self, item: T) -> bool {
        let shared = &self.shared;
        if !shared.running.load(Ordering::SeqCst) {
            return false;
        }
        let slot = match shared.reserve() {
            Some(slot) => slot,
            None => return false,
        };
        // Reserved and unpublished, so no other thread reads or writes it.
        unsafe {
            *shared.queue[slot].get() = item;
        }
        shared.publish(slot);
        // Best effort: a wakeup lost here only delays the item until the
        // broadcast in run().
        shared.request.notify_one();
        true
    }

    /// Block until every enqueued item has been processed, then reset the
    /// batch so the pool can be refilled.
    ///
    /// Returns immediately when the pool has no worker threads or the batch
    /// is empty. Completion order across workers is unspecified.
    pub fn run(&self) {
        let shared = &self.shared;
        if self.workers.is_empty() {
            return;
        }

        let mut guard = shared.mutex.lock().unwrap();
        if total_of(shared.state.load(Ordering::SeqCst)) == 0 {
            return;
        }

        // Workers woken by enqueue may have drained the batch already; the
        // wait loop then falls through straight to the reset.
        shared.request.notify_all();
        while shared.completed.load(Ordering::SeqCst)
            < total_of(shared.state.load(Ordering::SeqCst))
        {
            guard = shared.response.wait(guard).unwrap();
        }

        // Batch drained and every worker is either asleep or between items;
        // reset under the lock so no sleeper re-checks mid-reset.
        shared.state.store(0, Ordering::SeqCst);
        shared.reserved.store(0, Ordering::SeqCst);
        shared.completed.store(0, Ordering::SeqCst);
    }

    /// Stop and join all worker threads. One-shot: the pool cannot be
    /// restarted, and every subsequent [`enqueue`](Dispatcher::enqueue)
    /// returns `false`. Calling it again is a no-op. In-flight items finish;
    /// enqueued-but-unclaimed items are abandoned.
    pub fn shutdown(&mut self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            // lock so no worker is between its predicate check and its wait
            let _guard = self.shared.mutex.lock().unwrap();
            self.shared.request.notify_all();
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                log::debug!("joining worker-{}", worker.id);
                if handle.join().is_err() {
                    log::error!("worker-{} exited by panic", worker.id);
                }
            }
        }
    }

    /// Number of item slots in the queue.
    pub fn capacity(&self) -> usize {
        self.shared.queue.len()
    }

    /// Number of items enqueued in the current batch.
    pub fn len(&self) -> usize {
        total_of(self.shared.state.load(Ordering::SeqCst))
    }

    /// Whether the current batch is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of worker threads the pool was built with.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }
}

impl<T> Drop for Dispatcher<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_shared(capacity: usize) -> Shared<usize> {
        Shared {
            running: AtomicBool::new(true),
            queue: (0..capacity).map(|_| UnsafeCell::new(0)).collect(),
            state: AtomicU64::new(0),
            reserved: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            mutex: Mutex::new(()),
            request: Condvar::new(),
            response: Condvar::new(),
        }
    }

    #[test]
    fn packed_word_halves() {
        let word = 3 * TOTAL_UNIT + 2;
        assert_eq!(total_of(word), 3);
        assert_eq!(claimed_of(word), 2);
    }

    #[test]
    fn reserve_stops_at_capacity() {
        let shared = bare_shared(2);
        assert_eq!(shared.reserve(), Some(0));
        assert_eq!(shared.reserve(), Some(1));
        assert_eq!(shared.reserve(), None);
    }

    #[test]
    fn claim_never_passes_total() {
        let shared = bare_shared(4);
        assert_eq!(shared.claim(), None);
        assert_eq!(shared.reserve(), Some(0));
        shared.publish(0);
        assert_eq!(shared.claim(), Some(0));
        assert_eq!(shared.claim(), None);
        assert_eq!(claimed_of(shared.state.load(Ordering::SeqCst)), 1);
    }
}
