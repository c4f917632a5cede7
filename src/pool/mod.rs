//! Worker pool

/// Trait for per-thread work item processing.
///
/// One instance exists per worker thread, created by the pool's factory when
/// the thread starts and dropped when the thread exits. It owns whatever
/// per-thread state the application needs. It does not have to be `Send`,
/// since an instance never leaves the thread that created it.
pub trait Worker<T> {
    /// Process one work item in place.
    ///
    /// Called with no pool lock held, so blocking I/O is fine here. There is
    /// no return channel; errors must be handled inside the call or surfaced
    /// through application-owned shared state.
    ///
    /// # Panics
    ///
    /// A panic kills this worker thread and is not caught; the pool keeps
    /// running with one thread fewer. The item still counts as completed so
    /// [`Dispatcher::run`] does not block forever on it.
    fn process(&mut self, item: &mut T);
}

/// Any `FnMut(&mut T)` closure is a worker with the closure's captures as its
/// per-thread state.
impl<T, F> Worker<T> for F
where
    F: FnMut(&mut T),
{
    fn process(&mut self, item: &mut T) {
        self(item)
    }
}

pub use self::dispatcher::Dispatcher;

mod dispatcher;
