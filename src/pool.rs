//! The work-stealing pool itself.

use std::panic::UnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::barrier::{Barrier, GroupTask};
use crate::chain::Chain;
use crate::deque::Deque;
use crate::envelope::Envelope;
use crate::handle::ResultHandle;

/// Per-dispatch-attempt retry budget before the round-robin policy falls
/// back to an unconditional push onto the worker it started at.
const RETRY_BUDGET: usize = 2;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// State shared between the [`Pool`] handle and every worker thread.
///
/// Held behind an [`Arc`] so each worker's run loop and every in-flight
/// [`Barrier`] can reach it without borrowing from the owning `Pool`.
pub(crate) struct Shared {
    pub(crate) deques: Vec<Deque>,
    cursor: AtomicUsize,
    pub(crate) running: AtomicUsize,
    /// Counts envelopes from the moment they're handed to `dispatch` until
    /// their body finishes running, spanning the queued and the running
    /// state in one count. `running` and deque length are kept too, for
    /// reporting, but both have a brief window around the queued/running
    /// transition where neither reflects a task that's actually in flight;
    /// `outstanding` doesn't, which is what makes it safe for
    /// [`is_quiescent`][Self::is_quiescent] to rely on.
    outstanding: AtomicUsize,
    pub(crate) done: AtomicBool,
    paused: AtomicBool,
}

impl Shared {
    /// Submits an envelope using the bounded round-robin policy: try up to
    /// [`RETRY_BUDGET`] consecutive worker slots starting from the next
    /// cursor position, each capped at one queued-plus-one-running item, and
    /// if every one of those is already full, push unconditionally onto the
    /// slot the search started at.
    ///
    /// If the pool has been torn down, the envelope is dropped without
    /// running — any [`ResultHandle`] waiting on it resolves to
    /// [`Failure::Broken`][crate::Failure::Broken].
    pub(crate) fn dispatch(&self, mut envelope: Envelope) {
        if self.done.load(Ordering::Acquire) {
            return;
        }

        self.outstanding.fetch_add(1, Ordering::AcqRel);

        let n = self.deques.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % n;
        for attempt in 0..RETRY_BUDGET.min(n) {
            let slot = (start + attempt) % n;
            match self.deques[slot].try_push_front(envelope) {
                Ok(()) => return,
                Err(returned) => envelope = returned,
            }
        }
        self.deques[start].push_front(envelope);
    }

    /// Marks one previously dispatched envelope as finished running.
    pub(crate) fn finish(&self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    fn num_tasks_pending(&self) -> usize {
        self.deques.iter().map(Deque::len).sum()
    }

    fn is_quiescent(&self) -> bool {
        self.outstanding.load(Ordering::Acquire) == 0
    }
}

/// Configures and builds a [`Pool`].
///
/// # Examples
///
/// ```
/// use swarmpool::Pool;
///
/// let pool = Pool::builder().num_workers(4).name("batch").build();
/// assert_eq!(pool.num_workers(), 4);
/// ```
pub struct PoolBuilder {
    num_workers: usize,
    name: String,
}

impl PoolBuilder {
    fn new() -> Self {
        Self {
            num_workers: default_num_workers(),
            name: "swarmpool".to_string(),
        }
    }

    /// Sets the number of worker threads. `build()` panics if this is zero.
    #[must_use]
    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Sets the prefix used for worker thread names (`"{name}/{index}"`).
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the pool, spawning its worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `num_workers` is zero — there is no sensible degenerate
    /// pool of no workers.
    #[must_use]
    pub fn build(self) -> Pool {
        assert!(self.num_workers > 0, "a pool needs at least one worker");
        Pool::spawn(self.num_workers, self.name)
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A work-stealing pool of OS threads, each with its own double-ended task
/// deque, supporting single-shot submission, continuation chains, and
/// fan-in barriers.
///
/// `Pool` is deliberately not [`Clone`]: it owns the join handles for its
/// worker threads, and only one owner should ever be responsible for
/// joining them.
///
/// # Examples
///
/// ```
/// use swarmpool::Pool;
///
/// let pool = Pool::new(4);
/// let handle = pool.submit(|| 2 + 2);
/// assert_eq!(handle.get().unwrap(), 4);
/// ```
pub struct Pool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Pool {
    /// Creates a pool with `num_workers` worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `num_workers` is zero.
    #[must_use]
    pub fn new(num_workers: usize) -> Self {
        assert!(num_workers > 0, "a pool needs at least one worker");
        Self::spawn(num_workers, "swarmpool".to_string())
    }

    /// Starts building a pool with non-default configuration.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    fn spawn(num_workers: usize, name: String) -> Self {
        let shared = Arc::new(Shared {
            deques: (0..num_workers).map(|_| Deque::new()).collect(),
            cursor: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            outstanding: AtomicUsize::new(0),
            done: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        });

        let handles = (0..num_workers)
            .map(|id| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("{name}/{}", id + 1))
                    .spawn(move || crate::worker::run(shared, id))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { shared, handles }
    }

    /// Submits a task, returning a handle to its eventual result or panic.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn submit<F, T>(&self, task: F) -> ResultHandle<T>
    where
        F: FnOnce() -> T + Send + UnwindSafe + 'static,
        T: Send + 'static,
    {
        let (envelope, handle) = Envelope::wrap(task);
        self.shared.dispatch(envelope);
        handle
    }

    /// Wraps a task into an [`Envelope`] without submitting it, so it can be
    /// attached to a barrier group via
    /// [`add_group_with_barrier_envelopes`][Self::add_group_with_barrier_envelopes].
    #[must_use]
    pub fn wrap<F, T>(&self, task: F) -> (ResultHandle<T>, Envelope)
    where
        F: FnOnce() -> T + Send + UnwindSafe + 'static,
        T: Send + 'static,
    {
        let (envelope, handle) = Envelope::wrap(task);
        (handle, envelope)
    }

    /// Submits a previously built [`Envelope`] directly, bypassing
    /// [`submit`][Self::submit]'s handle creation. For callers composing
    /// envelopes themselves via [`wrap`][Self::wrap].
    pub fn submit_envelope(&self, envelope: Envelope) {
        self.shared.dispatch(envelope);
    }

    /// Submits a [`Chain`] for sequential execution: the first link runs,
    /// then each subsequent link is resubmitted through the pool's normal
    /// dispatch policy as the previous one finishes.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn submit_chain(&self, chain: Chain) {
        self.shared.dispatch(chain.into_envelope());
    }

    /// Submits a group of fire-and-forget tasks that together run `on_done`
    /// exactly once, after every member has finished, returning a handle to
    /// `on_done`'s own result.
    ///
    /// Panics inside a member task are caught and discarded, matching
    /// [`submit`][Self::submit]'s isolation guarantee, but since no handle
    /// is retained per member there is nowhere to report them individually.
    /// An empty group runs `on_done` immediately, synchronously, on the
    /// calling thread — the returned handle is already resolved by the time
    /// this call returns.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn add_group_with_barrier<F, T>(&self, tasks: Vec<GroupTask>, on_done: F) -> ResultHandle<T>
    where
        F: FnOnce() -> T + Send + UnwindSafe + 'static,
        T: Send + 'static,
    {
        let members: Vec<Envelope> = tasks
            .into_iter()
            .map(|task| Envelope::wrap_unobserved(move || task()))
            .collect();
        let (completion, handle) = Envelope::wrap(on_done);
        self.add_group_with_barrier_envelopes(members, completion);
        handle
    }

    /// Like [`add_group_with_barrier`][Self::add_group_with_barrier], but
    /// takes already-built envelopes for both the group members and the
    /// completion, so group members can carry their own [`ResultHandle`]
    /// via [`wrap`][Self::wrap].
    pub fn add_group_with_barrier_envelopes(&self, members: Vec<Envelope>, completion: Envelope) {
        let (barrier, immediate) = Barrier::new(members.len(), completion);

        if let Some(completion) = immediate {
            completion.invoke();
            return;
        }

        let barrier = Arc::new(barrier);
        for mut member in members {
            member.set_barrier(Arc::clone(&barrier));
            self.shared.dispatch(member);
        }
    }

    /// Flips the pool into its paused state.
    ///
    /// This does not itself stop workers from draining already-queued tasks
    /// or block the calling thread — only [`resume`][Self::resume] observes
    /// the flag, by waiting for the pool to go quiet before clearing it.
    pub fn wait(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    /// Blocks until the pool is quiescent (no task running, no task queued),
    /// then clears the paused flag set by [`wait`][Self::wait].
    pub fn resume(&self) {
        while !self.shared.is_quiescent() {
            thread::yield_now();
        }
        self.shared.paused.store(false, Ordering::Release);
    }

    /// Number of worker threads.
    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.handles.len()
    }

    /// Number of tasks currently executing.
    #[must_use]
    pub fn num_tasks_running(&self) -> usize {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Number of tasks sitting in a worker's deque, not yet started.
    #[must_use]
    pub fn num_tasks_pending(&self) -> usize {
        self.shared.num_tasks_pending()
    }

    /// Total of running and pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.num_tasks_running() + self.num_tasks_pending()
    }

    /// Whether there is no work running or queued.
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn is_idle(&self) -> bool {
        self.len() == 0
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl Default for Pool {
    /// Defaults to one worker per available core beyond the calling thread
    /// itself.
    fn default() -> Self {
        Self::new(default_num_workers())
    }
}

impl Drop for Pool {
    /// Abandons whatever is still queued; every worker finishes only the
    /// task it already has in hand, then sees `done` and exits.
    fn drop(&mut self) {
        self.shared.done.store(true, Ordering::Release);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

fn default_num_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn runs_many_independent_tasks() {
        let pool = Pool::new(4);
        let handles: Vec<_> = (0..1000).map(|i| pool.submit(move || i * i)).collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.get().unwrap(), i * i);
        }
    }

    #[test]
    fn wait_then_resume_drains_quietly() {
        let pool = Pool::new(2);
        let counter = Arc::new(AtomicU32::new(0));
        pool.wait();
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.resume();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn chain_runs_sequentially() {
        let pool = Pool::new(2);
        let log = Arc::new(Mutex::new(String::new()));

        let (chain, _h1) = {
            let log = Arc::clone(&log);
            Chain::new(move || log.lock().unwrap().push('a'))
        };
        let (chain, _h2) = chain.then({
            let log = Arc::clone(&log);
            move || log.lock().unwrap().push('b')
        });
        let (chain, _h3) = chain.then({
            let log = Arc::clone(&log);
            move || log.lock().unwrap().push('c')
        });

        pool.submit_chain(chain);
        pool.resume();
        assert_eq!(*log.lock().unwrap(), "abc");
    }

    #[test]
    fn barrier_group_fires_once_after_all_members() {
        let pool = Pool::new(4);
        let counter = Arc::new(AtomicU32::new(0));
        let done = Arc::new(AtomicU32::new(0));

        let tasks: Vec<GroupTask> = (0..100)
            .map(|_| {
                let counter = Arc::clone(&counter);
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }) as GroupTask
            })
            .collect();

        let done_clone = Arc::clone(&done);
        let completion = pool.add_group_with_barrier(tasks, move || {
            done_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(completion.get().is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_barrier_group_fires_immediately() {
        let pool = Pool::new(2);
        let done = Arc::new(AtomicU32::new(0));
        let done_clone = Arc::clone(&done);
        let completion: ResultHandle<()> = pool.add_group_with_barrier(Vec::new(), move || {
            done_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert!(completion.get().is_ok());
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panic_in_one_task_does_not_stop_the_pool() {
        let pool = Pool::new(2);
        let panicking = pool.submit(|| -> u32 { panic!("deliberate") });
        let recovering = pool.submit(|| 1 + 1);

        assert!(panicking.get().is_err());
        assert_eq!(recovering.get().unwrap(), 2);
    }

    #[test]
    fn single_worker_pool_still_runs_tasks() {
        let pool = Pool::new(1);
        assert_eq!(pool.num_workers(), 1);
        let handle = pool.submit(|| 99);
        assert_eq!(handle.get().unwrap(), 99);
    }

    #[test]
    fn steals_across_an_idle_worker() {
        let pool = Pool::builder().num_workers(2).name("steal-test").build();
        let handles: Vec<_> = (0..50).map(|i| pool.submit(move || i)).collect();
        let total: i32 = handles.into_iter().map(|h| h.get().unwrap()).sum();
        assert_eq!(total, (0..50).sum());
    }

    #[test]
    fn dropping_pool_abandons_queued_tasks() {
        let pool = Pool::new(1);
        // Occupies the single worker long enough that the second task is
        // still sitting in the deque when the pool is dropped.
        pool.submit(|| thread::sleep(Duration::from_millis(200)));
        thread::sleep(Duration::from_millis(20));
        let handle = pool.submit(|| 1);
        drop(pool);
        assert!(handle.get().is_err());
    }

    #[test]
    fn default_builds_a_usable_pool() {
        let pool = Pool::default();
        assert!(pool.num_workers() >= 1);
        let handle = pool.submit(|| "ok");
        assert_eq!(handle.get().unwrap(), "ok");
    }
}
