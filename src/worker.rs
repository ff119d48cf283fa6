//! Per-thread run loop: drain your own deque, then try to steal.

use std::sync::atomic::Ordering;
use std::thread;

use crate::pool::Shared;

/// Runs on a dedicated OS thread until the pool is torn down.
///
/// Each iteration: bail out if the pool is done; otherwise try to pop from
/// the front of this worker's own deque, and if that's empty, try to steal
/// from the back of every other worker's deque in turn. If both come up
/// empty, yield and try again.
pub(crate) fn run(shared: std::sync::Arc<Shared>, id: usize) {
    loop {
        if shared.done.load(Ordering::Acquire) {
            return;
        }

        let envelope = shared.deques[id]
            .try_pop_front()
            .or_else(|| steal(&shared, id));

        match envelope {
            Some(envelope) => execute(&shared, envelope),
            None => thread::yield_now(),
        }
    }
}

/// Tries every other worker's deque, back to front from this worker's own
/// index, returning the first successful steal.
fn steal(shared: &Shared, id: usize) -> Option<crate::envelope::Envelope> {
    let n = shared.deques.len();
    (1..n).find_map(|offset| {
        let victim = (id + offset) % n;
        shared.deques[victim].try_pop_back()
    })
}

/// Runs one envelope that was popped from a deque, tracking both the
/// running counter and the pool's outstanding-work count across its
/// execution, then dispatches whatever it hands back: a continuation gets
/// resubmitted through the pool's normal policy (counted as its own,
/// freshly dispatched, outstanding unit of work), and a barrier is
/// incremented, firing its completion synchronously right here if this was
/// the last member.
///
/// This envelope's own outstanding count is only released after all of
/// that — including a synchronously-run barrier completion — has happened.
/// Releasing it any earlier would let [`Shared::is_quiescent`] observe zero
/// outstanding work while a completion body is still about to run or
/// mid-flight, which would let [`Pool::resume`][crate::Pool::resume] return
/// before every pre-`wait()` submission has actually finished.
fn execute(shared: &Shared, envelope: crate::envelope::Envelope) {
    shared.running.fetch_add(1, Ordering::AcqRel);
    let (continuation, barrier) = envelope.invoke();
    shared.running.fetch_sub(1, Ordering::AcqRel);

    if let Some(continuation) = continuation {
        shared.dispatch(*continuation);
    }

    if let Some(barrier) = barrier {
        if let Some(completion) = barrier.increment() {
            run_uncounted(shared, completion);
        }
    }

    shared.finish();
}

/// Runs a barrier's completion envelope, and anything chained off of it, on
/// the worker that fired the barrier.
///
/// Unlike [`execute`], this envelope was never handed to `dispatch` — it's
/// invoked synchronously by whichever worker finishes the barrier's last
/// member — so there is no outstanding count of its own to release. Its own
/// continuation (if the completion was itself built as a chain link) is
/// still dispatched through the pool like any other continuation, and its
/// own barrier (if it happens to belong to another group) is still
/// incremented, recursively, the same way [`execute`] would.
fn run_uncounted(shared: &Shared, envelope: crate::envelope::Envelope) {
    shared.running.fetch_add(1, Ordering::AcqRel);
    let (continuation, barrier) = envelope.invoke();
    shared.running.fetch_sub(1, Ordering::AcqRel);

    if let Some(continuation) = continuation {
        shared.dispatch(*continuation);
    }

    if let Some(barrier) = barrier {
        if let Some(completion) = barrier.increment() {
            run_uncounted(shared, completion);
        }
    }
}
