//! Fan-in completion barrier.

use std::panic::UnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::envelope::Envelope;

/// A task submitted as one member of a barrier group.
///
/// An alias rather than a bound, since group members are plain
/// `FnOnce() + Send + UnwindSafe + 'static` closures like any other task —
/// the only thing distinguishing them is that the pool wraps each one to
/// notify a shared [`Barrier`] instead of (or in addition to) publishing to
/// a [`ResultHandle`][crate::ResultHandle]. `UnwindSafe` is part of the alias
/// itself, not left to the caller, since the pool always wraps group members
/// in `catch_unwind` the same way it wraps any other task body.
pub type GroupTask = Box<dyn FnOnce() + Send + UnwindSafe>;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Counts down as a group of tasks finish, running a completion envelope
/// exactly once when the last member reports in.
///
/// Reclaimed by ordinary [`Arc`][std::sync::Arc] reference counting once
/// every member envelope (and the pool's own bookkeeping, while the group is
/// still in flight) has dropped its clone — there is no manual teardown to
/// get wrong.
pub(crate) struct Barrier {
    remaining: AtomicUsize,
    completion: Mutex<Option<Envelope>>,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Barrier {
    /// Builds a barrier for `count` members and the envelope to run once
    /// they've all finished.
    ///
    /// If `count` is zero, the completion is handed straight back instead of
    /// being stored, since there is nothing left to wait on — the caller is
    /// expected to run it immediately.
    pub(crate) fn new(count: usize, completion: Envelope) -> (Self, Option<Envelope>) {
        if count == 0 {
            return (
                Self {
                    remaining: AtomicUsize::new(0),
                    completion: Mutex::new(None),
                },
                Some(completion),
            );
        }
        (
            Self {
                remaining: AtomicUsize::new(count),
                completion: Mutex::new(Some(completion)),
            },
            None,
        )
    }

    /// Reports one member finished, advancing the barrier's completed count
    /// by one. Returns the completion envelope exactly once, from whichever
    /// call observes the count reach `required`; every other call returns
    /// `None`.
    ///
    /// Tracked internally as a countdown of the *remaining* member count
    /// rather than the completed count the name refers to — the two reach
    /// their terminal value at the same call, so the observable behavior is
    /// identical.
    ///
    /// The caller is expected to invoke the returned envelope synchronously,
    /// on the spot, rather than resubmit it to the pool — the barrier fires
    /// from inside whichever worker happens to finish last.
    pub(crate) fn increment(&self) -> Option<Envelope> {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.completion.lock().unwrap().take()
        } else {
            None
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn fires_exactly_once_on_last_member() {
        let fired = Arc::new(AtomicU32::new(0));
        let completion = {
            let fired = Arc::clone(&fired);
            Envelope::wrap_unobserved(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        let (barrier, immediate) = Barrier::new(3, completion);
        assert!(immediate.is_none());

        assert!(barrier.increment().is_none());
        assert!(barrier.increment().is_none());
        let last = barrier.increment();
        assert!(last.is_some());
        last.unwrap().invoke();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(barrier.increment().is_none());
    }

    #[test]
    fn empty_group_fires_immediately() {
        let completion = Envelope::wrap_unobserved(|| ());
        let (_barrier, immediate) = Barrier::new(0, completion);
        assert!(immediate.is_some());
    }
}
