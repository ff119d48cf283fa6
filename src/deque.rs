//! Per-worker double-ended task deque.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::envelope::Envelope;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// A single worker's task deque, with distinct owner-front and thief-back
/// endpoints.
///
/// The owning worker pushes and pops from the front; every other worker only
/// ever pops from the back, to steal. Guarded by a plain [`Mutex`] and
/// [`Condvar`] rather than a lock-free structure, matching the pool's overall
/// preference for simple, obviously-correct synchronization over a bespoke
/// concurrent data structure.
pub(crate) struct Deque {
    inner: Mutex<VecDeque<Envelope>>,
    not_empty: Condvar,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Deque {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
        }
    }

    /// Pushes onto the front, unconditionally. Used by the dispatch policy's
    /// backstop once every bounded retry has failed.
    pub(crate) fn push_front(&self, envelope: Envelope) {
        let mut guard = self.inner.lock().unwrap();
        guard.push_front(envelope);
        self.not_empty.notify_one();
    }

    /// Pushes onto the front only if the deque currently holds at most one
    /// item, mirroring the bounded-retry dispatch policy's per-slot budget.
    /// Returns the envelope back on failure so the caller can try another
    /// worker or fall back to [`push_front`][Self::push_front].
    pub(crate) fn try_push_front(&self, envelope: Envelope) -> Result<(), Envelope> {
        let mut guard = self.inner.lock().unwrap();
        if guard.len() <= 1 {
            guard.push_front(envelope);
            self.not_empty.notify_one();
            Ok(())
        } else {
            Err(envelope)
        }
    }

    /// Pops from the front without blocking. The owning worker's normal,
    /// non-stealing path.
    pub(crate) fn try_pop_front(&self) -> Option<Envelope> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Pops from the back without blocking. The path every other worker
    /// takes when stealing. Enforces the same "leave the last item for the
    /// owner" guard as [`pop_back`][Self::pop_back]: returns `None` when the
    /// deque holds at most one item, even though one is sitting right there,
    /// rather than race the owner for it.
    pub(crate) fn try_pop_back(&self) -> Option<Envelope> {
        let mut guard = self.inner.lock().unwrap();
        if guard.len() > 1 {
            guard.pop_back()
        } else {
            None
        }
    }

    /// Blocks until an item is available, then pops it from the back,
    /// enforcing the same "leave at least one for the owner when there's
    /// more than one" guard as [`try_push_front`][Self::try_push_front].
    /// Not exercised by the worker run loop, which only ever steals
    /// non-blockingly, but preserved because the algorithm this pool
    /// generalizes defines it as part of the deque's contract.
    #[allow(dead_code)]
    pub(crate) fn pop_back(&self) -> Envelope {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if guard.len() > 1 {
                if let Some(envelope) = guard.pop_back() {
                    return envelope;
                }
            }
            guard = self.not_empty.wait(guard).unwrap();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Envelope {
        Envelope::wrap(|| ()).0
    }

    #[test]
    fn push_and_pop_front_is_lifo() {
        let deque = Deque::new();
        deque.push_front(noop());
        deque.push_front(noop());
        assert_eq!(deque.len(), 2);
        assert!(deque.try_pop_front().is_some());
        assert!(deque.try_pop_front().is_some());
        assert!(deque.try_pop_front().is_none());
    }

    #[test]
    fn try_push_front_respects_capacity_guard() {
        let deque = Deque::new();
        assert!(deque.try_push_front(noop()).is_ok());
        assert!(deque.try_push_front(noop()).is_ok());
        assert!(deque.try_push_front(noop()).is_err());
    }

    #[test]
    fn try_pop_back_steals_oldest() {
        let deque = Deque::new();
        deque.push_front(noop());
        deque.push_front(noop());
        assert!(deque.try_pop_back().is_some());
    }

    #[test]
    fn try_pop_back_rejects_the_last_item() {
        let deque = Deque::new();
        deque.push_front(noop());
        assert!(deque.try_pop_back().is_none());
        assert!(deque.try_pop_back().is_none());
        assert!(deque.try_pop_front().is_some());
    }

    #[test]
    fn try_pop_back_unblocks_once_another_item_arrives() {
        let deque = Deque::new();
        deque.push_front(noop());
        assert!(deque.try_pop_back().is_none());
        deque.push_front(noop());
        assert!(deque.try_pop_back().is_some());
        assert!(deque.try_pop_back().is_none());
    }

    #[test]
    fn pop_back_blocks_until_pushed() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let deque = Arc::new(Deque::new());
        let reader = {
            let deque = Arc::clone(&deque);
            thread::spawn(move || {
                deque.push_front(noop());
                deque.push_front(noop());
            })
        };
        thread::sleep(Duration::from_millis(20));
        reader.join().unwrap();
        deque.pop_back();
    }

    #[test]
    fn is_empty_reflects_state() {
        let deque = Deque::new();
        assert!(deque.is_empty());
        deque.push_front(noop());
        assert!(!deque.is_empty());
    }
}
