//! Task envelope.

use std::any::Any;
use std::fmt;
use std::panic::{self, UnwindSafe};
use std::sync::Arc;

use crate::barrier::Barrier;
use crate::handle::{self, Failure, ResultHandle};

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Erased, move-only holder for one unit of work.
///
/// An envelope carries exactly one task body, an optional continuation to
/// run when this one completes, and an optional barrier to notify. Both the
/// continuation and the barrier are attached before the envelope is first
/// submitted; afterwards, only the worker executing the envelope touches
/// them, and only to detach and hand them off.
///
/// Envelopes are otherwise opaque — this crate hands them back to callers
/// only so [`Pool::add_group_with_barrier_envelopes`][] and [`Chain`][] can
/// be built out of ordinary [`Pool::wrap`][] calls.
///
/// [`Pool::add_group_with_barrier_envelopes`]: crate::Pool::add_group_with_barrier_envelopes
/// [`Pool::wrap`]: crate::Pool::wrap
/// [`Chain`]: crate::Chain
pub struct Envelope {
    body: Option<Box<dyn FnOnce() + Send>>,
    continuation: Option<Box<Envelope>>,
    barrier: Option<Arc<Barrier>>,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Envelope {
    /// Wraps a task body, publishing its result or panic through a fresh
    /// [`ResultHandle`], without attaching a continuation or a barrier.
    pub(crate) fn wrap<F, T>(task: F) -> (Self, ResultHandle<T>)
    where
        F: FnOnce() -> T + Send + UnwindSafe + 'static,
        T: Send + 'static,
    {
        let (tx, handle) = handle::channel::<T>();
        let body: Box<dyn FnOnce() + Send> = Box::new(move || {
            let outcome = panic::catch_unwind(task).map_err(|payload| {
                Failure::Panicked(panic_message(&payload))
            });
            // The consumer may have already dropped the handle; that's not
            // our problem to report, there's nobody left to tell.
            let _ = tx.send(outcome);
        });
        (Self::new(body), handle)
    }

    /// Wraps a task body that nobody will individually observe the result
    /// of, catching and discarding any panic so it can never cross the
    /// worker's run loop. Used for barrier group members submitted through
    /// the closure-based [`Pool::add_group_with_barrier`][].
    ///
    /// [`Pool::add_group_with_barrier`]: crate::Pool::add_group_with_barrier
    pub(crate) fn wrap_unobserved<F>(task: F) -> Self
    where
        F: FnOnce() + Send + UnwindSafe + 'static,
    {
        let body: Box<dyn FnOnce() + Send> = Box::new(move || {
            let _ = panic::catch_unwind(task);
        });
        Self::new(body)
    }

    fn new(body: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            body: Some(body),
            continuation: None,
            barrier: None,
        }
    }

    /// Returns a mutable reference to the continuation slot, so a [`Chain`]
    /// can walk to the tail and append.
    ///
    /// [`Chain`]: crate::Chain
    pub(crate) fn continuation_mut(&mut self) -> &mut Option<Box<Envelope>> {
        &mut self.continuation
    }

    /// Attaches a barrier handle, to be incremented once this envelope's
    /// body has run.
    pub(crate) fn set_barrier(&mut self, barrier: Arc<Barrier>) {
        self.barrier = Some(barrier);
    }

    /// Runs the body, then detaches and returns the continuation and the
    /// barrier handle, in that order, so the caller (a worker's run loop, or
    /// a barrier firing its completion) can re-submit the one and increment
    /// the other.
    pub(crate) fn invoke(mut self) -> (Option<Box<Envelope>>, Option<Arc<Barrier>>) {
        if let Some(body) = self.body.take() {
            body();
        }
        (self.continuation.take(), self.barrier.take())
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("has_continuation", &self.continuation.is_some())
            .field("has_barrier", &self.barrier.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Best-effort stringification of a `catch_unwind` payload.
fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
