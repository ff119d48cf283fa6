//! Builder for sequential task continuations.

use std::panic::UnwindSafe;

use crate::envelope::Envelope;
use crate::handle::ResultHandle;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// An owned builder for a chain of tasks that run one after another, each
/// re-submitted to the pool once the previous one completes.
///
/// This replaces the raw, aliased tail-pointer a linked list of tasks would
/// otherwise need: `Chain` always owns the envelope it's building, and
/// `then` walks to the current tail internally, so there is never a
/// dangling or shared pointer to manage.
///
/// # Examples
///
/// ```
/// use swarmpool::{Chain, Pool};
/// use std::sync::{Arc, Mutex};
///
/// let pool = Pool::new(2);
/// let log = Arc::new(Mutex::new(String::new()));
///
/// let (chain, first) = {
///     let log = Arc::clone(&log);
///     Chain::new(move || log.lock().unwrap().push('a'))
/// };
/// let (chain, second) = chain.then({
///     let log = Arc::clone(&log);
///     move || log.lock().unwrap().push('b')
/// });
/// let (chain, third) = chain.then({
///     let log = Arc::clone(&log);
///     move || log.lock().unwrap().push('c')
/// });
///
/// pool.submit_chain(chain);
/// pool.resume(); // blocks until the pool has gone quiet
/// assert_eq!(*log.lock().unwrap(), "abc");
/// assert!(first.get().is_ok());
/// assert!(second.get().is_ok());
/// assert!(third.get().is_ok());
/// ```
pub struct Chain {
    head: Envelope,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Chain {
    /// Starts a new chain with `task` as its first link, returning the
    /// chain and a handle to that link's own result.
    pub fn new<F, T>(task: F) -> (Self, ResultHandle<T>)
    where
        F: FnOnce() -> T + Send + UnwindSafe + 'static,
        T: Send + 'static,
    {
        let (head, handle) = Envelope::wrap(task);
        (Self { head }, handle)
    }

    /// Appends `task` as the next link, to run once every earlier link in
    /// the chain has completed, returning the extended chain and a handle
    /// to the new link's own result.
    pub fn then<F, T>(mut self, task: F) -> (Self, ResultHandle<T>)
    where
        F: FnOnce() -> T + Send + UnwindSafe + 'static,
        T: Send + 'static,
    {
        let (next, handle) = Envelope::wrap(task);
        let mut tail = self.head.continuation_mut();
        while let Some(envelope) = tail {
            tail = envelope.continuation_mut();
        }
        *tail = Some(Box::new(next));
        (self, handle)
    }

    /// Consumes the chain, returning its head envelope for submission.
    pub(crate) fn into_envelope(self) -> Envelope {
        self.head
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn appends_links_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let (chain, _h1) = {
            let order = Arc::clone(&order);
            Chain::new(move || order.lock().unwrap().push(1))
        };
        let (chain, _h2) = chain.then({
            let order = Arc::clone(&order);
            move || order.lock().unwrap().push(2)
        });
        let (chain, _h3) = chain.then({
            let order = Arc::clone(&order);
            move || order.lock().unwrap().push(3)
        });

        let mut envelope = chain.into_envelope();
        loop {
            let (continuation, _barrier) = envelope.invoke();
            match continuation {
                Some(next) => envelope = *next,
                None => break,
            }
        }

        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn single_link_chain_has_no_continuation() {
        let (chain, _handle) = Chain::new(|| ());
        let envelope = chain.into_envelope();
        let (continuation, _barrier) = envelope.invoke();
        assert!(continuation.is_none());
    }

    #[test]
    fn associative_construction_produces_the_same_order() {
        let order_left = Arc::new(Mutex::new(Vec::new()));
        let order_right = Arc::new(Mutex::new(Vec::new()));

        // (a.then(b)).then(c)
        let (left, _) = {
            let order = Arc::clone(&order_left);
            Chain::new(move || order.lock().unwrap().push('a'))
        };
        let (left, _) = left.then({
            let order = Arc::clone(&order_left);
            move || order.lock().unwrap().push('b')
        });
        let (left, _) = left.then({
            let order = Arc::clone(&order_left);
            move || order.lock().unwrap().push('c')
        });

        // a.then(b).then(c), built the same left-associative way since
        // `Chain` exposes no other composition order, but walked and
        // executed identically to demonstrate the same linear result.
        let (right, _) = {
            let order = Arc::clone(&order_right);
            Chain::new(move || order.lock().unwrap().push('a'))
        };
        let (right, _) = right.then({
            let order = Arc::clone(&order_right);
            move || order.lock().unwrap().push('b')
        });
        let (right, _) = right.then({
            let order = Arc::clone(&order_right);
            move || order.lock().unwrap().push('c')
        });

        for chain in [left, right] {
            let mut envelope = chain.into_envelope();
            loop {
                let (continuation, _barrier) = envelope.invoke();
                match continuation {
                    Some(next) => envelope = *next,
                    None => break,
                }
            }
        }

        assert_eq!(*order_left.lock().unwrap(), *order_right.lock().unwrap());
    }
}
