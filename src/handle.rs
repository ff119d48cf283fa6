//! One-shot result publication.

use std::fmt;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use thiserror::Error;

// ----------------------------------------------------------------------------
// Enums
// ----------------------------------------------------------------------------

/// A per-task failure delivered through a [`ResultHandle`].
///
/// This is the only error surface a caller needs to watch: whether a task
/// panicked or was never run at all (because the pool tore down while it was
/// still queued), both show up here, at `get()` time, rather than through a
/// side channel.
#[derive(Clone, Debug, Error)]
pub enum Failure {
    /// The task body panicked. The payload is best-effort stringified, since
    /// panic payloads are `Any` and most are either `&str` or `String`.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The producer side of the handle was dropped without publishing a
    /// result, most commonly because the pool was torn down while the task
    /// was still sitting in a deque and the envelope was abandoned.
    #[error("task was abandoned before it could run")]
    Broken,
}

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// One-shot, single-consumer channel publishing a task's return value or
/// failure to whoever retained the handle at submission time.
///
/// The handle is movable but intentionally not [`Clone`]: only the caller
/// that submitted the task may consume its result, matching the
/// single-producer, single-consumer contract of the task that feeds it.
///
/// # Examples
///
/// ```
/// use swarmpool::Pool;
///
/// let pool = Pool::new(2);
/// let handle = pool.submit(|| 6 * 7);
/// assert_eq!(handle.get().unwrap(), 42);
/// ```
pub struct ResultHandle<T> {
    rx: Receiver<Result<T, Failure>>,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl<T> ResultHandle<T> {
    /// Blocks until the task publishes its result, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`Failure::Panicked`] if the task body panicked, or
    /// [`Failure::Broken`] if the producer side was dropped without
    /// publishing — the task was abandoned during shutdown, or a barrier
    /// completion's envelope was discarded before firing.
    pub fn get(&self) -> Result<T, Failure> {
        self.rx.recv().unwrap_or(Err(Failure::Broken))
    }

    /// Polls for a result without blocking.
    ///
    /// Returns `None` if the task has not finished yet, `Some(Err(Broken))`
    /// if it will never finish, and `Some(result)` otherwise.
    pub fn try_get(&self) -> Option<Result<T, Failure>> {
        match self.rx.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Failure::Broken)),
        }
    }
}

impl<T> fmt::Debug for ResultHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle").finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Creates the producer/consumer pair backing a [`ResultHandle`].
///
/// Uses a one-slot [`crossbeam`] channel: exactly one `send` is ever
/// attempted, and a `recv` on a channel whose sender was dropped without
/// sending surfaces as `Err`, which is mapped to [`Failure::Broken`] — the
/// "broken promise" signal the spec calls for.
pub(crate) fn channel<T>() -> (Sender<Result<T, Failure>>, ResultHandle<T>) {
    let (tx, rx) = channel::bounded(1);
    (tx, ResultHandle { rx })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
