// Copyright (c) 2025-2026 Zensical and contributors

// SPDX-License-Identifier: MIT
// All contributions are certified under the DCO

// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to
// deal in the Software without restriction, including without limitation the
// rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
// sell copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:

// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NON-INFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
// IN THE SOFTWARE.

// ----------------------------------------------------------------------------

//! A work-stealing pool of OS threads for running and composing small units
//! of CPU-bound work.
//!
//! Each worker owns a double-ended deque: it pushes and pops its own work
//! from the front, and every other worker may steal from the back when its
//! own deque runs dry. On top of plain one-shot submission, the pool
//! supports sequential continuation chains via [`Chain`], and fan-in
//! barriers that run a completion once every member of a group has
//! finished.
//!
//! # Examples
//!
//! ```
//! use swarmpool::Pool;
//!
//! let pool = Pool::new(4);
//! let handle = pool.submit(|| 2 + 2);
//! assert_eq!(handle.get().unwrap(), 4);
//! ```

mod barrier;
mod chain;
mod deque;
mod envelope;
mod handle;
mod pool;
mod worker;

pub use barrier::GroupTask;
pub use chain::Chain;
pub use envelope::Envelope;
pub use handle::{Failure, ResultHandle};
pub use pool::{Pool, PoolBuilder};
