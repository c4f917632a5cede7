#![deny(missing_docs)]
//! A fixed-size, reusable batch worker pool.
//!
//! A [`Dispatcher`] owns a pre-allocated queue of work items and a fixed set
//! of persistent worker threads. The caller fills a batch with [`enqueue`],
//! joins it with [`run`], and can then fill the next batch with the same
//! pool. Each thread holds one [`Worker`] instance for its whole lifetime,
//! so per-thread state (connections, buffers, caches) survives across items.
//!
//! [`enqueue`]: Dispatcher::enqueue
//! [`run`]: Dispatcher::run

pub use error::{ErrorKind, Result};
pub use logger::Logger;
pub use pool::{Dispatcher, Worker};

mod error;
mod logger;
mod pool;
