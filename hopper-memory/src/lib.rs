//! In-process backend for hopper queues.
//!
//! Jobs live in a vector kept sorted by priority then age. Nothing survives a
//! restart, which makes this backend suited to tests and embedded use.

mod driver;
mod queue;

pub use driver::MemoryDriver;
pub use queue::MemoryQueue;
