//! Protocol tests
//!
//! Each test starts a real host loop on its own thread, feeds it
//! line-delimited JSON through an in-memory pipe, and reads the kernel's
//! replies back. The fixture package is a genuine tarball written to a
//! temporary directory.

mod fixtures;
mod harness;

mod async_calls;
mod framing;
mod invocation;
mod lifecycle;
mod overrides;

pub use harness::*;
