//! Sondeo - traceable-source filter and call-stack locator
//!
//! This library is the attribution core of a sampling profiler for managed
//! runtimes: it decides which source files are in profiling scope and, on
//! every sample, walks the host runtime's live call stack to find the
//! innermost frame belonging to an in-scope file. Aggregation, timers, and
//! reporting live in the surrounding profiler, not here.

pub mod filter;
pub mod frames;
pub mod locator;
pub mod registry;

#[cfg(feature = "python")]
pub mod cpython;
