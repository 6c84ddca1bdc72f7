//! Store implementations for the millrace platform.
//!
//! Currently in-memory only: `DashMap`-backed stores implementing the
//! contracts from `millrace_flow::store`, used by tests and single-process
//! deployments.

pub mod memory;

pub use memory::{MemoryFlowStore, MemoryRunStore, MemoryUserStore};
