//! Flow definition and run-record engine for the millrace platform.
//!
//! This crate provides the domain model and services, including:
//!
//! - **Flow Model**: Versioned definitions with drafts, online promotion, and
//!   a single `newest` flow per origin
//! - **Node Graph**: Directed graphs using petgraph, with parameter wiring
//!   validated against ancestry
//! - **Run Records**: Append-only execution records mutated through
//!   single-document field patches
//! - **Crontab**: Minute-granularity schedule evaluation with per-tick dedup
//!   tokens
//! - **Permissions**: Five independent ownership lists per flow

pub mod crontab;
pub mod definition;
pub mod error;
pub mod graph;
pub mod ipt;
pub mod node;
pub mod permission;
pub mod run;
pub mod run_service;
pub mod service;
pub mod store;
pub mod user;

pub use crontab::Crontab;
pub use definition::Flow;
pub use error::{ErrorKind, FlowError, GraphError};
pub use graph::FlowGraph;
pub use ipt::{IptComponent, IptSlot, ValueType};
pub use node::{FlowFunction, START_NODE_KEY};
pub use permission::{PermissionRole, PermissionSet, User};
pub use run::{FlowRunRecord, RunPatch, RunStatus, TriggerSource, TriggerType};
pub use run_service::RunService;
pub use service::FlowService;
pub use store::{FlowPatch, FlowStore, RunStore, UserStore};
pub use user::UserCache;
