//! Trigger scheduling for the millrace platform.
//!
//! This crate drives run-record creation from outside the flow services:
//!
//! - **Dispatcher**: minute-granularity crontab polling with store-backed
//!   per-tick dedup
//! - **Manual Triggers**: key-based and user-initiated run creation with
//!   permission and parallel-run enforcement

pub mod dispatcher;
pub mod error;
pub mod trigger;

pub use dispatcher::TriggerDispatcher;
pub use error::TriggerError;
pub use trigger::{ManualTrigger, OverrideIptParams};
