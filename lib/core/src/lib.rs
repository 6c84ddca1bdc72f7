//! Core domain types for the millrace workflow engine.
//!
//! This crate provides the foundational identifier types shared by every
//! other millrace crate. Each crate defines its own domain-specific error
//! types in its own error module.

pub mod id;

pub use id::{
    ArrangementId, ArrangementRunRecordId, FlowId, FlowOriginId, FlowRunRecordId, FuncId,
    FuncRunRecordId, ParseIdError, TraceId, UserId,
};
