//! Error types for the flow crate.
//!
//! Two layers of concrete enums:
//! - `GraphError`: node-graph shape violations (adjacency, cycles, wiring),
//!   wrapped by `FlowError::InvalidGraph` when surfaced from flow operations
//! - `FlowError`: flow definition, permission, and run-record operations
//!
//! `FlowError::kind` classifies every variant into one of the five error
//! kinds callers dispatch on at the boundary.

use millrace_core::{FlowId, FlowOriginId, FlowRunRecordId, UserId};
use std::fmt;

/// Classification of a `FlowError`, used by transport adapters to pick a
/// response shape without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A caller-supplied value failed validation.
    InvalidArgument,
    /// A required field was absent or nil.
    MissingRequiredField,
    /// A referenced entity does not exist.
    NotFound,
    /// The operation would violate a structural uniqueness invariant.
    Conflict,
    /// The persistence collaborator failed; propagated unchanged.
    StoreUnavailable,
}

/// Errors from node-graph operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// An adjacency list references a node key that does not exist.
    UnknownNodeKey { node_key: String },
    /// The node graph contains a cycle.
    CycleDetected,
    /// A connection input references a node that is not strictly upstream.
    ConnectionNotUpstream {
        node_key: String,
        referenced_key: String,
    },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNodeKey { node_key } => {
                write!(f, "unknown node key: {node_key}")
            }
            Self::CycleDetected => write!(f, "node graph contains cycles"),
            Self::ConnectionNotUpstream {
                node_key,
                referenced_key,
            } => {
                write!(
                    f,
                    "connection on node '{node_key}' references '{referenced_key}' which is not upstream"
                )
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors from flow definition, permission, and run-record operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// A crontab expression failed validation.
    InvalidSchedule { expression: String, reason: String },
    /// The node graph failed structural validation.
    InvalidGraph(GraphError),
    /// A retry strategy had a zero amount or interval.
    InvalidRetryStrategy { amount: u16, interval_in_second: u16 },
    /// A permission role string did not name one of the five roles.
    UnknownRole { role: String },
    /// A required field was absent or nil.
    MissingRequiredField { field: &'static str },
    /// No flow with the given id.
    FlowNotFound { flow_id: FlowId },
    /// No online flow for the given origin.
    OnlineFlowNotFound { origin_id: FlowOriginId },
    /// No draft flow for the given origin.
    DraftNotFound { origin_id: FlowOriginId },
    /// No run record with the given id.
    RunRecordNotFound { run_record_id: FlowRunRecordId },
    /// No runnable flow carries the given trigger key.
    TriggerKeyNotFound,
    /// The user lacks the permission the operation requires.
    PermissionDenied { user_id: UserId, flow_id: FlowId },
    /// A second `newest` online flow would exist for one origin.
    NewestConflict { origin_id: FlowOriginId },
    /// The persistence collaborator failed.
    StoreUnavailable { reason: String },
}

impl FlowError {
    /// Returns the boundary-level classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSchedule { .. }
            | Self::InvalidGraph(_)
            | Self::InvalidRetryStrategy { .. }
            | Self::UnknownRole { .. }
            | Self::PermissionDenied { .. } => ErrorKind::InvalidArgument,
            Self::MissingRequiredField { .. } => ErrorKind::MissingRequiredField,
            Self::FlowNotFound { .. }
            | Self::OnlineFlowNotFound { .. }
            | Self::DraftNotFound { .. }
            | Self::RunRecordNotFound { .. }
            | Self::TriggerKeyNotFound => ErrorKind::NotFound,
            Self::NewestConflict { .. } => ErrorKind::Conflict,
            Self::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
        }
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSchedule { expression, reason } => {
                write!(f, "invalid crontab expression '{expression}': {reason}")
            }
            Self::InvalidGraph(err) => write!(f, "invalid node graph: {err}"),
            Self::InvalidRetryStrategy {
                amount,
                interval_in_second,
            } => {
                write!(
                    f,
                    "retry strategy requires amount and interval both > 0, got amount={amount} interval={interval_in_second}"
                )
            }
            Self::UnknownRole { role } => write!(f, "unknown permission role: {role}"),
            Self::MissingRequiredField { field } => {
                write!(f, "missing required field: {field}")
            }
            Self::FlowNotFound { flow_id } => write!(f, "flow not found: {flow_id}"),
            Self::OnlineFlowNotFound { origin_id } => {
                write!(f, "no online flow for origin {origin_id}")
            }
            Self::DraftNotFound { origin_id } => {
                write!(f, "no draft flow for origin {origin_id}")
            }
            Self::RunRecordNotFound { run_record_id } => {
                write!(f, "run record not found: {run_record_id}")
            }
            Self::TriggerKeyNotFound => write!(f, "no runnable flow for trigger key"),
            Self::PermissionDenied { user_id, flow_id } => {
                write!(f, "user {user_id} lacks permission on flow {flow_id}")
            }
            Self::NewestConflict { origin_id } => {
                write!(f, "origin {origin_id} already has a newest online flow")
            }
            Self::StoreUnavailable { reason } => write!(f, "store unavailable: {reason}"),
        }
    }
}

impl std::error::Error for FlowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidGraph(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GraphError> for FlowError {
    fn from(err: GraphError) -> Self {
        Self::InvalidGraph(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_error_display() {
        let flow_id = FlowId::new();
        let err = FlowError::FlowNotFound { flow_id };
        assert!(err.to_string().contains("flow not found"));
    }

    #[test]
    fn graph_error_display() {
        let err = GraphError::UnknownNodeKey {
            node_key: "n1".to_string(),
        };
        assert!(err.to_string().contains("unknown node key: n1"));
    }

    #[test]
    fn error_kind_classification() {
        assert_eq!(
            FlowError::UnknownRole {
                role: "owner".to_string()
            }
            .kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            FlowError::MissingRequiredField { field: "create_user_id" }.kind(),
            ErrorKind::MissingRequiredField
        );
        assert_eq!(
            FlowError::OnlineFlowNotFound {
                origin_id: FlowOriginId::new()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            FlowError::StoreUnavailable {
                reason: "down".to_string()
            }
            .kind(),
            ErrorKind::StoreUnavailable
        );
    }
}
