//! Error types for trigger dispatch.

use millrace_core::{FlowId, UserId};
use millrace_flow::FlowError;
use std::fmt;

/// Errors from the manual trigger paths and the crontab dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// The flow exists but does not accept key-based triggering.
    KeyTriggerDisabled { flow_id: FlowId },
    /// The user lacks the execute permission on the flow.
    PermissionDenied { user_id: UserId, flow_id: FlowId },
    /// The target flow is a draft and cannot run.
    FlowIsDraft { flow_id: FlowId },
    /// A flow-layer operation failed.
    Flow(FlowError),
}

impl fmt::Display for TriggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyTriggerDisabled { flow_id } => {
                write!(f, "flow {flow_id} does not allow triggering by key")
            }
            Self::PermissionDenied { user_id, flow_id } => {
                write!(f, "user {user_id} may not execute flow {flow_id}")
            }
            Self::FlowIsDraft { flow_id } => {
                write!(f, "flow {flow_id} is a draft and cannot run")
            }
            Self::Flow(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for TriggerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Flow(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FlowError> for TriggerError {
    fn from(err: FlowError) -> Self {
        Self::Flow(err)
    }
}
