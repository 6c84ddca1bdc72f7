//! Flow definitions.
//!
//! A flow is an immutable-once-online versioned document. Drafts are the
//! editable variant; publishing a draft mints a new online version under the
//! same origin while keeping exactly one `newest` online flow per origin.

use crate::crontab::Crontab;
use crate::graph::FlowGraph;
use crate::node::FlowFunction;
use crate::permission::PermissionSet;
use millrace_core::{FlowId, FlowOriginId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use ulid::Ulid;

/// A versioned workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// Unique identifier of this version.
    pub id: FlowId,
    /// Identity shared by every version of the same logical flow.
    pub origin_id: FlowOriginId,
    /// Human-readable name.
    pub name: String,
    /// Drafts are editable and never triggered.
    pub is_draft: bool,
    /// Soft-delete marker. Deleted flows stay queryable by id.
    pub deleted: bool,
    /// Monotonic per-origin version number. Drafts hold 0.
    pub version: u32,
    /// Exactly one non-deleted online flow per origin carries this.
    pub newest: bool,
    /// User who created this version.
    pub create_user_id: UserId,
    /// Creation timestamp.
    pub create_time: chrono::DateTime<chrono::Utc>,
    /// Opaque canvas layout blob, round-tripped for the front end.
    pub position: JsonValue,
    /// Stable secret for key-based triggering, inherited across versions.
    pub trigger_key: String,
    /// Whether key-based triggering is accepted at all.
    pub allow_trigger_by_key: bool,
    /// Crontab schedule. Absent or zero-valued means no timed trigger.
    pub crontab: Option<Crontab>,
    /// Per-run wall-clock timeout. Zero means no timeout.
    pub timeout_in_seconds: u32,
    /// Retry attempts after a failed run. Active only with a positive interval.
    pub retry_amount: u16,
    /// Seconds between retry attempts.
    pub retry_interval_in_second: u16,
    /// Whether a run may start while a previous one is still unfinished.
    pub allow_parallel_run: bool,
    /// The five ownership lists.
    pub permissions: PermissionSet,
    /// Node graph keyed by node key.
    pub flow_functions: HashMap<String, FlowFunction>,
}

impl Flow {
    /// Creates a fresh draft under a brand-new origin.
    ///
    /// The creator gets all five permission roles and a random trigger key is
    /// minted.
    #[must_use]
    pub fn new_draft(
        name: impl Into<String>,
        create_user_id: UserId,
        position: JsonValue,
        flow_functions: HashMap<String, FlowFunction>,
    ) -> Self {
        Self {
            id: FlowId::new(),
            origin_id: FlowOriginId::new(),
            name: name.into(),
            is_draft: true,
            deleted: false,
            version: 0,
            newest: false,
            create_user_id,
            create_time: chrono::Utc::now(),
            position,
            trigger_key: Ulid::new().to_string(),
            allow_trigger_by_key: false,
            crontab: None,
            timeout_in_seconds: 0,
            retry_amount: 0,
            retry_interval_in_second: 0,
            allow_parallel_run: false,
            permissions: PermissionSet::grant_all(create_user_id),
            flow_functions,
        }
    }

    /// Creates a draft under an existing origin, inheriting the trigger key
    /// and permission lists of the online flow it derives from.
    #[must_use]
    pub fn new_draft_from(
        name: impl Into<String>,
        create_user_id: UserId,
        online: &Flow,
        position: JsonValue,
        flow_functions: HashMap<String, FlowFunction>,
    ) -> Self {
        Self {
            id: FlowId::new(),
            origin_id: online.origin_id,
            name: name.into(),
            is_draft: true,
            deleted: false,
            version: 0,
            newest: false,
            create_user_id,
            create_time: chrono::Utc::now(),
            position,
            trigger_key: online.trigger_key.clone(),
            allow_trigger_by_key: false,
            crontab: None,
            timeout_in_seconds: 0,
            retry_amount: 0,
            retry_interval_in_second: 0,
            allow_parallel_run: false,
            permissions: online.permissions.clone(),
            flow_functions,
        }
    }

    /// True when both retry knobs are strictly positive.
    #[must_use]
    pub fn has_retry_strategy(&self) -> bool {
        self.retry_amount > 0 && self.retry_interval_in_second > 0
    }

    /// True when a non-zero crontab schedule is configured.
    #[must_use]
    pub fn has_crontab(&self) -> bool {
        self.crontab.as_ref().is_some_and(|c| !c.is_zero())
    }

    /// Builds the validated parameter-wiring view of the node graph.
    pub fn graph(&self) -> Result<FlowGraph<'_>, crate::error::GraphError> {
        let graph = FlowGraph::from_functions(&self.flow_functions)?;
        graph.validate()?;
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::START_NODE_KEY;
    use millrace_core::FuncId;

    fn single_start_graph() -> HashMap<String, FlowFunction> {
        HashMap::from([(START_NODE_KEY.to_string(), FlowFunction::start_node())])
    }

    #[test]
    fn new_draft_grants_creator_everything() {
        let creator = UserId::new();
        let flow = Flow::new_draft("etl", creator, JsonValue::Null, single_start_graph());

        assert!(flow.is_draft);
        assert_eq!(flow.version, 0);
        assert!(!flow.newest);
        assert!(flow.permissions.read.contains(&creator));
        assert!(flow.permissions.assign_permission.contains(&creator));
        assert!(!flow.trigger_key.is_empty());
    }

    #[test]
    fn draft_from_online_inherits_key_and_permissions() {
        let creator = UserId::new();
        let mut online = Flow::new_draft("etl", creator, JsonValue::Null, single_start_graph());
        online.is_draft = false;
        online.version = 3;
        online.newest = true;
        online
            .permissions
            .add(crate::permission::PermissionRole::Read, UserId::new());

        let editor = UserId::new();
        let draft = Flow::new_draft_from(
            "etl v4",
            editor,
            &online,
            JsonValue::Null,
            single_start_graph(),
        );

        assert!(draft.is_draft);
        assert_eq!(draft.origin_id, online.origin_id);
        assert_ne!(draft.id, online.id);
        assert_eq!(draft.trigger_key, online.trigger_key);
        assert_eq!(draft.permissions, online.permissions);
    }

    #[test]
    fn retry_strategy_needs_both_knobs() {
        let mut flow = Flow::new_draft("f", UserId::new(), JsonValue::Null, single_start_graph());
        assert!(!flow.has_retry_strategy());
        flow.retry_amount = 3;
        assert!(!flow.has_retry_strategy());
        flow.retry_interval_in_second = 30;
        assert!(flow.has_retry_strategy());
    }

    #[test]
    fn graph_validation_rejects_dangling_connection() {
        let mut functions = single_start_graph();
        let bad = FlowFunction::new(FuncId::new()).with_param_ipts(vec![crate::ipt::IptSlot::new(
            vec![crate::ipt::IptComponent::Connection {
                node_key: "missing".to_string(),
                output_key: "out".to_string(),
            }],
        )]);
        functions.insert("worker".to_string(), bad);

        let flow = Flow::new_draft("f", UserId::new(), JsonValue::Null, functions);
        assert!(flow.graph().is_err());
    }
}
