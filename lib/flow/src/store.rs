//! Persistence contracts for flows, run records, and users.
//!
//! Production deployments back these with a document store; tests use the
//! in-memory implementations from `millrace-storage`. Store failures surface
//! as `FlowError::StoreUnavailable` and are propagated to callers, never
//! auto-retried.

use crate::crontab::Crontab;
use crate::definition::Flow;
use crate::error::FlowError;
use crate::permission::{PermissionSet, User};
use crate::run::{FlowRunRecord, RunPatch};
use async_trait::async_trait;
use millrace_core::{FlowId, FlowOriginId, FlowRunRecordId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A field-level patch against one flow document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowPatch {
    pub name: Option<String>,
    pub position: Option<JsonValue>,
    pub crontab: Option<Option<Crontab>>,
    pub trigger_key: Option<String>,
    pub allow_trigger_by_key: Option<bool>,
    pub timeout_in_seconds: Option<u32>,
    pub retry_amount: Option<u16>,
    pub retry_interval_in_second: Option<u16>,
    pub allow_parallel_run: Option<bool>,
    pub permissions: Option<PermissionSet>,
    pub newest: Option<bool>,
    pub deleted: Option<bool>,
}

impl FlowPatch {
    /// Applies this patch to a flow document in place.
    pub fn apply_to(&self, flow: &mut Flow) {
        if let Some(name) = &self.name {
            flow.name = name.clone();
        }
        if let Some(position) = &self.position {
            flow.position = position.clone();
        }
        if let Some(crontab) = &self.crontab {
            flow.crontab = crontab.clone();
        }
        if let Some(trigger_key) = &self.trigger_key {
            flow.trigger_key = trigger_key.clone();
        }
        if let Some(allow) = self.allow_trigger_by_key {
            flow.allow_trigger_by_key = allow;
        }
        if let Some(timeout) = self.timeout_in_seconds {
            flow.timeout_in_seconds = timeout;
        }
        if let Some(amount) = self.retry_amount {
            flow.retry_amount = amount;
        }
        if let Some(interval) = self.retry_interval_in_second {
            flow.retry_interval_in_second = interval;
        }
        if let Some(allow) = self.allow_parallel_run {
            flow.allow_parallel_run = allow;
        }
        if let Some(permissions) = &self.permissions {
            flow.permissions = permissions.clone();
        }
        if let Some(newest) = self.newest {
            flow.newest = newest;
        }
        if let Some(deleted) = self.deleted {
            flow.deleted = deleted;
        }
    }
}

/// Persistence contract for flow definitions.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Persists a new flow document.
    async fn insert(&self, flow: Flow) -> Result<Flow, FlowError>;

    /// Fetches a flow by id, deleted or not.
    async fn get_by_id(&self, id: FlowId) -> Result<Option<Flow>, FlowError>;

    /// Fetches the newest non-deleted online flow for an origin.
    async fn get_online_by_origin(&self, origin_id: FlowOriginId)
    -> Result<Option<Flow>, FlowError>;

    /// Fetches the non-deleted draft for an origin.
    async fn get_draft_by_origin(&self, origin_id: FlowOriginId)
    -> Result<Option<Flow>, FlowError>;

    /// Fetches the runnable flow carrying the given trigger key.
    async fn get_runnable_by_trigger_key(&self, key: &str) -> Result<Option<Flow>, FlowError>;

    /// Lists every runnable flow: online, non-deleted, non-draft.
    async fn list_runnable(&self) -> Result<Vec<Flow>, FlowError>;

    /// Lists non-deleted flows, optionally read-filtered to one user and
    /// substring-matched on name.
    async fn list_visible(
        &self,
        read_filter: Option<UserId>,
        name_fragment: Option<&str>,
    ) -> Result<Vec<Flow>, FlowError>;

    /// Applies a field patch to one flow document.
    async fn patch(&self, id: FlowId, patch: FlowPatch) -> Result<Flow, FlowError>;
}

/// Persistence contract for run records.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persists a new run record.
    async fn insert(&self, record: FlowRunRecord) -> Result<FlowRunRecord, FlowError>;

    /// Fetches a run record by id.
    async fn get_by_id(&self, id: FlowRunRecordId) -> Result<Option<FlowRunRecord>, FlowError>;

    /// Applies a field patch to one run record.
    async fn patch(&self, id: FlowRunRecordId, patch: RunPatch)
    -> Result<FlowRunRecord, FlowError>;

    /// Atomic conditional insert keyed by dedup flag.
    ///
    /// Returns the record stored under the flag and whether this call
    /// created it. Two racing callers with the same flag observe the same
    /// record, exactly one of them with `created == true`.
    async fn find_or_create_by_trigger_flag(
        &self,
        flag: &str,
        record: FlowRunRecord,
    ) -> Result<(FlowRunRecord, bool), FlowError>;

    /// Most recently triggered record for the flow among those with no
    /// `end_time`, excluding the given record id. Finished records never
    /// mask an older still-unfinished one.
    async fn latest_unfinished_for_flow(
        &self,
        flow_id: FlowId,
        exclude: FlowRunRecordId,
    ) -> Result<Option<FlowRunRecord>, FlowError>;
}

/// Persistence contract for user identities.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetches a user by id.
    async fn get(&self, id: UserId) -> Result<Option<User>, FlowError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{FlowFunction, START_NODE_KEY};
    use std::collections::HashMap;

    #[test]
    fn flow_patch_applies_only_set_fields() {
        let mut flow = Flow::new_draft(
            "etl",
            UserId::new(),
            JsonValue::Null,
            HashMap::from([(START_NODE_KEY.to_string(), FlowFunction::start_node())]),
        );
        let original_key = flow.trigger_key.clone();

        let patch = FlowPatch {
            name: Some("etl nightly".to_string()),
            retry_amount: Some(2),
            retry_interval_in_second: Some(60),
            ..FlowPatch::default()
        };
        patch.apply_to(&mut flow);

        assert_eq!(flow.name, "etl nightly");
        assert!(flow.has_retry_strategy());
        assert_eq!(flow.trigger_key, original_key);
        assert!(!flow.deleted);
    }

    #[test]
    fn flow_patch_can_clear_crontab() {
        let mut flow = Flow::new_draft(
            "etl",
            UserId::new(),
            JsonValue::Null,
            HashMap::from([(START_NODE_KEY.to_string(), FlowFunction::start_node())]),
        );
        flow.crontab = Crontab::build("*/5 * * * *");
        assert!(flow.has_crontab());

        let patch = FlowPatch {
            crontab: Some(None),
            ..FlowPatch::default()
        };
        patch.apply_to(&mut flow);
        assert!(flow.crontab.is_none());
    }
}
