//! Manual trigger paths.
//!
//! Key-based triggering for external callers holding a flow's trigger key,
//! and user-initiated triggering gated on the execute permission. Both paths
//! create the run record first and apply the parallel-run guard to it, so a
//! rejected run still leaves an auditable record.

use crate::error::TriggerError;
use millrace_core::FlowId;
use millrace_flow::run::{FlowRunRecord, TriggerSource, TriggerType};
use millrace_flow::store::{FlowStore, RunStore};
use millrace_flow::{Flow, FlowError, RunService, User};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-run literal overrides, node key → slot index → value.
pub type OverrideIptParams = HashMap<String, HashMap<usize, JsonValue>>;

/// Key- and user-initiated run creation.
pub struct ManualTrigger<F: FlowStore, R: RunStore> {
    flows: Arc<F>,
    runs: RunService<R>,
}

impl<F: FlowStore, R: RunStore> ManualTrigger<F, R> {
    /// Creates the trigger frontend over the given stores.
    pub fn new(flows: Arc<F>, runs: RunService<R>) -> Self {
        Self { flows, runs }
    }

    /// Triggers a run on behalf of an external caller holding the flow's
    /// trigger key.
    pub async fn trigger_by_key(
        &self,
        key: &str,
        override_ipt_params: OverrideIptParams,
    ) -> Result<FlowRunRecord, TriggerError> {
        let flow = self
            .flows
            .get_runnable_by_trigger_key(key)
            .await?
            .ok_or(FlowError::TriggerKeyNotFound)?;
        if !flow.allow_trigger_by_key {
            return Err(TriggerError::KeyTriggerDisabled { flow_id: flow.id });
        }

        let record = FlowRunRecord::new(
            flow.id,
            flow.origin_id,
            TriggerSource::Flow,
            TriggerType::Key,
        )
        .with_trigger_key(key)
        .with_override_ipt_params(override_ipt_params);

        self.create_guarded(&flow, record).await
    }

    /// Triggers a run on behalf of a user. Requires the execute permission;
    /// drafts are never runnable.
    pub async fn trigger_by_user(
        &self,
        flow_id: FlowId,
        user: &User,
        override_ipt_params: OverrideIptParams,
    ) -> Result<FlowRunRecord, TriggerError> {
        let flow = self
            .flows
            .get_by_id(flow_id)
            .await?
            .ok_or(FlowError::FlowNotFound { flow_id })?;
        if flow.is_draft {
            return Err(TriggerError::FlowIsDraft { flow_id });
        }
        if !flow.permissions.can_execute(user) {
            return Err(TriggerError::PermissionDenied {
                user_id: user.id,
                flow_id,
            });
        }

        let record = FlowRunRecord::new(
            flow.id,
            flow.origin_id,
            TriggerSource::Flow,
            TriggerType::User,
        )
        .with_trigger_user(user.id)
        .with_override_ipt_params(override_ipt_params);

        self.create_guarded(&flow, record).await
    }

    /// Persists the record, then applies the parallel-run guard to it.
    async fn create_guarded(
        &self,
        flow: &Flow,
        record: FlowRunRecord,
    ) -> Result<FlowRunRecord, TriggerError> {
        let record = self.runs.create(record).await?;

        if !flow.allow_parallel_run
            && self.runs.is_have_running_task(flow.id, record.id).await?
        {
            tracing::info!(
                flow_id = %flow.id,
                run_record_id = %record.id,
                "previous run unfinished, canceling trigger"
            );
            let record = self.runs.not_allowed_parallel_run(record.id).await?;
            return Ok(record);
        }

        Ok(record)
    }
}
