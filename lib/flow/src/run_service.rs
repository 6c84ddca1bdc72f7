//! Run record service.
//!
//! Creation (unconditional and crontab-deduplicated) and the lifecycle
//! transitions, each expressed as one [`RunPatch`] against one record.

use crate::crontab::Crontab;
use crate::error::FlowError;
use crate::run::{FlowRunRecord, RunPatch};
use crate::store::RunStore;
use chrono::{DateTime, Utc};
use millrace_core::{FlowId, FlowRunRecordId, FuncRunRecordId, UserId};
use std::collections::HashMap;
use std::sync::Arc;

/// Creation and lifecycle transitions for run records.
pub struct RunService<S: RunStore> {
    store: Arc<S>,
}

impl<S: RunStore> Clone for RunService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RunStore> RunService<S> {
    /// Creates a service over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Unconditionally persists a new record. Used by manual, key, and user
    /// triggers, which carry no dedup token.
    pub async fn create(&self, record: FlowRunRecord) -> Result<FlowRunRecord, FlowError> {
        self.store.insert(record).await
    }

    /// Deduplicated creation for crontab ticks.
    ///
    /// The dedup token is `"{flow_id}_{tick_flag}"`, so two pollers firing on
    /// the same minute for the same flow converge on one record. Returns the
    /// stored record and whether this call created it.
    pub async fn crontab_find_or_create(
        &self,
        mut record: FlowRunRecord,
        tick_time: DateTime<Utc>,
    ) -> Result<(FlowRunRecord, bool), FlowError> {
        let flag = format!("{}_{}", record.flow_id, Crontab::tick_flag(tick_time));
        record.crontab_trigger_flag = Some(flag.clone());
        self.store.find_or_create_by_trigger_flag(&flag, record).await
    }

    /// Fetches a record by id, erring when absent.
    pub async fn get_by_id(&self, id: FlowRunRecordId) -> Result<FlowRunRecord, FlowError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or(FlowError::RunRecordNotFound { run_record_id: id })
    }

    /// Marks the record as picked up by a worker.
    pub async fn start(&self, id: FlowRunRecordId) -> Result<FlowRunRecord, FlowError> {
        self.store.patch(id, RunPatch::start()).await
    }

    /// Marks the record as finished successfully.
    pub async fn suc(&self, id: FlowRunRecordId) -> Result<FlowRunRecord, FlowError> {
        self.store.patch(id, RunPatch::suc()).await
    }

    /// Marks the record as failed.
    pub async fn fail(
        &self,
        id: FlowRunRecordId,
        error_msg: impl Into<String>,
    ) -> Result<FlowRunRecord, FlowError> {
        self.store.patch(id, RunPatch::fail(error_msg)).await
    }

    /// Marks the record as rejected by a policy layer before starting.
    pub async fn intercepted(
        &self,
        id: FlowRunRecordId,
        intercept_msg: impl Into<String>,
    ) -> Result<FlowRunRecord, FlowError> {
        self.store.patch(id, RunPatch::intercepted(intercept_msg)).await
    }

    /// Marks the record as canceled because a previous run was unfinished.
    pub async fn not_allowed_parallel_run(
        &self,
        id: FlowRunRecordId,
    ) -> Result<FlowRunRecord, FlowError> {
        self.store.patch(id, RunPatch::not_allowed_parallel()).await
    }

    /// Marks the record as canceled by the timeout watchdog.
    pub async fn timeout_cancel(&self, id: FlowRunRecordId) -> Result<FlowRunRecord, FlowError> {
        self.store.patch(id, RunPatch::timeout_cancel()).await
    }

    /// Marks the record as canceled by a user.
    pub async fn user_cancel(
        &self,
        id: FlowRunRecordId,
        user_id: UserId,
    ) -> Result<FlowRunRecord, FlowError> {
        self.store.patch(id, RunPatch::user_cancel(user_id)).await
    }

    /// Records one more consumed retry attempt. The status is untouched; the
    /// worker re-drives the run itself.
    pub async fn patch_data_for_retry(
        &self,
        id: FlowRunRecordId,
        retried_amount: u16,
    ) -> Result<FlowRunRecord, FlowError> {
        self.store.patch(id, RunPatch::retry(retried_amount)).await
    }

    /// Replaces the node-to-sub-run map wholesale and forces `Running`.
    pub async fn patch_func_run_records(
        &self,
        id: FlowRunRecordId,
        records: HashMap<String, FuncRunRecordId>,
    ) -> Result<FlowRunRecord, FlowError> {
        self.store
            .patch(id, RunPatch::set_func_run_records(records))
            .await
    }

    /// Records a single node's sub-run.
    pub async fn add_func_run_record(
        &self,
        id: FlowRunRecordId,
        node_key: impl Into<String>,
        record_id: FuncRunRecordId,
    ) -> Result<FlowRunRecord, FlowError> {
        self.store
            .patch(id, RunPatch::add_func_run_record(node_key, record_id))
            .await
    }

    /// Best-effort check for an unfinished run of the same flow.
    ///
    /// Looks for the most recently triggered record for the flow whose
    /// `end_time` is still unset, excluding the record being created. This
    /// is a guard, not a lock: a concurrent finish between the read and the
    /// caller's decision is tolerated.
    pub async fn is_have_running_task(
        &self,
        flow_id: FlowId,
        exclude: FlowRunRecordId,
    ) -> Result<bool, FlowError> {
        let latest = self
            .store
            .latest_unfinished_for_flow(flow_id, exclude)
            .await?;
        Ok(latest.is_some())
    }

    /// Re-reads the authoritative record and reports its cancellation flag.
    ///
    /// Workers poll this between nodes. A store failure here must not kill a
    /// healthy run, so it is logged and reported as "not canceled".
    pub async fn re_get_to_check_is_canceled(&self, id: FlowRunRecordId) -> bool {
        match self.store.get_by_id(id).await {
            Ok(Some(record)) => record.canceled,
            Ok(None) => {
                tracing::warn!(run_record_id = %id, "cancellation check: record missing");
                false
            }
            Err(err) => {
                tracing::warn!(run_record_id = %id, error = %err, "cancellation check: store failed");
                false
            }
        }
    }
}
