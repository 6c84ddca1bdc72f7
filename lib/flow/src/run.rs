//! Run records and the patch primitive that mutates them.
//!
//! A `FlowRunRecord` is the single source of truth for one execution of a
//! flow. Records are append-only at the collection level (never deleted) and
//! every in-place mutation flows through [`RunPatch`], so each lifecycle
//! transition is one field-patch against one document.

use chrono::{DateTime, Utc};
use millrace_core::{
    ArrangementId, ArrangementRunRecordId, FlowId, FlowOriginId, FlowRunRecordId, FuncRunRecordId,
    TraceId, UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Lifecycle state of a run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created but not yet picked up by a worker.
    Pending,
    /// At least one node is executing.
    Running,
    /// All nodes finished successfully.
    Success,
    /// A node failed and retries (if any) were exhausted.
    Failed,
    /// A user asked for cancellation.
    UserCanceled,
    /// The flow's wall-clock timeout elapsed.
    TimeoutCanceled,
    /// A policy layer rejected the run before it started.
    InterceptedCanceled,
    /// A previous run was still unfinished and parallel runs are disallowed.
    NotAllowedParallelCanceled,
}

impl RunStatus {
    /// True once the record can never change status again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// What kind of definition the run was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// A standalone flow.
    Flow,
    /// A flow embedded in an arrangement.
    Arrangement,
}

/// What caused the run to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// The crontab evaluator fired.
    Crontab,
    /// An external caller presented the flow's trigger key.
    Key,
    /// A user clicked run.
    User,
}

/// One execution of a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRunRecord {
    /// Unique identifier.
    pub id: FlowRunRecordId,
    /// The exact flow version that ran.
    pub flow_id: FlowId,
    /// The flow's origin, for history queries across versions.
    pub flow_origin_id: FlowOriginId,
    /// Set when the run belongs to an arrangement.
    pub arrangement_id: Option<ArrangementId>,
    /// The flow version the arrangement embedded, when applicable.
    pub arrangement_flow_id: Option<FlowId>,
    /// The arrangement run this flow run is part of, when applicable.
    pub arrangement_run_record_id: Option<ArrangementRunRecordId>,
    /// Node key → sub-run record, populated incrementally as nodes start.
    pub func_run_records: HashMap<String, FuncRunRecordId>,
    /// When the trigger decision was made.
    pub trigger_time: DateTime<Utc>,
    /// The trigger key presented, for key-triggered runs.
    pub trigger_key: Option<String>,
    /// Standalone flow or arrangement member.
    pub trigger_source: TriggerSource,
    /// Crontab, key, or user.
    pub trigger_type: TriggerType,
    /// The user behind a user-triggered run.
    pub trigger_user_id: Option<UserId>,
    /// Dedup token for crontab ticks, `"{flow_id}_{tick_flag}"`.
    pub crontab_trigger_flag: Option<String>,
    /// Set by the `start` transition.
    pub start_time: Option<DateTime<Utc>>,
    /// Set exactly once, by the first terminal transition.
    pub end_time: Option<DateTime<Utc>>,
    /// Lifecycle state.
    pub status: RunStatus,
    /// Failure detail. Distinct channel from `intercept_msg`.
    pub error_msg: Option<String>,
    /// Policy-rejection detail.
    pub intercept_msg: Option<String>,
    /// How many retry attempts have been consumed.
    pub retried_amount: u16,
    /// Cooperative cancellation flag polled by workers.
    pub canceled: bool,
    /// Whether the cancellation came from the timeout watchdog.
    pub timeout_canceled: bool,
    /// The user who canceled, for user cancellations.
    pub cancel_user_id: Option<UserId>,
    /// Correlation id threaded through logs.
    pub trace_id: TraceId,
    /// Per-run literal overrides, node key → slot index → value.
    pub override_ipt_params: HashMap<String, HashMap<usize, JsonValue>>,
}

impl FlowRunRecord {
    /// Creates a pending record for one flow version.
    #[must_use]
    pub fn new(
        flow_id: FlowId,
        flow_origin_id: FlowOriginId,
        trigger_source: TriggerSource,
        trigger_type: TriggerType,
    ) -> Self {
        Self {
            id: FlowRunRecordId::new(),
            flow_id,
            flow_origin_id,
            arrangement_id: None,
            arrangement_flow_id: None,
            arrangement_run_record_id: None,
            func_run_records: HashMap::new(),
            trigger_time: Utc::now(),
            trigger_key: None,
            trigger_source,
            trigger_type,
            trigger_user_id: None,
            crontab_trigger_flag: None,
            start_time: None,
            end_time: None,
            status: RunStatus::Pending,
            error_msg: None,
            intercept_msg: None,
            retried_amount: 0,
            canceled: false,
            timeout_canceled: false,
            cancel_user_id: None,
            trace_id: TraceId::new(),
            override_ipt_params: HashMap::new(),
        }
    }

    /// Attaches the user behind a user-triggered run.
    #[must_use]
    pub fn with_trigger_user(mut self, user_id: UserId) -> Self {
        self.trigger_user_id = Some(user_id);
        self
    }

    /// Attaches the presented trigger key.
    #[must_use]
    pub fn with_trigger_key(mut self, key: impl Into<String>) -> Self {
        self.trigger_key = Some(key.into());
        self
    }

    /// Attaches per-run literal overrides.
    #[must_use]
    pub fn with_override_ipt_params(
        mut self,
        params: HashMap<String, HashMap<usize, JsonValue>>,
    ) -> Self {
        self.override_ipt_params = params;
        self
    }

    /// True once the record can never change status again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Applies a patch in place. `end_time` is written at most once.
    pub fn apply(&mut self, patch: &RunPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(start_time) = patch.start_time {
            self.start_time = Some(start_time);
        }
        if let Some(end_time) = patch.end_time
            && self.end_time.is_none()
        {
            self.end_time = Some(end_time);
        }
        if let Some(error_msg) = &patch.error_msg {
            self.error_msg = Some(error_msg.clone());
        }
        if let Some(intercept_msg) = &patch.intercept_msg {
            self.intercept_msg = Some(intercept_msg.clone());
        }
        if let Some(retried_amount) = patch.retried_amount {
            self.retried_amount = retried_amount;
        }
        if let Some(canceled) = patch.canceled {
            self.canceled = canceled;
        }
        if let Some(timeout_canceled) = patch.timeout_canceled {
            self.timeout_canceled = timeout_canceled;
        }
        if let Some(cancel_user_id) = patch.cancel_user_id {
            self.cancel_user_id = Some(cancel_user_id);
        }
        if let Some(func_run_records) = &patch.func_run_records {
            self.func_run_records = func_run_records.clone();
        }
        for (node_key, record_id) in &patch.added_func_run_records {
            self.func_run_records.insert(node_key.clone(), *record_id);
        }
    }
}

/// A field-level patch against one run record.
///
/// Every lifecycle transition is expressed as one of the named constructors
/// here, applied atomically by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunPatch {
    pub status: Option<RunStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error_msg: Option<String>,
    pub intercept_msg: Option<String>,
    pub retried_amount: Option<u16>,
    pub canceled: Option<bool>,
    pub timeout_canceled: Option<bool>,
    pub cancel_user_id: Option<UserId>,
    pub func_run_records: Option<HashMap<String, FuncRunRecordId>>,
    pub added_func_run_records: Vec<(String, FuncRunRecordId)>,
}

impl RunPatch {
    /// Marks the run as picked up by a worker.
    #[must_use]
    pub fn start() -> Self {
        Self {
            status: Some(RunStatus::Running),
            start_time: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Marks the run as finished successfully.
    #[must_use]
    pub fn suc() -> Self {
        Self {
            status: Some(RunStatus::Success),
            end_time: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Marks the run as failed with a failure message.
    #[must_use]
    pub fn fail(error_msg: impl Into<String>) -> Self {
        Self {
            status: Some(RunStatus::Failed),
            end_time: Some(Utc::now()),
            error_msg: Some(error_msg.into()),
            ..Self::default()
        }
    }

    /// Marks the run as rejected by a policy layer.
    #[must_use]
    pub fn intercepted(intercept_msg: impl Into<String>) -> Self {
        Self {
            status: Some(RunStatus::InterceptedCanceled),
            end_time: Some(Utc::now()),
            intercept_msg: Some(intercept_msg.into()),
            ..Self::default()
        }
    }

    /// Marks the run as canceled because a previous run was still active.
    #[must_use]
    pub fn not_allowed_parallel() -> Self {
        Self {
            status: Some(RunStatus::NotAllowedParallelCanceled),
            end_time: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Marks the run as canceled by the timeout watchdog.
    #[must_use]
    pub fn timeout_cancel() -> Self {
        Self {
            status: Some(RunStatus::TimeoutCanceled),
            end_time: Some(Utc::now()),
            canceled: Some(true),
            timeout_canceled: Some(true),
            ..Self::default()
        }
    }

    /// Marks the run as canceled by a user.
    #[must_use]
    pub fn user_cancel(user_id: UserId) -> Self {
        Self {
            status: Some(RunStatus::UserCanceled),
            end_time: Some(Utc::now()),
            canceled: Some(true),
            cancel_user_id: Some(user_id),
            ..Self::default()
        }
    }

    /// Bumps the consumed-retries counter without touching the status.
    #[must_use]
    pub fn retry(retried_amount: u16) -> Self {
        Self {
            retried_amount: Some(retried_amount),
            ..Self::default()
        }
    }

    /// Replaces the node-to-sub-run map wholesale and forces `Running`.
    #[must_use]
    pub fn set_func_run_records(records: HashMap<String, FuncRunRecordId>) -> Self {
        Self {
            status: Some(RunStatus::Running),
            func_run_records: Some(records),
            ..Self::default()
        }
    }

    /// Records one node's sub-run without disturbing the rest of the map.
    #[must_use]
    pub fn add_func_run_record(node_key: impl Into<String>, record_id: FuncRunRecordId) -> Self {
        Self {
            added_func_run_records: vec![(node_key.into(), record_id)],
            ..Self::default()
        }
    }
}
