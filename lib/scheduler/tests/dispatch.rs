//! End-to-end trigger tests over the in-memory stores.

use chrono::{TimeZone, Utc};
use millrace_core::UserId;
use millrace_flow::node::{FlowFunction, START_NODE_KEY};
use millrace_flow::permission::User;
use millrace_flow::run::{RunStatus, TriggerType};
use millrace_flow::{FlowService, RunService};
use millrace_scheduler::{ManualTrigger, TriggerDispatcher, TriggerError};
use millrace_storage::{MemoryFlowStore, MemoryRunStore};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

struct Harness {
    flows: Arc<MemoryFlowStore>,
    flow_service: FlowService<MemoryFlowStore>,
    run_service: RunService<MemoryRunStore>,
}

impl Harness {
    fn new() -> Self {
        let flows = Arc::new(MemoryFlowStore::new());
        let runs = Arc::new(MemoryRunStore::new());
        Self {
            flows: Arc::clone(&flows),
            flow_service: FlowService::new(flows),
            run_service: RunService::new(runs),
        }
    }

    fn dispatcher(&self) -> TriggerDispatcher<MemoryFlowStore, MemoryRunStore> {
        TriggerDispatcher::new(Arc::clone(&self.flows), self.run_service.clone())
    }

    fn manual(&self) -> ManualTrigger<MemoryFlowStore, MemoryRunStore> {
        ManualTrigger::new(Arc::clone(&self.flows), self.run_service.clone())
    }

    /// Creates an online flow with an every-minute crontab.
    async fn online_flow_with_crontab(&self) -> millrace_flow::Flow {
        let draft = self
            .flow_service
            .create_draft_from_scratch(
                "scheduled etl",
                UserId::new(),
                JsonValue::Null,
                HashMap::from([(START_NODE_KEY.to_string(), FlowFunction::start_node())]),
            )
            .await
            .unwrap();
        let online = self
            .flow_service
            .create_online_from_draft(draft.id)
            .await
            .unwrap();
        self.flow_service
            .patch_crontab(online.id, "* * * * *")
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn poll_creates_one_record_per_tick() {
    let harness = Harness::new();
    let flow = harness.online_flow_with_crontab().await;
    let dispatcher = harness.dispatcher();

    let now = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 12).unwrap();
    let created = dispatcher.poll_once(now).await.unwrap();
    assert_eq!(created.len(), 1);

    let record = harness.run_service.get_by_id(created[0]).await.unwrap();
    assert_eq!(record.flow_id, flow.id);
    assert_eq!(record.trigger_type, TriggerType::Crontab);
    assert_eq!(
        record.trigger_time,
        Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap()
    );
    assert!(record.crontab_trigger_flag.is_some());

    // A second poll in the same minute loses the dedup race and creates
    // nothing, even from a different second.
    let later = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 55).unwrap();
    let created = dispatcher.poll_once(later).await.unwrap();
    assert!(created.is_empty());

    // The next minute fires again.
    let next = Utc.with_ymd_and_hms(2024, 3, 15, 10, 31, 3).unwrap();
    let created = dispatcher.poll_once(next).await.unwrap();
    assert_eq!(created.len(), 1);
}

#[tokio::test]
async fn poll_skips_flows_without_crontab() {
    let harness = Harness::new();
    let draft = harness
        .flow_service
        .create_draft_from_scratch(
            "manual only",
            UserId::new(),
            JsonValue::Null,
            HashMap::from([(START_NODE_KEY.to_string(), FlowFunction::start_node())]),
        )
        .await
        .unwrap();
    harness
        .flow_service
        .create_online_from_draft(draft.id)
        .await
        .unwrap();

    let created = harness.dispatcher().poll_once(Utc::now()).await.unwrap();
    assert!(created.is_empty());
}

#[tokio::test]
async fn poll_cancels_tick_when_parallel_runs_forbidden() {
    let harness = Harness::new();
    let flow = harness.online_flow_with_crontab().await;
    assert!(!flow.allow_parallel_run);
    let dispatcher = harness.dispatcher();

    let first_tick = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
    let created = dispatcher.poll_once(first_tick).await.unwrap();
    harness.run_service.start(created[0]).await.unwrap();

    // The earlier run is still unfinished when the next tick fires.
    let second_tick = Utc.with_ymd_and_hms(2024, 3, 15, 10, 31, 0).unwrap();
    let created = dispatcher.poll_once(second_tick).await.unwrap();
    assert_eq!(created.len(), 1);

    let record = harness.run_service.get_by_id(created[0]).await.unwrap();
    assert_eq!(record.status, RunStatus::NotAllowedParallelCanceled);
    assert!(record.end_time.is_some());
}

#[tokio::test]
async fn trigger_by_key_requires_opt_in() {
    let harness = Harness::new();
    let flow = harness.online_flow_with_crontab().await;
    let manual = harness.manual();

    let err = manual
        .trigger_by_key(&flow.trigger_key, HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TriggerError::KeyTriggerDisabled { .. }));

    harness
        .flow_service
        .patch_allow_trigger_by_key(flow.id, true)
        .await
        .unwrap();

    let record = manual
        .trigger_by_key(&flow.trigger_key, HashMap::new())
        .await
        .unwrap();
    assert_eq!(record.trigger_type, TriggerType::Key);
    assert_eq!(record.trigger_key.as_deref(), Some(flow.trigger_key.as_str()));
}

#[tokio::test]
async fn trigger_by_unknown_key_is_not_found() {
    let harness = Harness::new();
    let err = harness
        .manual()
        .trigger_by_key("no-such-key", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TriggerError::Flow(millrace_flow::FlowError::TriggerKeyNotFound)
    ));
}

#[tokio::test]
async fn trigger_by_user_enforces_execute_permission() {
    let harness = Harness::new();
    let flow = harness.online_flow_with_crontab().await;
    let manual = harness.manual();

    let outsider = User::new(UserId::new(), "outsider");
    let err = manual
        .trigger_by_user(flow.id, &outsider, HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TriggerError::PermissionDenied { .. }));

    // The creator holds execute; a super-user bypasses the list.
    let creator = User::new(flow.create_user_id, "creator");
    let record = manual
        .trigger_by_user(flow.id, &creator, HashMap::new())
        .await
        .unwrap();
    assert_eq!(record.trigger_type, TriggerType::User);
    assert_eq!(record.trigger_user_id, Some(creator.id));

    let root = User::super_user(UserId::new(), "root");
    manual
        .trigger_by_user(flow.id, &root, HashMap::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn trigger_by_user_rejects_drafts() {
    let harness = Harness::new();
    let creator = UserId::new();
    let draft = harness
        .flow_service
        .create_draft_from_scratch(
            "wip",
            creator,
            JsonValue::Null,
            HashMap::from([(START_NODE_KEY.to_string(), FlowFunction::start_node())]),
        )
        .await
        .unwrap();

    let err = harness
        .manual()
        .trigger_by_user(draft.id, &User::new(creator, "creator"), HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TriggerError::FlowIsDraft { .. }));
}

#[tokio::test]
async fn trigger_by_user_parallel_guard() {
    let harness = Harness::new();
    let flow = harness.online_flow_with_crontab().await;
    let manual = harness.manual();
    let creator = User::new(flow.create_user_id, "creator");

    let first = manual
        .trigger_by_user(flow.id, &creator, HashMap::new())
        .await
        .unwrap();
    harness.run_service.start(first.id).await.unwrap();

    let second = manual
        .trigger_by_user(flow.id, &creator, HashMap::new())
        .await
        .unwrap();
    assert_eq!(second.status, RunStatus::NotAllowedParallelCanceled);

    // With parallel runs allowed the guard never fires.
    harness
        .flow_service
        .patch_allow_parallel_run(flow.id, true)
        .await
        .unwrap();
    let third = manual
        .trigger_by_user(flow.id, &creator, HashMap::new())
        .await
        .unwrap();
    assert_eq!(third.status, RunStatus::Pending);
}

#[tokio::test]
async fn override_params_ride_along() {
    let harness = Harness::new();
    let flow = harness.online_flow_with_crontab().await;
    harness
        .flow_service
        .patch_allow_trigger_by_key(flow.id, true)
        .await
        .unwrap();

    let overrides = HashMap::from([(
        "fetch".to_string(),
        HashMap::from([(0usize, serde_json::json!("2024-03-15"))]),
    )]);
    let record = harness
        .manual()
        .trigger_by_key(&flow.trigger_key, overrides.clone())
        .await
        .unwrap();
    assert_eq!(record.override_ipt_params, overrides);
}
