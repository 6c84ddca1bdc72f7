//! Crontab polling loop.
//!
//! Once a minute the dispatcher walks every runnable flow, asks its schedule
//! whether the current minute is a firing tick, and creates a deduplicated
//! run record for each hit. Dedup rests entirely on the run store's
//! conditional insert, so any number of dispatcher replicas may poll the same
//! minute.

use crate::error::TriggerError;
use chrono::{DateTime, Timelike, Utc};
use millrace_core::FlowRunRecordId;
use millrace_flow::run::{FlowRunRecord, TriggerSource, TriggerType};
use millrace_flow::store::{FlowStore, RunStore};
use millrace_flow::RunService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Evaluates crontab schedules and creates run records for firing ticks.
pub struct TriggerDispatcher<F: FlowStore, R: RunStore> {
    flows: Arc<F>,
    runs: RunService<R>,
}

impl<F: FlowStore, R: RunStore> TriggerDispatcher<F, R> {
    /// Creates a dispatcher over the given stores.
    pub fn new(flows: Arc<F>, runs: RunService<R>) -> Self {
        Self { flows, runs }
    }

    /// Evaluates one tick.
    ///
    /// Returns the ids of run records actually created by this call. Records
    /// that lost the dedup race to another poller are not reported. A record
    /// created for a flow that forbids parallel runs while an earlier run is
    /// still unfinished is immediately transitioned to
    /// `NotAllowedParallelCanceled`, but its id is still returned: the record
    /// exists and documents the rejected tick.
    pub async fn poll_once(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<FlowRunRecordId>, TriggerError> {
        let tick = truncate_to_minute(now);
        let mut created_ids = Vec::new();

        for flow in self.flows.list_runnable().await? {
            let Some(crontab) = &flow.crontab else {
                continue;
            };
            if crontab.is_zero() || !crontab.should_fire_now(now) {
                continue;
            }

            let mut record = FlowRunRecord::new(
                flow.id,
                flow.origin_id,
                TriggerSource::Flow,
                TriggerType::Crontab,
            );
            record.trigger_time = tick;

            let (record, created) = self.runs.crontab_find_or_create(record, tick).await?;
            if !created {
                continue;
            }

            tracing::info!(
                flow_id = %flow.id,
                run_record_id = %record.id,
                crontab = crontab.expression(),
                "crontab tick dispatched"
            );

            if !flow.allow_parallel_run
                && self.runs.is_have_running_task(flow.id, record.id).await?
            {
                tracing::info!(
                    flow_id = %flow.id,
                    run_record_id = %record.id,
                    "previous run unfinished, canceling tick"
                );
                self.runs.not_allowed_parallel_run(record.id).await?;
            }

            created_ids.push(record.id);
        }

        Ok(created_ids)
    }

    /// Polls once a minute until the shutdown channel fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.poll_once(Utc::now()).await {
                        Ok(ids) if !ids.is_empty() => {
                            tracing::info!(count = ids.len(), "crontab poll created run records");
                        }
                        Ok(_) => {}
                        Err(err) => {
                            tracing::error!(error = %err, "crontab poll failed");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("trigger dispatcher shutting down");
                    return;
                }
            }
        }
    }
}

fn truncate_to_minute(time: DateTime<Utc>) -> DateTime<Utc> {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}
