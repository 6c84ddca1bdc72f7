//! DashMap-backed store implementations.
//!
//! Per-document atomicity only: each map entry is patched under its own
//! shard lock, and `find_or_create_by_trigger_flag` keys a dedicated map by
//! dedup flag so conditional insertion races resolve inside one `entry`
//! call.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use millrace_core::{FlowId, FlowOriginId, FlowRunRecordId, UserId};
use millrace_flow::permission::User;
use millrace_flow::store::{FlowPatch, FlowStore, RunStore, UserStore};
use millrace_flow::{Flow, FlowError, FlowRunRecord, RunPatch};

/// In-memory [`FlowStore`].
#[derive(Default)]
pub struct MemoryFlowStore {
    flows: DashMap<FlowId, Flow>,
}

impl MemoryFlowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlowStore for MemoryFlowStore {
    async fn insert(&self, flow: Flow) -> Result<Flow, FlowError> {
        self.flows.insert(flow.id, flow.clone());
        Ok(flow)
    }

    async fn get_by_id(&self, id: FlowId) -> Result<Option<Flow>, FlowError> {
        Ok(self.flows.get(&id).map(|f| f.clone()))
    }

    async fn get_online_by_origin(
        &self,
        origin_id: FlowOriginId,
    ) -> Result<Option<Flow>, FlowError> {
        Ok(self
            .flows
            .iter()
            .find(|f| f.origin_id == origin_id && !f.is_draft && !f.deleted && f.newest)
            .map(|f| f.clone()))
    }

    async fn get_draft_by_origin(
        &self,
        origin_id: FlowOriginId,
    ) -> Result<Option<Flow>, FlowError> {
        Ok(self
            .flows
            .iter()
            .find(|f| f.origin_id == origin_id && f.is_draft && !f.deleted)
            .map(|f| f.clone()))
    }

    async fn get_runnable_by_trigger_key(&self, key: &str) -> Result<Option<Flow>, FlowError> {
        Ok(self
            .flows
            .iter()
            .find(|f| f.trigger_key == key && !f.is_draft && !f.deleted)
            .map(|f| f.clone()))
    }

    async fn list_runnable(&self) -> Result<Vec<Flow>, FlowError> {
        Ok(self
            .flows
            .iter()
            .filter(|f| !f.is_draft && !f.deleted)
            .map(|f| f.clone())
            .collect())
    }

    async fn list_visible(
        &self,
        read_filter: Option<UserId>,
        name_fragment: Option<&str>,
    ) -> Result<Vec<Flow>, FlowError> {
        Ok(self
            .flows
            .iter()
            .filter(|f| !f.deleted)
            .filter(|f| read_filter.is_none_or(|user_id| f.permissions.read.contains(&user_id)))
            .filter(|f| name_fragment.is_none_or(|fragment| f.name.contains(fragment)))
            .map(|f| f.clone())
            .collect())
    }

    async fn patch(&self, id: FlowId, patch: FlowPatch) -> Result<Flow, FlowError> {
        match self.flows.entry(id) {
            Entry::Occupied(mut entry) => {
                patch.apply_to(entry.get_mut());
                Ok(entry.get().clone())
            }
            Entry::Vacant(_) => Err(FlowError::FlowNotFound { flow_id: id }),
        }
    }
}

/// In-memory [`RunStore`].
#[derive(Default)]
pub struct MemoryRunStore {
    records: DashMap<FlowRunRecordId, FlowRunRecord>,
    by_trigger_flag: DashMap<String, FlowRunRecordId>,
}

impl MemoryRunStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn insert(&self, record: FlowRunRecord) -> Result<FlowRunRecord, FlowError> {
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: FlowRunRecordId) -> Result<Option<FlowRunRecord>, FlowError> {
        Ok(self.records.get(&id).map(|r| r.clone()))
    }

    async fn patch(
        &self,
        id: FlowRunRecordId,
        patch: RunPatch,
    ) -> Result<FlowRunRecord, FlowError> {
        match self.records.entry(id) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().apply(&patch);
                Ok(entry.get().clone())
            }
            Entry::Vacant(_) => Err(FlowError::RunRecordNotFound { run_record_id: id }),
        }
    }

    async fn find_or_create_by_trigger_flag(
        &self,
        flag: &str,
        record: FlowRunRecord,
    ) -> Result<(FlowRunRecord, bool), FlowError> {
        // The flag map entry is the linearization point: whichever caller
        // claims it first owns the insert.
        match self.by_trigger_flag.entry(flag.to_string()) {
            Entry::Occupied(entry) => {
                let existing_id = *entry.get();
                drop(entry);
                let existing = self
                    .records
                    .get(&existing_id)
                    .map(|r| r.clone())
                    .ok_or(FlowError::RunRecordNotFound {
                        run_record_id: existing_id,
                    })?;
                Ok((existing, false))
            }
            Entry::Vacant(entry) => {
                entry.insert(record.id);
                self.records.insert(record.id, record.clone());
                Ok((record, true))
            }
        }
    }

    async fn latest_unfinished_for_flow(
        &self,
        flow_id: FlowId,
        exclude: FlowRunRecordId,
    ) -> Result<Option<FlowRunRecord>, FlowError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.flow_id == flow_id && r.id != exclude && r.end_time.is_none())
            .max_by_key(|r| r.trigger_time)
            .map(|r| r.clone()))
    }
}

/// In-memory [`UserStore`].
#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<UserId, User>,
}

impl MemoryUserStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a user. Test-facing convenience.
    pub fn put(&self, user: User) {
        self.users.insert(user.id, user);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get(&self, id: UserId) -> Result<Option<User>, FlowError> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }
}
