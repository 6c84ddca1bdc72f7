//! Flow definition service.
//!
//! Drafting, publishing, and the narrow single-field mutators. The service is
//! generic over its [`FlowStore`] so the same logic runs against the
//! in-memory store in tests and a document store in production.

use crate::crontab::Crontab;
use crate::definition::Flow;
use crate::error::FlowError;
use crate::node::FlowFunction;
use crate::permission::{PermissionRole, User};
use crate::store::{FlowPatch, FlowStore};
use millrace_core::{FlowId, FlowOriginId, UserId};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use ulid::Ulid;

/// Drafting, versioning, and mutation of flow definitions.
pub struct FlowService<S: FlowStore> {
    store: Arc<S>,
}

impl<S: FlowStore> Clone for FlowService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: FlowStore> FlowService<S> {
    /// Creates a service over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Creates a draft under a brand-new origin.
    ///
    /// The creator receives all five permission roles and a fresh random
    /// trigger key is minted.
    pub async fn create_draft_from_scratch(
        &self,
        name: impl Into<String>,
        creator: UserId,
        position: JsonValue,
        flow_functions: HashMap<String, FlowFunction>,
    ) -> Result<Flow, FlowError> {
        if creator.is_nil() {
            return Err(FlowError::MissingRequiredField {
                field: "create_user_id",
            });
        }
        let flow = Flow::new_draft(name, creator, position, flow_functions);
        flow.graph().map_err(FlowError::from)?;
        self.store.insert(flow).await
    }

    /// Creates a draft under an existing origin.
    ///
    /// The draft inherits the trigger key and permission lists of the
    /// origin's current online flow but carries its own node graph.
    pub async fn create_draft_from_exist_flow(
        &self,
        name: impl Into<String>,
        creator: UserId,
        origin_id: FlowOriginId,
        position: JsonValue,
        flow_functions: HashMap<String, FlowFunction>,
    ) -> Result<Flow, FlowError> {
        if creator.is_nil() {
            return Err(FlowError::MissingRequiredField {
                field: "create_user_id",
            });
        }
        let online = self
            .store
            .get_online_by_origin(origin_id)
            .await?
            .ok_or(FlowError::OnlineFlowNotFound { origin_id })?;
        let draft = Flow::new_draft_from(name, creator, &online, position, flow_functions);
        draft.graph().map_err(FlowError::from)?;
        self.store.insert(draft).await
    }

    /// Publishes a draft as the new online version of its origin.
    ///
    /// With no prior online flow the draft's content goes online as version 1.
    /// Otherwise the new online record inherits the prior online flow's
    /// version (plus one), permissions, parallel-run policy, crontab, trigger
    /// key, timeout, and retry strategy, and the prior `newest` record is
    /// offlined first. The consumed draft is marked deleted either way.
    pub async fn create_online_from_draft(&self, draft_id: FlowId) -> Result<Flow, FlowError> {
        let draft = self
            .store
            .get_by_id(draft_id)
            .await?
            .filter(|f| f.is_draft && !f.deleted)
            .ok_or(FlowError::FlowNotFound { flow_id: draft_id })?;

        let prior = self.store.get_online_by_origin(draft.origin_id).await?;

        let mut online = draft.clone();
        online.id = FlowId::new();
        online.is_draft = false;
        online.newest = true;
        online.create_time = chrono::Utc::now();

        match &prior {
            None => {
                online.version = 1;
            }
            Some(prior) => {
                online.version = prior.version + 1;
                online.permissions = prior.permissions.clone();
                online.allow_parallel_run = prior.allow_parallel_run;
                online.crontab = prior.crontab.clone();
                online.trigger_key = prior.trigger_key.clone();
                online.allow_trigger_by_key = prior.allow_trigger_by_key;
                online.timeout_in_seconds = prior.timeout_in_seconds;
                online.retry_amount = prior.retry_amount;
                online.retry_interval_in_second = prior.retry_interval_in_second;
            }
        }

        // Offline the prior record before inserting so there is never a
        // moment with two `newest` flows under one origin.
        if let Some(prior) = &prior
            && prior.newest
        {
            self.store
                .patch(
                    prior.id,
                    FlowPatch {
                        newest: Some(false),
                        deleted: Some(true),
                        ..FlowPatch::default()
                    },
                )
                .await?;
        }

        let online = self.store.insert(online).await?;

        self.store
            .patch(
                draft.id,
                FlowPatch {
                    deleted: Some(true),
                    ..FlowPatch::default()
                },
            )
            .await?;

        Ok(online)
    }

    /// Renames a flow.
    pub async fn patch_name(&self, id: FlowId, name: impl Into<String>) -> Result<Flow, FlowError> {
        self.patch(
            id,
            FlowPatch {
                name: Some(name.into()),
                ..FlowPatch::default()
            },
        )
        .await
    }

    /// Replaces the canvas layout blob.
    pub async fn patch_position(&self, id: FlowId, position: JsonValue) -> Result<Flow, FlowError> {
        self.patch(
            id,
            FlowPatch {
                position: Some(position),
                ..FlowPatch::default()
            },
        )
        .await
    }

    /// Sets or clears the crontab schedule.
    ///
    /// A blank expression clears the schedule; anything else must pass
    /// evaluator validation.
    pub async fn patch_crontab(&self, id: FlowId, expression: &str) -> Result<Flow, FlowError> {
        Crontab::validate(expression)?;
        self.patch(
            id,
            FlowPatch {
                crontab: Some(Crontab::build(expression)),
                ..FlowPatch::default()
            },
        )
        .await
    }

    /// Sets both retry knobs. Rejects zero for either.
    pub async fn patch_retry_strategy(
        &self,
        id: FlowId,
        amount: u16,
        interval_in_second: u16,
    ) -> Result<Flow, FlowError> {
        if amount == 0 || interval_in_second == 0 {
            return Err(FlowError::InvalidRetryStrategy {
                amount,
                interval_in_second,
            });
        }
        self.patch(
            id,
            FlowPatch {
                retry_amount: Some(amount),
                retry_interval_in_second: Some(interval_in_second),
                ..FlowPatch::default()
            },
        )
        .await
    }

    /// Flips whether runs may overlap.
    pub async fn patch_allow_parallel_run(
        &self,
        id: FlowId,
        allow: bool,
    ) -> Result<Flow, FlowError> {
        self.patch(
            id,
            FlowPatch {
                allow_parallel_run: Some(allow),
                ..FlowPatch::default()
            },
        )
        .await
    }

    /// Flips whether key-based triggering is accepted.
    pub async fn patch_allow_trigger_by_key(
        &self,
        id: FlowId,
        allow: bool,
    ) -> Result<Flow, FlowError> {
        self.patch(
            id,
            FlowPatch {
                allow_trigger_by_key: Some(allow),
                ..FlowPatch::default()
            },
        )
        .await
    }

    /// Sets the per-run wall-clock timeout. Zero disables it.
    pub async fn patch_timeout(
        &self,
        id: FlowId,
        timeout_in_seconds: u32,
    ) -> Result<Flow, FlowError> {
        self.patch(
            id,
            FlowPatch {
                timeout_in_seconds: Some(timeout_in_seconds),
                ..FlowPatch::default()
            },
        )
        .await
    }

    /// Mints a fresh trigger key, invalidating the old one.
    pub async fn regenerate_trigger_key(&self, id: FlowId) -> Result<Flow, FlowError> {
        self.patch(
            id,
            FlowPatch {
                trigger_key: Some(Ulid::new().to_string()),
                ..FlowPatch::default()
            },
        )
        .await
    }

    /// Grants one role to one user.
    pub async fn add_permission(
        &self,
        id: FlowId,
        role: PermissionRole,
        user_id: UserId,
    ) -> Result<Flow, FlowError> {
        let flow = self.require(id).await?;
        let mut permissions = flow.permissions;
        permissions.add(role, user_id);
        self.patch(
            id,
            FlowPatch {
                permissions: Some(permissions),
                ..FlowPatch::default()
            },
        )
        .await
    }

    /// Revokes one role from one user.
    pub async fn remove_permission(
        &self,
        id: FlowId,
        role: PermissionRole,
        user_id: UserId,
    ) -> Result<Flow, FlowError> {
        let flow = self.require(id).await?;
        let mut permissions = flow.permissions;
        permissions.remove(role, user_id);
        self.patch(
            id,
            FlowPatch {
                permissions: Some(permissions),
                ..FlowPatch::default()
            },
        )
        .await
    }

    /// Fetches a flow by id.
    pub async fn get_by_id(&self, id: FlowId) -> Result<Option<Flow>, FlowError> {
        self.store.get_by_id(id).await
    }

    /// Fetches the newest online flow for an origin.
    pub async fn get_online_by_origin(
        &self,
        origin_id: FlowOriginId,
    ) -> Result<Option<Flow>, FlowError> {
        self.store.get_online_by_origin(origin_id).await
    }

    /// Fetches the editable draft for an origin.
    pub async fn get_draft_by_origin(
        &self,
        origin_id: FlowOriginId,
    ) -> Result<Option<Flow>, FlowError> {
        self.store.get_draft_by_origin(origin_id).await
    }

    /// Lists the flows a user may see, optionally filtered by a name
    /// fragment. Super-users see everything.
    pub async fn list_visible(
        &self,
        user: &User,
        name_fragment: Option<&str>,
    ) -> Result<Vec<Flow>, FlowError> {
        let read_filter = if user.super_user { None } else { Some(user.id) };
        self.store.list_visible(read_filter, name_fragment).await
    }

    async fn require(&self, id: FlowId) -> Result<Flow, FlowError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or(FlowError::FlowNotFound { flow_id: id })
    }

    async fn patch(&self, id: FlowId, patch: FlowPatch) -> Result<Flow, FlowError> {
        self.require(id).await?;
        self.store.patch(id, patch).await
    }
}
