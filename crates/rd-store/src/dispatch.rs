//! Dispatch container.

use crate::container::{Container, Page, Sequence};
use crate::store::{Store, StoreHandle};
use rd_core::{
    require_reason, ActionError, CreateDispatchInput, Dispatch, DispatchFeedback,
    DispatchFilters, DispatchStatus, RecordId,
};
use rd_gateway::operation::{
    CANCEL_DISPATCH, COMPLETE_DISPATCH, CREATE_DISPATCH, DISPATCH, DISPATCHES,
    SUBMIT_DISPATCH_FEEDBACK, UPDATE_DISPATCH_STATUS,
};
use rd_gateway::DynGateway;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone)]
pub struct DispatchStore {
    handle: StoreHandle<Dispatch, DispatchFilters>,
}

impl DispatchStore {
    pub fn new(gateway: DynGateway, page: Page) -> Self {
        Self {
            handle: StoreHandle::new(Container::new("dispatch", page), gateway),
        }
    }

    fn inner(&self) -> &Container<Dispatch, DispatchFilters> {
        &self.handle.container
    }

    /// Fetch the list. `filters` are merged into the current filters first.
    pub async fn load(&self, filters: Option<DispatchFilters>, limit: Option<u32>) {
        let container = self.inner();
        let token = container.issue(Sequence::Load);
        let filters = match filters {
            Some(filters) => container.set_filters(filters),
            None => container.read(|s| s.filters.clone()),
        };
        if let Some(limit) = limit {
            container.set_page(Page::new(limit));
        }
        let limit = container.read(|s| s.page.limit);

        let _ = self
            .handle
            .perform("load dispatches", async {
                let result = self
                    .handle
                    .request::<Vec<Dispatch>>(
                        &DISPATCHES,
                        json!({ "filters": filters, "limit": limit }),
                    )
                    .await;
                if !container.is_current(Sequence::Load, token) {
                    return Ok(());
                }
                let items = result?;
                debug!(count = items.len(), "Dispatches loaded");
                container.replace_items(items, None);
                Ok(())
            })
            .await;
    }

    /// Fetch one dispatch into `selected`.
    pub async fn select(&self, id: impl Into<RecordId>) {
        let id = id.into();
        let container = self.inner();
        let token = container.issue(Sequence::Select);

        let _ = self
            .handle
            .perform("load dispatch", async {
                let result = self
                    .handle
                    .request::<Option<Dispatch>>(&DISPATCH, json!({ "id": id }))
                    .await;
                if !container.is_current(Sequence::Select, token) {
                    return Ok(());
                }
                let dispatch = result?
                    .ok_or_else(|| ActionError::NotFound(format!("Dispatch {id} not found")))?;
                container.set_selected(Some(dispatch));
                Ok(())
            })
            .await;
    }

    pub async fn create(&self, input: CreateDispatchInput) -> Result<Dispatch, ActionError> {
        self.handle
            .perform("create dispatch", async {
                input.validate().map_err(ActionError::Validation)?;
                let dispatch: Dispatch = self
                    .handle
                    .request(&CREATE_DISPATCH, json!({ "input": input }))
                    .await?;
                self.inner().prepend(dispatch.clone());
                info!(id = %dispatch.id, "Dispatch created");
                Ok(dispatch)
            })
            .await
    }

    /// Move a dispatch to `status`.
    ///
    /// Returns `Err` only when the transition is not allowed from the known
    /// current status; backend failures land on `error`.
    pub async fn update_status(
        &self,
        id: impl Into<RecordId>,
        status: DispatchStatus,
    ) -> Result<(), ActionError> {
        let id = id.into();
        self.precheck("update dispatch status", self.check_transition(&id, status))?;

        let _ = self
            .handle
            .perform("update dispatch status", async {
                self.handle
                    .request::<Value>(&UPDATE_DISPATCH_STATUS, json!({ "id": id, "status": status }))
                    .await?;
                self.inner().patch(&id, |d| d.status = status);
                Ok(())
            })
            .await;
        Ok(())
    }

    /// Complete a dispatch; `feedback` is submitted by a second call only
    /// when provided.
    pub async fn complete(
        &self,
        id: impl Into<RecordId>,
        feedback: Option<DispatchFeedback>,
    ) -> Result<(), ActionError> {
        let id = id.into();
        let check = self
            .check_transition(&id, DispatchStatus::Completed)
            .and_then(|()| match &feedback {
                Some(f) if !(1..=5).contains(&f.rating) => Err(ActionError::Validation(format!(
                    "Rating must be between 1 and 5, got {}",
                    f.rating
                ))),
                _ => Ok(()),
            });
        self.precheck("complete dispatch", check)?;

        let _ = self
            .handle
            .perform("complete dispatch", async {
                self.handle
                    .request::<Value>(&COMPLETE_DISPATCH, json!({ "id": id }))
                    .await?;
                self.inner()
                    .patch(&id, |d| d.status = DispatchStatus::Completed);
                info!(%id, "Dispatch completed");

                if let Some(feedback) = &feedback {
                    self.handle
                        .request::<Value>(
                            &SUBMIT_DISPATCH_FEEDBACK,
                            json!({ "id": id, "feedback": feedback }),
                        )
                        .await?;
                }
                Ok(())
            })
            .await;
        Ok(())
    }

    /// Cancel a dispatch. `reason` is required and never defaulted.
    pub async fn cancel(&self, id: impl Into<RecordId>, reason: &str) -> Result<(), ActionError> {
        let id = id.into();
        let check = require_reason(Some(reason), "cancel a dispatch").and_then(|reason| {
            self.check_transition(&id, DispatchStatus::Cancelled)
                .map(|()| reason)
        });
        let reason = self.precheck("cancel dispatch", check)?;

        let _ = self
            .handle
            .perform("cancel dispatch", async {
                self.handle
                    .request::<Value>(&CANCEL_DISPATCH, json!({ "id": id, "reason": reason }))
                    .await?;
                self.inner().patch(&id, |d| {
                    d.status = DispatchStatus::Cancelled;
                    d.cancel_reason = Some(reason.clone());
                });
                info!(%id, "Dispatch cancelled");
                Ok(())
            })
            .await;
        Ok(())
    }

    pub fn set_filters(&self, filters: DispatchFilters) -> DispatchFilters {
        self.inner().set_filters(filters)
    }

    pub fn clear_filters(&self) {
        self.inner().clear_filters();
    }

    pub fn clear_selection(&self) {
        self.inner().clear_selection();
    }

    pub fn clear_error(&self) {
        self.inner().clear_error();
    }

    pub fn reset(&self) {
        self.inner().reset();
    }

    /// Dispatches not yet in a terminal status.
    pub fn active_count(&self) -> usize {
        self.inner()
            .read(|s| s.items.iter().filter(|d| !d.status.is_terminal()).count())
    }

    fn check_transition(&self, id: &RecordId, next: DispatchStatus) -> Result<(), ActionError> {
        let current = self.inner().read(|s| s.find(id).map(|d| d.status));
        match current {
            Some(current) if !current.can_transition_to(next) => Err(ActionError::Validation(
                format!("Dispatch {id} cannot move from {current} to {next}"),
            )),
            _ => Ok(()),
        }
    }

    fn precheck<R>(&self, action: &str, check: Result<R, ActionError>) -> Result<R, ActionError> {
        if let Err(e) = &check {
            self.inner().record_failure(action, e.clone());
        }
        check
    }
}

impl Store for DispatchStore {
    type Item = Dispatch;
    type Filters = DispatchFilters;

    fn container(&self) -> &Arc<Container<Dispatch, DispatchFilters>> {
        &self.handle.container
    }

    fn cancellation(&self) -> &CancellationToken {
        self.handle.cancellation()
    }

    fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            handle: self.handle.scoped(token),
        }
    }
}
