//! Incident container.
//!
//! Incidents are paginated server-side: `total_count` mirrors the backend's
//! total, not the length of the current page.

use crate::container::{Container, Page, Sequence};
use crate::store::{Store, StoreHandle};
use rd_core::{
    require_reason, ActionError, CreateIncidentInput, Incident, IncidentFilters, IncidentPage,
    IncidentPriority, IncidentStatus, RecordId,
};
use rd_gateway::operation::{
    APPROVE_INCIDENT, CHANGE_INCIDENT_PRIORITY, CREATE_INCIDENT, INCIDENT, INCIDENTS,
    REJECT_INCIDENT, REQUEST_INCIDENT_ANALYSIS, UPDATE_INCIDENT_STATUS,
};
use rd_gateway::{DynGateway, Operation};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone)]
pub struct IncidentStore {
    handle: StoreHandle<Incident, IncidentFilters>,
}

impl IncidentStore {
    pub fn new(gateway: DynGateway, page: Page) -> Self {
        Self {
            handle: StoreHandle::new(Container::new("incident", page), gateway),
        }
    }

    fn inner(&self) -> &Container<Incident, IncidentFilters> {
        &self.handle.container
    }

    /// Fetch one page. New `filters` restart from the first page.
    pub async fn load(&self, filters: Option<IncidentFilters>, page: Option<Page>) {
        let container = self.inner();
        let token = container.issue(Sequence::Load);
        let filters = match filters {
            Some(filters) => {
                let merged = container.set_filters(filters);
                let limit = container.read(|s| s.page.limit);
                container.set_page(Page::new(limit));
                merged
            }
            None => container.read(|s| s.filters.clone()),
        };
        if let Some(page) = page {
            container.set_page(page);
        }
        let page = container.read(|s| s.page);

        let _ = self
            .handle
            .perform("load incidents", async {
                let result = self
                    .handle
                    .request::<IncidentPage>(
                        &INCIDENTS,
                        json!({
                            "filters": filters,
                            "limit": page.limit,
                            "offset": page.offset,
                        }),
                    )
                    .await;
                if !container.is_current(Sequence::Load, token) {
                    return Ok(());
                }
                let IncidentPage { items, total } = result?;
                debug!(count = items.len(), total, offset = page.offset, "Incidents loaded");
                container.replace_items(items, Some(total));
                Ok(())
            })
            .await;
    }

    /// Load the page after the current one. Returns false when the current
    /// page is the last.
    pub async fn next_page(&self) -> bool {
        let (page, total) = self.inner().read(|s| (s.page, s.total_count));
        let next = page.next();
        if u64::from(next.offset) >= total {
            debug!(offset = page.offset, total, "Already on the last incident page");
            return false;
        }
        self.load(None, Some(next)).await;
        true
    }

    pub async fn select(&self, id: impl Into<RecordId>) {
        let id = id.into();
        let container = self.inner();
        let token = container.issue(Sequence::Select);

        let _ = self
            .handle
            .perform("load incident", async {
                let result = self
                    .handle
                    .request::<Option<Incident>>(&INCIDENT, json!({ "id": id }))
                    .await;
                if !container.is_current(Sequence::Select, token) {
                    return Ok(());
                }
                let incident = result?
                    .ok_or_else(|| ActionError::NotFound(format!("Incident {id} not found")))?;
                container.set_selected(Some(incident));
                Ok(())
            })
            .await;
    }

    pub async fn create(&self, input: CreateIncidentInput) -> Result<Incident, ActionError> {
        self.handle
            .perform("create incident", async {
                if input.description.trim().is_empty() {
                    return Err(ActionError::validation("An incident needs a description"));
                }
                let incident: Incident = self
                    .handle
                    .request(&CREATE_INCIDENT, json!({ "input": input }))
                    .await?;
                self.inner().prepend(incident.clone());
                info!(id = %incident.id, "Incident created");
                Ok(incident)
            })
            .await
    }

    /// Move an incident to `status`. `rechazado` requires a reason.
    pub async fn update_status(
        &self,
        id: impl Into<RecordId>,
        status: IncidentStatus,
        reason: Option<&str>,
    ) -> Result<(), ActionError> {
        let id = id.into();
        let check = self.check_transition(&id, status).and_then(|()| {
            if status.requires_reason() {
                require_reason(reason, "reject an incident").map(Some)
            } else {
                Ok(reason.map(str::to_string))
            }
        });
        let reason = self.precheck("update incident status", check)?;

        let variables = json!({ "id": id, "status": status, "reason": reason });
        self.transition("update incident status", &UPDATE_INCIDENT_STATUS, variables, &id, status, reason)
            .await;
        Ok(())
    }

    pub async fn approve(&self, id: impl Into<RecordId>) -> Result<(), ActionError> {
        let id = id.into();
        self.precheck(
            "approve incident",
            self.check_transition(&id, IncidentStatus::Aprobado),
        )?;

        self.transition(
            "approve incident",
            &APPROVE_INCIDENT,
            json!({ "id": id }),
            &id,
            IncidentStatus::Aprobado,
            None,
        )
        .await;
        Ok(())
    }

    /// Reject an incident. `reason` is required and never defaulted.
    pub async fn reject(&self, id: impl Into<RecordId>, reason: &str) -> Result<(), ActionError> {
        let id = id.into();
        let check = require_reason(Some(reason), "reject an incident").and_then(|reason| {
            self.check_transition(&id, IncidentStatus::Rechazado)
                .map(|()| reason)
        });
        let reason = self.precheck("reject incident", check)?;

        self.transition(
            "reject incident",
            &REJECT_INCIDENT,
            json!({ "id": id, "reason": reason }),
            &id,
            IncidentStatus::Rechazado,
            Some(reason),
        )
        .await;
        Ok(())
    }

    /// Ask the backend to analyse an incident; the result arrives later as
    /// an `incident:analysis-completed` event.
    pub async fn request_analysis(&self, id: impl Into<RecordId>) -> Result<(), ActionError> {
        let id = id.into();
        self.precheck(
            "request incident analysis",
            self.check_transition(&id, IncidentStatus::EnAnalisis),
        )?;

        self.transition(
            "request incident analysis",
            &REQUEST_INCIDENT_ANALYSIS,
            json!({ "id": id }),
            &id,
            IncidentStatus::EnAnalisis,
            None,
        )
        .await;
        Ok(())
    }

    pub async fn change_priority(&self, id: impl Into<RecordId>, priority: IncidentPriority) {
        let id = id.into();
        let _ = self
            .handle
            .perform("change incident priority", async {
                self.handle
                    .request::<Value>(
                        &CHANGE_INCIDENT_PRIORITY,
                        json!({ "id": id, "priority": priority }),
                    )
                    .await?;
                self.inner().patch(&id, |i| i.priority = Some(priority));
                Ok(())
            })
            .await;
    }

    pub fn set_filters(&self, filters: IncidentFilters) -> IncidentFilters {
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

    pub fn total_count(&self) -> u64 {
        self.inner().read(|s| s.total_count)
    }

    async fn transition(
        &self,
        action: &str,
        operation: &'static Operation,
        variables: Value,
        id: &RecordId,
        status: IncidentStatus,
        reason: Option<String>,
    ) {
        let _ = self
            .handle
            .perform(action, async {
                self.handle.request::<Value>(operation, variables).await?;
                self.inner().patch(id, |i| {
                    i.status = status;
                    if status == IncidentStatus::Rechazado {
                        i.rejection_reason = reason.clone();
                    }
                });
                info!(%id, %status, "Incident status changed");
                Ok(())
            })
            .await;
    }

    fn check_transition(&self, id: &RecordId, next: IncidentStatus) -> Result<(), ActionError> {
        let current = self.inner().read(|s| s.find(id).map(|i| i.status));
        match current {
            Some(current) if !current.can_transition_to(next) => Err(ActionError::Validation(
                format!("Incident {id} cannot move from {current} to {next}"),
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

impl Store for IncidentStore {
    type Item = Incident;
    type Filters = IncidentFilters;

    fn container(&self) -> &Arc<Container<Incident, IncidentFilters>> {
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
