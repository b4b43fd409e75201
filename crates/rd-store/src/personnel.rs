//! Personnel container.

use crate::container::{Container, Page, Sequence};
use crate::store::{Store, StoreHandle};
use rd_core::{
    require_reason, ActionError, CreatePersonalInput, Personal, PersonalStatus, PersonalUpdate,
    PersonnelFilters, RecordId,
};
use rd_gateway::operation::{
    CHANGE_PERSONAL_STATUS, CREATE_PERSONAL, DELETE_PERSONAL, PERSONAL, PERSONNEL,
    UPDATE_PERSONAL,
};
use rd_gateway::DynGateway;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone)]
pub struct PersonnelStore {
    handle: StoreHandle<Personal, PersonnelFilters>,
}

impl PersonnelStore {
    pub fn new(gateway: DynGateway, page: Page) -> Self {
        Self {
            handle: StoreHandle::new(Container::new("personnel", page), gateway),
        }
    }

    fn inner(&self) -> &Container<Personal, PersonnelFilters> {
        &self.handle.container
    }

    pub async fn load(&self, filters: Option<PersonnelFilters>) {
        let container = self.inner();
        let token = container.issue(Sequence::Load);
        let filters = match filters {
            Some(filters) => container.set_filters(filters),
            None => container.read(|s| s.filters.clone()),
        };

        let _ = self
            .handle
            .perform("load personnel", async {
                let result = self
                    .handle
                    .request::<Vec<Personal>>(&PERSONNEL, json!({ "filters": filters }))
                    .await;
                if !container.is_current(Sequence::Load, token) {
                    return Ok(());
                }
                let items = result?;
                debug!(count = items.len(), "Personnel loaded");
                container.replace_items(items, None);
                Ok(())
            })
            .await;
    }

    pub async fn select(&self, id: impl Into<RecordId>) {
        let id = id.into();
        let container = self.inner();
        let token = container.issue(Sequence::Select);

        let _ = self
            .handle
            .perform("load crew member", async {
                let result = self
                    .handle
                    .request::<Option<Personal>>(&PERSONAL, json!({ "id": id }))
                    .await;
                if !container.is_current(Sequence::Select, token) {
                    return Ok(());
                }
                let personal = result?.ok_or_else(|| {
                    ActionError::NotFound(format!("Crew member {id} not found"))
                })?;
                container.set_selected(Some(personal));
                Ok(())
            })
            .await;
    }

    pub async fn create(&self, input: CreatePersonalInput) -> Result<Personal, ActionError> {
        self.handle
            .perform("create crew member", async {
                if input.first_name.trim().is_empty() || input.last_name.trim().is_empty() {
                    return Err(ActionError::validation("First and last name are required"));
                }
                let personal: Personal = self
                    .handle
                    .request(&CREATE_PERSONAL, json!({ "input": input }))
                    .await?;
                self.inner().prepend(personal.clone());
                info!(id = %personal.id, "Crew member created");
                Ok(personal)
            })
            .await
    }

    /// Apply `changes` to a crew member. Only the supplied fields are
    /// patched locally.
    pub async fn update(&self, id: impl Into<RecordId>, changes: PersonalUpdate) {
        let id = id.into();
        if changes.is_empty() {
            debug!(%id, "Empty crew member update skipped");
            return;
        }

        let _ = self
            .handle
            .perform("update crew member", async {
                self.handle
                    .request::<Value>(&UPDATE_PERSONAL, json!({ "id": id, "input": changes }))
                    .await?;
                self.inner().patch(&id, |p| changes.apply_to(p));
                Ok(())
            })
            .await;
    }

    /// Change availability. `fuera_de_servicio` and `de_licencia` require a
    /// reason; that is the only case that returns `Err`.
    pub async fn change_status(
        &self,
        id: impl Into<RecordId>,
        status: PersonalStatus,
        reason: Option<&str>,
    ) -> Result<(), ActionError> {
        let id = id.into();
        let reason = if status.requires_reason() {
            let check = require_reason(reason, &format!("set status {status}"));
            if let Err(e) = &check {
                self.inner().record_failure("change crew member status", e.clone());
            }
            Some(check?)
        } else {
            reason.map(str::trim).filter(|r| !r.is_empty()).map(str::to_string)
        };

        let _ = self
            .handle
            .perform("change crew member status", async {
                self.handle
                    .request::<Value>(
                        &CHANGE_PERSONAL_STATUS,
                        json!({ "id": id, "status": status, "reason": reason }),
                    )
                    .await?;
                self.inner().patch(&id, |p| p.status = status);
                info!(%id, %status, "Crew member status changed");
                Ok(())
            })
            .await;
        Ok(())
    }

    /// Delete a crew member; `selected` is cleared when it is the one
    /// removed.
    pub async fn remove(&self, id: impl Into<RecordId>) {
        let id = id.into();
        let _ = self
            .handle
            .perform("delete crew member", async {
                self.handle
                    .request::<Value>(&DELETE_PERSONAL, json!({ "id": id }))
                    .await?;
                self.inner().remove(&id);
                info!(%id, "Crew member deleted");
                Ok(())
            })
            .await;
    }

    pub fn set_filters(&self, filters: PersonnelFilters) -> PersonnelFilters {
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

    /// Crew members currently `disponible`.
    pub fn available_count(&self) -> usize {
        self.inner()
            .read(|s| s.items.iter().filter(|p| p.is_available()).count())
    }
}

impl Store for PersonnelStore {
    type Item = Personal;
    type Filters = PersonnelFilters;

    fn container(&self) -> &Arc<Container<Personal, PersonnelFilters>> {
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
