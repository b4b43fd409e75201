//! Domain state containers for the dispatch client.
//!
//! - One generic container per domain (dispatch, personnel, incident)
//! - Actions that call the gateway and fold the result into the container
//! - Reconciliation wiring from hub events to container patches
//! - Views that scope actions to a consumer's lifetime

pub mod auth;
pub mod clinical;
pub mod container;
pub mod dispatch;
pub mod incident;
pub mod personnel;
pub mod reconcile;
pub mod store;
pub mod view;

#[cfg(test)]
mod test_support;

pub use auth::{AuthState, AuthStore, Clock, SystemClock};
pub use clinical::{ClinicalState, ClinicalStore};
pub use container::{Container, ContainerState, Page, DEFAULT_PAGE_SIZE};
pub use dispatch::DispatchStore;
pub use incident::IncidentStore;
pub use personnel::PersonnelStore;
pub use reconcile::{wire_all, wire_dispatch, wire_incidents, wire_personnel, Reconciler, WiringError};
pub use store::Store;
pub use view::{StoreView, DEFAULT_RETRY_DELAY};
