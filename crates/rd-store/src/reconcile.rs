//! Event-to-state reconciliation.
//!
//! Registers hub listeners that fold real-time domain events into the
//! containers. Every handler goes through the container's write methods, so
//! a replayed event is idempotent and never duplicates an entry.

use crate::container::Container;
use crate::dispatch::DispatchStore;
use crate::incident::IncidentStore;
use crate::personnel::PersonnelStore;
use crate::store::Store;
use chrono::Utc;
use rd_core::{
    AmbulanceLocationUpdated, Dispatch, DispatchCompleted, DispatchStatus, Filters, Incident,
    IncidentAnalysisCompleted, IncidentPriorityChanged, IncidentStatus, Personal,
    PersonalStatus, Record, StatusChanged,
};
use rd_hub::{EventHub, HubEvent, Subscription};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WiringError {
    #[error("{0} container is already wired to the event hub")]
    AlreadyWired(&'static str),
}

/// Listeners registered for one or more containers.
///
/// Dropping it leaves the listeners in place; call [`Reconciler::detach`]
/// to remove them and allow the containers to be wired again.
#[must_use = "dropping a Reconciler keeps its listeners; keep it to call detach()"]
#[derive(Debug, Default)]
pub struct Reconciler {
    subscriptions: Vec<Subscription>,
    guards: Vec<(&'static str, Arc<AtomicBool>)>,
}

impl Reconciler {
    /// Combine two reconcilers into one.
    pub fn merge(mut self, other: Reconciler) -> Self {
        self.subscriptions.extend(other.subscriptions);
        self.guards.extend(other.guards);
        self
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Containers covered, by name.
    pub fn containers(&self) -> Vec<&'static str> {
        self.guards.iter().map(|(name, _)| *name).collect()
    }

    /// Unsubscribe every listener and release the wiring guards. Returns
    /// how many listeners were removed.
    pub fn detach(self) -> usize {
        let removed = self
            .subscriptions
            .into_iter()
            .map(Subscription::unsubscribe)
            .filter(|removed| *removed)
            .count();
        for (name, guard) in self.guards {
            guard.store(false, Ordering::SeqCst);
            debug!(container = name, "Container unwired");
        }
        removed
    }
}

/// Builds one container's subscriptions.
struct Wiring<'a, T: Record, F: Filters> {
    hub: &'a EventHub,
    container: Arc<Container<T, F>>,
    subscriptions: Vec<Subscription>,
}

impl<'a, T: Record, F: Filters> Wiring<'a, T, F> {
    fn claim<S>(hub: &'a EventHub, store: &S) -> Result<(Self, Arc<AtomicBool>), WiringError>
    where
        S: Store<Item = T, Filters = F>,
    {
        let container = store.container().clone();
        let guard = container
            .claim_wiring()
            .ok_or(WiringError::AlreadyWired(container.name()))?;
        Ok((
            Self {
                hub,
                container,
                subscriptions: Vec::new(),
            },
            guard,
        ))
    }

    fn on<P, H>(mut self, event: HubEvent, apply: H) -> Self
    where
        P: DeserializeOwned,
        H: Fn(&Container<T, F>, P) -> bool + Send + Sync + 'static,
    {
        let container = self.container.clone();
        let subscription = self.hub.subscribe_typed(event, move |payload: P| {
            let changed = apply(&container, payload);
            trace!(container = container.name(), %event, changed, "Event reconciled");
        });
        self.subscriptions.push(subscription);
        self
    }

    fn finish(self, guard: Arc<AtomicBool>) -> Reconciler {
        let name = self.container.name();
        info!(
            container = name,
            listeners = self.subscriptions.len(),
            "Container wired to event hub"
        );
        Reconciler {
            subscriptions: self.subscriptions,
            guards: vec![(name, guard)],
        }
    }
}

pub fn wire_dispatch(hub: &EventHub, store: &DispatchStore) -> Result<Reconciler, WiringError> {
    let (wiring, guard) = Wiring::claim(hub, store)?;
    Ok(wiring
        .on(HubEvent::DispatchCreated, |c, dispatch: Dispatch| {
            c.prepend(dispatch)
        })
        .on(
            HubEvent::DispatchStatusChanged,
            |c, e: StatusChanged<DispatchStatus>| c.patch(&e.id, |d| d.status = e.status),
        )
        .on(HubEvent::DispatchCompleted, |c, e: DispatchCompleted| {
            let status = e.terminal_status();
            c.patch(&e.id, |d| d.status = status)
        })
        .on(
            HubEvent::AmbulanceLocationUpdated,
            |c, e: AmbulanceLocationUpdated| {
                c.update_selected(|d| match d.ambulance.as_mut() {
                    Some(ambulance) if ambulance.id == e.ambulance_id => {
                        ambulance.location = Some(e.location);
                        true
                    }
                    _ => false,
                })
            },
        )
        .finish(guard))
}

pub fn wire_personnel(hub: &EventHub, store: &PersonnelStore) -> Result<Reconciler, WiringError> {
    let (wiring, guard) = Wiring::claim(hub, store)?;
    Ok(wiring
        .on(HubEvent::PersonalCreated, |c, personal: Personal| {
            c.prepend(personal)
        })
        .on(HubEvent::PersonalUpdated, |c, personal: Personal| {
            c.replace(personal)
        })
        .on(
            HubEvent::PersonalStatusChanged,
            |c, e: StatusChanged<PersonalStatus>| c.patch(&e.id, |p| p.status = e.status),
        )
        .finish(guard))
}

pub fn wire_incidents(hub: &EventHub, store: &IncidentStore) -> Result<Reconciler, WiringError> {
    let (wiring, guard) = Wiring::claim(hub, store)?;
    Ok(wiring
        .on(HubEvent::IncidentCreated, |c, incident: Incident| {
            c.prepend(incident)
        })
        .on(HubEvent::IncidentUpdated, |c, incident: Incident| {
            c.replace(incident)
        })
        .on(
            HubEvent::IncidentStatusChanged,
            |c, e: StatusChanged<IncidentStatus>| c.patch(&e.id, |i| i.status = e.status),
        )
        .on(
            HubEvent::IncidentAnalysisCompleted,
            |c, e: IncidentAnalysisCompleted| {
                let analyzed_at = e.analyzed_at.unwrap_or_else(Utc::now);
                c.patch(&e.id, |i| {
                    i.status = e.status;
                    i.analysis = Some(e.analysis.clone());
                    i.analyzed_at = Some(analyzed_at);
                })
            },
        )
        .on(
            HubEvent::IncidentPriorityChanged,
            |c, e: IncidentPriorityChanged| c.patch(&e.id, |i| i.priority = Some(e.priority)),
        )
        .finish(guard))
}

/// Wire all three domain containers. Nothing stays wired on failure.
pub fn wire_all(
    hub: &EventHub,
    dispatch: &DispatchStore,
    personnel: &PersonnelStore,
    incidents: &IncidentStore,
) -> Result<Reconciler, WiringError> {
    let dispatch = wire_dispatch(hub, dispatch)?;
    let personnel = match wire_personnel(hub, personnel) {
        Ok(r) => r,
        Err(e) => {
            dispatch.detach();
            return Err(e);
        }
    };
    match wire_incidents(hub, incidents) {
        Ok(r) => Ok(dispatch.merge(personnel).merge(r)),
        Err(e) => {
            dispatch.merge(personnel).detach();
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Page;
    use rd_core::{IncidentPriority, MemoryStorage};
    use rd_gateway::MockGateway;
    use rd_hub::{HubConfig, ListenerError};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct Fixture {
        hub: EventHub,
        dispatch: DispatchStore,
        personnel: PersonnelStore,
        incidents: IncidentStore,
        gateway: Arc<MockGateway>,
    }

    fn fixture() -> Fixture {
        let gateway = Arc::new(MockGateway::new());
        Fixture {
            hub: EventHub::new(
                HubConfig::new("ws://127.0.0.1:9"),
                Arc::new(MemoryStorage::new()),
            ),
            dispatch: DispatchStore::new(gateway.clone(), Page::default()),
            personnel: PersonnelStore::new(gateway.clone(), Page::default()),
            incidents: IncidentStore::new(gateway.clone(), Page::default()),
            gateway,
        }
    }

    fn dispatch(id: &str, status: DispatchStatus) -> Dispatch {
        Dispatch::new(id, status)
    }

    #[test]
    fn test_status_change_patches_only_target() {
        let f = fixture();
        let _r = wire_dispatch(&f.hub, &f.dispatch).unwrap();
        f.dispatch.container().replace_items(
            vec![
                dispatch("1", DispatchStatus::EnRoute),
                dispatch("2", DispatchStatus::OnSite),
            ],
            None,
        );

        f.hub.deliver(
            HubEvent::DispatchStatusChanged,
            &json!({"id": "1", "status": "en_sitio"}),
        );

        let s = f.dispatch.state();
        assert_eq!(s.items[0].status, DispatchStatus::OnSite);
        assert_eq!(s.items[1], dispatch("2", DispatchStatus::OnSite));
    }

    #[test]
    fn test_status_change_is_idempotent_and_reaches_selected() {
        let f = fixture();
        let _r = wire_dispatch(&f.hub, &f.dispatch).unwrap();
        let c = f.dispatch.container();
        c.replace_items(vec![dispatch("1", DispatchStatus::Assigned)], None);
        c.set_selected(Some(dispatch("1", DispatchStatus::Assigned)));

        let payload = json!({"id": "1", "status": "en_camino"});
        f.hub.deliver(HubEvent::DispatchStatusChanged, &payload);
        let once = f.dispatch.state();
        f.hub.deliver(HubEvent::DispatchStatusChanged, &payload);
        let twice = f.dispatch.state();

        assert_eq!(once.items, twice.items);
        assert_eq!(once.selected, twice.selected);
        assert_eq!(twice.selected.unwrap().status, DispatchStatus::EnRoute);
        assert_eq!(twice.items[0].status, DispatchStatus::EnRoute);
    }

    #[test]
    fn test_completed_applies_terminal_status() {
        let f = fixture();
        let _r = wire_dispatch(&f.hub, &f.dispatch).unwrap();
        let c = f.dispatch.container();
        c.replace_items(
            vec![
                dispatch("1", DispatchStatus::AtHospital),
                dispatch("2", DispatchStatus::OnSite),
            ],
            None,
        );

        f.hub.deliver(HubEvent::DispatchCompleted, &json!({"id": "1"}));
        f.hub.deliver(
            HubEvent::DispatchCompleted,
            &json!({"id": "2", "status": "cancelado"}),
        );

        let s = f.dispatch.state();
        assert_eq!(s.items[0].status, DispatchStatus::Completed);
        assert_eq!(s.items[1].status, DispatchStatus::Cancelled);
    }

    #[test]
    fn test_ambulance_location_only_patches_matching_selected() {
        let f = fixture();
        let _r = wire_dispatch(&f.hub, &f.dispatch).unwrap();
        let mut selected = dispatch("1", DispatchStatus::EnRoute);
        selected.ambulance = Some(rd_core::AmbulanceRef {
            id: "amb-7".into(),
            plate: Some("XYZ-123".into()),
            location: None,
        });
        let c = f.dispatch.container();
        c.replace_items(vec![selected.clone()], None);
        c.set_selected(Some(selected));

        let mut changes = f.dispatch.changes();
        let _ = changes.borrow_and_update();
        f.hub.deliver(
            HubEvent::AmbulanceLocationUpdated,
            &json!({"ambulanceId": "amb-9", "location": {"lat": 4.6, "lon": -74.1}}),
        );
        assert!(!changes.has_changed().unwrap());

        f.hub.deliver(
            HubEvent::AmbulanceLocationUpdated,
            &json!({"ambulanceId": "amb-7", "location": {"lat": 4.6, "lon": -74.1}}),
        );
        let s = f.dispatch.state();
        let ambulance = s.selected.unwrap().ambulance.unwrap();
        assert_eq!(ambulance.location, Some(rd_core::GeoPoint::new(4.6, -74.1)));
        assert_eq!(ambulance.plate.as_deref(), Some("XYZ-123"));
        assert!(s.items[0].ambulance.as_ref().unwrap().location.is_none());
    }

    #[tokio::test]
    async fn test_created_event_after_create_does_not_duplicate() {
        let f = fixture();
        let _r = wire_incidents(&f.hub, &f.incidents).unwrap();
        f.gateway.respond(
            &rd_gateway::operation::CREATE_INCIDENT,
            json!({"id": "5", "status": "pendiente", "description": "fall"}),
        );

        f.incidents
            .create(rd_core::CreateIncidentInput {
                description: "fall".into(),
                priority: None,
                reporter_name: None,
                reporter_phone: None,
                address: None,
                lat: None,
                lon: None,
            })
            .await
            .unwrap();
        f.hub.deliver(
            HubEvent::IncidentCreated,
            &json!({"id": "5", "status": "pendiente", "description": "fall"}),
        );

        let s = f.incidents.state();
        assert_eq!(s.items.len(), 1);
        assert_eq!(s.total_count, 1);
    }

    #[test]
    fn test_created_event_for_listed_id_refreshes_selected() {
        let f = fixture();
        let _r = wire_dispatch(&f.hub, &f.dispatch).unwrap();
        let c = f.dispatch.container();
        c.replace_items(vec![dispatch("1", DispatchStatus::Pending)], None);
        c.set_selected(Some(dispatch("1", DispatchStatus::Pending)));

        f.hub.deliver(
            HubEvent::DispatchCreated,
            &json!({"id": "1", "status": "asignado"}),
        );

        let s = f.dispatch.state();
        assert_eq!(s.items.len(), 1);
        assert_eq!(s.total_count, 1);
        assert_eq!(s.items[0].status, DispatchStatus::Assigned);
        assert_eq!(s.selected, Some(s.items[0].clone()));
    }

    #[tokio::test]
    async fn test_load_refreshes_selected_from_new_list() {
        let f = fixture();
        let _r = wire_dispatch(&f.hub, &f.dispatch).unwrap();
        let c = f.dispatch.container();
        c.replace_items(vec![dispatch("1", DispatchStatus::Pending)], None);
        c.set_selected(Some(dispatch("1", DispatchStatus::Pending)));
        f.gateway.respond(
            &rd_gateway::operation::DISPATCHES,
            json!([{"id": "1", "status": "en_camino"}, {"id": "2", "status": "asignado"}]),
        );

        f.dispatch.load(None, None).await;

        let s = f.dispatch.state();
        assert_eq!(s.items.len(), 2);
        assert_eq!(s.selected.unwrap().status, DispatchStatus::EnRoute);
    }

    #[test]
    fn test_incident_events() {
        let f = fixture();
        let _r = wire_incidents(&f.hub, &f.incidents).unwrap();
        f.hub.deliver(
            HubEvent::IncidentCreated,
            &json!({"id": "1", "status": "pendiente", "description": "burn"}),
        );
        f.hub.deliver(
            HubEvent::IncidentPriorityChanged,
            &json!({"id": "1", "priority": "alta"}),
        );
        f.hub.deliver(
            HubEvent::IncidentAnalysisCompleted,
            &json!({
                "id": "1",
                "status": "analizado",
                "analysis": {"severityScore": 6.5, "summary": "second degree burns"},
                "analyzedAt": "2026-03-01T08:15:00Z"
            }),
        );

        let s = f.incidents.state();
        let incident = &s.items[0];
        assert_eq!(s.total_count, 1);
        assert_eq!(incident.priority, Some(IncidentPriority::Alta));
        assert_eq!(incident.status, IncidentStatus::Analizado);
        assert_eq!(incident.analysis.as_ref().unwrap().severity_score, 6.5);
        assert_eq!(
            incident.analyzed_at.unwrap().to_rfc3339(),
            "2026-03-01T08:15:00+00:00"
        );

        let mut updated = incident.clone();
        updated.description = "burns, both arms".into();
        f.hub.deliver(
            HubEvent::IncidentUpdated,
            &serde_json::to_value(&updated).unwrap(),
        );
        f.hub.deliver(
            HubEvent::IncidentStatusChanged,
            &json!({"id": "1", "status": "aprobado"}),
        );
        let s = f.incidents.state();
        assert_eq!(s.items[0].description, "burns, both arms");
        assert_eq!(s.items[0].status, IncidentStatus::Aprobado);
    }

    #[test]
    fn test_personnel_events() {
        let f = fixture();
        let _r = wire_personnel(&f.hub, &f.personnel).unwrap();
        let crew = json!({
            "id": "p1", "firstName": "Luis", "lastName": "Mora",
            "role": "conductor", "status": "disponible"
        });
        f.hub.deliver(HubEvent::PersonalCreated, &crew);
        f.hub.deliver(HubEvent::PersonalCreated, &crew);
        f.hub.deliver(
            HubEvent::PersonalStatusChanged,
            &json!({"id": "p1", "status": "en_servicio"}),
        );

        let s = f.personnel.state();
        assert_eq!(s.items.len(), 1);
        assert_eq!(s.items[0].status, PersonalStatus::EnServicio);

        let mut updated = crew.clone();
        updated["phone"] = json!("+57 310 555 0101");
        f.hub.deliver(HubEvent::PersonalUpdated, &updated);
        let s = f.personnel.state();
        assert_eq!(s.items[0].phone.as_deref(), Some("+57 310 555 0101"));
        assert_eq!(s.items[0].status, PersonalStatus::Disponible);
    }

    #[test]
    fn test_undecodable_payload_is_ignored() {
        let f = fixture();
        let _r = wire_dispatch(&f.hub, &f.dispatch).unwrap();
        f.dispatch
            .container()
            .replace_items(vec![dispatch("1", DispatchStatus::Assigned)], None);

        let delivered = f.hub.deliver(
            HubEvent::DispatchStatusChanged,
            &json!({"id": "1", "status": "teleported"}),
        );
        assert_eq!(delivered, 0);
        assert_eq!(f.dispatch.state().items[0].status, DispatchStatus::Assigned);
    }

    #[test]
    fn test_failing_listener_does_not_block_reconciliation() {
        let f = fixture();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let _panicky = f.hub.subscribe(HubEvent::DispatchStatusChanged, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            panic!("view crashed")
        });
        let _failing = f.hub.subscribe(HubEvent::DispatchStatusChanged, |_| {
            Err(ListenerError::Handler("rejected".into()))
        });
        let _r = wire_dispatch(&f.hub, &f.dispatch).unwrap();
        f.dispatch
            .container()
            .replace_items(vec![dispatch("1", DispatchStatus::Assigned)], None);

        let delivered = f.hub.deliver(
            HubEvent::DispatchStatusChanged,
            &json!({"id": "1", "status": "en_camino"}),
        );

        assert_eq!(delivered, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.dispatch.state().items[0].status, DispatchStatus::EnRoute);
    }

    #[test]
    fn test_second_wiring_is_rejected_until_detached() {
        let f = fixture();
        let first = wire_dispatch(&f.hub, &f.dispatch).unwrap();
        assert!(f.dispatch.container().is_wired());
        assert_eq!(
            wire_dispatch(&f.hub, &f.dispatch).unwrap_err(),
            WiringError::AlreadyWired("dispatch")
        );
        assert_eq!(f.hub.listener_count(HubEvent::DispatchCreated), 1);

        assert_eq!(first.detach(), 4);
        assert!(!f.dispatch.container().is_wired());
        assert_eq!(f.hub.listener_count(HubEvent::DispatchCreated), 0);

        f.hub.deliver(
            HubEvent::DispatchCreated,
            &json!({"id": "9", "status": "pending"}),
        );
        assert!(f.dispatch.state().items.is_empty());

        let again = wire_dispatch(&f.hub, &f.dispatch).unwrap();
        assert_eq!(again.subscription_count(), 4);
    }

    #[test]
    fn test_wire_all_rolls_back_on_failure() {
        let f = fixture();
        let _incidents = wire_incidents(&f.hub, &f.incidents).unwrap();

        let err = wire_all(&f.hub, &f.dispatch, &f.personnel, &f.incidents).unwrap_err();
        assert_eq!(err, WiringError::AlreadyWired("incident"));
        assert!(!f.dispatch.container().is_wired());
        assert!(!f.personnel.container().is_wired());
        assert_eq!(f.hub.listener_count(HubEvent::DispatchCreated), 0);
        assert_eq!(f.hub.listener_count(HubEvent::PersonalCreated), 0);
    }

    #[test]
    fn test_wire_all_covers_every_domain_event() {
        let f = fixture();
        let r = wire_all(&f.hub, &f.dispatch, &f.personnel, &f.incidents).unwrap();
        assert_eq!(r.subscription_count(), 12);
        assert_eq!(r.containers(), vec!["dispatch", "personnel", "incident"]);
        for event in HubEvent::ALL.into_iter().filter(|e| !e.is_lifecycle() && *e != HubEvent::Error) {
            assert_eq!(f.hub.listener_count(event), 1, "{event}");
        }
        assert_eq!(r.detach(), 12);
    }
}
