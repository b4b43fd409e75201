//! Main application orchestration.
//!
//! Startup order:
//! 1. Storage, gateway and containers
//! 2. Event hub, then reconciliation wiring
//! 3. Connect (degraded mode is logged, not fatal)
//! 4. Initial loads
//! 5. Observe containers and the connection until Ctrl-C

use crate::config::AppConfig;
use crate::error::AppResult;
use rd_core::{
    ClinicalAssessment, ClinicalInput, FileStorage, KeyValueStore, MemoryStorage, UserProfile,
};
use rd_gateway::{DynGateway, HttpGateway};
use rd_hub::{ConnectStatus, ConnectionState, EventHub, HubEvent, Subscription};
use rd_store::{
    wire_all, AuthStore, ClinicalStore, DispatchStore, IncidentStore, Page, PersonnelStore,
    Reconciler, Store, SystemClock,
};
use rd_telemetry::Metrics;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    hub: EventHub,
    auth: AuthStore,
    clinical: ClinicalStore,
    dispatch: DispatchStore,
    personnel: PersonnelStore,
    incidents: IncidentStore,
}

/// Everything `start` set up; torn down by [`Application::stop`].
pub struct Running {
    reconciler: Reconciler,
    metric_subscriptions: Vec<Subscription>,
    observers: Vec<JoinHandle<()>>,
}

impl Running {
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }
}

impl Application {
    /// Build the application against the configured endpoints.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let storage: Arc<dyn KeyValueStore> = match &config.storage_path {
            Some(path) => Arc::new(FileStorage::open(path)?),
            None => Arc::new(MemoryStorage::new()),
        };
        let gateway: DynGateway = Arc::new(HttpGateway::new(
            config.gateway_url.clone(),
            config.request_timeout(),
            storage.clone(),
        )?);
        Ok(Self::with_parts(config, storage, gateway))
    }

    /// Build the application from explicit storage and gateway.
    pub fn with_parts(
        config: AppConfig,
        storage: Arc<dyn KeyValueStore>,
        gateway: DynGateway,
    ) -> Self {
        let page = Page::new(config.stores.page_size);
        Self {
            hub: EventHub::new(config.hub.clone(), storage.clone()),
            auth: AuthStore::new(gateway.clone(), storage, Arc::new(SystemClock)),
            clinical: ClinicalStore::new(gateway.clone()),
            dispatch: DispatchStore::new(gateway.clone(), page),
            personnel: PersonnelStore::new(gateway.clone(), page),
            incidents: IncidentStore::new(gateway, page),
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    pub fn dispatch(&self) -> &DispatchStore {
        &self.dispatch
    }

    pub fn personnel(&self) -> &PersonnelStore {
        &self.personnel
    }

    pub fn incidents(&self) -> &IncidentStore {
        &self.incidents
    }

    pub async fn login(&self, username: &str, password: &str) -> AppResult<UserProfile> {
        Ok(self.auth.login(username, password).await?)
    }

    pub fn logout(&self) {
        self.auth.logout();
    }

    pub async fn assess(&self, input: ClinicalInput) -> AppResult<ClinicalAssessment> {
        Ok(self.clinical.assess(input).await?)
    }

    /// Wire, connect and load. Returns what [`Application::stop`] tears down.
    pub async fn start(&self) -> AppResult<Running> {
        if !self.auth.is_authenticated() {
            warn!("No valid session, push connection will be anonymous");
        }

        let reconciler = wire_all(&self.hub, &self.dispatch, &self.personnel, &self.incidents)?;
        let metric_subscriptions = self.count_events();
        let observers = vec![
            self.observe_connection(),
            observe_store(self.dispatch.clone()),
            observe_store(self.personnel.clone()),
            observe_store(self.incidents.clone()),
        ];

        let running = Running {
            reconciler,
            metric_subscriptions,
            observers,
        };

        match self.hub.connect().await {
            Ok(ConnectStatus::Connected) => {
                info!(url = %self.config.push_url, "Push connection up")
            }
            Ok(ConnectStatus::Degraded(reason)) => {
                warn!(%reason, "Push connection unavailable, running without real-time updates")
            }
            Err(e) => {
                error!(error = %e, "Push connection rejected, releasing wiring");
                self.stop(running).await;
                return Err(e.into());
            }
        }

        tokio::join!(
            self.dispatch.load(None, None),
            self.personnel.load(None),
            self.incidents.load(None, None),
        );
        info!(
            dispatches = self.dispatch.state().items.len(),
            active = self.dispatch.active_count(),
            personnel = self.personnel.state().items.len(),
            available = self.personnel.available_count(),
            incidents = self.incidents.total_count(),
            "Initial state loaded"
        );

        Ok(running)
    }

    /// Disconnect and release everything `start` set up.
    pub async fn stop(&self, running: Running) {
        self.hub.disconnect().await;
        for observer in running.observers {
            observer.abort();
        }
        for subscription in running.metric_subscriptions {
            subscription.unsubscribe();
        }
        let removed = running.reconciler.detach();
        debug!(removed, "Reconciliation listeners removed");
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        info!("Starting dispatch console");
        let running = self.start().await?;

        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }

        self.stop(running).await;
        info!("Dispatch console stopped");
        Ok(())
    }

    fn count_events(&self) -> Vec<Subscription> {
        HubEvent::ALL
            .into_iter()
            .map(|event| {
                self.hub.subscribe(event, move |_| {
                    Metrics::hub_event(event.as_str());
                    if event == HubEvent::Error {
                        Metrics::hub_error();
                    }
                    Ok(())
                })
            })
            .collect()
    }

    fn observe_connection(&self) -> JoinHandle<()> {
        let mut states = self.hub.state_changes();
        tokio::spawn(async move {
            loop {
                let state = *states.borrow_and_update();
                Metrics::hub_state_set(state.as_str());
                if state == ConnectionState::Reconnecting {
                    Metrics::hub_reconnect();
                }
                if states.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

/// Mirror a container into metrics and log newly surfaced errors.
fn observe_store<S: Store>(store: S) -> JoinHandle<()> {
    let mut changes = store.changes();
    tokio::spawn(async move {
        let name = store.container().name();
        let mut last_error = None;
        loop {
            let state = store.state();
            Metrics::store_snapshot(name, state.items.len(), state.total_count, state.loading);
            if state.error != last_error {
                if let Some(err) = &state.error {
                    Metrics::store_failure(name, err.kind().as_str());
                    warn!(store = name, kind = err.kind().as_str(), error = %err, "Container error");
                }
                last_error = state.error;
            }
            if changes.changed().await.is_err() {
                break;
            }
        }
    })
}
