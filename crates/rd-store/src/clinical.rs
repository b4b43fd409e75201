//! Clinical decision support lookup.

use parking_lot::RwLock;
use rd_core::{ActionError, ClinicalAssessment, ClinicalInput};
use rd_gateway::operation::ASSESS_PATIENT;
use rd_gateway::{call, DynGateway};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClinicalState {
    pub last: Option<ClinicalAssessment>,
    pub loading: bool,
    pub error: Option<ActionError>,
}

#[derive(Clone)]
pub struct ClinicalStore {
    state: Arc<RwLock<ClinicalState>>,
    version: Arc<watch::Sender<u64>>,
    gateway: DynGateway,
}

impl ClinicalStore {
    pub fn new(gateway: DynGateway) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(ClinicalState::default())),
            version: Arc::new(version),
            gateway,
        }
    }

    pub fn state(&self) -> ClinicalState {
        self.state.read().clone()
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Score the patient and rank receiving hospitals.
    ///
    /// Input is checked locally before the backend is asked. The result is
    /// kept as `last`; a failure is recorded and returned.
    pub async fn assess(&self, input: ClinicalInput) -> Result<ClinicalAssessment, ActionError> {
        if let Err(message) = input.validate() {
            let err = ActionError::Validation(message);
            self.update(|s| s.error = Some(err.clone()));
            return Err(err);
        }

        self.update(|s| {
            s.loading = true;
            s.error = None;
        });
        let result = call::<ClinicalAssessment>(
            self.gateway.as_ref(),
            &ASSESS_PATIENT,
            json!({ "input": input }),
        )
        .await
        .map_err(|e| ActionError::from(e).or_default_message("assess patient"));

        match result {
            Ok(assessment) => {
                info!(
                    score = assessment.severity_score,
                    level = ?assessment.severity_level,
                    hospitals = assessment.recommendations.len(),
                    "Patient assessed"
                );
                self.update(|s| {
                    s.loading = false;
                    s.last = Some(assessment.clone());
                });
                Ok(assessment)
            }
            Err(e) => {
                warn!(error = %e, "Patient assessment failed");
                self.update(|s| {
                    s.loading = false;
                    s.error = Some(e.clone());
                });
                Err(e)
            }
        }
    }

    pub fn clear(&self) {
        self.update(|s| *s = ClinicalState::default());
    }

    fn update(&self, f: impl FnOnce(&mut ClinicalState)) {
        f(&mut self.state.write());
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}
