use crate::aggregation::Aggregation;
use crate::classifier::classify;
use crate::clock::Clock;
use crate::error::Result;
use crate::schema::{DashboardView, SimulateRequest};
use crate::store::{DocumentSource, PolicyStore};
use chrono::Datelike;
use log::info;
use std::sync::Arc;

/// What-if engine: overlays hypothetical monthly deltas on the real
/// aggregation and reruns the same forecast and classification formulas.
/// Holds no snapshot store and no event bus, so a simulation cannot persist
/// or notify anything by construction.
pub struct Simulator {
    documents: Arc<dyn DocumentSource>,
    policies: Arc<dyn PolicyStore>,
    clock: Arc<dyn Clock>,
}

impl Simulator {
    pub fn new(
        documents: Arc<dyn DocumentSource>,
        policies: Arc<dyn PolicyStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            documents,
            policies,
            clock,
        }
    }

    pub fn simulate(&self, request: &SimulateRequest) -> Result<DashboardView> {
        let docs = self
            .documents
            .fetch_year(&request.tenant_id, request.year, request.doc_ids.as_deref())?;
        let policy = self.policies.get_or_create(request.year)?;

        let current_month = self.clock.today().month();
        let base = Aggregation::from_documents(&docs, current_month);
        let projected = base.with_adjustments(&request.adjustments, current_month)?;
        let state = classify(projected.accumulated, projected.forecast, &policy);

        info!(
            "Simulated tenant {} year {} with {} adjustment(s): accumulated={:.2} forecast={:.2} state={}",
            request.tenant_id,
            request.year,
            request.adjustments.len(),
            projected.accumulated,
            projected.forecast,
            state
        );

        Ok(projected.to_dashboard(&policy, state))
    }
}
