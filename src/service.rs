use crate::clock::Clock;
use crate::error::Result;
use crate::events::{EventBus, TOPIC_FIELDS_UPDATED};
use crate::export;
use crate::recalc::Recalculator;
use crate::schema::{
    DashboardView, FieldsUpdated, Health, LimitState, MonthValue, RecalculateAccepted,
    RecalculateRequest, SimulateRequest, ThresholdView, TriggerOutcome,
};
use crate::simulation::Simulator;
use crate::store::{DocumentSource, PolicyStore, SnapshotStore};
use log::{error, warn};
use std::sync::Arc;

/// Facade over the limits engine, one method per external interface.
/// Transport framing (HTTP, queue consumers) wraps this; the engine itself
/// is synchronous and transport-agnostic.
pub struct LimitsService {
    policies: Arc<dyn PolicyStore>,
    snapshots: Arc<dyn SnapshotStore>,
    bus: Arc<dyn EventBus>,
    recalculator: Recalculator,
    simulator: Simulator,
}

impl LimitsService {
    pub fn new(
        documents: Arc<dyn DocumentSource>,
        policies: Arc<dyn PolicyStore>,
        snapshots: Arc<dyn SnapshotStore>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let recalculator = Recalculator::new(
            Arc::clone(&documents),
            Arc::clone(&policies),
            Arc::clone(&snapshots),
            Arc::clone(&bus),
            Arc::clone(&clock),
        );
        let simulator = Simulator::new(documents, Arc::clone(&policies), clock);
        Self {
            policies,
            snapshots,
            bus,
            recalculator,
            simulator,
        }
    }

    /// `GET /limits/{year}/dashboard` — read of the last persisted
    /// recalculation. A tenant-year that has never been recalculated yields
    /// an all-zero OK view with the (lazily created) policy thresholds.
    pub fn dashboard(&self, tenant_id: &str, year: i32) -> Result<DashboardView> {
        let policy = self.policies.get_or_create(year)?;
        let threshold = ThresholdView {
            warn: policy.warn_threshold,
            critical: policy.critical_threshold,
        };

        let rows = self.snapshots.fetch_year(tenant_id, year)?;
        let Some(last) = rows.last() else {
            return Ok(DashboardView {
                accumulated: 0.0,
                forecast: 0.0,
                state: LimitState::Ok,
                threshold,
                months: (1..=12).map(|month| MonthValue { month, value: 0.0 }).collect(),
            });
        };

        Ok(DashboardView {
            accumulated: last.accumulated,
            forecast: last.forecast,
            state: last.state,
            threshold,
            months: rows
                .iter()
                .map(|row| MonthValue {
                    month: row.month,
                    value: row.accumulated,
                })
                .collect(),
        })
    }

    /// `POST /limits/recalculate` — synchronous run; the accepted record
    /// carries the resulting state.
    pub fn recalculate(&self, request: &RecalculateRequest) -> Result<RecalculateAccepted> {
        let view = self.recalculator.recalculate(request)?;
        Ok(RecalculateAccepted {
            accepted: true,
            state: view.state,
        })
    }

    /// `POST /limits/simulate` — what-if projection, never persisted.
    pub fn simulate(&self, request: &SimulateRequest) -> Result<DashboardView> {
        self.simulator.simulate(request)
    }

    /// `GET /limits/{year}/export?format=` — CSV stream of the stored
    /// dashboard. Any format other than csv is rejected.
    pub fn export(&self, tenant_id: &str, year: i32, format: &str) -> Result<String> {
        export::validate_format(format)?;
        let view = self.dashboard(tenant_id, year)?;
        export::dashboard_to_csv(&view)
    }

    /// `GET /limits/health`.
    pub fn health(&self) -> Health {
        Health { ok: true }
    }

    /// Inbound `FIELDS_UPDATED` handler, callable directly by a transport.
    pub fn handle_fields_updated(&self, event: &FieldsUpdated) -> Result<TriggerOutcome> {
        self.recalculator.on_fields_updated(event)
    }

    /// Wires the service to its bus: every `FIELDS_UPDATED` publish triggers
    /// the event-path recalculation. Failures stay on this side of the bus;
    /// the publisher of the edit event never sees them.
    pub fn subscribe_to_field_changes(self: &Arc<Self>) {
        let service = Arc::clone(self);
        self.bus.subscribe(
            TOPIC_FIELDS_UPDATED,
            Arc::new(move |payload| {
                let event: FieldsUpdated = match serde_json::from_value(payload.clone()) {
                    Ok(event) => event,
                    Err(err) => {
                        warn!("Malformed {} payload: {}", TOPIC_FIELDS_UPDATED, err);
                        return;
                    }
                };
                if let Err(err) = service.handle_fields_updated(&event) {
                    error!(
                        "Event-triggered recalculation for document {} failed: {}",
                        event.doc_id, err
                    );
                }
            }),
        );
    }
}
