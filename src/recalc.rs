use crate::aggregation::Aggregation;
use crate::classifier::classify;
use crate::clock::Clock;
use crate::error::Result;
use crate::events::{EventBus, TOPIC_LIMITS_RECALCULATED};
use crate::schema::{
    DashboardView, FieldsUpdated, LimitsRecalculated, MonthlySnapshot, RecalculateRequest,
    TriggerOutcome,
};
use crate::store::{DocumentSource, PolicyStore, SnapshotStore};
use chrono::Datelike;
use log::{info, warn};
use std::sync::Arc;

/// End-to-end recalculation orchestrator for one (tenant, year):
/// fetch documents, aggregate, persist all 12 monthly snapshots, classify,
/// emit the completion event.
///
/// Replaying a run with the same input document set produces identical
/// snapshot rows, so at-least-once delivery of the triggering event is safe.
///
/// No lock is held across the fetch-aggregate-persist span. Two concurrent
/// runs for the same (tenant, year) can interleave, and the stored 12-row set
/// then reflects whichever writer landed last per row. This is a known
/// weak-consistency trade-off: the next edit event re-triggers recalculation
/// and converges the rows.
pub struct Recalculator {
    documents: Arc<dyn DocumentSource>,
    policies: Arc<dyn PolicyStore>,
    snapshots: Arc<dyn SnapshotStore>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
}

impl Recalculator {
    pub fn new(
        documents: Arc<dyn DocumentSource>,
        policies: Arc<dyn PolicyStore>,
        snapshots: Arc<dyn SnapshotStore>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            documents,
            policies,
            snapshots,
            bus,
            clock,
        }
    }

    /// Synchronous entry point. Returns the freshly computed dashboard.
    ///
    /// Store failures abort the run before any snapshot row is written; the
    /// completion event is best-effort and never fails the run.
    pub fn recalculate(&self, request: &RecalculateRequest) -> Result<DashboardView> {
        let RecalculateRequest {
            tenant_id,
            year,
            doc_ids,
        } = request;

        let docs = self
            .documents
            .fetch_year(tenant_id, *year, doc_ids.as_deref())?;
        let policy = self.policies.get_or_create(*year)?;

        let current_month = self.clock.today().month();
        let aggregation = Aggregation::from_documents(&docs, current_month);
        let state = classify(aggregation.accumulated, aggregation.forecast, &policy);

        let updated_at = self.clock.now();
        let rows: Vec<MonthlySnapshot> = aggregation
            .cumulative_months()
            .into_iter()
            .map(|entry| MonthlySnapshot {
                tenant_id: tenant_id.clone(),
                year: *year,
                month: entry.month,
                accumulated: entry.value,
                forecast: aggregation.forecast,
                state,
                updated_at,
            })
            .collect();
        self.snapshots.upsert_year(&rows)?;

        info!(
            "Recalculated limits for tenant {} year {}: accumulated={:.2} forecast={:.2} state={}",
            tenant_id, year, aggregation.accumulated, aggregation.forecast, state
        );

        self.emit_completed(&LimitsRecalculated {
            tenant_id: tenant_id.clone(),
            year: *year,
            state,
            accumulated: aggregation.accumulated,
        });

        Ok(aggregation.to_dashboard(&policy, state))
    }

    /// Event-triggered entry point. Resolves tenant and year from the
    /// referenced document; a missing document is a logged no-op because the
    /// originating edit already succeeded and must not see a failure here.
    pub fn on_fields_updated(&self, event: &FieldsUpdated) -> Result<TriggerOutcome> {
        let Some(doc) = self.documents.fetch_by_id(&event.doc_id)? else {
            warn!(
                "Field-change trigger for unknown document {}; ignoring",
                event.doc_id
            );
            return Ok(TriggerOutcome::Ignored {
                doc_id: event.doc_id.clone(),
                reason: "document not found".to_string(),
            });
        };

        let year = doc
            .issue_year()
            .unwrap_or_else(|| self.clock.today().year());
        let view = self.recalculate(&RecalculateRequest {
            tenant_id: doc.tenant_id.clone(),
            year,
            doc_ids: None,
        })?;

        Ok(TriggerOutcome::Recalculated {
            tenant_id: doc.tenant_id,
            year,
            state: view.state,
        })
    }

    // The snapshot write is the source of truth; the event is a best-effort
    // notification and its failure only warns.
    fn emit_completed(&self, payload: &LimitsRecalculated) {
        let value = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(err) => {
                warn!("Could not encode {} payload: {}", TOPIC_LIMITS_RECALCULATED, err);
                return;
            }
        };
        if let Err(err) = self.bus.publish(TOPIC_LIMITS_RECALCULATED, &value) {
            warn!(
                "Could not publish {} for tenant {} year {}: {}",
                TOPIC_LIMITS_RECALCULATED, payload.tenant_id, payload.year, err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::LimitsError;
    use crate::events::{InProcessEventBus, UnavailableEventBus};
    use crate::schema::{DocumentTotal, LimitState};
    use crate::store::{InMemoryDocumentSource, InMemoryPolicyStore, InMemorySnapshotStore};
    use chrono::NaiveDate;
    use parking_lot::Mutex;

    fn fixed_clock(year: i32, month: u32) -> Arc<FixedClock> {
        Arc::new(FixedClock(
            NaiveDate::from_ymd_opt(year, month, 15)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        ))
    }

    fn doc(id: &str, tenant: &str, issue_date: &str, amount: f64) -> DocumentTotal {
        DocumentTotal {
            id: id.to_string(),
            tenant_id: tenant.to_string(),
            issue_date: issue_date.to_string(),
            gross_amount: amount,
        }
    }

    struct Fixture {
        documents: Arc<InMemoryDocumentSource>,
        snapshots: Arc<InMemorySnapshotStore>,
        bus: Arc<InProcessEventBus>,
        recalculator: Recalculator,
    }

    fn fixture(clock: Arc<FixedClock>) -> Fixture {
        let documents = Arc::new(InMemoryDocumentSource::new());
        let policies = Arc::new(InMemoryPolicyStore::new());
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        let bus = Arc::new(InProcessEventBus::new());
        let recalculator = Recalculator::new(
            Arc::clone(&documents) as Arc<dyn DocumentSource>,
            policies,
            Arc::clone(&snapshots) as Arc<dyn SnapshotStore>,
            Arc::clone(&bus) as Arc<dyn EventBus>,
            clock,
        );
        Fixture {
            documents,
            snapshots,
            bus,
            recalculator,
        }
    }

    #[test]
    fn test_run_persists_twelve_rows_with_constant_forecast_and_state() {
        let fx = fixture(fixed_clock(2024, 5));
        for (i, month) in (1..=4).enumerate() {
            fx.documents.insert(doc(
                &format!("d{}", i),
                "t1",
                &format!("2024-{:02}-10", month),
                10_000.0,
            ));
        }

        let view = fx
            .recalculator
            .recalculate(&RecalculateRequest {
                tenant_id: "t1".to_string(),
                year: 2024,
                doc_ids: None,
            })
            .unwrap();

        assert_eq!(view.accumulated, 40_000.0);
        assert!((view.forecast - 120_000.0).abs() < 1e-9);
        assert_eq!(view.state, LimitState::Exceeded);

        let rows = fx.snapshots.fetch_year("t1", 2024).unwrap();
        assert_eq!(rows.len(), 12);
        for row in &rows {
            assert!((row.forecast - 120_000.0).abs() < 1e-9);
            assert_eq!(row.state, LimitState::Exceeded);
        }
        // Cumulative curve: 10k, 20k, 30k, 40k, then flat.
        assert_eq!(rows[0].accumulated, 10_000.0);
        assert_eq!(rows[3].accumulated, 40_000.0);
        assert_eq!(rows[11].accumulated, 40_000.0);
    }

    #[test]
    fn test_recalculation_is_idempotent() {
        let fx = fixture(fixed_clock(2024, 7));
        fx.documents.insert(doc("d1", "t1", "2024-02-01", 5_000.0));
        let request = RecalculateRequest {
            tenant_id: "t1".to_string(),
            year: 2024,
            doc_ids: None,
        };

        fx.recalculator.recalculate(&request).unwrap();
        let first = fx.snapshots.fetch_year("t1", 2024).unwrap();
        fx.recalculator.recalculate(&request).unwrap();
        let second = fx.snapshots.fetch_year("t1", 2024).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_tenant_year_is_ok_with_zero_forecast() {
        let fx = fixture(fixed_clock(2024, 6));
        let view = fx
            .recalculator
            .recalculate(&RecalculateRequest {
                tenant_id: "fresh".to_string(),
                year: 2024,
                doc_ids: None,
            })
            .unwrap();

        assert_eq!(view.accumulated, 0.0);
        assert_eq!(view.forecast, 0.0);
        assert_eq!(view.state, LimitState::Ok);
        assert_eq!(fx.snapshots.fetch_year("fresh", 2024).unwrap().len(), 12);
    }

    #[test]
    fn test_run_emits_completion_event() {
        let fx = fixture(fixed_clock(2024, 3));
        fx.documents.insert(doc("d1", "t1", "2024-01-01", 1_000.0));

        let seen: Arc<Mutex<Vec<LimitsRecalculated>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        fx.bus.subscribe(
            TOPIC_LIMITS_RECALCULATED,
            Arc::new(move |payload| {
                let event: LimitsRecalculated = serde_json::from_value(payload.clone()).unwrap();
                sink.lock().push(event);
            }),
        );

        fx.recalculator
            .recalculate(&RecalculateRequest {
                tenant_id: "t1".to_string(),
                year: 2024,
                doc_ids: None,
            })
            .unwrap();

        let events = seen.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tenant_id, "t1");
        assert_eq!(events[0].year, 2024);
        assert_eq!(events[0].accumulated, 1_000.0);
    }

    #[test]
    fn test_publish_failure_does_not_fail_the_run() {
        let documents = Arc::new(InMemoryDocumentSource::new());
        documents.insert(doc("d1", "t1", "2024-01-01", 1_000.0));
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        let recalculator = Recalculator::new(
            Arc::clone(&documents) as Arc<dyn DocumentSource>,
            Arc::new(InMemoryPolicyStore::new()),
            Arc::clone(&snapshots) as Arc<dyn SnapshotStore>,
            Arc::new(UnavailableEventBus),
            fixed_clock(2024, 4),
        );

        let result = recalculator.recalculate(&RecalculateRequest {
            tenant_id: "t1".to_string(),
            year: 2024,
            doc_ids: None,
        });

        assert!(result.is_ok());
        assert_eq!(snapshots.fetch_year("t1", 2024).unwrap().len(), 12);
    }

    #[test]
    fn test_store_failure_aborts_run_without_partial_writes() {
        struct FailingSnapshotStore;
        impl SnapshotStore for FailingSnapshotStore {
            fn upsert_year(&self, _snapshots: &[MonthlySnapshot]) -> Result<()> {
                Err(LimitsError::dependency("snapshot store", "connection refused"))
            }
            fn fetch_year(&self, _tenant_id: &str, _year: i32) -> Result<Vec<MonthlySnapshot>> {
                Ok(Vec::new())
            }
        }

        let documents = Arc::new(InMemoryDocumentSource::new());
        documents.insert(doc("d1", "t1", "2024-01-01", 1_000.0));
        let bus = Arc::new(InProcessEventBus::new());
        let published = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&published);
        bus.subscribe(
            TOPIC_LIMITS_RECALCULATED,
            Arc::new(move |_| *counter.lock() += 1),
        );

        let recalculator = Recalculator::new(
            Arc::clone(&documents) as Arc<dyn DocumentSource>,
            Arc::new(InMemoryPolicyStore::new()),
            Arc::new(FailingSnapshotStore),
            Arc::clone(&bus) as Arc<dyn EventBus>,
            fixed_clock(2024, 4),
        );

        let result = recalculator.recalculate(&RecalculateRequest {
            tenant_id: "t1".to_string(),
            year: 2024,
            doc_ids: None,
        });

        assert!(matches!(
            result,
            Err(LimitsError::DependencyUnavailable { .. })
        ));
        // No completion event after an aborted run.
        assert_eq!(*published.lock(), 0);
    }

    #[test]
    fn test_trigger_resolves_tenant_and_year_from_document() {
        let fx = fixture(fixed_clock(2025, 2));
        fx.documents.insert(doc("d9", "t7", "2024-11-20", 2_500.0));

        let outcome = fx
            .recalculator
            .on_fields_updated(&FieldsUpdated {
                doc_id: "d9".to_string(),
            })
            .unwrap();

        match outcome {
            TriggerOutcome::Recalculated {
                tenant_id, year, ..
            } => {
                assert_eq!(tenant_id, "t7");
                assert_eq!(year, 2024);
            }
            other => panic!("expected recalculation, got {:?}", other),
        }
        assert_eq!(fx.snapshots.fetch_year("t7", 2024).unwrap().len(), 12);
    }

    #[test]
    fn test_trigger_defaults_year_to_current_when_date_unparseable() {
        let fx = fixture(fixed_clock(2025, 2));
        fx.documents.insert(doc("d9", "t7", "unknown", 2_500.0));

        let outcome = fx
            .recalculator
            .on_fields_updated(&FieldsUpdated {
                doc_id: "d9".to_string(),
            })
            .unwrap();

        match outcome {
            TriggerOutcome::Recalculated { year, .. } => assert_eq!(year, 2025),
            other => panic!("expected recalculation, got {:?}", other),
        }
    }

    #[test]
    fn test_trigger_for_missing_document_is_a_no_op() {
        let fx = fixture(fixed_clock(2024, 6));
        let published = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&published);
        fx.bus.subscribe(
            TOPIC_LIMITS_RECALCULATED,
            Arc::new(move |_| *counter.lock() += 1),
        );

        let outcome = fx
            .recalculator
            .on_fields_updated(&FieldsUpdated {
                doc_id: "ghost".to_string(),
            })
            .unwrap();

        assert!(matches!(outcome, TriggerOutcome::Ignored { .. }));
        assert_eq!(fx.snapshots.row_count(), 0);
        assert_eq!(*published.lock(), 0);
    }
}
