//! # Limits Engine
//!
//! Per-tenant annual accumulation limits for a document-processing back end:
//! aggregates a tenant-year's document totals into monthly snapshots,
//! projects the year-end total from the observed run-rate, classifies risk
//! against a configurable policy, and answers what-if questions without
//! touching persisted state.
//!
//! ## Core Concepts
//!
//! - **Aggregation**: documents bucketed by issue month; the accumulated
//!   total and a linear run-rate forecast derive from the buckets
//! - **Classification**: `max(accumulated, forecast) / annual_limit` mapped
//!   to OK / NEAR_LIMIT / AT_LIMIT / EXCEEDED through ordered thresholds
//! - **Snapshots**: all 12 months of a (tenant, year) written together on
//!   every recalculation; idempotent for identical input, last writer wins
//! - **Events**: an inbound field-change signal triggers recalculation; a
//!   completion signal is emitted best-effort after every run
//! - **Simulation**: the same formulas applied over hypothetical monthly
//!   deltas, with persistence and notification unreachable by construction
//!
//! ## Example
//!
//! ```rust,ignore
//! use limits_engine::*;
//! use std::sync::Arc;
//!
//! let documents = Arc::new(InMemoryDocumentSource::new());
//! documents.insert(DocumentTotal {
//!     id: "doc-1".to_string(),
//!     tenant_id: "acme".to_string(),
//!     issue_date: "2024-03-10".to_string(),
//!     gross_amount: 12_500.0,
//! });
//!
//! let service = Arc::new(LimitsService::new(
//!     documents,
//!     Arc::new(InMemoryPolicyStore::new()),
//!     Arc::new(InMemorySnapshotStore::new()),
//!     Arc::new(InProcessEventBus::new()),
//!     Arc::new(SystemClock),
//! ));
//! service.subscribe_to_field_changes();
//!
//! let accepted = service.recalculate(&RecalculateRequest {
//!     tenant_id: "acme".to_string(),
//!     year: 2024,
//!     doc_ids: None,
//! })?;
//! println!("state after recalculation: {}", accepted.state);
//! ```

pub mod aggregation;
pub mod classifier;
pub mod clock;
pub mod error;
pub mod events;
pub mod export;
pub mod recalc;
pub mod schema;
pub mod service;
pub mod simulation;
pub mod store;

pub use aggregation::{validate_adjustments, Aggregation};
pub use classifier::{classify, classify_ratio, utilization_ratio, AT_LIMIT_TOLERANCE};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{LimitsError, Result};
pub use events::{
    EventBus, EventHandler, InProcessEventBus, TOPIC_FIELDS_UPDATED, TOPIC_LIMITS_RECALCULATED,
};
pub use export::{dashboard_to_csv, validate_format, FORMAT_CSV};
pub use recalc::Recalculator;
pub use schema::*;
pub use service::LimitsService;
pub use simulation::Simulator;
pub use store::{
    DocumentSource, InMemoryDocumentSource, InMemoryPolicyStore, InMemorySnapshotStore,
    PolicyStore, SnapshotStore,
};
