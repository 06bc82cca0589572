use crate::error::{LimitsError, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default policy applied when a year has no explicit configuration.
/// These constants are passed explicitly at the get-or-create point;
/// there is no ambient global default state.
pub const DEFAULT_ANNUAL_LIMIT: f64 = 81_000.0;
pub const DEFAULT_WARN_THRESHOLD: f64 = 0.8;
pub const DEFAULT_CRITICAL_THRESHOLD: f64 = 1.0;

/// Per-year accumulation policy: the annual cap and the ratios at which a
/// tenant is flagged as approaching or breaching it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LimitPolicy {
    pub year: i32,

    #[schemars(description = "The annual accumulation cap. Must be positive.")]
    pub annual_limit: f64,

    #[schemars(description = "Utilization ratio in (0, 1] at which the state leaves OK.")]
    pub warn_threshold: f64,

    #[schemars(
        description = "Utilization ratio in (0, 1] at which the state escalates past NEAR_LIMIT. Must be >= warn_threshold."
    )]
    pub critical_threshold: f64,
}

impl LimitPolicy {
    pub fn default_for_year(year: i32) -> Self {
        Self {
            year,
            annual_limit: DEFAULT_ANNUAL_LIMIT,
            warn_threshold: DEFAULT_WARN_THRESHOLD,
            critical_threshold: DEFAULT_CRITICAL_THRESHOLD,
        }
    }

    /// Validates an explicitly supplied policy. The built-in defaults are
    /// known-good constants and skip this path.
    pub fn validate(&self) -> Result<()> {
        if self.annual_limit <= 0.0 {
            return Err(LimitsError::Validation(format!(
                "annual_limit must be positive, got {}",
                self.annual_limit
            )));
        }
        for (name, value) in [
            ("warn_threshold", self.warn_threshold),
            ("critical_threshold", self.critical_threshold),
        ] {
            if value <= 0.0 || value > 1.0 {
                return Err(LimitsError::Validation(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.warn_threshold > self.critical_threshold {
            return Err(LimitsError::Validation(format!(
                "warn_threshold ({}) must not exceed critical_threshold ({})",
                self.warn_threshold, self.critical_threshold
            )));
        }
        Ok(())
    }
}

/// Read view of a document as served by the external Document Source.
/// This subsystem never mutates documents; it only aggregates them.
///
/// `issue_date` arrives as a loosely-typed string. Month and year are
/// extracted with a strict parse returning a tagged absence; a document
/// whose date does not parse is dropped from the month map rather than
/// silently defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTotal {
    pub id: String,
    pub tenant_id: String,
    pub issue_date: String,
    pub gross_amount: f64,
}

impl DocumentTotal {
    /// Strict `YYYY-MM-DD` parse of the issue date.
    pub fn issue_date_parsed(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.issue_date.trim(), "%Y-%m-%d").ok()
    }

    pub fn issue_month(&self) -> Option<u32> {
        self.issue_date_parsed().map(|d| d.month())
    }

    pub fn issue_year(&self) -> Option<i32> {
        self.issue_date_parsed().map(|d| d.year())
    }
}

/// Risk classification of a tenant-year against its policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum LimitState {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "NEAR_LIMIT")]
    NearLimit,
    #[serde(rename = "AT_LIMIT")]
    AtLimit,
    #[serde(rename = "EXCEEDED")]
    Exceeded,
}

impl std::fmt::Display for LimitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Ok => "OK",
            Self::NearLimit => "NEAR_LIMIT",
            Self::AtLimit => "AT_LIMIT",
            Self::Exceeded => "EXCEEDED",
        };
        f.write_str(label)
    }
}

/// One persisted row per (tenant, year, month). All 12 rows of a year are
/// recomputed and written together on every recalculation; `forecast` and
/// `state` are therefore constant across the 12 rows of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySnapshot {
    pub tenant_id: String,
    pub year: i32,
    pub month: u32,
    /// Cumulative total from month 1 through this month.
    pub accumulated: f64,
    pub forecast: f64,
    pub state: LimitState,
    pub updated_at: NaiveDateTime,
}

/// One dashboard month entry. `value` is the cumulative total through this
/// month, not the month's own delta; the UI renders a single ascending
/// progress curve from these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthValue {
    #[schemars(description = "Calendar month, 1-12.")]
    pub month: u32,

    #[schemars(description = "Cumulative total from January through this month.")]
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ThresholdView {
    pub warn: f64,
    pub critical: f64,
}

/// Derived, non-persisted projection served to dashboards and exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DashboardView {
    #[schemars(description = "Total accumulated to date for the year.")]
    pub accumulated: f64,

    #[schemars(description = "Linear run-rate projection of the full-year total.")]
    pub forecast: f64,

    pub state: LimitState,
    pub threshold: ThresholdView,

    #[schemars(description = "Ordered 12 entries of cumulative monthly totals.")]
    pub months: Vec<MonthValue>,
}

/// Request body for a synchronous recalculation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecalculateRequest {
    pub tenant_id: String,
    pub year: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Optional restriction to an explicit document id set.")]
    pub doc_ids: Option<Vec<String>>,
}

/// Acknowledgement returned by the recalculate entry point.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecalculateAccepted {
    pub accepted: bool,
    pub state: LimitState,
}

/// A hypothetical monthly delta overlaid on real totals during simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthlyAdjustment {
    #[schemars(description = "Calendar month, 1-12.")]
    pub month: u32,

    #[schemars(description = "Amount added to (or, if negative, removed from) the month's total.")]
    pub delta: f64,
}

/// Request body for a what-if simulation. Never persists anything.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SimulateRequest {
    pub tenant_id: String,
    pub year: i32,
    pub adjustments: Vec<MonthlyAdjustment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct Health {
    pub ok: bool,
}

/// Inbound signal that a document's extracted fields changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldsUpdated {
    pub doc_id: String,
}

/// Outbound signal emitted after every successful recalculation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsRecalculated {
    pub tenant_id: String,
    pub year: i32,
    pub state: LimitState,
    pub accumulated: f64,
}

/// Status record returned by the event-triggered recalculation path.
/// A missing document is a benign no-op, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Recalculated {
        tenant_id: String,
        year: i32,
        state: LimitState,
    },
    Ignored {
        doc_id: String,
        reason: String,
    },
}
