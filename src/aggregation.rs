use crate::error::{LimitsError, Result};
use crate::schema::{
    DashboardView, DocumentTotal, LimitPolicy, LimitState, MonthValue, MonthlyAdjustment,
    ThresholdView,
};
use log::debug;
use std::collections::BTreeMap;

/// Result of aggregating one tenant-year's documents into monthly totals.
///
/// The forecast is a plain linear run-rate extrapolation
/// (`accumulated / months_with_data * 12`), not a seasonal model: a burst of
/// activity early in the year is projected forward at full rate and will
/// overweight the year-end estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// Month (1-12) to the sum of gross amounts issued in that month.
    /// Months without activity are absent.
    pub monthly_totals: BTreeMap<u32, f64>,
    /// Sum over all months present.
    pub accumulated: f64,
    /// Count of months with a strictly positive total.
    pub months_with_data: u32,
    /// Projected full-year total.
    pub forecast: f64,
}

impl Aggregation {
    /// Buckets documents by issue month and derives accumulated/forecast.
    ///
    /// Documents whose issue date does not parse are dropped from the month
    /// map. Amount sign is not validated here; rejecting negative totals is
    /// the Document Source's responsibility.
    ///
    /// `current_month` (1-12) is the divisor floor when no month has data,
    /// which keeps a fresh tenant's early-year forecast from dividing by zero.
    pub fn from_documents(docs: &[DocumentTotal], current_month: u32) -> Self {
        let mut monthly_totals: BTreeMap<u32, f64> = BTreeMap::new();
        let mut dropped = 0usize;

        for doc in docs {
            match doc.issue_month() {
                Some(month) => {
                    *monthly_totals.entry(month).or_insert(0.0) += doc.gross_amount;
                }
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            debug!(
                "Dropped {} document(s) with unparseable issue dates from aggregation",
                dropped
            );
        }

        Self::from_monthly_totals(monthly_totals, current_month)
    }

    /// Derives accumulated/forecast from an already-built month map. Used by
    /// the simulation overlay, which edits the map and recomputes.
    pub fn from_monthly_totals(monthly_totals: BTreeMap<u32, f64>, current_month: u32) -> Self {
        let accumulated: f64 = monthly_totals.values().sum();
        let months_with_data = monthly_totals.values().filter(|&&v| v > 0.0).count() as u32;

        let divisor = if months_with_data == 0 {
            current_month.max(1)
        } else {
            months_with_data
        };
        let forecast = accumulated / f64::from(divisor) * 12.0;

        Self {
            monthly_totals,
            accumulated,
            months_with_data,
            forecast,
        }
    }

    /// Additively overlays hypothetical deltas and recomputes. The original
    /// aggregation is left untouched.
    pub fn with_adjustments(
        &self,
        adjustments: &[MonthlyAdjustment],
        current_month: u32,
    ) -> Result<Self> {
        validate_adjustments(adjustments)?;

        let mut monthly_totals = self.monthly_totals.clone();
        for adjustment in adjustments {
            *monthly_totals.entry(adjustment.month).or_insert(0.0) += adjustment.delta;
        }

        Ok(Self::from_monthly_totals(monthly_totals, current_month))
    }

    /// The 12 dashboard entries, month 1 through 12, each carrying the
    /// cumulative total through that month.
    pub fn cumulative_months(&self) -> Vec<MonthValue> {
        let mut running = 0.0;
        (1..=12)
            .map(|month| {
                running += self.monthly_totals.get(&month).copied().unwrap_or(0.0);
                MonthValue {
                    month,
                    value: running,
                }
            })
            .collect()
    }

    pub fn to_dashboard(&self, policy: &LimitPolicy, state: LimitState) -> DashboardView {
        DashboardView {
            accumulated: self.accumulated,
            forecast: self.forecast,
            state,
            threshold: ThresholdView {
                warn: policy.warn_threshold,
                critical: policy.critical_threshold,
            },
            months: self.cumulative_months(),
        }
    }
}

pub fn validate_adjustments(adjustments: &[MonthlyAdjustment]) -> Result<()> {
    for adjustment in adjustments {
        if !(1..=12).contains(&adjustment.month) {
            return Err(LimitsError::Validation(format!(
                "Adjustment month must be between 1 and 12, got {}",
                adjustment.month
            )));
        }
    }
    Ok(())
}
