use crate::schema::{LimitPolicy, LimitState};

/// Half-width of the band around exact breach that classifies as AT_LIMIT,
/// whether approached from above or below.
pub const AT_LIMIT_TOLERANCE: f64 = 0.01;

/// Utilization of the annual cap. Takes the larger of actual and projected
/// spend: the forecast alone must not mask an already-elevated actual, and
/// the actual alone must not mask a projected breach.
///
/// A non-positive annual limit yields 0.0 rather than dividing by zero.
pub fn utilization_ratio(accumulated: f64, forecast: f64, annual_limit: f64) -> f64 {
    if annual_limit <= 0.0 {
        return 0.0;
    }
    accumulated.max(forecast) / annual_limit
}

pub fn classify(accumulated: f64, forecast: f64, policy: &LimitPolicy) -> LimitState {
    classify_ratio(
        utilization_ratio(accumulated, forecast, policy.annual_limit),
        policy,
    )
}

/// Maps a utilization ratio to a risk state. The arms are ordered; the final
/// NEAR_LIMIT catches ratios between the critical threshold and the AT_LIMIT
/// band when the critical threshold sits below 1.0.
pub fn classify_ratio(ratio: f64, policy: &LimitPolicy) -> LimitState {
    if ratio < policy.warn_threshold {
        LimitState::Ok
    } else if ratio < policy.critical_threshold {
        LimitState::NearLimit
    } else if (ratio - 1.0).abs() <= AT_LIMIT_TOLERANCE {
        LimitState::AtLimit
    } else if ratio >= 1.0 {
        LimitState::Exceeded
    } else {
        LimitState::NearLimit
    }
}
