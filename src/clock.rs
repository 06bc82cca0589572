use chrono::{NaiveDate, NaiveDateTime, Utc};

/// Source of "now" for the engine. The current date feeds exactly two
/// documented fallbacks: the forecast divisor floor when no month has data,
/// and the year default when an event-referenced document carries no
/// parseable issue date. Routing both through this trait keeps them
/// pinnable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// Deterministic clock for tests and replay.
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
