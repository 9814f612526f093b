use chrono::{DateTime, Utc};

/// Time source for everything that does clock arithmetic. Injectable so
/// tests can advance time deterministically; all instants are UTC and
/// staleness checks are always duration comparisons.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
