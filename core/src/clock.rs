//! Report clock: the single source of the generation timestamp.

use chrono::{DateTime, SubsecRound, Utc};

pub trait ReportClock {
    /// Current UTC time at whole-second precision.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock. Used by the runner.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ReportClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(0)
    }
}

/// A clock frozen at one instant, so report content is reproducible.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    at: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at: at.trunc_subsecs(0) }
    }
}

impl ReportClock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }
}
