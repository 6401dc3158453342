//! Attempt and wall-clock ceilings for a single `run`.

use std::time::{Duration, Instant};

/// Which ceiling a run hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeilingBreach {
    Attempts { used: u32, max: u32 },
    WallClock { limit: Duration },
}

impl CeilingBreach {
    pub fn describe(&self) -> String {
        match self {
            CeilingBreach::Attempts { used, max } => {
                format!("attempt ceiling reached ({used}/{max})")
            }
            CeilingBreach::WallClock { limit } => {
                format!("wall-clock ceiling of {}s exceeded", limit.as_secs())
            }
        }
    }
}

/// Hard bounds on the orchestrator loop, independent of selector decisions.
#[derive(Debug, Clone, Copy)]
pub struct Ceiling {
    max_attempts: u32,
    limit: Duration,
    deadline: Instant,
}

impl Ceiling {
    /// Start the wall clock now.
    pub fn start(max_attempts: u32, limit: Duration) -> Self {
        Self {
            max_attempts,
            limit,
            deadline: Instant::now() + limit,
        }
    }

    /// Check the ceiling given the number of oracle rounds consumed so far.
    pub fn check(&self, used: u32) -> Option<CeilingBreach> {
        if used >= self.max_attempts {
            return Some(CeilingBreach::Attempts {
                used,
                max: self.max_attempts,
            });
        }
        if self.remaining().is_zero() {
            return Some(CeilingBreach::WallClock { limit: self.limit });
        }
        None
    }

    pub fn remaining(&self) -> Duration {
        remaining_budget(self.deadline)
    }

    /// Timeout for one blocking call: the configured value, capped by the clock.
    pub fn call_timeout(&self, configured: Duration) -> Duration {
        configured.min(self.remaining())
    }
}

/// Return the time left until `deadline`, or zero once it has passed.
pub fn remaining_budget(deadline: Instant) -> Duration {
    deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_ceiling_trips_at_max() {
        let ceiling = Ceiling::start(2, Duration::from_secs(60));
        assert_eq!(ceiling.check(1), None);
        assert_eq!(
            ceiling.check(2),
            Some(CeilingBreach::Attempts { used: 2, max: 2 })
        );
    }

    #[test]
    fn zero_wall_clock_trips_immediately() {
        let ceiling = Ceiling::start(10, Duration::from_secs(0));
        assert_eq!(
            ceiling.check(0),
            Some(CeilingBreach::WallClock {
                limit: Duration::from_secs(0)
            })
        );
    }

    #[test]
    fn call_timeout_is_capped_by_remaining_clock() {
        let ceiling = Ceiling::start(10, Duration::from_secs(5));
        assert!(ceiling.call_timeout(Duration::from_secs(600)) <= Duration::from_secs(5));
        assert_eq!(
            ceiling.call_timeout(Duration::from_millis(10)),
            Duration::from_millis(10)
        );
    }
}
