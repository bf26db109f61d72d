use super::Validator;
use crate::core::{UserId, ValidationResult};
use crate::domain::memory::ROUTINE_DAILY_LIMIT;
use crate::domain::DomainSnapshot;
use std::collections::BTreeMap;

/// Per-user daily limits, checked against what actually got stored
pub struct RateLimitValidator {
    routines_per_day: usize,
    conditions_per_day: usize,
    sessions_per_day: usize,
}

impl Default for RateLimitValidator {
    fn default() -> Self {
        Self {
            routines_per_day: ROUTINE_DAILY_LIMIT as usize,
            conditions_per_day: 1,
            sessions_per_day: 1,
        }
    }
}

impl RateLimitValidator {
    pub fn routines_per_day(mut self, limit: usize) -> Self {
        self.routines_per_day = limit;
        self
    }
}

fn over_limit<I>(label: &str, limit: usize, keys: I, violations: &mut Vec<String>)
where
    I: Iterator<Item = (UserId, u32)>,
{
    let mut buckets: BTreeMap<(UserId, u32), usize> = BTreeMap::new();
    for key in keys {
        *buckets.entry(key).or_default() += 1;
    }
    for ((user, day), count) in buckets {
        if count > limit {
            violations.push(format!(
                "{}: {} {} on day {} (limit {})",
                user, count, label, day, limit
            ));
        }
    }
}

impl Validator for RateLimitValidator {
    fn name(&self) -> &'static str {
        "rate_limiting"
    }

    fn validate(&self, snapshot: &DomainSnapshot) -> ValidationResult {
        let mut violations = Vec::new();

        over_limit(
            "routines",
            self.routines_per_day,
            snapshot.routines.iter().map(|r| (r.user, r.day)),
            &mut violations,
        );
        over_limit(
            "condition checks",
            self.conditions_per_day,
            snapshot.conditions.iter().map(|r| (r.user, r.day)),
            &mut violations,
        );
        over_limit(
            "sessions",
            self.sessions_per_day,
            snapshot.sessions.iter().map(|r| (r.user, r.day)),
            &mut violations,
        );

        let checked = snapshot.routines.len() + snapshot.conditions.len() + snapshot.sessions.len();
        ValidationResult::from_violations(self.name(), checked, violations)
    }
}
