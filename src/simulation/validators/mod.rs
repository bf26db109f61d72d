//! Post-run invariant checks
//!
//! Each validator reads a snapshot of the cohort's records and reports one
//! class of invariant. They are independent signals: all of them always run.

mod business_logic;
mod concurrency;
mod data_integrity;
mod rate_limit;

pub use business_logic::BusinessLogicValidator;
pub use concurrency::ConcurrencyValidator;
pub use data_integrity::DataIntegrityValidator;
pub use rate_limit::RateLimitValidator;

use crate::core::ValidationResult;
use crate::domain::DomainSnapshot;

/// Read-only check over already persisted state
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, snapshot: &DomainSnapshot) -> ValidationResult;
}

/// The four standard checks, in report order
pub fn default_validators() -> Vec<Box<dyn Validator>> {
    vec![
        Box::new(DataIntegrityValidator),
        Box::new(ConcurrencyValidator),
        Box::new(RateLimitValidator::default()),
        Box::new(BusinessLogicValidator),
    ]
}

/// Run every validator; a failing one never prevents the next
pub fn run_all(validators: &[Box<dyn Validator>], snapshot: &DomainSnapshot) -> Vec<ValidationResult> {
    validators.iter().map(|v| v.validate(snapshot)).collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::core::UserId;
    use crate::domain::store::{
        FeedbackRecord, LevelChangeReason, LevelEvent, SessionRecord, SessionStatus, SetRecord,
        UserRecord,
    };
    use crate::domain::DomainSnapshot;
    use chrono::Utc;

    /// One onboarded user with a completed, rated three-set session on day 2
    pub fn healthy() -> DomainSnapshot {
        let user = UserId(1);
        DomainSnapshot {
            users: vec![UserRecord {
                id: user,
                email: "sim-normal-0000-run@sim.repstack.test".into(),
                level: 3,
                onboarded: true,
                goal: Some("strength".into()),
                created_at: Utc::now(),
            }],
            sessions: vec![SessionRecord {
                id: 10,
                user,
                day: 2,
                status: SessionStatus::Completed,
                total_sets: 3,
                closed_day: Some(2),
            }],
            sets: (0..3)
                .map(|i| SetRecord {
                    id: 20 + i,
                    session: 10,
                    user,
                    day: 2,
                    exercise: "squat".into(),
                    reps: 8,
                    weight_kg: 60.0,
                })
                .collect(),
            feedbacks: vec![FeedbackRecord {
                id: 30,
                session: 10,
                user,
                day: 2,
                rating: 4,
                text: "good".into(),
            }],
            level_events: vec![LevelEvent {
                id: 2,
                user,
                day: 1,
                from: 1,
                to: 3,
                reason: LevelChangeReason::Onboarding,
            }],
            ..DomainSnapshot::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_validators_pass_on_healthy_state() {
        let results = run_all(&default_validators(), &fixtures::healthy());
        assert_eq!(results.len(), 4);
        for result in &results {
            assert!(result.pass, "{}: {:?}", result.name, result.violations);
        }
    }

    #[test]
    fn test_failures_do_not_short_circuit() {
        let mut snapshot = fixtures::healthy();
        snapshot.feedbacks[0].rating = 9;
        snapshot.sessions[0].total_sets = 2;

        let results = run_all(&default_validators(), &snapshot);
        let names: Vec<_> = results.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec!["data_integrity", "concurrency", "rate_limiting", "business_logic"]
        );
        assert!(!results[0].pass);
        assert!(!results[1].pass);
    }
}
