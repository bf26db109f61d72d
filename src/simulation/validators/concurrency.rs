use super::Validator;
use crate::core::{UserId, ValidationResult};
use crate::domain::store::{LevelChangeReason, SessionStatus};
use crate::domain::DomainSnapshot;
use std::collections::{BTreeMap, BTreeSet};

/// Traces of unserialized writes: lost updates, duplicate inserts, double
/// allocation of ids.
pub struct ConcurrencyValidator;

impl Validator for ConcurrencyValidator {
    fn name(&self) -> &'static str {
        "concurrency"
    }

    fn validate(&self, snapshot: &DomainSnapshot) -> ValidationResult {
        let mut violations = Vec::new();

        let mut active: BTreeMap<UserId, usize> = BTreeMap::new();
        for session in snapshot.sessions.iter().filter(|s| s.status == SessionStatus::Active) {
            *active.entry(session.user).or_default() += 1;
        }
        for (user, count) in active.into_iter().filter(|(_, n)| *n > 1) {
            violations.push(format!("{}: {} sessions active at once", user, count));
        }

        // total_sets is a running counter; it must equal the rows it counts.
        let mut logged: BTreeMap<u64, u32> = BTreeMap::new();
        for set in &snapshot.sets {
            *logged.entry(set.session).or_default() += 1;
        }
        for session in &snapshot.sessions {
            let rows = logged.get(&session.id).copied().unwrap_or(0);
            if rows != session.total_sets {
                violations.push(format!(
                    "session {}: counter says {} sets, {} stored",
                    session.id, session.total_sets, rows
                ));
            }
        }

        let mut rated = BTreeSet::new();
        for feedback in &snapshot.feedbacks {
            if !rated.insert(feedback.session) {
                violations.push(format!("session {}: feedback stored twice", feedback.session));
            }
        }

        let mut onboarded = BTreeSet::new();
        for event in snapshot
            .level_events
            .iter()
            .filter(|e| e.reason == LevelChangeReason::Onboarding)
        {
            if !onboarded.insert(event.user) {
                violations.push(format!("{}: onboarded more than once", event.user));
            }
        }

        let ids = snapshot
            .conditions
            .iter()
            .map(|r| r.id)
            .chain(snapshot.routines.iter().map(|r| r.id))
            .chain(snapshot.sessions.iter().map(|r| r.id))
            .chain(snapshot.sets.iter().map(|r| r.id))
            .chain(snapshot.feedbacks.iter().map(|r| r.id))
            .chain(snapshot.level_events.iter().map(|r| r.id))
            .chain(snapshot.users.iter().map(|r| r.id.0));
        let mut seen = BTreeSet::new();
        for id in ids {
            if !seen.insert(id) {
                violations.push(format!("record id {} allocated twice", id));
            }
        }

        ValidationResult::from_violations(self.name(), snapshot.record_count(), violations)
    }
}
