use super::Validator;
use crate::core::{UserId, ValidationResult};
use crate::domain::store::{
    SessionStatus, MAX_LEVEL, MAX_REPS, MAX_ROUTINE_EXERCISES, MAX_WEIGHT_KG, MIN_LEVEL,
};
use crate::domain::DomainSnapshot;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Referential integrity and value ranges
///
/// Every child record must point at a parent that exists and agrees on
/// owner and day; every stored value must be one the product would accept.
pub struct DataIntegrityValidator;

impl Validator for DataIntegrityValidator {
    fn name(&self) -> &'static str {
        "data_integrity"
    }

    fn validate(&self, snapshot: &DomainSnapshot) -> ValidationResult {
        let mut violations = Vec::new();
        let users: BTreeSet<UserId> = snapshot.users.iter().map(|u| u.id).collect();
        let sessions: BTreeMap<u64, _> = snapshot.sessions.iter().map(|s| (s.id, s)).collect();

        let mut emails = BTreeSet::new();
        for user in &snapshot.users {
            if !emails.insert(user.email.as_str()) {
                violations.push(format!("{}: duplicate email {}", user.id, user.email));
            }
            if !(MIN_LEVEL..=MAX_LEVEL).contains(&user.level) {
                violations.push(format!("{}: level {} out of range", user.id, user.level));
            }
        }

        for condition in &snapshot.conditions {
            if !users.contains(&condition.user) {
                violations.push(format!("condition {}: unknown owner {}", condition.id, condition.user));
            }
            if !(1..=5).contains(&condition.energy) {
                violations.push(format!("condition {}: energy {}", condition.id, condition.energy));
            }
            if condition.text.trim().is_empty() {
                violations.push(format!("condition {}: empty text", condition.id));
            }
        }

        for routine in &snapshot.routines {
            if !users.contains(&routine.user) {
                violations.push(format!("routine {}: unknown owner {}", routine.id, routine.user));
            }
            if routine.exercises.is_empty() {
                violations.push(format!("routine {}: no exercises", routine.id));
            }
            if routine.exercises.len() > MAX_ROUTINE_EXERCISES {
                violations.push(format!("routine {}: {} exercises", routine.id, routine.exercises.len()));
            }
            let distinct: HashSet<&String> = routine.exercises.iter().collect();
            if distinct.len() != routine.exercises.len() {
                violations.push(format!("routine {}: duplicate exercise", routine.id));
            }
        }

        for session in &snapshot.sessions {
            if !users.contains(&session.user) {
                violations.push(format!("session {}: unknown owner {}", session.id, session.user));
            }
            match (session.status, session.closed_day) {
                (SessionStatus::Active, Some(_)) => {
                    violations.push(format!("session {}: active but closed", session.id));
                }
                (SessionStatus::Completed | SessionStatus::Abandoned, None) => {
                    violations.push(format!("session {}: closed without a close day", session.id));
                }
                (_, Some(closed)) if closed < session.day => {
                    violations.push(format!(
                        "session {}: closed on day {} before it started on day {}",
                        session.id, closed, session.day
                    ));
                }
                _ => {}
            }
        }

        for set in &snapshot.sets {
            match sessions.get(&set.session) {
                None => violations.push(format!("set {}: orphaned, session {} missing", set.id, set.session)),
                Some(session) if session.user != set.user || session.day != set.day => {
                    violations.push(format!(
                        "set {}: owner/day {}/{} disagrees with session {}",
                        set.id, set.user, set.day, session.id
                    ));
                }
                Some(_) => {}
            }
            if !(1..=MAX_REPS).contains(&set.reps) {
                violations.push(format!("set {}: {} reps", set.id, set.reps));
            }
            if !(0.0..=MAX_WEIGHT_KG).contains(&set.weight_kg) {
                violations.push(format!("set {}: weight {}kg", set.id, set.weight_kg));
            }
        }

        for feedback in &snapshot.feedbacks {
            match sessions.get(&feedback.session) {
                None => violations.push(format!(
                    "feedback {}: orphaned, session {} missing",
                    feedback.id, feedback.session
                )),
                Some(session) if session.user != feedback.user => {
                    violations.push(format!(
                        "feedback {}: owner {} disagrees with session {}",
                        feedback.id, feedback.user, session.id
                    ));
                }
                Some(_) => {}
            }
            if !(1..=5).contains(&feedback.rating) {
                violations.push(format!("feedback {}: rating {}", feedback.id, feedback.rating));
            }
        }

        for event in &snapshot.level_events {
            if !users.contains(&event.user) {
                violations.push(format!("level event {}: unknown owner {}", event.id, event.user));
            }
            if !(MIN_LEVEL..=MAX_LEVEL).contains(&event.to) {
                violations.push(format!("level event {}: level {} out of range", event.id, event.to));
            }
        }

        ValidationResult::from_violations(self.name(), snapshot.record_count(), violations)
    }
}
