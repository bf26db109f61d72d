use super::Validator;
use crate::core::{UserId, ValidationResult};
use crate::domain::store::{LevelChangeReason, LevelEvent, SessionStatus, MIN_LEVEL};
use crate::domain::DomainSnapshot;
use std::collections::BTreeMap;

/// Product rules: level progression and workout lifecycle
pub struct BusinessLogicValidator;

impl BusinessLogicValidator {
    fn check_levels(snapshot: &DomainSnapshot, violations: &mut Vec<String>) {
        let mut history: BTreeMap<UserId, Vec<&LevelEvent>> = BTreeMap::new();
        for event in &snapshot.level_events {
            history.entry(event.user).or_default().push(event);
        }

        for user in &snapshot.users {
            let mut events = history.remove(&user.id).unwrap_or_default();
            events.sort_by_key(|e| e.id);

            if user.onboarded != events.iter().any(|e| e.reason == LevelChangeReason::Onboarding) {
                violations.push(format!(
                    "{}: onboarded flag {} disagrees with level history",
                    user.id, user.onboarded
                ));
            }

            let mut level = MIN_LEVEL;
            for event in &events {
                if event.from != level {
                    violations.push(format!(
                        "{}: level event {} starts at {} but level was {}",
                        user.id, event.id, event.from, level
                    ));
                }
                let allowed = match event.reason {
                    LevelChangeReason::Onboarding => true,
                    LevelChangeReason::TestPassed => event.to >= event.from,
                    LevelChangeReason::TestFailed => event.to <= event.from,
                };
                if !allowed {
                    violations.push(format!(
                        "{}: level {} -> {} not allowed for {:?}",
                        user.id, event.from, event.to, event.reason
                    ));
                }
                level = event.to;
            }
            if user.level != level {
                violations.push(format!(
                    "{}: stored level {} but history ends at {}",
                    user.id, user.level, level
                ));
            }
        }
    }

    fn check_workouts(snapshot: &DomainSnapshot, violations: &mut Vec<String>) {
        let onboarded: BTreeMap<UserId, bool> =
            snapshot.users.iter().map(|u| (u.id, u.onboarded)).collect();
        let sessions: BTreeMap<u64, _> = snapshot.sessions.iter().map(|s| (s.id, s)).collect();

        for session in &snapshot.sessions {
            if onboarded.get(&session.user) == Some(&false) {
                violations.push(format!("session {}: owner {} never onboarded", session.id, session.user));
            }
            if session.status == SessionStatus::Completed && session.total_sets == 0 {
                violations.push(format!("session {}: completed with no sets", session.id));
            }
        }

        for feedback in &snapshot.feedbacks {
            if let Some(session) = sessions.get(&feedback.session) {
                if session.status != SessionStatus::Completed {
                    violations.push(format!(
                        "feedback {}: session {} was never completed",
                        feedback.id, session.id
                    ));
                }
                if session.day != feedback.day {
                    violations.push(format!(
                        "feedback {}: given on day {} for a day {} session",
                        feedback.id, feedback.day, session.day
                    ));
                }
            }
        }
    }
}

impl Validator for BusinessLogicValidator {
    fn name(&self) -> &'static str {
        "business_logic"
    }

    fn validate(&self, snapshot: &DomainSnapshot) -> ValidationResult {
        let mut violations = Vec::new();
        Self::check_levels(snapshot, &mut violations);
        Self::check_workouts(snapshot, &mut violations);

        let checked = snapshot.users.len()
            + snapshot.level_events.len()
            + snapshot.sessions.len()
            + snapshot.feedbacks.len();
        ValidationResult::from_violations(self.name(), checked, violations)
    }
}
