use crate::core::{DomainError, DomainResult, UserId};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 10;
pub const MAX_SETS_PER_CALL: u32 = 20;
pub const MAX_REPS: u32 = 100;
pub const MAX_WEIGHT_KG: f32 = 500.0;
pub const MAX_GOAL_LEN: usize = 200;
pub const MAX_HISTORY_DAYS: u32 = 90;
pub const MAX_ROUTINE_EXERCISES: usize = 12;

const EXERCISE_LIBRARY: [&str; 10] = [
    "squat",
    "bench_press",
    "deadlift",
    "overhead_press",
    "barbell_row",
    "pull_up",
    "lunge",
    "dip",
    "romanian_deadlift",
    "plank",
];

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid email regex")
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub level: u8,
    pub onboarded: bool,
    pub goal: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRecord {
    pub id: u64,
    pub user: UserId,
    pub day: u32,
    pub energy: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineRecord {
    pub id: u64,
    pub user: UserId,
    pub day: u32,
    pub goal: Option<String>,
    pub exercises: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: u64,
    pub user: UserId,
    pub day: u32,
    pub status: SessionStatus,
    pub total_sets: u32,
    pub closed_day: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRecord {
    pub id: u64,
    pub session: u64,
    pub user: UserId,
    pub day: u32,
    pub exercise: String,
    pub reps: u32,
    pub weight_kg: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: u64,
    pub session: u64,
    pub user: UserId,
    pub day: u32,
    pub rating: i32,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelChangeReason {
    Onboarding,
    TestPassed,
    TestFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelEvent {
    pub id: u64,
    pub user: UserId,
    pub day: u32,
    pub from: u8,
    pub to: u8,
    pub reason: LevelChangeReason,
}

/// Persisted record classes, listed children first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordClass {
    Sets,
    Feedbacks,
    Sessions,
    Routines,
    Conditions,
    LevelEvents,
    Users,
}

impl RecordClass {
    /// Deletion order that satisfies every referential constraint
    pub const CLEANUP_ORDER: [RecordClass; 7] = [
        RecordClass::Sets,
        RecordClass::Feedbacks,
        RecordClass::Sessions,
        RecordClass::Routines,
        RecordClass::Conditions,
        RecordClass::LevelEvents,
        RecordClass::Users,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sets => "exercise_sets",
            Self::Feedbacks => "workout_feedbacks",
            Self::Sessions => "workout_sessions",
            Self::Routines => "workout_routines",
            Self::Conditions => "condition_logs",
            Self::LevelEvents => "level_events",
            Self::Users => "users",
        }
    }
}

/// Point-in-time copy of the records owned by a set of users
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainSnapshot {
    pub users: Vec<UserRecord>,
    pub conditions: Vec<ConditionRecord>,
    pub routines: Vec<RoutineRecord>,
    pub sessions: Vec<SessionRecord>,
    pub sets: Vec<SetRecord>,
    pub feedbacks: Vec<FeedbackRecord>,
    pub level_events: Vec<LevelEvent>,
}

impl DomainSnapshot {
    pub fn record_count(&self) -> usize {
        self.users.len()
            + self.conditions.len()
            + self.routines.len()
            + self.sessions.len()
            + self.sets.len()
            + self.feedbacks.len()
            + self.level_events.len()
    }
}

/// Relational state of the fitness domain
///
/// Callers serialize access through the connection pool's store lock, so
/// every method here may assume exclusive access for its duration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitnessStore {
    next_id: u64,
    users: BTreeMap<UserId, UserRecord>,
    conditions: Vec<ConditionRecord>,
    routines: Vec<RoutineRecord>,
    sessions: BTreeMap<u64, SessionRecord>,
    sets: Vec<SetRecord>,
    feedbacks: Vec<FeedbackRecord>,
    level_events: Vec<LevelEvent>,
}

impl FitnessStore {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, user: UserId) -> DomainResult<&UserRecord> {
        self.users
            .get(&user)
            .ok_or_else(|| DomainError::NotFound(format!("{}", user)))
    }

    fn onboarded_user(&self, user: UserId) -> DomainResult<&UserRecord> {
        let record = self.user(user)?;
        if !record.onboarded {
            return Err(DomainError::Precondition(format!("{} has not onboarded", user)));
        }
        Ok(record)
    }

    fn active_session_mut(&mut self, user: UserId, day: u32) -> DomainResult<&mut SessionRecord> {
        self.sessions
            .values_mut()
            .find(|s| s.user == user && s.day == day && s.status == SessionStatus::Active)
            .ok_or_else(|| DomainError::Precondition(format!("{} has no active session on day {}", user, day)))
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn create_user(&mut self, email: &str) -> DomainResult<UserId> {
        if !email_pattern().is_match(email) {
            return Err(DomainError::Validation(format!("malformed email '{}'", email)));
        }
        if self.users.values().any(|u| u.email == email) {
            return Err(DomainError::Conflict(format!("email '{}' already taken", email)));
        }

        let id = UserId(self.allocate_id());
        self.users.insert(
            id,
            UserRecord {
                id,
                email: email.to_string(),
                level: MIN_LEVEL,
                onboarded: false,
                goal: None,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    pub fn onboard(&mut self, user: UserId, day: u32, level: u8, goal: &str) -> DomainResult<()> {
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
            return Err(DomainError::Validation(format!("level {} out of range", level)));
        }
        if goal.trim().is_empty() || goal.len() > MAX_GOAL_LEN {
            return Err(DomainError::Validation("goal must be 1..=200 characters".into()));
        }
        let record = self.user(user)?;
        if record.onboarded {
            return Err(DomainError::Conflict(format!("{} already onboarded", user)));
        }
        let from = record.level;

        let id = self.allocate_id();
        self.level_events.push(LevelEvent {
            id,
            user,
            day,
            from,
            to: level,
            reason: LevelChangeReason::Onboarding,
        });
        if let Some(record) = self.users.get_mut(&user) {
            record.onboarded = true;
            record.level = level;
            record.goal = Some(goal.to_string());
        }
        Ok(())
    }

    pub fn check_condition(&mut self, user: UserId, day: u32, text: &str, energy: u8) -> DomainResult<()> {
        if text.trim().is_empty() {
            return Err(DomainError::Validation("condition text is empty".into()));
        }
        if !(1..=5).contains(&energy) {
            return Err(DomainError::Validation(format!("energy {} out of range", energy)));
        }
        self.onboarded_user(user)?;
        if self.conditions.iter().any(|c| c.user == user && c.day == day) {
            return Err(DomainError::RateLimited(format!(
                "{} already checked condition on day {}",
                user, day
            )));
        }

        let id = self.allocate_id();
        self.conditions.push(ConditionRecord {
            id,
            user,
            day,
            energy,
            text: text.to_string(),
        });
        Ok(())
    }

    /// Insert a generated routine. Rate limiting is the caller's job.
    pub fn insert_routine(&mut self, user: UserId, day: u32, goal: Option<&str>) -> DomainResult<u64> {
        if goal.is_some_and(|g| g.len() > MAX_GOAL_LEN) {
            return Err(DomainError::Validation("routine goal too long".into()));
        }
        let level = self.onboarded_user(user)?.level;

        let count = 4 + usize::from(level / 3);
        let offset = day as usize % EXERCISE_LIBRARY.len();
        let exercises = EXERCISE_LIBRARY
            .iter()
            .cycle()
            .skip(offset)
            .take(count)
            .map(|e| e.to_string())
            .collect();

        let id = self.allocate_id();
        self.routines.push(RoutineRecord {
            id,
            user,
            day,
            goal: goal.map(str::to_string),
            exercises,
        });
        Ok(id)
    }

    pub fn start_session(&mut self, user: UserId, day: u32) -> DomainResult<u64> {
        self.onboarded_user(user)?;

        for session in self.sessions.values_mut() {
            if session.user != user || session.status != SessionStatus::Active {
                continue;
            }
            if session.day == day {
                return Err(DomainError::Conflict(format!(
                    "{} already has an active session",
                    user
                )));
            }
            session.status = SessionStatus::Abandoned;
            session.closed_day = Some(day);
        }
        if self.sessions.values().any(|s| s.user == user && s.day == day) {
            return Err(DomainError::RateLimited(format!(
                "{} already worked out on day {}",
                user, day
            )));
        }

        let id = self.allocate_id();
        self.sessions.insert(
            id,
            SessionRecord {
                id,
                user,
                day,
                status: SessionStatus::Active,
                total_sets: 0,
                closed_day: None,
            },
        );
        Ok(id)
    }

    pub fn log_sets(
        &mut self,
        user: UserId,
        day: u32,
        exercise: &str,
        sets: u32,
        reps: u32,
        weight_kg: f32,
    ) -> DomainResult<()> {
        if exercise.trim().is_empty() {
            return Err(DomainError::Validation("exercise name is empty".into()));
        }
        if !(1..=MAX_SETS_PER_CALL).contains(&sets) {
            return Err(DomainError::Validation(format!("{} sets out of range", sets)));
        }
        if !(1..=MAX_REPS).contains(&reps) {
            return Err(DomainError::Validation(format!("{} reps out of range", reps)));
        }
        if !(0.0..=MAX_WEIGHT_KG).contains(&weight_kg) {
            return Err(DomainError::Validation(format!("weight {}kg out of range", weight_kg)));
        }
        self.user(user)?;

        let session = self.active_session_mut(user, day)?;
        session.total_sets += sets;
        let session_id = session.id;

        for _ in 0..sets {
            let id = self.allocate_id();
            self.sets.push(SetRecord {
                id,
                session: session_id,
                user,
                day,
                exercise: exercise.to_string(),
                reps,
                weight_kg,
            });
        }
        Ok(())
    }

    pub fn complete_session(&mut self, user: UserId, day: u32) -> DomainResult<u64> {
        self.user(user)?;
        let session = self.active_session_mut(user, day)?;
        if session.total_sets == 0 {
            return Err(DomainError::Validation("cannot complete a session with no sets".into()));
        }
        session.status = SessionStatus::Completed;
        session.closed_day = Some(day);
        Ok(session.id)
    }

    /// Complete a session addressed by id, as a client holding a stale or forged id would
    pub fn complete_session_by_id(&mut self, user: UserId, day: u32, session_id: u64) -> DomainResult<()> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| DomainError::NotFound(format!("session {}", session_id)))?;
        if session.user != user {
            return Err(DomainError::Conflict(format!(
                "session {} belongs to another user",
                session_id
            )));
        }
        if session.status != SessionStatus::Active {
            return Err(DomainError::Conflict(format!("session {} is not active", session_id)));
        }
        session.status = SessionStatus::Completed;
        session.closed_day = Some(day);
        Ok(())
    }

    pub fn submit_feedback(&mut self, user: UserId, day: u32, rating: i32, text: &str) -> DomainResult<()> {
        if !(1..=5).contains(&rating) {
            return Err(DomainError::Validation(format!("rating {} out of range", rating)));
        }
        self.user(user)?;
        let session = self
            .sessions
            .values()
            .find(|s| s.user == user && s.day == day && s.status == SessionStatus::Completed)
            .map(|s| s.id)
            .ok_or_else(|| DomainError::Precondition(format!("{} has no completed session on day {}", user, day)))?;
        if self.feedbacks.iter().any(|f| f.session == session) {
            return Err(DomainError::Conflict(format!("session {} already has feedback", session)));
        }

        let id = self.allocate_id();
        self.feedbacks.push(FeedbackRecord {
            id,
            session,
            user,
            day,
            rating,
            text: text.to_string(),
        });
        Ok(())
    }

    fn todays_routine(&mut self, user: UserId, day: u32) -> DomainResult<&mut RoutineRecord> {
        self.user(user)?;
        self.routines
            .iter_mut()
            .rev()
            .find(|r| r.user == user && r.day == day)
            .ok_or_else(|| DomainError::Precondition(format!("{} has no routine on day {}", user, day)))
    }

    pub fn replace_exercise(&mut self, user: UserId, day: u32, exercise: &str) -> DomainResult<()> {
        if exercise.trim().is_empty() {
            return Err(DomainError::Validation("exercise name is empty".into()));
        }
        let routine = self.todays_routine(user, day)?;
        if routine.exercises.iter().any(|e| e == exercise) {
            return Err(DomainError::Conflict(format!("'{}' already in routine", exercise)));
        }
        match routine.exercises.first_mut() {
            Some(first) => *first = exercise.to_string(),
            None => routine.exercises.push(exercise.to_string()),
        }
        Ok(())
    }

    pub fn add_exercise(&mut self, user: UserId, day: u32, exercise: &str) -> DomainResult<()> {
        if exercise.trim().is_empty() {
            return Err(DomainError::Validation("exercise name is empty".into()));
        }
        let routine = self.todays_routine(user, day)?;
        if routine.exercises.iter().any(|e| e == exercise) {
            return Err(DomainError::Conflict(format!("'{}' already in routine", exercise)));
        }
        if routine.exercises.len() >= MAX_ROUTINE_EXERCISES {
            return Err(DomainError::Validation(format!(
                "routine {} already has {} exercises",
                routine.id, MAX_ROUTINE_EXERCISES
            )));
        }
        routine.exercises.push(exercise.to_string());
        Ok(())
    }

    /// Remove an exercise; the last one cannot go
    pub fn delete_exercise(&mut self, user: UserId, day: u32, exercise: &str) -> DomainResult<()> {
        let routine = self.todays_routine(user, day)?;
        let position = routine
            .exercises
            .iter()
            .position(|e| e == exercise)
            .ok_or_else(|| DomainError::NotFound(format!("'{}' not in routine {}", exercise, routine.id)))?;
        if routine.exercises.len() == 1 {
            return Err(DomainError::Validation(format!("routine {} needs at least one exercise", routine.id)));
        }
        routine.exercises.remove(position);
        Ok(())
    }

    /// Number of sessions in the trailing window ending at `day`
    pub fn review_history(&self, user: UserId, day: u32, days: u32) -> DomainResult<usize> {
        if !(1..=MAX_HISTORY_DAYS).contains(&days) {
            return Err(DomainError::Validation(format!("history window {} out of range", days)));
        }
        self.onboarded_user(user)?;
        let since = day.saturating_sub(days);
        Ok(self
            .sessions
            .values()
            .filter(|s| s.user == user && s.day > since && s.day <= day)
            .count())
    }

    pub fn advance_week(&mut self, user: UserId, day: u32, passed: bool) -> DomainResult<u8> {
        let from = self.onboarded_user(user)?.level;
        let (to, reason) = if passed {
            ((from + 1).min(MAX_LEVEL), LevelChangeReason::TestPassed)
        } else {
            (from.saturating_sub(1).max(MIN_LEVEL), LevelChangeReason::TestFailed)
        };

        let id = self.allocate_id();
        self.level_events.push(LevelEvent {
            id,
            user,
            day,
            from,
            to,
            reason,
        });
        if let Some(record) = self.users.get_mut(&user) {
            record.level = to;
        }
        Ok(to)
    }

    pub fn users_where<F>(&self, predicate: F) -> Vec<UserRecord>
    where
        F: Fn(&UserRecord) -> bool,
    {
        self.users.values().filter(|u| predicate(u)).cloned().collect()
    }

    pub fn snapshot(&self, users: &[UserId]) -> DomainSnapshot {
        let scope: BTreeSet<UserId> = users.iter().copied().collect();
        DomainSnapshot {
            users: self
                .users
                .values()
                .filter(|u| scope.contains(&u.id))
                .cloned()
                .collect(),
            conditions: scoped(&self.conditions, &scope, |r| r.user),
            routines: scoped(&self.routines, &scope, |r| r.user),
            sessions: self
                .sessions
                .values()
                .filter(|s| scope.contains(&s.user))
                .cloned()
                .collect(),
            sets: scoped(&self.sets, &scope, |r| r.user),
            feedbacks: scoped(&self.feedbacks, &scope, |r| r.user),
            level_events: scoped(&self.level_events, &scope, |r| r.user),
        }
    }

    /// Delete every record of `class` owned by `users`.
    ///
    /// Fails with a constraint violation while dependent records still exist,
    /// and deletes nothing in that case.
    pub fn delete(&mut self, class: RecordClass, users: &[UserId]) -> DomainResult<usize> {
        let scope: BTreeSet<UserId> = users.iter().copied().collect();
        let deleted = match class {
            RecordClass::Sets => retain_count(&mut self.sets, |r| !scope.contains(&r.user)),
            RecordClass::Feedbacks => retain_count(&mut self.feedbacks, |r| !scope.contains(&r.user)),
            RecordClass::Sessions => {
                let doomed: BTreeSet<u64> = self
                    .sessions
                    .values()
                    .filter(|s| scope.contains(&s.user))
                    .map(|s| s.id)
                    .collect();
                let referenced = self.sets.iter().map(|s| s.session).chain(self.feedbacks.iter().map(|f| f.session));
                if let Some(session) = referenced.into_iter().find(|id| doomed.contains(id)) {
                    return Err(DomainError::ConstraintViolation(format!(
                        "session {} is still referenced",
                        session
                    )));
                }
                let before = self.sessions.len();
                self.sessions.retain(|id, _| !doomed.contains(id));
                before - self.sessions.len()
            }
            RecordClass::Routines => retain_count(&mut self.routines, |r| !scope.contains(&r.user)),
            RecordClass::Conditions => retain_count(&mut self.conditions, |r| !scope.contains(&r.user)),
            RecordClass::LevelEvents => retain_count(&mut self.level_events, |r| !scope.contains(&r.user)),
            RecordClass::Users => {
                if let Some(user) = self.first_dependent_owner(&scope) {
                    return Err(DomainError::ConstraintViolation(format!(
                        "{} still owns dependent records",
                        user
                    )));
                }
                let before = self.users.len();
                self.users.retain(|id, _| !scope.contains(id));
                before - self.users.len()
            }
        };
        Ok(deleted)
    }

    fn first_dependent_owner(&self, scope: &BTreeSet<UserId>) -> Option<UserId> {
        self.sets
            .iter()
            .map(|r| r.user)
            .chain(self.feedbacks.iter().map(|r| r.user))
            .chain(self.sessions.values().map(|r| r.user))
            .chain(self.routines.iter().map(|r| r.user))
            .chain(self.conditions.iter().map(|r| r.user))
            .chain(self.level_events.iter().map(|r| r.user))
            .find(|user| scope.contains(user))
    }
}

fn scoped<T: Clone>(records: &[T], scope: &BTreeSet<UserId>, owner: impl Fn(&T) -> UserId) -> Vec<T> {
    records.iter().filter(|r| scope.contains(&owner(r))).cloned().collect()
}

fn retain_count<T>(records: &mut Vec<T>, keep: impl Fn(&T) -> bool) -> usize {
    let before = records.len();
    records.retain(|r| keep(r));
    before - records.len()
}
