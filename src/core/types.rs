use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle for a domain user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user#{}", self.0)
    }
}

/// Discriminant of an [`Action`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Onboarding,
    ConditionCheck,
    GenerateRoutine,
    StartWorkout,
    LogSets,
    CompleteWorkout,
    SubmitFeedback,
    ReplaceExercise,
    AddExercise,
    DeleteExercise,
    ReviewHistory,
    AbuseProbe,
    WeekAdvance,
}

impl ActionKind {
    pub const ALL: [ActionKind; 13] = [
        ActionKind::Onboarding,
        ActionKind::ConditionCheck,
        ActionKind::GenerateRoutine,
        ActionKind::StartWorkout,
        ActionKind::LogSets,
        ActionKind::CompleteWorkout,
        ActionKind::SubmitFeedback,
        ActionKind::ReplaceExercise,
        ActionKind::AddExercise,
        ActionKind::DeleteExercise,
        ActionKind::ReviewHistory,
        ActionKind::AbuseProbe,
        ActionKind::WeekAdvance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::ConditionCheck => "condition_check",
            Self::GenerateRoutine => "generate_routine",
            Self::StartWorkout => "start_workout",
            Self::LogSets => "log_sets",
            Self::CompleteWorkout => "complete_workout",
            Self::SubmitFeedback => "submit_feedback",
            Self::ReplaceExercise => "replace_exercise",
            Self::AddExercise => "add_exercise",
            Self::DeleteExercise => "delete_exercise",
            Self::ReviewHistory => "review_history",
            Self::AbuseProbe => "abuse_probe",
            Self::WeekAdvance => "week_advance",
        }
    }

    /// Stats key incremented when an action of this kind succeeds
    pub fn success_key(&self) -> &'static str {
        match self {
            Self::Onboarding => "onboardings_completed",
            Self::ConditionCheck => "conditions_checked",
            Self::GenerateRoutine => "routines_generated",
            Self::StartWorkout => "workouts_started",
            Self::LogSets => "sets_logged",
            Self::CompleteWorkout => "workouts_completed",
            Self::SubmitFeedback => "feedbacks_submitted",
            Self::ReplaceExercise => "exercises_replaced",
            Self::AddExercise => "exercises_added",
            Self::DeleteExercise => "exercises_deleted",
            Self::ReviewHistory => "histories_reviewed",
            Self::AbuseProbe => "abuse_probes_accepted",
            Self::WeekAdvance => "weeks_advanced",
        }
    }

    /// Whether the rest of a day's plan depends on this action succeeding.
    ///
    /// A failed workout start leaves nothing to log sets against, complete,
    /// or rate, so the remainder of that user's day is skipped.
    pub fn is_hard_precondition(&self) -> bool {
        matches!(self, Self::StartWorkout)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Malicious variants of ordinary calls. The domain must reject every one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbuseProbe {
    OversizedSets,
    NegativeWeight,
    ForeignSession,
    RoutineBurst,
}

impl AbuseProbe {
    pub const ALL: [AbuseProbe; 4] = [
        AbuseProbe::OversizedSets,
        AbuseProbe::NegativeWeight,
        AbuseProbe::ForeignSession,
        AbuseProbe::RoutineBurst,
    ];
}

/// One planned unit of simulated user behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Onboarding { level: u8, goal: String },
    ConditionCheck { text: String, energy: u8 },
    GenerateRoutine { goal: Option<String> },
    StartWorkout,
    LogSets { exercise: String, sets: u32, reps: u32, weight_kg: f32 },
    CompleteWorkout,
    SubmitFeedback { rating: i32, text: String },
    ReplaceExercise { exercise: String },
    AddExercise { exercise: String },
    DeleteExercise { exercise: String },
    ReviewHistory { days: u32 },
    AbuseProbe { probe: AbuseProbe },
    WeekAdvance { passed: bool },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Onboarding { .. } => ActionKind::Onboarding,
            Self::ConditionCheck { .. } => ActionKind::ConditionCheck,
            Self::GenerateRoutine { .. } => ActionKind::GenerateRoutine,
            Self::StartWorkout => ActionKind::StartWorkout,
            Self::LogSets { .. } => ActionKind::LogSets,
            Self::CompleteWorkout => ActionKind::CompleteWorkout,
            Self::SubmitFeedback { .. } => ActionKind::SubmitFeedback,
            Self::ReplaceExercise { .. } => ActionKind::ReplaceExercise,
            Self::AddExercise { .. } => ActionKind::AddExercise,
            Self::DeleteExercise { .. } => ActionKind::DeleteExercise,
            Self::ReviewHistory { .. } => ActionKind::ReviewHistory,
            Self::AbuseProbe { .. } => ActionKind::AbuseProbe,
            Self::WeekAdvance { .. } => ActionKind::WeekAdvance,
        }
    }

    /// How much a success adds to the kind's stats counter
    pub fn stat_weight(&self) -> u64 {
        match self {
            Self::LogSets { sets, .. } => u64::from(*sets),
            _ => 1,
        }
    }
}

/// Result of executing one action. Folded into stats and the error log, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub kind: ActionKind,
    pub success: bool,
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn ok(kind: ActionKind) -> Self {
        Self {
            kind,
            success: true,
            error: None,
        }
    }

    pub fn failed(kind: ActionKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// A failure captured during a run, with enough context to replay it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub day: u32,
    pub action: String,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(
        user: impl Into<String>,
        day: u32,
        action: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            user: user.into(),
            day,
            action: action.into(),
            message: message.into(),
        }
    }
}

/// Verdict of one post-run validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub name: &'static str,
    pub pass: bool,
    pub summary: String,
    pub violations: Vec<String>,
}

impl ValidationResult {
    pub fn from_violations(name: &'static str, checked: usize, violations: Vec<String>) -> Self {
        let pass = violations.is_empty();
        let summary = if pass {
            format!("{} records checked, no violations", checked)
        } else {
            format!("{} violations across {} records", violations.len(), checked)
        };
        Self {
            name,
            pass,
            summary,
            violations,
        }
    }
}
