//! Persona catalog
//!
//! A persona turns a day number into an ordered action plan. Planning is
//! pure: it never touches the domain, and all randomness comes from the
//! caller's generator so a seeded run is reproducible.

use crate::core::{AbuseProbe, Action, Result, SimError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const GOALS: [&str; 4] = ["strength", "hypertrophy", "endurance", "fat_loss"];
const EXERCISES: [&str; 8] = [
    "squat",
    "bench_press",
    "deadlift",
    "overhead_press",
    "barbell_row",
    "pull_up",
    "lunge",
    "dip",
];
const CONDITION_NOTES: [&str; 4] = [
    "slept well, feeling strong",
    "a bit sore from last session",
    "low energy after work",
    "ready to train",
];
const ROUTINE_SPAM: usize = 6;

/// Closed set of persona identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaTag {
    Normal,
    Power,
    Lazy,
    Abuser,
    EdgeCase,
    Marathon,
    AgentTest,
}

impl PersonaTag {
    pub const ALL: [PersonaTag; 7] = [
        PersonaTag::Normal,
        PersonaTag::Power,
        PersonaTag::Lazy,
        PersonaTag::Abuser,
        PersonaTag::EdgeCase,
        PersonaTag::Marathon,
        PersonaTag::AgentTest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Power => "power",
            Self::Lazy => "lazy",
            Self::Abuser => "abuser",
            Self::EdgeCase => "edge_case",
            Self::Marathon => "marathon",
            Self::AgentTest => "agent_test",
        }
    }
}

impl fmt::Display for PersonaTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonaTag {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        PersonaTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == normalized)
            .ok_or_else(|| SimError::UnknownPersona(s.to_string()))
    }
}

/// Week-advance days: 8, 15, 22, ...
pub fn is_week_boundary(day: u32) -> bool {
    day > 1 && (day - 1) % 7 == 0
}

/// Average user: trains most days, rates some sessions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normal {
    pub workout_chance: f64,
    pub feedback_chance: f64,
    pub replace_chance: f64,
    pub pass_chance: f64,
}

/// High-volume user: daily training, repeated routine generation, history reads
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Power {
    pub workout_chance: f64,
    pub routine_requests: usize,
    pub pass_chance: f64,
}

/// Sporadic user who often walks away mid-session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lazy {
    pub workout_chance: f64,
    pub abandon_chance: f64,
    pub pass_chance: f64,
}

/// Hammers rate limits and sends malicious payloads every day
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Abuser {
    pub pass_chance: f64,
}

/// Exercises boundary values on a fixed four-day rotation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeCase;

/// Long-horizon user training six days a week
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marathon {
    pub pass_chance: f64,
}

/// Mirrors the chat agent's flow: onboarding first, short capped sessions after
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentTest {
    pub workout_chance: f64,
    pub pass_chance: f64,
}

/// Behaviour of one simulated user
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PersonaBehavior {
    Normal(Normal),
    Power(Power),
    Lazy(Lazy),
    Abuser(Abuser),
    EdgeCase(EdgeCase),
    Marathon(Marathon),
    AgentTest(AgentTest),
}

impl PersonaBehavior {
    /// The single factory from tag to behaviour
    pub fn for_tag(tag: PersonaTag) -> Self {
        match tag {
            PersonaTag::Normal => Self::Normal(Normal {
                workout_chance: 0.7,
                feedback_chance: 0.5,
                replace_chance: 0.1,
                pass_chance: 0.8,
            }),
            PersonaTag::Power => Self::Power(Power {
                workout_chance: 0.95,
                routine_requests: 2,
                pass_chance: 0.9,
            }),
            PersonaTag::Lazy => Self::Lazy(Lazy {
                workout_chance: 0.25,
                abandon_chance: 0.3,
                pass_chance: 0.5,
            }),
            PersonaTag::Abuser => Self::Abuser(Abuser { pass_chance: 0.5 }),
            PersonaTag::EdgeCase => Self::EdgeCase(EdgeCase),
            PersonaTag::Marathon => Self::Marathon(Marathon { pass_chance: 0.85 }),
            PersonaTag::AgentTest => Self::AgentTest(AgentTest {
                workout_chance: 0.85,
                pass_chance: 0.8,
            }),
        }
    }

    pub fn tag(&self) -> PersonaTag {
        match self {
            Self::Normal(_) => PersonaTag::Normal,
            Self::Power(_) => PersonaTag::Power,
            Self::Lazy(_) => PersonaTag::Lazy,
            Self::Abuser(_) => PersonaTag::Abuser,
            Self::EdgeCase(_) => PersonaTag::EdgeCase,
            Self::Marathon(_) => PersonaTag::Marathon,
            Self::AgentTest(_) => PersonaTag::AgentTest,
        }
    }

    /// Ordered plan for `day` (1-based)
    pub fn actions_for_day<R: Rng + ?Sized>(&self, day: u32, rng: &mut R) -> Vec<Action> {
        let mut plan = Plan::default();
        match self {
            Self::Normal(p) => p.plan(day, rng, &mut plan),
            Self::Power(p) => p.plan(day, rng, &mut plan),
            Self::Lazy(p) => p.plan(day, rng, &mut plan),
            Self::Abuser(p) => p.plan(day, rng, &mut plan),
            Self::EdgeCase(p) => p.plan(day, &mut plan),
            Self::Marathon(p) => p.plan(day, rng, &mut plan),
            Self::AgentTest(p) => p.plan(day, rng, &mut plan),
        }
        plan.actions
    }
}

/// Resolves persona names from configuration
#[derive(Debug, Default, Clone, Copy)]
pub struct PersonaCatalog;

impl PersonaCatalog {
    /// Fails with [`SimError::UnknownPersona`] for names outside the closed set
    pub fn instantiate(&self, name: &str) -> Result<PersonaBehavior> {
        let tag = name.parse::<PersonaTag>()?;
        Ok(PersonaBehavior::for_tag(tag))
    }
}

#[derive(Default)]
struct Plan {
    actions: Vec<Action>,
}

impl Plan {
    fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    fn onboarding<R: Rng + ?Sized>(&mut self, rng: &mut R, max_level: u8) {
        self.push(Action::Onboarding {
            level: rng.gen_range(1..=max_level),
            goal: pick(rng, &GOALS).to_string(),
        });
    }

    fn condition<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.push(Action::ConditionCheck {
            text: pick(rng, &CONDITION_NOTES).to_string(),
            energy: rng.gen_range(2..=5),
        });
    }

    fn week_advance<R: Rng + ?Sized>(&mut self, day: u32, rng: &mut R, pass_chance: f64) {
        if is_week_boundary(day) {
            self.push(Action::WeekAdvance {
                passed: rng.gen_bool(pass_chance),
            });
        }
    }

    /// One LogSets per exercise, each with a set count drawn from `sets`
    fn sets<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        exercises: std::ops::RangeInclusive<usize>,
        sets: std::ops::RangeInclusive<u32>,
    ) {
        let count = rng.gen_range(exercises);
        let start = rng.gen_range(0..EXERCISES.len());
        for exercise in EXERCISES.iter().cycle().skip(start).take(count) {
            self.push(Action::LogSets {
                exercise: exercise.to_string(),
                sets: rng.gen_range(sets.clone()),
                reps: rng.gen_range(5..=12),
                weight_kg: f32::from(rng.gen_range(20u8..=140)),
            });
        }
    }

    fn feedback<R: Rng + ?Sized>(&mut self, rng: &mut R, ratings: std::ops::RangeInclusive<i32>) {
        self.push(Action::SubmitFeedback {
            rating: rng.gen_range(ratings),
            text: "session feedback".to_string(),
        });
    }
}

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items[rng.gen_range(0..items.len())]
}

impl Normal {
    fn plan<R: Rng + ?Sized>(&self, day: u32, rng: &mut R, plan: &mut Plan) {
        if day == 1 {
            plan.onboarding(rng, 4);
        }
        plan.week_advance(day, rng, self.pass_chance);
        if !rng.gen_bool(self.workout_chance) {
            return;
        }
        plan.condition(rng);
        plan.push(Action::GenerateRoutine { goal: None });
        if rng.gen_bool(self.replace_chance) {
            plan.push(Action::ReplaceExercise {
                exercise: "cable_row".to_string(),
            });
        }
        plan.push(Action::StartWorkout);
        plan.sets(rng, 2..=3, 3..=4);
        plan.push(Action::CompleteWorkout);
        if rng.gen_bool(self.feedback_chance) {
            plan.feedback(rng, 2..=4);
        }
    }
}

impl Power {
    fn plan<R: Rng + ?Sized>(&self, day: u32, rng: &mut R, plan: &mut Plan) {
        if day == 1 {
            plan.onboarding(rng, 7);
        }
        plan.week_advance(day, rng, self.pass_chance);
        plan.push(Action::ReviewHistory { days: 7 });
        if !rng.gen_bool(self.workout_chance) {
            return;
        }
        plan.condition(rng);
        for _ in 0..self.routine_requests {
            plan.push(Action::GenerateRoutine {
                goal: Some(pick(rng, &GOALS).to_string()),
            });
        }
        plan.push(Action::ReplaceExercise {
            exercise: "farmer_carry".to_string(),
        });
        plan.push(Action::AddExercise {
            exercise: "face_pull".to_string(),
        });
        plan.push(Action::DeleteExercise {
            exercise: "farmer_carry".to_string(),
        });
        plan.push(Action::StartWorkout);
        plan.sets(rng, 4..=5, 4..=5);
        plan.push(Action::CompleteWorkout);
        plan.feedback(rng, 1..=5);
    }
}

impl Lazy {
    fn plan<R: Rng + ?Sized>(&self, day: u32, rng: &mut R, plan: &mut Plan) {
        if day == 1 {
            plan.onboarding(rng, 2);
            return;
        }
        plan.week_advance(day, rng, self.pass_chance);
        if !rng.gen_bool(self.workout_chance) {
            return;
        }
        if rng.gen_bool(0.5) {
            plan.condition(rng);
        }
        plan.push(Action::StartWorkout);
        plan.sets(rng, 1..=2, 1..=2);
        if rng.gen_bool(self.abandon_chance) {
            return;
        }
        plan.push(Action::CompleteWorkout);
        if rng.gen_bool(0.2) {
            plan.feedback(rng, 3..=5);
        }
    }
}

impl Abuser {
    fn plan<R: Rng + ?Sized>(&self, day: u32, rng: &mut R, plan: &mut Plan) {
        if day == 1 {
            plan.onboarding(rng, 3);
        }
        plan.week_advance(day, rng, self.pass_chance);
        for _ in 0..ROUTINE_SPAM {
            plan.push(Action::GenerateRoutine { goal: None });
        }
        plan.condition(rng);
        plan.condition(rng);
        plan.push(Action::AbuseProbe {
            probe: AbuseProbe::ForeignSession,
        });
        plan.push(Action::AbuseProbe {
            probe: AbuseProbe::RoutineBurst,
        });
        plan.push(Action::StartWorkout);
        plan.sets(rng, 1..=1, 3..=3);
        plan.push(Action::AbuseProbe {
            probe: AbuseProbe::OversizedSets,
        });
        plan.push(Action::AbuseProbe {
            probe: AbuseProbe::NegativeWeight,
        });
        plan.push(Action::CompleteWorkout);
        plan.feedback(rng, 1..=5);
        plan.feedback(rng, 1..=5);
        plan.push(Action::StartWorkout);
    }
}

impl EdgeCase {
    fn plan(&self, day: u32, plan: &mut Plan) {
        if day == 1 {
            plan.push(Action::Onboarding {
                level: 10,
                goal: "strength".to_string(),
            });
            plan.push(Action::Onboarding {
                level: 1,
                goal: "strength".to_string(),
            });
            return;
        }
        if is_week_boundary(day) {
            plan.push(Action::WeekAdvance {
                passed: (day / 7) % 2 == 0,
            });
        }
        match day % 4 {
            0 => {
                plan.push(Action::ConditionCheck {
                    text: " ".to_string(),
                    energy: 0,
                });
                plan.push(Action::CompleteWorkout);
                plan.push(Action::SubmitFeedback {
                    rating: 0,
                    text: String::new(),
                });
            }
            1 => {
                plan.push(Action::StartWorkout);
                plan.push(Action::LogSets {
                    exercise: "squat".to_string(),
                    sets: 20,
                    reps: 1,
                    weight_kg: 0.0,
                });
                plan.push(Action::LogSets {
                    exercise: "deadlift".to_string(),
                    sets: 1,
                    reps: 100,
                    weight_kg: 500.0,
                });
                plan.push(Action::CompleteWorkout);
                plan.push(Action::SubmitFeedback {
                    rating: 5,
                    text: "x".repeat(2_000),
                });
            }
            2 => {
                plan.push(Action::StartWorkout);
                plan.push(Action::LogSets {
                    exercise: "squat".to_string(),
                    sets: 21,
                    reps: 5,
                    weight_kg: 60.0,
                });
                plan.push(Action::CompleteWorkout);
                plan.push(Action::SubmitFeedback {
                    rating: 6,
                    text: "off the scale".to_string(),
                });
            }
            _ => {
                plan.push(Action::GenerateRoutine {
                    goal: Some("g".repeat(200)),
                });
                plan.push(Action::ReplaceExercise {
                    exercise: "plank".to_string(),
                });
                plan.push(Action::AddExercise {
                    exercise: String::new(),
                });
                plan.push(Action::DeleteExercise {
                    exercise: "plank".to_string(),
                });
                plan.push(Action::ReviewHistory { days: 90 });
                plan.push(Action::ReviewHistory { days: 91 });
            }
        }
    }
}

impl Marathon {
    fn plan<R: Rng + ?Sized>(&self, day: u32, rng: &mut R, plan: &mut Plan) {
        if day == 1 {
            plan.onboarding(rng, 5);
        }
        plan.week_advance(day, rng, self.pass_chance);
        if day % 10 == 0 {
            plan.push(Action::ReviewHistory { days: 30 });
        }
        if day % 7 == 0 {
            return;
        }
        plan.condition(rng);
        plan.push(Action::GenerateRoutine { goal: None });
        plan.push(Action::StartWorkout);
        plan.sets(rng, 3..=5, 3..=4);
        plan.push(Action::CompleteWorkout);
        plan.feedback(rng, 2..=4);
    }
}

impl AgentTest {
    fn plan<R: Rng + ?Sized>(&self, day: u32, rng: &mut R, plan: &mut Plan) {
        if day == 1 {
            plan.onboarding(rng, 3);
            return;
        }
        plan.week_advance(day, rng, self.pass_chance);
        if !rng.gen_bool(self.workout_chance) {
            return;
        }
        plan.condition(rng);
        plan.push(Action::GenerateRoutine { goal: None });
        plan.push(Action::StartWorkout);
        // Capped at 3-4 sets in total, split over two exercises.
        let total: u32 = rng.gen_range(3..=4);
        for (exercise, sets) in [("squat", 2), ("bench_press", total - 2)] {
            plan.push(Action::LogSets {
                exercise: exercise.to_string(),
                sets,
                reps: rng.gen_range(6..=10),
                weight_kg: f32::from(rng.gen_range(20u8..=80)),
            });
        }
        plan.push(Action::CompleteWorkout);
        plan.feedback(rng, 2..=4);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ActionKind;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn kinds(actions: &[Action]) -> Vec<ActionKind> {
        actions.iter().map(Action::kind).collect()
    }

    #[test]
    fn test_tag_parsing() {
        assert_eq!("edge-case".parse::<PersonaTag>().unwrap(), PersonaTag::EdgeCase);
        assert_eq!(" AGENT_TEST ".parse::<PersonaTag>().unwrap(), PersonaTag::AgentTest);
        assert!(matches!(
            "sloth".parse::<PersonaTag>(),
            Err(SimError::UnknownPersona(_))
        ));
    }

    #[test]
    fn test_catalog_round_trips_every_tag() {
        let catalog = PersonaCatalog;
        for tag in PersonaTag::ALL {
            assert_eq!(catalog.instantiate(tag.as_str()).unwrap().tag(), tag);
        }
        assert!(catalog.instantiate("unknown").is_err());
    }

    #[test]
    fn test_week_boundaries() {
        let days: Vec<u32> = (1..=28).filter(|d| is_week_boundary(*d)).collect();
        assert_eq!(days, vec![8, 15, 22]);
    }

    #[test]
    fn test_same_seed_same_plan() {
        for tag in PersonaTag::ALL {
            let persona = PersonaBehavior::for_tag(tag);
            for day in 1..=10 {
                let a = persona.actions_for_day(day, &mut StdRng::seed_from_u64(7));
                let b = persona.actions_for_day(day, &mut StdRng::seed_from_u64(7));
                assert_eq!(a, b, "{} day {}", tag, day);
            }
        }
    }

    #[test]
    fn test_agent_day_one_is_onboarding_only() {
        let persona = PersonaBehavior::for_tag(PersonaTag::AgentTest);
        for seed in 0..50 {
            let plan = persona.actions_for_day(1, &mut StdRng::seed_from_u64(seed));
            assert_eq!(kinds(&plan), vec![ActionKind::Onboarding]);
        }
    }

    #[test]
    fn test_agent_weekly_advance_and_set_cap() {
        let persona = PersonaBehavior::for_tag(PersonaTag::AgentTest);
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            for day in 2..=28 {
                let plan = persona.actions_for_day(day, &mut rng);
                let advances = plan.iter().filter(|a| a.kind() == ActionKind::WeekAdvance).count();
                assert_eq!(advances, usize::from(is_week_boundary(day)), "day {}", day);

                let sets: u32 = plan
                    .iter()
                    .filter_map(|a| match a {
                        Action::LogSets { sets, .. } => Some(*sets),
                        _ => None,
                    })
                    .sum();
                assert!(sets == 0 || (3..=4).contains(&sets), "day {} had {} sets", day, sets);
            }
        }
    }

    #[test]
    fn test_workout_chains_start_before_sets() {
        for tag in PersonaTag::ALL {
            let persona = PersonaBehavior::for_tag(tag);
            let mut rng = StdRng::seed_from_u64(11);
            for day in 1..=14 {
                let plan = kinds(&persona.actions_for_day(day, &mut rng));
                if let Some(first_set) = plan.iter().position(|k| *k == ActionKind::LogSets) {
                    let start = plan.iter().position(|k| *k == ActionKind::StartWorkout);
                    assert!(start.is_some_and(|s| s < first_set), "{} day {}", tag, day);
                }
            }
        }
    }

    #[test]
    fn test_abuser_exceeds_routine_limit_every_day() {
        let persona = PersonaBehavior::for_tag(PersonaTag::Abuser);
        let plan = persona.actions_for_day(3, &mut StdRng::seed_from_u64(1));
        let routines = plan
            .iter()
            .filter(|a| a.kind() == ActionKind::GenerateRoutine)
            .count();
        assert!(routines > crate::domain::memory::ROUTINE_DAILY_LIMIT as usize);
        assert!(plan.iter().any(|a| a.kind() == ActionKind::AbuseProbe));
    }

    #[test]
    fn test_power_user_edits_routine_after_generating_it() {
        let persona = PersonaBehavior::for_tag(PersonaTag::Power);
        let mut rng = StdRng::seed_from_u64(5);
        let plan = (2..=10)
            .map(|day| kinds(&persona.actions_for_day(day, &mut rng)))
            .find(|plan| plan.contains(&ActionKind::StartWorkout))
            .unwrap();

        let position = |kind: ActionKind| plan.iter().position(|k| *k == kind).unwrap();
        let routine = position(ActionKind::GenerateRoutine);
        assert!(routine < position(ActionKind::ReplaceExercise));
        assert!(position(ActionKind::ReplaceExercise) < position(ActionKind::AddExercise));
        assert!(position(ActionKind::AddExercise) < position(ActionKind::DeleteExercise));
        assert!(position(ActionKind::DeleteExercise) < position(ActionKind::StartWorkout));
    }

    #[test]
    fn test_marathon_rests_on_seventh_day() {
        let persona = PersonaBehavior::for_tag(PersonaTag::Marathon);
        let plan = persona.actions_for_day(14, &mut StdRng::seed_from_u64(3));
        assert!(plan.iter().all(|a| a.kind() != ActionKind::StartWorkout));
    }
}
