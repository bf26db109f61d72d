use super::executor::ActionExecutor;
use super::persona::PersonaBehavior;
use super::stats::ACTIONS_SKIPPED;
use crate::core::{ErrorRecord, UserId};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// One simulated user for the duration of a run
#[derive(Debug, Clone, PartialEq)]
pub struct CohortMember {
    /// Position in the cohort; feeds the per-day plan seed
    pub index: usize,
    pub identity: UserId,
    pub email: String,
    pub persona: PersonaBehavior,
}

/// What happened to one member on one day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayReport {
    pub planned: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Seed for a member's plan on a given day.
///
/// Depends only on the run seed, the member's cohort position and the day,
/// so sequential and parallel runs plan identically.
pub fn plan_seed(run_seed: u64, index: usize, day: u32) -> u64 {
    run_seed
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((index as u64) << 20)
        .wrapping_add(u64::from(day))
}

/// Plays one member through one day
#[derive(Clone)]
pub struct DaySimulator {
    executor: ActionExecutor,
    seed: u64,
}

impl DaySimulator {
    pub fn new(executor: ActionExecutor, seed: u64) -> Self {
        Self { executor, seed }
    }

    /// Execute the persona's plan in order.
    ///
    /// A failed action does not stop the day unless it is a hard
    /// precondition; then the rest of the plan is skipped and one record
    /// notes the skip.
    pub async fn run(&self, member: &CohortMember, day: u32) -> DayReport {
        let mut rng = StdRng::seed_from_u64(plan_seed(self.seed, member.index, day));
        let plan = member.persona.actions_for_day(day, &mut rng);
        let mut report = DayReport {
            planned: plan.len(),
            ..DayReport::default()
        };

        for (position, action) in plan.iter().enumerate() {
            let outcome = self.executor.execute(member.identity, day, action).await;
            if outcome.success {
                report.succeeded += 1;
                continue;
            }
            report.failed += 1;

            if outcome.kind.is_hard_precondition() {
                let remaining = plan.len() - position - 1;
                if remaining > 0 {
                    report.skipped = remaining;
                    self.executor.stats().add(ACTIONS_SKIPPED, remaining as u64);
                    self.executor.errors().append(ErrorRecord::new(
                        member.identity.to_string(),
                        day,
                        "skip",
                        format!(
                            "Skipped: {} remaining actions after {} failed",
                            remaining, outcome.kind
                        ),
                    ));
                }
                break;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::config::PoolConfig;
    use crate::core::{Action, ActionKind};
    use crate::domain::{DomainApi, InMemoryDomain};
    use crate::simulation::error_log::ErrorLog;
    use crate::simulation::persona::{PersonaTag, EdgeCase};
    use crate::simulation::stats::Stats;
    use std::sync::Arc;

    async fn setup(persona: PersonaBehavior) -> (Arc<InMemoryDomain>, DaySimulator, CohortMember) {
        let domain = Arc::new(InMemoryDomain::new(PoolConfig::default()).unwrap());
        let identity = domain.create_user("day@sim.repstack.test").await.unwrap();
        let executor = ActionExecutor::new(
            domain.clone(),
            Arc::new(Stats::new()),
            Arc::new(ErrorLog::new()),
            None,
        );
        let member = CohortMember {
            index: 0,
            identity,
            email: "day@sim.repstack.test".into(),
            persona,
        };
        (domain, DaySimulator::new(executor, 42), member)
    }

    #[test]
    fn test_plan_seed_varies_by_member_and_day() {
        assert_ne!(plan_seed(1, 0, 1), plan_seed(1, 1, 1));
        assert_ne!(plan_seed(1, 0, 1), plan_seed(1, 0, 2));
        assert_eq!(plan_seed(9, 3, 4), plan_seed(9, 3, 4));
    }

    #[tokio::test]
    async fn test_independent_failures_do_not_stop_the_day() {
        // Day 4 for edge cases: three invalid, independent actions.
        let (_domain, sim, member) = setup(PersonaBehavior::EdgeCase(EdgeCase)).await;
        let report = sim.run(&member, 4).await;

        assert_eq!(report.planned, 3);
        assert_eq!(report.failed, 3);
        assert_eq!(report.skipped, 0);
        assert_eq!(sim.executor.errors().count(), 3);
    }

    #[tokio::test]
    async fn test_failed_workout_start_skips_rest_of_day() {
        let persona = PersonaBehavior::for_tag(PersonaTag::Marathon);
        let (domain, sim, member) = setup(persona).await;
        sim.run(&member, 1).await;

        domain.inject_fault(member.identity, 2, ActionKind::StartWorkout);
        let report = sim.run(&member, 2).await;

        let mut rng = StdRng::seed_from_u64(plan_seed(42, 0, 2));
        let plan = persona.actions_for_day(2, &mut rng);
        let start = plan.iter().position(|a| *a == Action::StartWorkout).unwrap();

        assert_eq!(report.skipped, plan.len() - start - 1);
        assert_eq!(report.succeeded, start);
        let skips: Vec<_> = sim
            .executor
            .errors()
            .snapshot()
            .into_iter()
            .filter(|r| r.action == "skip")
            .collect();
        assert_eq!(skips.len(), 1);
        assert_eq!(skips[0].day, 2);
        assert_eq!(sim.executor.stats().get(ACTIONS_SKIPPED), report.skipped as u64);
    }
}
