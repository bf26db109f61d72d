use repsim::core::{AbuseProbe, Action, DomainError, UserId};
use repsim::domain::store::{LevelChangeReason, SessionStatus};
use repsim::domain::{DomainApi, InMemoryDomain};
use repsim::simulation::validators::{ConcurrencyValidator, Validator};
use repsim::PoolConfig;
use std::sync::Arc;
use std::time::Duration;

async fn onboarded(domain: &InMemoryDomain, email: &str, level: u8) -> UserId {
    let user = domain.create_user(email).await.unwrap();
    domain
        .perform(
            user,
            1,
            &Action::Onboarding {
                level,
                goal: "strength".into(),
            },
        )
        .await
        .unwrap();
    user
}

fn log_sets(sets: u32) -> Action {
    Action::LogSets {
        exercise: "squat".into(),
        sets,
        reps: 5,
        weight_kg: 80.0,
    }
}

#[tokio::test]
async fn test_workout_lifecycle() {
    let domain = InMemoryDomain::new(PoolConfig::default()).unwrap();
    let user = onboarded(&domain, "life@sim.repstack.test", 4).await;

    domain.perform(user, 2, &Action::StartWorkout).await.unwrap();
    assert!(matches!(
        domain.perform(user, 2, &Action::CompleteWorkout).await,
        Err(DomainError::Validation(_))
    ));
    domain.perform(user, 2, &log_sets(3)).await.unwrap();
    domain.perform(user, 2, &Action::CompleteWorkout).await.unwrap();

    let feedback = Action::SubmitFeedback {
        rating: 4,
        text: "solid".into(),
    };
    domain.perform(user, 2, &feedback).await.unwrap();
    assert!(matches!(
        domain.perform(user, 2, &feedback).await,
        Err(DomainError::Conflict(_))
    ));

    let snapshot = domain.snapshot(&[user]).await.unwrap();
    assert_eq!(snapshot.sessions.len(), 1);
    assert_eq!(snapshot.sessions[0].status, SessionStatus::Completed);
    assert_eq!(snapshot.sessions[0].total_sets, 3);
    assert_eq!(snapshot.sets.len(), 3);
    assert_eq!(snapshot.feedbacks.len(), 1);
}

#[tokio::test]
async fn test_stale_session_is_abandoned_on_next_start() {
    let domain = InMemoryDomain::new(PoolConfig::default()).unwrap();
    let user = onboarded(&domain, "stale@sim.repstack.test", 2).await;

    domain.perform(user, 2, &Action::StartWorkout).await.unwrap();
    domain.perform(user, 2, &log_sets(1)).await.unwrap();
    domain.perform(user, 4, &Action::StartWorkout).await.unwrap();

    let snapshot = domain.snapshot(&[user]).await.unwrap();
    let statuses: Vec<_> = snapshot.sessions.iter().map(|s| (s.day, s.status, s.closed_day)).collect();
    assert_eq!(
        statuses,
        vec![
            (2, SessionStatus::Abandoned, Some(4)),
            (4, SessionStatus::Active, None),
        ]
    );
}

#[tokio::test]
async fn test_level_changes_are_bounded_and_recorded() {
    let domain = InMemoryDomain::new(PoolConfig::default()).unwrap();
    let top = onboarded(&domain, "top@sim.repstack.test", 10).await;
    let bottom = onboarded(&domain, "bottom@sim.repstack.test", 1).await;

    domain.perform(top, 8, &Action::WeekAdvance { passed: true }).await.unwrap();
    domain.perform(top, 15, &Action::WeekAdvance { passed: false }).await.unwrap();
    domain.perform(bottom, 8, &Action::WeekAdvance { passed: false }).await.unwrap();

    let snapshot = domain.snapshot(&[top, bottom]).await.unwrap();
    let level = |user: UserId| snapshot.users.iter().find(|u| u.id == user).unwrap().level;
    assert_eq!(level(top), 9);
    assert_eq!(level(bottom), 1);

    let top_events: Vec<_> = snapshot
        .level_events
        .iter()
        .filter(|e| e.user == top)
        .map(|e| (e.from, e.to, e.reason))
        .collect();
    assert_eq!(
        top_events,
        vec![
            (1, 10, LevelChangeReason::Onboarding),
            (10, 10, LevelChangeReason::TestPassed),
            (10, 9, LevelChangeReason::TestFailed),
        ]
    );
}

#[tokio::test]
async fn test_actions_require_onboarding() {
    let domain = InMemoryDomain::new(PoolConfig::default()).unwrap();
    let user = domain.create_user("fresh@sim.repstack.test").await.unwrap();

    for action in [
        Action::StartWorkout,
        Action::GenerateRoutine { goal: None },
        Action::WeekAdvance { passed: true },
        Action::ReviewHistory { days: 7 },
    ] {
        assert!(matches!(
            domain.perform(user, 1, &action).await,
            Err(DomainError::Precondition(_))
        ));
    }
}

#[tokio::test]
async fn test_abuse_probes_leave_no_trace() {
    let domain = InMemoryDomain::new(PoolConfig::default()).unwrap();
    let user = onboarded(&domain, "probe@sim.repstack.test", 3).await;
    domain.perform(user, 2, &Action::StartWorkout).await.unwrap();

    for probe in AbuseProbe::ALL {
        assert!(domain.perform(user, 2, &Action::AbuseProbe { probe }).await.is_err());
    }

    let snapshot = domain.snapshot(&[user]).await.unwrap();
    assert!(snapshot.sets.is_empty());
    assert!(snapshot.routines.is_empty());
    assert_eq!(snapshot.sessions[0].status, SessionStatus::Active);
}

#[tokio::test]
async fn test_malformed_and_duplicate_emails_rejected() {
    let domain = InMemoryDomain::new(PoolConfig::default()).unwrap();
    assert!(matches!(
        domain.create_user("not-an-email").await,
        Err(DomainError::Validation(_))
    ));
    domain.create_user("once@sim.repstack.test").await.unwrap();
    assert!(matches!(
        domain.create_user("once@sim.repstack.test").await,
        Err(DomainError::Conflict(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_admit_one_session() {
    let domain = Arc::new(InMemoryDomain::new(PoolConfig::default().max_connections(8)).unwrap());
    let user = onboarded(&domain, "race@sim.repstack.test", 5).await;

    let mut handles = vec![];
    for _ in 0..16 {
        let domain = Arc::clone(&domain);
        handles.push(tokio::spawn(async move {
            domain.perform(user, 2, &Action::StartWorkout).await
        }));
    }

    let mut started = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => started += 1,
            Err(e) => assert!(matches!(e, DomainError::Conflict(_)), "{}", e),
        }
    }
    assert_eq!(started, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_set_logging_loses_no_updates() {
    let domain = Arc::new(InMemoryDomain::new(PoolConfig::default().max_connections(8)).unwrap());
    let user = onboarded(&domain, "sets@sim.repstack.test", 5).await;
    domain.perform(user, 2, &Action::StartWorkout).await.unwrap();

    let mut handles = vec![];
    for _ in 0..8 {
        let domain = Arc::clone(&domain);
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                domain.perform(user, 2, &log_sets(2)).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let snapshot = domain.snapshot(&[user]).await.unwrap();
    assert_eq!(snapshot.sessions[0].total_sets, 160);
    assert_eq!(snapshot.sets.len(), 160);
    assert!(ConcurrencyValidator.validate(&snapshot).pass);
}

#[tokio::test]
async fn test_pool_exhaustion_times_out() {
    let config = PoolConfig::default()
        .max_connections(1)
        .connect_timeout(Duration::from_millis(50))
        .latency(Duration::from_millis(300));
    let domain = Arc::new(InMemoryDomain::new(config).unwrap());

    let holder = {
        let domain = Arc::clone(&domain);
        tokio::spawn(async move { domain.ping().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(matches!(domain.ping().await, Err(DomainError::PoolTimeout(_))));
    holder.await.unwrap().unwrap();
    assert!(domain.ping().await.is_ok());
}

#[tokio::test]
async fn test_state_survives_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("domain.json");

    let domain = InMemoryDomain::new(PoolConfig::default()).unwrap();
    let user = onboarded(&domain, "kept@sim.repstack.test", 6).await;
    domain.perform(user, 2, &Action::GenerateRoutine { goal: None }).await.unwrap();
    domain.save(&path).await.unwrap();

    let restored = InMemoryDomain::load(PoolConfig::default(), &path).unwrap();
    let users = restored.find_users("sim.repstack.test").await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].level, 6);

    let snapshot = restored.snapshot(&[user]).await.unwrap();
    assert_eq!(snapshot.routines.len(), 1);
    assert_eq!(snapshot.level_events.len(), 1);

    let missing = InMemoryDomain::load(PoolConfig::default(), &dir.path().join("nope.json")).unwrap();
    assert!(missing.find_users("sim.repstack.test").await.unwrap().is_empty());
}
