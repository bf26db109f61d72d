use super::cache::{RateKey, RateLimitCache};
use super::store::{DomainSnapshot, FitnessStore, RecordClass, UserRecord};
use super::DomainApi;
use crate::connection::config::PoolConfig;
use crate::connection::pool::{ConnectionPool, PoolStats};
use crate::core::{AbuseProbe, Action, ActionKind, DomainError, DomainResult, UserId};
use async_trait::async_trait;
use std::collections::HashSet;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Routine generations admitted per user per day
pub const ROUTINE_DAILY_LIMIT: u32 = 3;

const CACHE_CAPACITY: usize = 65_536;
const ROUTINE_BUCKET: &str = "routine_generation";
const OVERSIZED_SET_COUNT: u32 = 10_000;

/// Self-contained fitness domain: store, pool, and rate-limit cache
pub struct InMemoryDomain {
    store: Arc<RwLock<FitnessStore>>,
    pool: ConnectionPool,
    cache: Mutex<RateLimitCache>,
    faults: Mutex<HashSet<(UserId, u32, ActionKind)>>,
}

impl InMemoryDomain {
    pub fn new(config: PoolConfig) -> DomainResult<Self> {
        Self::with_store(config, FitnessStore::default())
    }

    pub fn with_store(config: PoolConfig, store: FitnessStore) -> DomainResult<Self> {
        let store = Arc::new(RwLock::new(store));
        let pool = ConnectionPool::new(config, Arc::clone(&store))?;
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            store,
            pool,
            cache: Mutex::new(RateLimitCache::new(capacity)),
            faults: Mutex::new(HashSet::new()),
        })
    }

    /// Open a domain from a JSON state file, or start empty if it does not exist
    pub fn load(config: PoolConfig, path: &Path) -> DomainResult<Self> {
        if !path.exists() {
            return Self::new(config);
        }
        let data = std::fs::read(path)?;
        let store: FitnessStore = serde_json::from_slice(&data)?;
        info!(path = %path.display(), users = store.user_count(), "loaded domain state");
        Self::with_store(config, store)
    }

    /// Atomically write the store to `path`
    pub async fn save(&self, path: &Path) -> DomainResult<()> {
        let data = {
            let store = self.store.read().await;
            serde_json::to_vec(&*store)?
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(&data)?;
        temp.persist(path).map_err(|e| DomainError::Io(e.to_string()))?;
        Ok(())
    }

    /// Make the next matching call fail once with [`DomainError::Injected`]
    pub fn inject_fault(&self, user: UserId, day: u32, kind: ActionKind) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert((user, day, kind));
        }
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or_default()
    }

    fn take_fault(&self, user: UserId, day: u32, kind: ActionKind) -> DomainResult<()> {
        let mut faults = self.faults.lock()?;
        if faults.remove(&(user, day, kind)) {
            return Err(DomainError::Injected(format!("{} on day {}", kind, day)));
        }
        Ok(())
    }

    fn generate_routine(
        &self,
        store: &mut FitnessStore,
        user: UserId,
        day: u32,
        goal: Option<&str>,
    ) -> DomainResult<()> {
        let key = RateKey {
            user,
            day,
            bucket: ROUTINE_BUCKET,
        };
        // Store lock is held, so the count check and the insert are atomic per user.
        let mut cache = self.cache.lock()?;
        if cache.count(&key) >= ROUTINE_DAILY_LIMIT {
            return Err(DomainError::RateLimited(format!(
                "{} reached {} routine generations on day {}",
                user, ROUTINE_DAILY_LIMIT, day
            )));
        }
        store.insert_routine(user, day, goal)?;
        cache.try_acquire(key, ROUTINE_DAILY_LIMIT);
        Ok(())
    }

    fn probe(&self, store: &mut FitnessStore, user: UserId, day: u32, probe: AbuseProbe) -> DomainResult<()> {
        match probe {
            AbuseProbe::OversizedSets => {
                store.log_sets(user, day, "squat", OVERSIZED_SET_COUNT, 10, 60.0)
            }
            AbuseProbe::NegativeWeight => store.log_sets(user, day, "bench_press", 1, 10, -50.0),
            AbuseProbe::ForeignSession => store.complete_session_by_id(user, day, u64::MAX),
            AbuseProbe::RoutineBurst => {
                let goal = "x".repeat(10_000);
                self.generate_routine(store, user, day, Some(&goal))
            }
        }
    }
}

#[async_trait]
impl DomainApi for InMemoryDomain {
    async fn ping(&self) -> DomainResult<()> {
        let guard = self.pool.get_connection().await?;
        let _ = guard.connection().read().await;
        Ok(())
    }

    async fn create_user(&self, email: &str) -> DomainResult<UserId> {
        let guard = self.pool.get_connection().await?;
        let mut store = guard.connection().write().await;
        store.create_user(email)
    }

    async fn perform(&self, user: UserId, day: u32, action: &Action) -> DomainResult<()> {
        self.take_fault(user, day, action.kind())?;

        let guard = self.pool.get_connection().await?;
        let mut store = guard.connection().write().await;
        debug!(%user, day, action = %action.kind(), "perform");

        match action {
            Action::Onboarding { level, goal } => store.onboard(user, day, *level, goal),
            Action::ConditionCheck { text, energy } => store.check_condition(user, day, text, *energy),
            Action::GenerateRoutine { goal } => {
                self.generate_routine(&mut store, user, day, goal.as_deref())
            }
            Action::StartWorkout => store.start_session(user, day).map(|_| ()),
            Action::LogSets {
                exercise,
                sets,
                reps,
                weight_kg,
            } => store.log_sets(user, day, exercise, *sets, *reps, *weight_kg),
            Action::CompleteWorkout => store.complete_session(user, day).map(|_| ()),
            Action::SubmitFeedback { rating, text } => store.submit_feedback(user, day, *rating, text),
            Action::ReplaceExercise { exercise } => store.replace_exercise(user, day, exercise),
            Action::AddExercise { exercise } => store.add_exercise(user, day, exercise),
            Action::DeleteExercise { exercise } => store.delete_exercise(user, day, exercise),
            Action::ReviewHistory { days } => store.review_history(user, day, *days).map(|_| ()),
            Action::AbuseProbe { probe } => self.probe(&mut store, user, day, *probe),
            Action::WeekAdvance { passed } => store.advance_week(user, day, *passed).map(|_| ()),
        }
    }

    async fn find_users(&self, email_domain: &str) -> DomainResult<Vec<UserRecord>> {
        let suffix = format!("@{}", email_domain);
        let guard = self.pool.get_connection().await?;
        let store = guard.connection().read().await;
        Ok(store.users_where(|u| u.email.ends_with(&suffix)))
    }

    async fn snapshot(&self, users: &[UserId]) -> DomainResult<DomainSnapshot> {
        let guard = self.pool.get_connection().await?;
        let store = guard.connection().read().await;
        Ok(store.snapshot(users))
    }

    async fn delete_records(&self, class: RecordClass, users: &[UserId]) -> DomainResult<usize> {
        let guard = self.pool.get_connection().await?;
        let mut store = guard.connection().write().await;
        store.delete(class, users)
    }

    async fn clear_cache(&self, users: &[UserId]) -> DomainResult<usize> {
        let mut cache = self.cache.lock()?;
        Ok(cache.clear_users(users))
    }

    fn pool_capacity(&self) -> usize {
        self.pool.capacity()
    }

    async fn resize_pool(&self, max: usize) -> DomainResult<usize> {
        self.pool.resize(max)
    }
}
