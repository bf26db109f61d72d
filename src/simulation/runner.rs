use super::config::{RunConfig, ValidationScope};
use super::day::{CohortMember, DaySimulator};
use super::error_log::{ErrorLog, ErrorLogPaths};
use super::executor::ActionExecutor;
use super::persona::{PersonaCatalog, PersonaTag};
use super::progress::Progress;
use super::report::{self, ReportHeader};
use super::stats::{DAYS_COMPLETED, Stats, USERS_CREATED};
use super::validators::{self, Validator};
use crate::core::{ErrorRecord, Result, SimError, UserId, ValidationResult};
use crate::domain::{DomainApi, RecordClass};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

/// Spare pool capacity kept above the worker count
pub const POOL_HEADROOM: usize = 5;

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Created,
    CohortBuilt,
    Simulating(u32),
    Validating,
    Reported,
    Cleaned,
}

impl RunPhase {
    fn permits(self, next: RunPhase, days: u32, rehydrated: bool) -> bool {
        use RunPhase::*;
        match (self, next) {
            (Created, CohortBuilt) => true,
            (CohortBuilt, Simulating(1)) => !rehydrated,
            (Simulating(d), Simulating(n)) => n == d + 1 && n <= days,
            (Simulating(d), Validating) => d == days,
            (CohortBuilt, Validating) => rehydrated,
            (Validating, Reported) => true,
            (Created | CohortBuilt | Reported | Cleaned, Cleaned) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Created => write!(f, "created"),
            RunPhase::CohortBuilt => write!(f, "cohort_built"),
            RunPhase::Simulating(day) => write!(f, "simulating(day={})", day),
            RunPhase::Validating => write!(f, "validating"),
            RunPhase::Reported => write!(f, "reported"),
            RunPhase::Cleaned => write!(f, "cleaned"),
        }
    }
}

/// Outcome of a teardown pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub users: usize,
    pub deleted: BTreeMap<RecordClass, usize>,
    /// (record class or "cache", error message)
    pub failures: Vec<(String, String)>,
    pub cache_cleared: usize,
}

impl CleanupReport {
    pub fn total_deleted(&self) -> usize {
        self.deleted.values().sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cleanup: {} simulation users", self.users)?;
        for (class, count) in &self.deleted {
            writeln!(f, "  {:<16} {:>8} deleted", class.as_str(), count)?;
        }
        writeln!(f, "  {:<16} {:>8} cleared", "cache", self.cache_cleared)?;
        for (class, message) in &self.failures {
            writeln!(f, "  {:<16} FAILED: {}", class, message)?;
        }
        Ok(())
    }
}

/// Everything a finished run hands back to its caller
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: String,
    pub stats: BTreeMap<String, u64>,
    pub error_count: usize,
    pub validations: Vec<ValidationResult>,
    pub elapsed: Duration,
    /// Day barriers released; equals the day count for a full run
    pub barriers: u32,
    pub error_logs: Option<ErrorLogPaths>,
    pub cleanup: Option<CleanupReport>,
}

impl RunSummary {
    pub fn all_passed(&self) -> bool {
        self.validations.iter().all(|v| v.pass)
    }
}

/// Drives one simulation from cohort creation to report
///
/// Phases advance strictly in order; each day is a barrier that every
/// cohort member clears before the next day starts.
pub struct Runner {
    config: RunConfig,
    domain: Arc<dyn DomainApi>,
    catalog: PersonaCatalog,
    stats: Arc<Stats>,
    errors: Arc<ErrorLog>,
    progress: Arc<Progress>,
    simulator: DaySimulator,
    validators: Vec<Box<dyn Validator>>,
    phase: RunPhase,
    cohort: Arc<Vec<CohortMember>>,
    /// Set once the cohort is rebuilt instead of created
    scope: Option<ValidationScope>,
    provisioned: bool,
    barriers: u32,
    started_at: DateTime<Utc>,
}

impl Runner {
    /// Fails on an invalid configuration, before touching the domain
    pub fn new(config: RunConfig, domain: Arc<dyn DomainApi>) -> Result<Self> {
        config.validate()?;

        let stats = Arc::new(Stats::new());
        let errors = Arc::new(ErrorLog::new());
        let executor = ActionExecutor::new(
            Arc::clone(&domain),
            Arc::clone(&stats),
            Arc::clone(&errors),
            config.action_timeout,
        );
        let simulator = DaySimulator::new(executor, config.seed);

        Ok(Self {
            config,
            domain,
            catalog: PersonaCatalog,
            stats,
            errors,
            progress: Arc::new(Progress::stdout()),
            simulator,
            validators: validators::default_validators(),
            phase: RunPhase::Created,
            cohort: Arc::new(Vec::new()),
            scope: None,
            provisioned: false,
            barriers: 0,
            started_at: Utc::now(),
        })
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    pub fn with_validators(mut self, validators: Vec<Box<dyn Validator>>) -> Self {
        self.validators = validators;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn cohort(&self) -> &[CohortMember] {
        &self.cohort
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn errors(&self) -> &Arc<ErrorLog> {
        &self.errors
    }

    pub fn progress(&self) -> &Arc<Progress> {
        &self.progress
    }

    pub fn barriers(&self) -> u32 {
        self.barriers
    }

    fn advance(&mut self, next: RunPhase) -> Result<()> {
        if !self.phase.permits(next, self.config.days, self.scope.is_some()) {
            return Err(SimError::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        info!(run = %self.config.run_id, from = %self.phase, to = %next, "phase transition");
        self.phase = next;
        Ok(())
    }

    /// Check the domain is reachable and its pool can carry every worker.
    ///
    /// Runs at most once per runner; a second call is a no-op.
    pub async fn provision(&mut self) -> Result<()> {
        if self.provisioned {
            return Ok(());
        }
        self.domain
            .ping()
            .await
            .map_err(|e| SimError::DomainUnavailable(e.to_string()))?;

        if self.config.is_parallel() {
            let needed = self.config.workers + POOL_HEADROOM;
            let capacity = self.domain.pool_capacity();
            if capacity < needed {
                let resized = self
                    .domain
                    .resize_pool(needed)
                    .await
                    .map_err(|e| SimError::Provisioning(e.to_string()))?;
                warn!(from = capacity, to = resized, workers = self.config.workers, "raised domain pool capacity");
            }
        }
        self.provisioned = true;
        Ok(())
    }

    /// Create one domain account per planned member.
    ///
    /// Every persona is instantiated before the first account is created, so
    /// a bad persona leaves no partial cohort behind. A failed account is
    /// recorded and left out of the cohort.
    pub async fn build_cohort(&mut self) -> Result<()> {
        if self.phase != RunPhase::Created {
            return Err(SimError::InvalidTransition {
                from: self.phase.to_string(),
                to: RunPhase::CohortBuilt.to_string(),
            });
        }

        let mut planned = Vec::with_capacity(self.config.total_users);
        for (tag, count) in self.config.persona_counts() {
            let persona = self.catalog.instantiate(tag.as_str())?;
            planned.extend(std::iter::repeat_n(persona, count));
        }

        let mut cohort = Vec::with_capacity(planned.len());
        for (index, persona) in planned.into_iter().enumerate() {
            let email = self
                .config
                .ownership
                .email_for(persona.tag(), index, &self.config.run_id);
            match self.domain.create_user(&email).await {
                Ok(identity) => {
                    self.stats.increment(USERS_CREATED);
                    cohort.push(CohortMember {
                        index,
                        identity,
                        email,
                        persona,
                    });
                }
                Err(e) => {
                    warn!(%email, error = %e, "user creation failed");
                    self.errors
                        .append(ErrorRecord::new(email, 0, "create_user", e.to_string()));
                }
            }
        }

        info!(users = cohort.len(), planned = self.config.total_users, "cohort built");
        self.cohort = Arc::new(cohort);
        self.advance(RunPhase::CohortBuilt)
    }

    /// Run every member through `day` and wait for all of them
    pub async fn simulate_day(&mut self, day: u32) -> Result<()> {
        self.advance(RunPhase::Simulating(day))?;
        self.progress
            .start_day(day, self.config.days, self.cohort.len());

        if self.config.is_parallel() {
            self.run_parallel(day).await?;
        } else {
            self.run_sequential(day).await;
        }

        self.stats.increment(DAYS_COMPLETED);
        self.barriers += 1;
        info!(day, errors = self.errors.count(), "day barrier released");
        Ok(())
    }

    async fn run_sequential(&self, day: u32) {
        for member in self.cohort.iter() {
            let report = self.simulator.run(member, day).await;
            self.progress.user_done(&report);
        }
    }

    /// Fixed pool of workers draining one queue entry per member
    async fn run_parallel(&self, day: u32) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        for index in 0..self.cohort.len() {
            tx.send(index)
                .map_err(|e| SimError::Worker(format!("queue closed: {}", e)))?;
        }
        drop(tx);
        let queue = Arc::new(Mutex::new(rx));

        let mut handles = Vec::with_capacity(self.config.workers);
        for _ in 0..self.config.workers {
            let queue = Arc::clone(&queue);
            let cohort = Arc::clone(&self.cohort);
            let simulator = self.simulator.clone();
            let progress = Arc::clone(&self.progress);

            handles.push(tokio::spawn(async move {
                loop {
                    let next = queue.lock().await.recv().await;
                    let Some(index) = next else { break };
                    let report = simulator.run(&cohort[index], day).await;
                    progress.user_done(&report);
                }
            }));
        }

        // Join every worker before surfacing a failure so the barrier holds.
        let mut failure = None;
        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                failure.get_or_insert_with(|| SimError::Worker(e.to_string()));
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run every validator over one snapshot of the cohort's records
    pub async fn validate(&mut self) -> Result<Vec<ValidationResult>> {
        self.advance(RunPhase::Validating)?;
        let identities: Vec<UserId> = self.cohort.iter().map(|m| m.identity).collect();
        let snapshot = self.domain.snapshot(&identities).await?;

        let results = validators::run_all(&self.validators, &snapshot);
        for result in &results {
            if result.pass {
                info!(validator = result.name, summary = %result.summary, "validator passed");
            } else {
                warn!(validator = result.name, summary = %result.summary, "validator failed");
            }
        }
        Ok(results)
    }

    /// Render and print the report, then persist both error logs
    pub fn report(
        &mut self,
        validations: &[ValidationResult],
        elapsed: Duration,
    ) -> Result<(String, Option<ErrorLogPaths>)> {
        self.advance(RunPhase::Reported)?;
        let header = match &self.scope {
            Some(scope) => ReportHeader::ValidateOnly {
                scope,
                personas: self.persona_mix(),
            },
            None => ReportHeader::Run(&self.config),
        };
        let text = report::render(
            &header,
            &self.stats.snapshot(),
            self.errors.count(),
            validations,
            elapsed,
        );
        self.progress.message(text.clone());

        let paths = match self
            .errors
            .persist(&self.config.log_dir, header.log_label(), self.started_at)
        {
            Ok(paths) => {
                info!(summary = %paths.summary.display(), detail = %paths.detail.display(), "error logs written");
                Some(paths)
            }
            Err(e) => {
                warn!(dir = %self.config.log_dir.display(), error = %e, "could not write error logs");
                None
            }
        };
        Ok((text, paths))
    }

    fn persona_mix(&self) -> BTreeMap<PersonaTag, usize> {
        let mut mix = BTreeMap::new();
        for member in self.cohort.iter() {
            *mix.entry(member.persona.tag()).or_insert(0) += 1;
        }
        mix
    }

    /// Full run: provision, build the cohort, simulate every day, validate, report
    pub async fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        info!(
            profile = %self.config.mode,
            users = self.config.total_users,
            days = self.config.days,
            workers = self.config.workers,
            run = %self.config.run_id,
            "starting simulation"
        );

        self.provision().await?;
        self.build_cohort().await?;
        for day in 1..=self.config.days {
            self.simulate_day(day).await?;
        }
        let validations = self.validate().await?;
        let elapsed = started.elapsed();
        let (report, error_logs) = self.report(&validations, elapsed)?;

        let cleanup = if self.config.cleanup_after {
            Some(self.cleanup().await?)
        } else {
            None
        };

        Ok(RunSummary {
            report,
            stats: self.stats.snapshot(),
            error_count: self.errors.count(),
            validations,
            elapsed,
            barriers: self.barriers,
            error_logs,
            cleanup,
        })
    }

    /// Validate data left behind by earlier runs without simulating
    ///
    /// The cohort is rebuilt from persisted accounts under `scope`; accounts
    /// whose persona cannot be recovered from the email are left out. The
    /// report describes that cohort, not this runner's profile.
    pub async fn validate_only(&mut self, scope: &ValidationScope) -> Result<RunSummary> {
        let started = Instant::now();
        if self.phase != RunPhase::Created {
            return Err(SimError::InvalidTransition {
                from: self.phase.to_string(),
                to: RunPhase::CohortBuilt.to_string(),
            });
        }
        self.domain
            .ping()
            .await
            .map_err(|e| SimError::DomainUnavailable(e.to_string()))?;

        let users = self
            .domain
            .find_users(scope.ownership.email_domain())
            .await
            .map_err(|e| SimError::DomainUnavailable(e.to_string()))?;

        let mut cohort = Vec::with_capacity(users.len());
        for user in users.into_iter().filter(|u| scope.includes(&u.email)) {
            let Some(tag) = scope.ownership.persona_from_email(&user.email) else {
                warn!(email = %user.email, "cannot recover persona, skipping");
                continue;
            };
            let persona = self.catalog.instantiate(tag.as_str())?;
            cohort.push(CohortMember {
                index: cohort.len(),
                identity: user.id,
                email: user.email,
                persona,
            });
        }
        info!(users = cohort.len(), %scope, "cohort rehydrated");

        self.cohort = Arc::new(cohort);
        self.scope = Some(scope.clone());
        self.advance(RunPhase::CohortBuilt)?;

        let validations = self.validate().await?;
        let elapsed = started.elapsed();
        let (report, error_logs) = self.report(&validations, elapsed)?;

        Ok(RunSummary {
            report,
            stats: self.stats.snapshot(),
            error_count: self.errors.count(),
            validations,
            elapsed,
            barriers: self.barriers,
            error_logs,
            cleanup: None,
        })
    }

    /// Delete every record owned by simulation accounts, children first,
    /// then clear their cache entries.
    ///
    /// Best effort: a failing class is reported and the pass continues.
    /// Safe to repeat; a second pass deletes nothing.
    pub async fn cleanup(&mut self) -> Result<CleanupReport> {
        if !self.phase.permits(RunPhase::Cleaned, self.config.days, self.scope.is_some()) {
            return Err(SimError::InvalidTransition {
                from: self.phase.to_string(),
                to: RunPhase::Cleaned.to_string(),
            });
        }

        let ownership = &self.config.ownership;
        let identities: Vec<UserId> = self
            .domain
            .find_users(ownership.email_domain())
            .await
            .map_err(|e| SimError::DomainUnavailable(e.to_string()))?
            .into_iter()
            .filter(|u| ownership.owns_email(&u.email))
            .map(|u| u.id)
            .collect();

        let mut report = CleanupReport {
            users: identities.len(),
            ..CleanupReport::default()
        };

        for class in RecordClass::CLEANUP_ORDER {
            match self.domain.delete_records(class, &identities).await {
                Ok(count) => {
                    info!(class = class.as_str(), count, "cleanup deleted records");
                    report.deleted.insert(class, count);
                }
                Err(e) => {
                    warn!(class = class.as_str(), error = %e, "cleanup failed for record class");
                    report.failures.push((class.as_str().to_string(), e.to_string()));
                }
            }
        }

        match self.domain.clear_cache(&identities).await {
            Ok(cleared) => report.cache_cleared = cleared,
            Err(e) => {
                warn!(error = %e, "cache cleanup failed");
                report.failures.push(("cache".to_string(), e.to_string()));
            }
        }

        self.advance(RunPhase::Cleaned)?;
        Ok(report)
    }
}
