// ============================================================================
// repsim Library
// ============================================================================

pub mod core;
pub mod connection;
pub mod domain;
pub mod simulation;

// Re-export main types for convenience
pub use core::{DomainError, Result, SimError};
pub use domain::{DomainApi, InMemoryDomain};

// Re-export simulation API
pub use simulation::{
    CleanupReport, OwnershipTag, PersonaTag, RunConfig, RunMode, RunSummary, Runner,
    ValidationScope,
};
pub use connection::{
    config::PoolConfig,
    pool::{ConnectionPool, PoolStats},
};

use std::sync::Arc;

// ============================================================================
// High-level API
// ============================================================================

/// A simulation bound to its own in-memory fitness domain
///
/// This is the shortest path from a profile name to a report.
///
/// # Examples
///
/// ```no_run
/// use repsim::Simulation;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let simulation = Simulation::profile("smoke")?;
/// let summary = simulation.run().await?;
/// println!("{}", summary.report);
/// # Ok(())
/// # }
/// ```
pub struct Simulation {
    config: RunConfig,
    domain: Arc<InMemoryDomain>,
}

impl Simulation {
    /// Resolve a named profile against a fresh domain
    pub fn profile(name: &str) -> Result<Self> {
        Self::new(RunConfig::resolve(name)?)
    }

    pub fn new(config: RunConfig) -> Result<Self> {
        let domain = InMemoryDomain::new(PoolConfig::default())?;
        Ok(Self::with_domain(config, Arc::new(domain)))
    }

    /// Run against an existing domain, e.g. one loaded from a state file
    pub fn with_domain(config: RunConfig, domain: Arc<InMemoryDomain>) -> Self {
        Self { config, domain }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn domain(&self) -> &Arc<InMemoryDomain> {
        &self.domain
    }

    /// A runner for this simulation; each call starts a fresh run
    pub fn runner(&self) -> Result<Runner> {
        let domain: Arc<dyn DomainApi> = self.domain.clone();
        Runner::new(self.config.clone(), domain)
    }

    /// Full run: cohort, days, validation, report
    pub async fn run(&self) -> Result<RunSummary> {
        self.runner()?.run().await
    }

    /// Re-check data left by earlier runs, optionally only the run `run_id`
    pub async fn validate_only(&self, run_id: Option<&str>) -> Result<RunSummary> {
        let mut scope = ValidationScope::new(self.config.ownership.clone());
        if let Some(run_id) = run_id {
            scope = scope.run(run_id);
        }
        self.runner()?.validate_only(&scope).await
    }

    /// Remove every record owned by simulation accounts
    pub async fn cleanup(&self) -> Result<CleanupReport> {
        self.runner()?.cleanup().await
    }
}
