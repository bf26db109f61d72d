use super::persona::PersonaTag;
use crate::core::{Result, SimError};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default population mix, in percent
pub const PERSONA_DISTRIBUTION: [(PersonaTag, usize); 5] = [
    (PersonaTag::Normal, 60),
    (PersonaTag::Power, 10),
    (PersonaTag::Lazy, 10),
    (PersonaTag::Abuser, 10),
    (PersonaTag::EdgeCase, 10),
];

pub const DEFAULT_LOG_DIR: &str = "log/simulation";
pub const DEFAULT_SEED: u64 = 42;

/// Named run profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunMode {
    Smoke,
    Standard,
    Full,
    Stress,
    Marathon,
    Agent,
}

impl RunMode {
    pub const ALL: [RunMode; 6] = [
        RunMode::Smoke,
        RunMode::Standard,
        RunMode::Full,
        RunMode::Stress,
        RunMode::Marathon,
        RunMode::Agent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Smoke => "smoke",
            Self::Standard => "standard",
            Self::Full => "full",
            Self::Stress => "stress",
            Self::Marathon => "marathon",
            Self::Agent => "agent",
        }
    }

    /// (users, days, workers, persona override)
    fn profile(&self) -> (usize, u32, usize, Option<PersonaTag>) {
        match self {
            Self::Smoke => (10, 2, 1, None),
            Self::Standard => (100, 7, 4, None),
            Self::Full => (500, 30, 10, None),
            Self::Stress => (1000, 14, 20, None),
            Self::Marathon => (20, 90, 2, Some(PersonaTag::Marathon)),
            Self::Agent => (10, 28, 1, Some(PersonaTag::AgentTest)),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        RunMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| SimError::UnknownProfile(s.to_string()))
    }
}

/// Marks the accounts a simulation owns
///
/// Every simulated user gets an email under a reserved domain; validation and
/// cleanup find their data through it and nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipTag {
    email_domain: String,
}

impl OwnershipTag {
    pub const DEFAULT_DOMAIN: &'static str = "sim.repstack.test";

    pub fn new(email_domain: &str) -> Self {
        Self {
            email_domain: email_domain.trim_start_matches('@').to_ascii_lowercase(),
        }
    }

    pub fn email_domain(&self) -> &str {
        &self.email_domain
    }

    /// `sim-<persona>-<index>-<run>@<domain>`
    pub fn email_for(&self, persona: PersonaTag, index: usize, run_id: &str) -> String {
        format!(
            "sim-{}-{:04}-{}@{}",
            persona.as_str(),
            index,
            run_id,
            self.email_domain
        )
    }

    pub fn owns_email(&self, email: &str) -> bool {
        email
            .rsplit_once('@')
            .is_some_and(|(local, domain)| {
                local.starts_with("sim-") && domain.eq_ignore_ascii_case(&self.email_domain)
            })
    }

    pub fn belongs_to_run(&self, email: &str, run_id: &str) -> bool {
        self.owns_email(email)
            && email
                .rsplit_once('@')
                .is_some_and(|(local, _)| local.ends_with(&format!("-{}", run_id)))
    }

    /// Recover the persona encoded in an owned email
    pub fn persona_from_email(&self, email: &str) -> Option<PersonaTag> {
        if !self.owns_email(email) {
            return None;
        }
        let (local, _) = email.rsplit_once('@')?;
        let persona = local.strip_prefix("sim-")?.split('-').next()?;
        persona.parse().ok()
    }
}

impl Default for OwnershipTag {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DOMAIN)
    }
}

/// Which leftover accounts a validate-only pass rebuilds its cohort from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationScope {
    pub ownership: OwnershipTag,
    /// Narrow to one earlier run; `None` takes every owned account
    pub run_id: Option<String>,
}

impl ValidationScope {
    pub fn new(ownership: OwnershipTag) -> Self {
        Self {
            ownership,
            run_id: None,
        }
    }

    pub fn run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn includes(&self, email: &str) -> bool {
        match &self.run_id {
            Some(run_id) => self.ownership.belongs_to_run(email, run_id),
            None => self.ownership.owns_email(email),
        }
    }
}

impl From<OwnershipTag> for ValidationScope {
    fn from(ownership: OwnershipTag) -> Self {
        Self::new(ownership)
    }
}

impl fmt::Display for ValidationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope {}", self.ownership.email_domain())?;
        if let Some(run_id) = &self.run_id {
            write!(f, " run {}", run_id)?;
        }
        Ok(())
    }
}

/// Immutable description of one simulation run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: RunMode,
    pub total_users: usize,
    pub days: u32,
    pub workers: usize,
    pub persona_override: Option<PersonaTag>,
    pub seed: u64,
    /// Deadline for a single domain call; `None` defers to the domain's own timeouts
    pub action_timeout: Option<Duration>,
    pub log_dir: PathBuf,
    pub cleanup_after: bool,
    pub ownership: OwnershipTag,
    pub run_id: String,
}

impl RunConfig {
    /// Resolve a named profile
    pub fn resolve(mode: &str) -> Result<Self> {
        let mode: RunMode = mode.parse()?;
        let (total_users, days, workers, persona_override) = mode.profile();
        Ok(Self {
            mode,
            total_users,
            days,
            workers,
            persona_override,
            seed: DEFAULT_SEED,
            action_timeout: None,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            cleanup_after: false,
            ownership: OwnershipTag::default(),
            run_id: new_run_id(),
        })
    }

    pub fn users(mut self, users: usize) -> Self {
        self.total_users = users;
        self
    }

    pub fn days(mut self, days: u32) -> Self {
        self.days = days;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn persona(mut self, persona: PersonaTag) -> Self {
        self.persona_override = Some(persona);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = Some(timeout);
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn cleanup_after(mut self, cleanup: bool) -> Self {
        self.cleanup_after = cleanup;
        self
    }

    pub fn ownership(mut self, tag: OwnershipTag) -> Self {
        self.ownership = tag;
        self
    }

    /// Apply `SIM_*` environment overrides
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SIM_USERS") {
            self.total_users = parse_var("SIM_USERS", &value)?;
        }
        if let Some(value) = lookup("SIM_DAYS") {
            self.days = parse_var("SIM_DAYS", &value)?;
        }
        if let Some(value) = lookup("SIM_WORKERS") {
            self.workers = parse_var("SIM_WORKERS", &value)?;
        }
        if let Some(value) = lookup("SIM_PERSONA") {
            self.persona_override = Some(value.parse()?);
        }
        if let Some(value) = lookup("SIM_SEED") {
            self.seed = parse_var("SIM_SEED", &value)?;
        }
        if let Some(value) = lookup("SIM_LOG_DIR") {
            self.log_dir = PathBuf::from(value);
        }
        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.total_users == 0 {
            return Err(SimError::InvalidConfig("users must be > 0".into()));
        }
        if self.days == 0 {
            return Err(SimError::InvalidConfig("days must be > 0".into()));
        }
        if self.workers == 0 {
            return Err(SimError::InvalidConfig("workers must be > 0".into()));
        }
        if self.action_timeout.is_some_and(|t| t.is_zero()) {
            return Err(SimError::InvalidConfig("action timeout must be > 0".into()));
        }
        Ok(())
    }

    pub fn is_parallel(&self) -> bool {
        self.workers > 1
    }

    /// Users per persona.
    ///
    /// Buckets are apportioned by largest remainder, so the counts always sum
    /// to `total_users` exactly. Empty buckets are omitted.
    pub fn persona_counts(&self) -> BTreeMap<PersonaTag, usize> {
        if let Some(persona) = self.persona_override {
            return BTreeMap::from([(persona, self.total_users)]);
        }

        let total = self.total_users;
        let mut counts: Vec<(PersonaTag, usize, usize)> = PERSONA_DISTRIBUTION
            .iter()
            .map(|(tag, pct)| (*tag, total * pct / 100, total * pct % 100))
            .collect();

        let assigned: usize = counts.iter().map(|(_, n, _)| n).sum();
        let mut order: Vec<usize> = (0..counts.len()).collect();
        // Stable sort keeps distribution order among equal remainders.
        order.sort_by(|a, b| counts[*b].2.cmp(&counts[*a].2));
        for idx in order.into_iter().cycle().take(total - assigned) {
            counts[idx].1 += 1;
        }

        counts
            .into_iter()
            .filter(|(_, n, _)| *n > 0)
            .map(|(tag, n, _)| (tag, n))
            .collect()
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SimError::InvalidConfig(format!("{} has invalid value '{}'", key, value)))
}

fn new_run_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_resolve_profiles() {
        let smoke = RunConfig::resolve("smoke").unwrap();
        assert_eq!((smoke.total_users, smoke.days, smoke.workers), (10, 2, 1));
        assert!(!smoke.is_parallel());

        let agent = RunConfig::resolve("Agent").unwrap();
        assert_eq!(agent.persona_override, Some(PersonaTag::AgentTest));
        assert_eq!((agent.total_users, agent.days), (10, 28));

        assert!(matches!(
            RunConfig::resolve("turbo"),
            Err(SimError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_persona_counts_sum_for_every_profile_and_size() {
        for mode in RunMode::ALL {
            for users in 1..=257 {
                let config = RunConfig::resolve(mode.as_str()).unwrap().users(users);
                let total: usize = config.persona_counts().values().sum();
                assert_eq!(total, users, "{} with {} users", mode, users);
            }
        }
    }

    #[test]
    fn test_persona_counts_distribution() {
        let config = RunConfig::resolve("standard").unwrap();
        let counts = config.persona_counts();
        assert_eq!(counts[&PersonaTag::Normal], 60);
        assert_eq!(counts[&PersonaTag::EdgeCase], 10);

        let small = config.users(7).persona_counts();
        // 4.2 normal, 0.7 for each of the rest
        assert_eq!(small[&PersonaTag::Normal], 4);
        assert_eq!(small.values().sum::<usize>(), 7);
    }

    #[test]
    fn test_persona_override_takes_everyone() {
        let config = RunConfig::resolve("smoke").unwrap().persona(PersonaTag::Lazy);
        let counts = config.persona_counts();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[&PersonaTag::Lazy], 10);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> =
            HashMap::from([("SIM_USERS", "33"), ("SIM_WORKERS", "3"), ("SIM_PERSONA", "power")]);
        let config = RunConfig::resolve("smoke")
            .unwrap()
            .apply_vars(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.total_users, 33);
        assert_eq!(config.workers, 3);
        assert_eq!(config.persona_override, Some(PersonaTag::Power));

        let bad = RunConfig::resolve("smoke")
            .unwrap()
            .apply_vars(|key| (key == "SIM_DAYS").then(|| "many".to_string()));
        assert!(matches!(bad, Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate() {
        assert!(RunConfig::resolve("smoke").unwrap().validate().is_ok());
        assert!(RunConfig::resolve("smoke").unwrap().workers(0).validate().is_err());
        assert!(RunConfig::resolve("smoke").unwrap().days(0).validate().is_err());
        assert!(
            RunConfig::resolve("smoke")
                .unwrap()
                .action_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_ownership_predicates() {
        let tag = OwnershipTag::default();
        let email = tag.email_for(PersonaTag::EdgeCase, 7, "abc123");
        assert_eq!(email, "sim-edge_case-0007-abc123@sim.repstack.test");

        assert!(tag.owns_email(&email));
        assert!(tag.belongs_to_run(&email, "abc123"));
        assert!(!tag.belongs_to_run(&email, "zzz999"));
        assert!(!tag.owns_email("sim-normal-0001-abc123@example.com"));
        assert!(!tag.owns_email("alice@sim.repstack.test"));
        assert_eq!(tag.persona_from_email(&email), Some(PersonaTag::EdgeCase));
        assert_eq!(tag.persona_from_email("alice@example.com"), None);
    }

    #[test]
    fn test_validation_scope_narrows_to_one_run() {
        let tag = OwnershipTag::default();
        let ours = tag.email_for(PersonaTag::Normal, 0, "abc123");
        let theirs = tag.email_for(PersonaTag::Normal, 0, "zzz999");

        let all = ValidationScope::from(tag.clone());
        assert!(all.includes(&ours) && all.includes(&theirs));
        assert_eq!(all.to_string(), "scope sim.repstack.test");

        let one = all.run("abc123");
        assert!(one.includes(&ours));
        assert!(!one.includes(&theirs));
        assert!(!one.includes("coach@repstack.app"));
        assert_eq!(one.to_string(), "scope sim.repstack.test run abc123");
    }
}
