use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use repsim::simulation::config::DEFAULT_LOG_DIR;
use repsim::{
    InMemoryDomain, OwnershipTag, PersonaTag, PoolConfig, RunConfig, RunMode, Simulation,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_STATE: &str = "log/simulation/domain_state.json";

#[derive(Parser)]
#[command(name = "repsim")]
#[command(about = "Load simulation for the fitness-coaching backend")]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a named profile end to end
    Run {
        profile: String,
        #[arg(long)]
        users: Option<usize>,
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        persona: Option<String>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        log_dir: Option<PathBuf>,
        #[arg(long)]
        action_timeout_ms: Option<u64>,
        /// Simulated latency per domain call
        #[arg(long)]
        latency_ms: Option<u64>,
        /// Delete simulation data after the report
        #[arg(long)]
        cleanup: bool,
        #[arg(long, default_value = DEFAULT_STATE)]
        state: PathBuf,
    },
    /// Re-run the validators against data left by earlier runs
    Validate {
        #[arg(long, default_value = DEFAULT_STATE)]
        state: PathBuf,
        #[arg(long, default_value = OwnershipTag::DEFAULT_DOMAIN)]
        email_domain: String,
        /// Only the accounts of this run id
        #[arg(long = "run")]
        run_id: Option<String>,
        #[arg(long, default_value = DEFAULT_LOG_DIR)]
        log_dir: PathBuf,
    },
    /// Delete all simulation data
    Cleanup {
        #[arg(long, default_value = DEFAULT_STATE)]
        state: PathBuf,
    },
    /// List the named profiles
    Profiles,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("repsim={}", cli.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run {
            profile,
            users,
            days,
            workers,
            persona,
            seed,
            log_dir,
            action_timeout_ms,
            latency_ms,
            cleanup,
            state,
        } => {
            let mut config = RunConfig::resolve(&profile)?.apply_env()?;
            if let Some(users) = users {
                config = config.users(users);
            }
            if let Some(days) = days {
                config = config.days(days);
            }
            if let Some(workers) = workers {
                config = config.workers(workers);
            }
            if let Some(persona) = persona {
                config = config.persona(persona.parse::<PersonaTag>()?);
            }
            if let Some(seed) = seed {
                config = config.seed(seed);
            }
            if let Some(dir) = log_dir {
                config = config.log_dir(dir);
            }
            if let Some(ms) = action_timeout_ms {
                config = config.action_timeout(Duration::from_millis(ms));
            }
            config = config.cleanup_after(cleanup);

            let mut pool = PoolConfig::default();
            if let Some(ms) = latency_ms {
                pool = pool.latency(Duration::from_millis(ms));
            }
            run(config, pool, &state).await
        }
        Command::Validate {
            state,
            email_domain,
            run_id,
            log_dir,
        } => validate(&state, &email_domain, run_id.as_deref(), log_dir).await,
        Command::Cleanup { state } => cleanup(&state).await,
        Command::Profiles => {
            println!("{:<10} {:>6} {:>5} {:>8}  persona", "profile", "users", "days", "workers");
            for mode in RunMode::ALL {
                let config = RunConfig::resolve(mode.as_str())?;
                let persona = config
                    .persona_override
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "mixed".to_string());
                println!(
                    "{:<10} {:>6} {:>5} {:>8}  {}",
                    mode, config.total_users, config.days, config.workers, persona
                );
            }
            Ok(())
        }
    }
}

fn open_domain(state: &Path, pool: PoolConfig) -> Result<Arc<InMemoryDomain>> {
    let domain = InMemoryDomain::load(pool, state)
        .with_context(|| format!("Failed to load domain state from '{}'", state.display()))?;
    Ok(Arc::new(domain))
}

async fn save_domain(domain: &InMemoryDomain, state: &Path) -> Result<()> {
    domain
        .save(state)
        .await
        .with_context(|| format!("Failed to save domain state to '{}'", state.display()))
}

async fn run(config: RunConfig, pool: PoolConfig, state: &Path) -> Result<()> {
    let domain = open_domain(state, pool)?;
    let simulation = Simulation::with_domain(config, Arc::clone(&domain));

    let summary = simulation.run().await.context("Simulation aborted")?;
    save_domain(&domain, state).await?;

    if let Some(paths) = &summary.error_logs {
        println!("Error summary: {}", paths.summary.display());
        println!("Error detail:  {}", paths.detail.display());
    }
    if let Some(cleanup) = &summary.cleanup {
        print!("{}", cleanup);
    }
    Ok(())
}

async fn validate(
    state: &Path,
    email_domain: &str,
    run_id: Option<&str>,
    log_dir: PathBuf,
) -> Result<()> {
    let domain = open_domain(state, PoolConfig::default())?;
    // The profile only supplies defaults; the report describes the rebuilt cohort.
    let config = RunConfig::resolve(RunMode::Smoke.as_str())?
        .log_dir(log_dir)
        .ownership(OwnershipTag::new(email_domain));
    let summary = Simulation::with_domain(config, domain)
        .validate_only(run_id)
        .await
        .context("Validation aborted")?;

    if let Some(paths) = &summary.error_logs {
        println!("Error summary: {}", paths.summary.display());
    }
    Ok(())
}

async fn cleanup(state: &Path) -> Result<()> {
    let domain = open_domain(state, PoolConfig::default())?;
    let config = RunConfig::resolve(RunMode::Smoke.as_str())?;
    let report = Simulation::with_domain(config, Arc::clone(&domain))
        .cleanup()
        .await
        .context("Cleanup aborted")?;
    save_domain(&domain, state).await?;

    print!("{}", report);
    if !report.is_complete() {
        println!("Cleanup incomplete; run it again to retry the failed classes.");
    }
    Ok(())
}
