//! Load-simulation engine
//!
//! A [`runner::Runner`] builds a cohort of synthetic users, each driven by a
//! persona, plays them through a number of simulated days against a
//! [`crate::domain::DomainApi`], then checks the accumulated state with
//! independent validators and renders a report.

pub mod config;
pub mod day;
pub mod error_log;
pub mod executor;
pub mod persona;
pub mod progress;
pub mod report;
pub mod runner;
pub mod stats;
pub mod validators;

pub use config::{OwnershipTag, RunConfig, RunMode, ValidationScope};
pub use day::{CohortMember, DayReport, DaySimulator};
pub use error_log::{ErrorLog, ErrorLogPaths};
pub use executor::ActionExecutor;
pub use persona::{PersonaBehavior, PersonaCatalog, PersonaTag};
pub use progress::Progress;
pub use runner::{CleanupReport, RunPhase, RunSummary, Runner};
pub use stats::Stats;
pub use validators::{Validator, default_validators};
