pub mod error;
pub mod types;

pub use error::{DomainError, DomainResult, Result, SimError};
pub use types::{
    AbuseProbe, Action, ActionKind, ActionOutcome, ErrorRecord, UserId, ValidationResult,
};
