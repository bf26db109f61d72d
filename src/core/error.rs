use thiserror::Error;

/// Errors raised by the domain collaborator.
///
/// Per-action variants (`Validation` through `Injected`) are absorbed by the
/// action executor and never abort a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Connection pool timeout: {0}")]
    PoolTimeout(String),

    #[error("Pool provisioning failed: {0}")]
    Provisioning(String),

    #[error("Injected fault: {0}")]
    Injected(String),

    #[error("Domain unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

pub type DomainResult<T> = std::result::Result<T, DomainError>;

impl<T> From<std::sync::PoisonError<T>> for DomainError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors that stop a simulation run.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Unknown profile '{0}' (expected one of: smoke, standard, full, stress, marathon, agent)")]
    UnknownProfile(String),

    #[error("Unknown persona '{0}'")]
    UnknownPersona(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource provisioning failed: {0}")]
    Provisioning(String),

    #[error("Domain collaborator unreachable: {0}")]
    DomainUnavailable(String),

    #[error("Invalid run transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Worker failure: {0}")]
    Worker(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    /// Configuration errors are raised before any domain state exists.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownProfile(_) | Self::UnknownPersona(_) | Self::InvalidConfig(_)
        )
    }
}
