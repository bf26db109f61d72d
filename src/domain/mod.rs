//! Domain collaborator
//!
//! The simulation drives the fitness-coaching product only through
//! [`DomainApi`]. [`InMemoryDomain`] is the bundled implementation: a
//! relational-style store behind a bounded connection pool, with a separate
//! rate-limit cache.

pub mod cache;
pub mod memory;
pub mod store;

use crate::core::{Action, DomainResult, UserId};
use async_trait::async_trait;

pub use memory::InMemoryDomain;
pub use store::{DomainSnapshot, RecordClass, UserRecord};

/// Operations the simulation engine needs from the product
#[async_trait]
pub trait DomainApi: Send + Sync {
    /// Cheap round trip proving the collaborator is reachable
    async fn ping(&self) -> DomainResult<()>;

    /// Create one account; `email` carries the simulation's ownership tag
    async fn create_user(&self, email: &str) -> DomainResult<UserId>;

    /// Execute one user action on the given simulated day
    async fn perform(&self, user: UserId, day: u32, action: &Action) -> DomainResult<()>;

    /// Every account whose email is under `email_domain`
    async fn find_users(&self, email_domain: &str) -> DomainResult<Vec<UserRecord>>;

    /// Read back all records owned by `users`
    async fn snapshot(&self, users: &[UserId]) -> DomainResult<DomainSnapshot>;

    /// Delete one record class for `users`; returns the number removed
    async fn delete_records(&self, class: RecordClass, users: &[UserId]) -> DomainResult<usize>;

    /// Drop cache entries keyed by `users`; returns the number removed
    async fn clear_cache(&self, users: &[UserId]) -> DomainResult<usize>;

    /// Maximum number of concurrent callers the collaborator accepts
    fn pool_capacity(&self) -> usize;

    /// Raise concurrent-caller capacity to at least `max`
    async fn resize_pool(&self, max: usize) -> DomainResult<usize>;
}
