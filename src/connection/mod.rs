pub mod config;
pub mod pool;

use crate::domain::store::FitnessStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Handle onto the shared fitness store, leased from a [`pool::ConnectionPool`]
pub struct Connection {
    /// Unique connection ID
    id: u64,
    /// Shared store instance
    store: Arc<RwLock<FitnessStore>>,
    /// Simulated round-trip latency
    latency: Option<Duration>,
}

impl Connection {
    pub(crate) fn new(id: u64, store: Arc<RwLock<FitnessStore>>, latency: Option<Duration>) -> Self {
        Self { id, store, latency }
    }

    /// Get connection ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Acquire shared read access to the store
    pub async fn read(&self) -> RwLockReadGuard<'_, FitnessStore> {
        self.round_trip().await;
        self.store.read().await
    }

    /// Acquire exclusive write access to the store
    ///
    /// Every check-then-insert business rule runs under this guard, which is
    /// what keeps concurrent callers from producing duplicate records.
    pub async fn write(&self) -> RwLockWriteGuard<'_, FitnessStore> {
        self.round_trip().await;
        self.store.write().await
    }

    async fn round_trip(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}
