use super::{Connection, config::PoolConfig};
use crate::core::{DomainError, DomainResult};
use crate::domain::store::FitnessStore;
use log::warn;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Connection pool
///
/// Bounds how many callers may touch the fitness store at once. Every domain
/// call holds exactly one lease for its duration.
pub struct ConnectionPool {
    /// Pool configuration
    config: PoolConfig,
    /// Available connections
    available: Arc<Mutex<VecDeque<Connection>>>,
    /// Total number of connections created
    total_connections: Arc<AtomicUsize>,
    /// Current capacity, raised by `resize`
    max_connections: AtomicUsize,
    /// Shared store instance
    store: Arc<RwLock<FitnessStore>>,
    /// Next connection ID
    next_id: AtomicU64,
}

impl ConnectionPool {
    /// Create a new connection pool over a shared store
    pub fn new(config: PoolConfig, store: Arc<RwLock<FitnessStore>>) -> DomainResult<Self> {
        config.validate().map_err(DomainError::Provisioning)?;

        let pool = Self {
            max_connections: AtomicUsize::new(config.max_connections),
            config,
            available: Arc::new(Mutex::new(VecDeque::new())),
            total_connections: Arc::new(AtomicUsize::new(0)),
            store,
            next_id: AtomicU64::new(1),
        };

        // Pre-create minimum connections
        pool.ensure_min_connections()?;

        Ok(pool)
    }

    /// Get a connection from the pool
    pub async fn get_connection(&self) -> DomainResult<PoolGuard> {
        let start = Instant::now();

        loop {
            if let Some(connection) = self.try_get_available()? {
                return Ok(self.guard(connection));
            }

            if let Some(connection) = self.try_create_connection() {
                return Ok(self.guard(connection));
            }

            if start.elapsed() > self.config.connect_timeout {
                return Err(DomainError::PoolTimeout(format!(
                    "no connections available after {:?} (max {})",
                    self.config.connect_timeout,
                    self.capacity()
                )));
            }

            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    fn guard(&self, connection: Connection) -> PoolGuard {
        PoolGuard {
            connection: Some(connection),
            pool: Arc::clone(&self.available),
            total_connections: Arc::clone(&self.total_connections),
        }
    }

    fn try_get_available(&self) -> DomainResult<Option<Connection>> {
        let mut available = self.available.lock()?;
        Ok(available.pop_front())
    }

    /// Try to create a new connection if under limit
    fn try_create_connection(&self) -> Option<Connection> {
        let max = self.capacity();
        let reserved = self
            .total_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |total| {
                (total < max).then_some(total + 1)
            });
        reserved.ok().map(|_| self.open_connection())
    }

    fn open_connection(&self) -> Connection {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Connection::new(id, Arc::clone(&self.store), self.config.latency)
    }

    fn ensure_min_connections(&self) -> DomainResult<()> {
        let mut available = self.available.lock()?;

        while self.total_connections.load(Ordering::SeqCst) < self.config.min_connections {
            available.push_back(self.open_connection());
            self.total_connections.fetch_add(1, Ordering::SeqCst);
        }

        Ok(())
    }

    /// Current maximum number of concurrent leases
    pub fn capacity(&self) -> usize {
        self.max_connections.load(Ordering::SeqCst)
    }

    /// Raise the pool capacity. Shrinking is not supported.
    pub fn resize(&self, max: usize) -> DomainResult<usize> {
        if max > self.config.hard_limit {
            return Err(DomainError::Provisioning(format!(
                "requested {} connections, hard limit is {}",
                max, self.config.hard_limit
            )));
        }
        let previous = self.max_connections.fetch_max(max, Ordering::SeqCst);
        Ok(previous.max(max))
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let available = self
            .available
            .lock()
            .map(|queue| queue.len())
            .unwrap_or_default();
        let total = self.total_connections.load(Ordering::SeqCst);

        PoolStats {
            total_connections: total,
            available_connections: available,
            active_connections: total.saturating_sub(available),
            max_connections: self.capacity(),
        }
    }
}

/// Connection pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// Returns the connection to the pool when dropped
pub struct PoolGuard {
    connection: Option<Connection>,
    pool: Arc<Mutex<VecDeque<Connection>>>,
    total_connections: Arc<AtomicUsize>,
}

impl PoolGuard {
    /// Get a reference to the connection
    pub fn connection(&self) -> &Connection {
        self.connection
            .as_ref()
            .expect("Connection already returned to pool")
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            match self.pool.lock() {
                Ok(mut pool) => pool.push_back(connection),
                Err(_) => {
                    warn!("pool lock poisoned, dropping connection {}", connection.id());
                    self.total_connections.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Arc<RwLock<FitnessStore>> {
        Arc::new(RwLock::new(FitnessStore::default()))
    }

    #[test]
    fn test_pool_creation() {
        let config = PoolConfig::default().min_connections(2).max_connections(5);

        let pool = ConnectionPool::new(config, store()).unwrap();
        let stats = pool.stats();

        assert_eq!(stats.total_connections, 2); // min_connections
        assert_eq!(stats.available_connections, 2);
    }

    #[tokio::test]
    async fn test_connection_return_to_pool() {
        let config = PoolConfig::default().min_connections(1).max_connections(5);
        let pool = ConnectionPool::new(config, store()).unwrap();

        {
            let _conn = pool.get_connection().await.unwrap();
            let stats = pool.stats();
            assert_eq!(stats.active_connections, 1);
            assert_eq!(stats.available_connections, 0);
        } // Connection returned here

        let stats = pool.stats();
        assert_eq!(stats.available_connections, 1);
    }

    #[tokio::test]
    async fn test_max_connections_limit() {
        let config = PoolConfig::default()
            .max_connections(2)
            .connect_timeout(Duration::from_millis(50));

        let pool = ConnectionPool::new(config, store()).unwrap();

        let _conn1 = pool.get_connection().await.unwrap();
        let _conn2 = pool.get_connection().await.unwrap();

        // Third connection should timeout
        let result = pool.get_connection().await;
        assert!(matches!(result, Err(DomainError::PoolTimeout(_))));
    }

    #[tokio::test]
    async fn test_resize_unblocks_waiters() {
        let config = PoolConfig::default()
            .max_connections(1)
            .connect_timeout(Duration::from_millis(50));
        let pool = ConnectionPool::new(config, store()).unwrap();

        let _held = pool.get_connection().await.unwrap();
        assert_eq!(pool.resize(3).unwrap(), 3);
        assert!(pool.get_connection().await.is_ok());
        assert_eq!(pool.stats().max_connections, 3);
    }

    #[test]
    fn test_resize_never_shrinks_and_respects_hard_limit() {
        let config = PoolConfig::default().max_connections(8).hard_limit(10);
        let pool = ConnectionPool::new(config, store()).unwrap();

        assert_eq!(pool.resize(4).unwrap(), 8);
        assert!(matches!(pool.resize(11), Err(DomainError::Provisioning(_))));
        assert_eq!(pool.capacity(), 8);
    }
}
