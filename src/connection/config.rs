use std::time::Duration;

/// Connection pool configuration for the domain store
///
/// Mirrors the knobs of a PostgreSQL connection pool: the simulation
/// resizes `max_connections` upward before a parallel run.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Database name
    pub database: String,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Maximum number of connections in pool
    pub max_connections: usize,

    /// Minimum number of connections in pool
    pub min_connections: usize,

    /// Ceiling that `max_connections` may never be resized past
    pub hard_limit: usize,

    /// Simulated round-trip latency applied to every store access
    pub latency: Option<Duration>,
}

impl PoolConfig {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            connect_timeout: Duration::from_secs(30),
            max_connections: 5,
            min_connections: 1,
            hard_limit: 256,
            latency: None,
        }
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set minimum connections
    pub fn min_connections(mut self, min: usize) -> Self {
        self.min_connections = min;
        self
    }

    /// Set the resize ceiling
    pub fn hard_limit(mut self, limit: usize) -> Self {
        self.hard_limit = limit;
        self
    }

    /// Set simulated latency
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.database.is_empty() {
            return Err("database cannot be empty".to_string());
        }

        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }

        if self.min_connections > self.max_connections {
            return Err("min_connections cannot exceed max_connections".to_string());
        }

        if self.max_connections > self.hard_limit {
            return Err("max_connections cannot exceed hard_limit".to_string());
        }

        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new("repstack_simulation")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.database, "repstack_simulation");
        assert_eq!(config.max_connections, 5);
        assert!(config.latency.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = PoolConfig::new("db")
            .max_connections(20)
            .min_connections(2)
            .hard_limit(40)
            .latency(Duration::from_millis(3));

        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.hard_limit, 40);
        assert_eq!(config.latency, Some(Duration::from_millis(3)));
    }

    #[test]
    fn test_validate() {
        assert!(PoolConfig::default().validate().is_ok());
        assert!(PoolConfig::new("").validate().is_err());
        assert!(PoolConfig::default().max_connections(0).validate().is_err());
        assert!(
            PoolConfig::default()
                .min_connections(10)
                .max_connections(5)
                .validate()
                .is_err()
        );
        assert!(
            PoolConfig::default()
                .hard_limit(4)
                .max_connections(5)
                .validate()
                .is_err()
        );
    }
}
