use std::collections::BTreeMap;
use std::sync::Mutex;

pub const USERS_CREATED: &str = "users_created";
pub const ACTIONS_FAILED: &str = "actions_failed";
pub const ACTIONS_SKIPPED: &str = "actions_skipped";
pub const ACTIONS_TIMED_OUT: &str = "actions_timed_out";
pub const DAYS_COMPLETED: &str = "days_completed";

/// Run-wide counters shared by every worker
///
/// One mutex guards the whole map; callers only ever increment or take a
/// snapshot, so the critical section is a single map operation.
#[derive(Debug, Default)]
pub struct Stats {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, key: &str) {
        self.add(key, 1);
    }

    pub fn add(&self, key: &str, amount: u64) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        match counters.get_mut(key) {
            Some(value) => *value += amount,
            None => {
                counters.insert(key.to_string(), amount);
            }
        }
    }

    pub fn get(&self, key: &str) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters.get(key).copied().unwrap_or(0)
    }

    /// Consistent copy of every counter
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
