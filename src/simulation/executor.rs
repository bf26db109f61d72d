use super::error_log::ErrorLog;
use super::stats::{ACTIONS_FAILED, ACTIONS_TIMED_OUT, Stats};
use crate::core::{Action, ActionOutcome, ErrorRecord, UserId};
use crate::domain::DomainApi;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Runs single actions against the domain and folds the outcome into the
/// shared stats and error log. Never returns an error: every domain failure
/// becomes a failed [`ActionOutcome`].
#[derive(Clone)]
pub struct ActionExecutor {
    domain: Arc<dyn DomainApi>,
    stats: Arc<Stats>,
    errors: Arc<ErrorLog>,
    timeout: Option<Duration>,
}

impl ActionExecutor {
    pub fn new(
        domain: Arc<dyn DomainApi>,
        stats: Arc<Stats>,
        errors: Arc<ErrorLog>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            domain,
            stats,
            errors,
            timeout,
        }
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn errors(&self) -> &Arc<ErrorLog> {
        &self.errors
    }

    pub async fn execute(&self, user: UserId, day: u32, action: &Action) -> ActionOutcome {
        let kind = action.kind();
        let call = self.domain.perform(user, day, action);

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => {
                    self.stats.increment(ACTIONS_TIMED_OUT);
                    Err(format!("timed out after {}ms", limit.as_millis()))
                }
            },
            None => call.await.map_err(|e| e.to_string()),
        };

        match result {
            Ok(()) => {
                self.stats.add(kind.success_key(), action.stat_weight());
                ActionOutcome::ok(kind)
            }
            Err(message) => {
                debug!(%user, day, action = %kind, error = %message, "action failed");
                self.stats.increment(ACTIONS_FAILED);
                self.errors
                    .append(ErrorRecord::new(user.to_string(), day, kind.as_str(), message.clone()));
                ActionOutcome::failed(kind, message)
            }
        }
    }
}
