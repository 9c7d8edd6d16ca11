use chrono::Duration;
use std::fmt;
use std::sync::Arc;

use super::store::CounterStore;
use crate::clock::Clock;
use crate::config::{Quota, RateLimitConfig};

/// Longer windows are clamped to this.
const MAX_WINDOW_SECS: u64 = 366 * 24 * 3600;

/// What a quota protects. Each concern has its own key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateConcern {
    Api,
    Chat,
    Login,
    EmailVerification,
}

impl RateConcern {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Chat => "chat",
            Self::Login => "login",
            Self::EmailVerification => "email_verification",
        }
    }
}

impl fmt::Display for RateConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Fixed-window limiter over a shared [`CounterStore`].
///
/// Store failures fail open: the request is admitted and the error logged.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn CounterStore>,
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    pub fn key(concern: RateConcern, id: &str) -> String {
        format!("{}:{}", concern.prefix(), id)
    }

    pub fn quota(&self, concern: RateConcern) -> Quota {
        match concern {
            RateConcern::Api => self.config.api,
            RateConcern::Chat => self.config.chat,
            RateConcern::Login => self.config.login,
            RateConcern::EmailVerification => self.config.email_verification,
        }
    }

    /// Admit one event for `key` if the current window has room.
    pub async fn admit(&self, key: &str, limit: u32, window_secs: u64) -> bool {
        let window = Duration::seconds(window_secs.min(MAX_WINDOW_SECS) as i64);
        match self.store.admit(key, limit, window).await {
            Ok(admission) => {
                if !admission.admitted {
                    tracing::warn!(
                        key = %key,
                        limit = admission.limit,
                        resets_at = %admission.resets_at,
                        "Rate limit exceeded"
                    );
                }
                admission.admitted
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Rate limit store failed, admitting");
                true
            }
        }
    }

    /// Admit one event under the configured quota for `concern`.
    pub async fn check(&self, concern: RateConcern, id: &str) -> bool {
        let quota = self.quota(concern);
        self.admit(&Self::key(concern, id), quota.count, quota.window_secs)
            .await
    }

    /// Events left in the current window.
    pub async fn remaining(&self, concern: RateConcern, id: &str) -> u32 {
        let quota = self.quota(concern);
        match self.store.peek(&Self::key(concern, id)).await {
            Ok(Some(state)) => quota.count.saturating_sub(state.count),
            Ok(None) => quota.count,
            Err(e) => {
                tracing::error!(concern = %concern, error = %e, "Rate limit store failed");
                quota.count
            }
        }
    }

    /// Time until the current window closes, `None` without a live window.
    pub async fn ttl(&self, concern: RateConcern, id: &str) -> Option<Duration> {
        match self.store.peek(&Self::key(concern, id)).await {
            Ok(state) => state.map(|s| s.resets_at() - self.clock.now()),
            Err(e) => {
                tracing::error!(concern = %concern, error = %e, "Rate limit store failed");
                None
            }
        }
    }

    pub async fn reset(&self, concern: RateConcern, id: &str) {
        let key = Self::key(concern, id);
        if let Err(e) = self.store.reset(&key).await {
            tracing::error!(key = %key, error = %e, "Failed to reset rate limit");
        }
    }
}
