use anyhow::Result;
use redis::AsyncCommands;
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

use crate::config::rate_limits::{current_window, RateAction, RateLimits};
use crate::infra::cache::RedisCache;

/// Who a counter is kept for. Anonymous paths are limited per client IP.
#[derive(Debug, Clone, Copy)]
pub enum RateSubject {
    User(Uuid),
    Ip(IpAddr),
}

impl fmt::Display for RateSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateSubject::User(id) => write!(f, "user:{}", id),
            RateSubject::Ip(ip) => write!(f, "ip:{}", ip),
        }
    }
}

pub struct RateLimitInfo {
    pub limited: bool,
    pub limit: u32,
    pub remaining: u32,
}

#[derive(Clone)]
pub struct RateLimiter {
    cache: RedisCache,
    limits: RateLimits,
}

fn counter_key(subject: RateSubject, action: RateAction, window_seconds: u64) -> String {
    format!(
        "ratelimit:{}:{}:{}",
        subject,
        action.as_key(),
        current_window(window_seconds)
    )
}

impl RateLimiter {
    pub fn new(cache: RedisCache, limits: RateLimits) -> Self {
        Self { cache, limits }
    }

    /// Checks every window configured for the action and reports the
    /// tightest one.
    pub async fn check(&self, subject: RateSubject, action: RateAction) -> Result<RateLimitInfo> {
        let mut conn = self.cache.connection().await?;

        let mut min_remaining = u32::MAX;
        let mut effective_limit: u32 = 0;

        for (limit, window) in self.limits.windows_for(action) {
            let key = counter_key(subject, action, window.seconds());
            let count: u32 = conn.get::<_, Option<u32>>(&key).await?.unwrap_or(0);
            let remaining = limit.saturating_sub(count);

            if remaining < min_remaining {
                min_remaining = remaining;
                effective_limit = limit;
            }

            if count >= limit {
                tracing::debug!(
                    subject = %subject,
                    action = action.as_key(),
                    window = ?window,
                    count = count,
                    limit = limit,
                    "rate limit exceeded"
                );
                return Ok(RateLimitInfo {
                    limited: true,
                    limit,
                    remaining: 0,
                });
            }
        }

        Ok(RateLimitInfo {
            limited: false,
            limit: effective_limit,
            remaining: min_remaining,
        })
    }

    pub async fn increment(&self, subject: RateSubject, action: RateAction) -> Result<()> {
        let mut conn = self.cache.connection().await?;

        for (_, window) in self.limits.windows_for(action) {
            let window_seconds = window.seconds();
            let key = counter_key(subject, action, window_seconds);

            let count: u64 = conn.incr(&key, 1).await?;
            if count == 1 {
                let _: () = conn.expire(&key, window_seconds as i64).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn counter_keys_separate_users_from_addresses() {
        let user = Uuid::nil();
        let user_key = counter_key(RateSubject::User(user), RateAction::Vote, 3600);
        let ip_key = counter_key(
            RateSubject::Ip(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            RateAction::TrackingLookup,
            3600,
        );
        assert!(user_key.starts_with("ratelimit:user:00000000-0000-0000-0000-000000000000:vote:"));
        assert!(ip_key.starts_with("ratelimit:ip:127.0.0.1:tracking_lookup:"));
    }
}
