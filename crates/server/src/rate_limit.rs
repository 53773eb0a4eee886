//! # Rate Limiting
//!
//! Per-client request quota keyed by client address. In memory only;
//! counts reset when the process restarts.

use std::num::NonZeroU32;

use governor::{DefaultKeyedRateLimiter, Quota};

pub const DEFAULT_PER_MINUTE: u32 = 60;

pub struct RateLimiter {
    per_minute: u32,
    /// `None` when limiting is disabled
    inner: Option<DefaultKeyedRateLimiter<String>>,
}

impl RateLimiter {
    /// Allow `per_minute` requests per client; 0 disables limiting
    pub fn new(per_minute: u32) -> Self {
        let inner = NonZeroU32::new(per_minute)
            .map(|n| governor::RateLimiter::keyed(Quota::per_minute(n)));
        Self { per_minute, inner }
    }

    /// Read `ARCSYS_RATE_LIMIT_PER_MINUTE`, falling back to the default
    pub fn from_env() -> Self {
        let per_minute = match std::env::var("ARCSYS_RATE_LIMIT_PER_MINUTE") {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(
                    value = %raw,
                    default = DEFAULT_PER_MINUTE,
                    "Invalid ARCSYS_RATE_LIMIT_PER_MINUTE, using default"
                );
                DEFAULT_PER_MINUTE
            }),
            Err(_) => DEFAULT_PER_MINUTE,
        };
        Self::new(per_minute)
    }

    pub fn limit(&self) -> u32 {
        self.per_minute
    }

    /// Record a request from `client`; false when it is over the quota
    pub fn check(&self, client: &str) -> bool {
        let Some(limiter) = &self.inner else {
            return true;
        };

        let allowed = limiter.check_key(&client.to_string()).is_ok();
        // Forget clients whose quota has fully replenished
        limiter.retain_recent();
        allowed
    }
}
