//! Expiry rules for cached artifacts.
//!
//! Role maps have no embedded expiry and are judged by file age against a
//! fixed TTL. ID tokens and STS credentials carry their own expiry and are
//! usable only while more than the clock-skew allowance remains, so a
//! credential about to expire is treated as already expired.

use chrono::{DateTime, Duration, Utc};

use crate::types::StsCredentials;

/// Default clock skew allowance (5 minutes)
pub const DEFAULT_CLOCK_SKEW_ALLOWANCE_SECS: u32 = 300;

/// Default role map lifetime (1 hour)
pub const DEFAULT_ROLE_MAP_CACHE_SECS: u32 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    clock_skew_allowance: Duration,
    role_map_ttl: Duration,
}

impl ExpiryPolicy {
    pub fn new(clock_skew_allowance_secs: u32, role_map_cache_secs: u32) -> Self {
        Self {
            clock_skew_allowance: Duration::seconds(i64::from(clock_skew_allowance_secs)),
            role_map_ttl: Duration::seconds(i64::from(role_map_cache_secs)),
        }
    }

    pub fn clock_skew_allowance(&self) -> Duration {
        self.clock_skew_allowance
    }

    pub fn role_map_ttl(&self) -> Duration {
        self.role_map_ttl
    }

    /// A role map is fresh while strictly less than the TTL has passed since
    /// it was written.
    pub fn role_map_is_fresh(&self, modified: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - modified < self.role_map_ttl
    }

    /// True while strictly more than the clock skew allowance remains.
    pub fn outlives_skew(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        expires_at - now > self.clock_skew_allowance
    }

    /// `exp` is seconds since the epoch; out-of-range values are expired.
    pub fn id_token_is_fresh(&self, exp: i64, now: DateTime<Utc>) -> bool {
        match DateTime::<Utc>::from_timestamp(exp, 0) {
            Some(expires_at) => self.outlives_skew(expires_at, now),
            None => false,
        }
    }

    pub fn sts_credentials_are_fresh(&self, credentials: &StsCredentials, now: DateTime<Utc>) -> bool {
        self.outlives_skew(credentials.expiration, now)
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CLOCK_SKEW_ALLOWANCE_SECS, DEFAULT_ROLE_MAP_CACHE_SECS)
    }
}
