//! Per-client admission control.
//!
//! Two interchangeable backends behind one trait: a redis counter with a
//! per-window TTL for multi-instance deployments, and an in-process sliding
//! window. The redis backend carries an embedded local window and falls back
//! to it per call when the store is unreachable, so a redis outage degrades
//! accuracy but never availability.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use waypost_core::{AppError, AppResult};

/// Admission decision for one request from one client identity.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Returns true when the request is admitted.
    async fn check(&self, identity: &str) -> bool;
}

/// In-process sliding window: per identity, the timestamps of recently
/// admitted requests.
pub struct LocalRateLimiter {
    limit: usize,
    window: Duration,
    seen: Mutex<HashMap<String, Vec<Instant>>>,
}

impl LocalRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit as usize,
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Admission check against an explicit clock.
    ///
    /// The prune-check-push sequence runs under one lock acquisition, so two
    /// concurrent requests from the same identity cannot both slip past the
    /// limit.
    fn check_at(&self, identity: &str, now: Instant) -> bool {
        let mut seen = self.seen.lock();
        let window = seen.entry(identity.to_string()).or_default();

        let cutoff = now.checked_sub(self.window);
        window.retain(|&stamp| cutoff.map_or(true, |cutoff| stamp > cutoff));

        if window.len() >= self.limit {
            return false;
        }
        window.push(now);
        true
    }
}

#[async_trait]
impl RateLimiter for LocalRateLimiter {
    async fn check(&self, identity: &str) -> bool {
        self.check_at(identity, Instant::now())
    }
}

/// Redis-backed window shared across service instances.
///
/// One counter per identity: INCR, then set the TTL to the window length on
/// the counter's first increment. Admitted while the post-increment count
/// stays within the limit.
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    limit: u32,
    window: Duration,
    fallback: LocalRateLimiter,
}

impl RedisRateLimiter {
    /// Connect to redis; failure here selects the local backend at startup.
    pub async fn connect(url: &str, limit: u32, window: Duration) -> AppResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| AppError::Config(format!("Invalid redis URL: {}", e)))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Other(format!("Redis connection failed: {}", e)))?;

        Ok(Self {
            conn,
            limit,
            window,
            fallback: LocalRateLimiter::new(limit, window),
        })
    }

    async fn check_redis(&self, identity: &str) -> Result<bool, redis::RedisError> {
        let key = format!("waypost:rate:{}", identity);
        let mut conn = self.conn.clone();

        let count: u64 = conn.incr(&key, 1).await?;
        if count == 1 {
            let _: i64 = conn.expire(&key, self.window.as_secs() as i64).await?;
        }
        Ok(count <= u64::from(self.limit))
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, identity: &str) -> bool {
        match self.check_redis(identity).await {
            Ok(admitted) => admitted,
            Err(e) => {
                tracing::warn!("Redis rate limit check failed, using local window: {}", e);
                self.fallback.check(identity).await
            }
        }
    }
}
