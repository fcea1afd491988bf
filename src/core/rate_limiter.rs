//! Token bucket rate limiting for the REST surface
//!
//! One bucket per (client identity, endpoint class). Buckets live only in
//! memory; a background sweep drops the ones that have refilled completely.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::config::{ClassLimit, RateLimitSettings};

// Upper bound reported when the refill rate cannot produce a token
const MAX_RETRY_AFTER: Duration = Duration::from_secs(24 * 3600);

/// Endpoint families with independent limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    /// Login, registration, password reset
    Auth,
    /// General API reads and writes
    Api,
    /// File uploads
    Upload,
    /// Posting messages
    Messaging,
}

impl EndpointClass {
    pub const ALL: [EndpointClass; 4] = [
        EndpointClass::Auth,
        EndpointClass::Api,
        EndpointClass::Upload,
        EndpointClass::Messaging,
    ];
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndpointClass::Auth => "auth",
            EndpointClass::Api => "api",
            EndpointClass::Upload => "upload",
            EndpointClass::Messaging => "messaging",
        };
        f.write_str(name)
    }
}

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Burst capacity of the bucket
    pub limit: u32,
    /// Whole tokens left after this call; always 0 on deny
    pub remaining: u32,
    /// Time until one token is available; zero when allowed
    pub retry_after: Duration,
}

impl RateLimitDecision {
    /// Retry-After value in whole seconds, never less than one
    pub fn retry_after_secs(&self) -> u64 {
        (self.retry_after.as_secs_f64().ceil() as u64).max(1)
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    burst: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(limit: ClassLimit) -> Self {
        Self {
            tokens: limit.burst as f64,
            burst: limit.burst as f64,
            refill_rate: limit.rate_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.burst);
        self.last_refill = now;
    }

    fn try_consume(&mut self, now: Instant) -> RateLimitDecision {
        self.refill(now);
        let limit = self.burst as u32;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            RateLimitDecision {
                allowed: true,
                limit,
                remaining: self.tokens.floor() as u32,
                retry_after: Duration::ZERO,
            }
        } else {
            let wait = (1.0 - self.tokens) / self.refill_rate;
            RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                retry_after: Duration::try_from_secs_f64(wait).unwrap_or(MAX_RETRY_AFTER),
            }
        }
    }

    fn is_full(&self) -> bool {
        self.tokens >= self.burst
    }
}

type BucketKey = (String, EndpointClass);

/// Per-identity, per-class token bucket limiter
pub struct RateLimiter {
    settings: RateLimitSettings,
    buckets: RwLock<HashMap<BucketKey, Mutex<TokenBucket>>>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// Consume one token for `identity` on `class` if available
    pub async fn check(&self, identity: &str, class: EndpointClass) -> RateLimitDecision {
        let key = (identity.to_string(), class);

        // Fast path: existing bucket under the read lock
        {
            let buckets = self.buckets.read().await;
            if let Some(bucket) = buckets.get(&key) {
                return consume(bucket);
            }
        }

        let mut buckets = self.buckets.write().await;
        let limit = self.settings.limit_for(class);
        // Another caller may have inserted it between the two locks
        let bucket = buckets
            .entry(key)
            .or_insert_with(|| Mutex::new(TokenBucket::new(limit)));
        let decision = consume(bucket);
        if !decision.allowed {
            log::debug!("Rate limit hit for {} on {} endpoints", identity, class);
        }
        decision
    }

    /// Drop every bucket whose balance has fully refilled.
    ///
    /// A full bucket is treated as idle. This can reclaim a bucket that was
    /// used shortly before the sweep; its next caller simply starts full.
    pub async fn reclaim(&self) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
            bucket.refill(now);
            !bucket.is_full()
        });
        let removed = before - buckets.len();
        if removed > 0 {
            log::debug!(
                "Rate limiter reclaimed {} idle buckets, {} remain",
                removed,
                buckets.len()
            );
        }
        removed
    }

    /// Number of tracked buckets
    pub async fn bucket_count(&self) -> usize {
        self.buckets.read().await.len()
    }

    /// Start the periodic reclaim sweep
    pub fn start_reclaim_task(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period = self.settings.reclaim_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                self.reclaim().await;
            }
        })
    }
}

fn consume(bucket: &Mutex<TokenBucket>) -> RateLimitDecision {
    bucket
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .try_consume(Instant::now())
}

pub type SharedRateLimiter = Arc<RateLimiter>;
