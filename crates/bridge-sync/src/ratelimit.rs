//! # Rate Limiter
//!
//! Token-bucket admission control for remote API calls.
//!
//! ## Bucket Mechanics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Token Bucket (60 req / 60 s default)                 │
//! │                                                                         │
//! │   refill: tokens = min(capacity, tokens + elapsed × rate)              │
//! │                                                                         │
//! │   ┌──────────────┐   1 token per request                               │
//! │   │ ████████░░░░ │ ──────────────────────►  API call                   │
//! │   └──────────────┘                                                      │
//! │                                                                         │
//! │   empty bucket → wait deficit/rate (+50ms buffer), re-check            │
//! │   429 from server → drain bucket, honor Retry-After (or 5s)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! State is persisted through the KV store with TTL = 2× the window, so a
//! restarted process inherits the bucket instead of bursting from full.
//! Concurrent readers can race on the snapshot; the server's 429 is the
//! backstop and feeds back through [`RateLimiter::handle_rate_limit`].

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::error::SyncResult;
use bridge_db::KvStore;

/// KV key holding the persisted bucket snapshot.
const BUCKET_KEY: &str = "rate_limiter";

/// Extra sleep beyond the computed deficit, to absorb timer skew.
const WAIT_BUFFER: Duration = Duration::from_millis(50);

/// Sleep applied on a 429 with no Retry-After hint.
const RATE_LIMIT_FALLBACK: Duration = Duration::from_secs(5);

/// Persisted bucket snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BucketState {
    tokens: f64,
    last_refill_unix: f64,
}

/// Token-bucket rate limiter persisted across process restarts.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    kv: KvStore,
    capacity: f64,
    window: Duration,
}

impl RateLimiter {
    /// Creates a limiter allowing `max_requests` per `window`.
    pub fn new(kv: KvStore, max_requests: u32, window: Duration) -> Self {
        RateLimiter {
            kv,
            capacity: f64::from(max_requests.max(1)),
            window,
        }
    }

    /// Refill rate in tokens per second.
    fn rate(&self) -> f64 {
        self.capacity / self.window.as_secs_f64()
    }

    fn now_unix() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs_f64()
    }

    /// Loads the snapshot and applies continuous refill up to now.
    async fn refilled(&self) -> SyncResult<BucketState> {
        let now = Self::now_unix();
        let mut state = self
            .kv
            .get::<BucketState>(BUCKET_KEY)
            .await?
            .unwrap_or(BucketState {
                tokens: self.capacity,
                last_refill_unix: now,
            });

        let elapsed = (now - state.last_refill_unix).max(0.0);
        state.tokens = (state.tokens + elapsed * self.rate()).clamp(0.0, self.capacity);
        state.last_refill_unix = now;
        Ok(state)
    }

    async fn save(&self, state: &BucketState) -> SyncResult<()> {
        // TTL twice the window: a bucket idle that long is full anyway.
        self.kv.put(BUCKET_KEY, state, Some(self.window * 2)).await?;
        Ok(())
    }

    /// Returns true if a request could be admitted right now.
    pub async fn can_make_request(&self) -> SyncResult<bool> {
        Ok(self.refilled().await?.tokens >= 1.0)
    }

    /// Blocks until a token is available.
    ///
    /// Sleeps the computed deficit plus a small buffer and re-checks, so a
    /// concurrent consumer taking the freed token just extends the wait.
    pub async fn wait_if_needed(&self) -> SyncResult<()> {
        loop {
            let state = self.refilled().await?;
            if state.tokens >= 1.0 {
                return Ok(());
            }

            let deficit = 1.0 - state.tokens;
            let wait = Duration::from_secs_f64(deficit / self.rate()) + WAIT_BUFFER;
            debug!(tokens = state.tokens, wait_ms = wait.as_millis() as u64, "Rate limit wait");
            self.save(&state).await?;
            tokio::time::sleep(wait).await;
        }
    }

    /// Consumes one token after a request has gone out.
    pub async fn record_request(&self) -> SyncResult<()> {
        let mut state = self.refilled().await?;
        state.tokens = (state.tokens - 1.0).max(0.0);
        self.save(&state).await
    }

    /// Reacts to a server-side 429: drains the bucket and sleeps the
    /// server's hint, or a fixed fallback when none was sent.
    pub async fn handle_rate_limit(&self, retry_after: Option<Duration>) -> SyncResult<()> {
        let mut state = self.refilled().await?;
        state.tokens = 0.0;
        self.save(&state).await?;

        let wait = retry_after.unwrap_or(RATE_LIMIT_FALLBACK);
        warn!(wait_secs = wait.as_secs(), "Remote rate limit hit, backing off");
        tokio::time::sleep(wait).await;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
