use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::ratelimit::RateLimitConfig;

/// A token bucket that throttles request dispatch.
///
/// The bucket starts full and refills continuously: each acquisition
/// decision credits `elapsed * regen_rate` tokens, capped at `max_tokens`.
/// [`acquire`](Self::acquire) suspends the caller until a whole token is
/// available and then takes it; two concurrent callers can never take the
/// same token. Dropping the returned future while it waits consumes
/// nothing.
///
/// A bucket built without a config is unlimited and never suspends.
/// Acquisition has no intrinsic timeout; callers that need a bounded wait
/// wrap `acquire` in [`tokio::time::timeout`].
#[derive(Debug)]
pub struct TokenBucket {
    /// `None` means unlimited
    inner: Option<Inner>,
}

#[derive(Debug)]
struct Inner {
    max_tokens: f64,
    regen_rate: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a token bucket. `None` disables throttling entirely.
    #[must_use]
    pub fn new(config: Option<RateLimitConfig>) -> Self {
        let inner = config.map(|config| Inner {
            max_tokens: f64::from(config.max_tokens),
            regen_rate: config.regen_rate,
            state: Mutex::new(BucketState {
                tokens: f64::from(config.max_tokens),
                last_refill: Instant::now(),
            }),
        });
        Self { inner }
    }

    /// Suspend until a token is available, then take it.
    ///
    /// Tokens are taken in a single locked region, so concurrent callers
    /// cannot observe a partially updated count or take the same token.
    /// The lock is never held across a suspension point; a caller that is
    /// cancelled while waiting leaves the bucket exactly as it found it.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub async fn acquire(&self) {
        let Some(inner) = &self.inner else {
            return;
        };

        loop {
            let wait = {
                let mut state = inner.state.lock().unwrap();
                inner.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                inner.time_until_next_token(&state)
            };

            match wait {
                Some(wait) => sleep(wait).await,
                // No regeneration configured: a token can never accrue, so
                // park until the caller cancels from outside.
                None => std::future::pending::<()>().await,
            }
        }
    }

    /// The number of tokens currently available, after crediting the time
    /// elapsed since the last acquisition decision. `None` if the bucket
    /// is unlimited.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn available(&self) -> Option<f64> {
        let inner = self.inner.as_ref()?;
        let mut state = inner.state.lock().unwrap();
        inner.refill(&mut state);
        Some(state.tokens)
    }

    /// `true` if this bucket never throttles
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.inner.is_none()
    }
}

impl Inner {
    /// Credit tokens for the time elapsed since the last refill,
    /// capped at the bucket capacity.
    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        if self.regen_rate > 0.0 {
            let elapsed = now.duration_since(state.last_refill);
            state.tokens =
                (state.tokens + elapsed.as_secs_f64() * self.regen_rate).min(self.max_tokens);
        }
        state.last_refill = now;
    }

    /// How long until a whole token will have accrued, or `None` if
    /// no amount of waiting will produce one.
    fn time_until_next_token(&self, state: &BucketState) -> Option<Duration> {
        if self.regen_rate > 0.0 && self.max_tokens >= 1.0 {
            let deficit = 1.0 - state.tokens;
            // A rate slow enough to overflow `Duration` is an effectively
            // infinite wait, not a panic.
            Some(Duration::try_from_secs_f64(deficit / self.regen_rate).unwrap_or(Duration::MAX))
        } else {
            None
        }
    }
}
