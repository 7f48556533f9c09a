//! Admission algorithms
//!
//! Each algorithm is a small state machine driven by an explicit timestamp
//! in milliseconds, so the same code serves the in-process store and the
//! tests. The Redis store runs Lua ports of these and feeds the raw numbers
//! back through [`QuotaCheck`] and [`BucketOutcome`].

use std::collections::VecDeque;

use super::tier::{Algorithm, RateLimitTier};

pub const HOUR_MS: u64 = 3_600_000;
pub const MINUTE_MS: u64 = 60_000;

/// Everything an algorithm needs to know about a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    pub algorithm: Algorithm,
    pub per_hour: u32,
    pub per_minute: u32,
    /// Sub-windows per quota for the sliding window
    pub sub_windows: u32,
}

impl LimitPolicy {
    pub fn from_tier(tier: &RateLimitTier, sub_windows: u32) -> Self {
        Self {
            algorithm: tier.algorithm,
            per_hour: tier.requests_per_hour,
            per_minute: tier.requests_per_minute,
            sub_windows: sub_windows.max(1),
        }
    }
}

/// Outcome of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Limit of the quota that decided the outcome
    pub limit: u32,
    pub remaining: u32,
    pub reset_in_seconds: u64,
    /// Set only when rejected; always at least one second
    pub retry_after: Option<u64>,
}

impl RateLimitDecision {
    /// Combine per-quota checks of a window algorithm
    ///
    /// Admitted only if every quota admits. On admission the quota with the
    /// least headroom is reported; on rejection the exhausted quota that
    /// frees up last.
    pub fn from_windows(checks: &[QuotaCheck]) -> Self {
        let allowed = checks.iter().all(QuotaCheck::admits);

        let binding = if allowed {
            checks
                .iter()
                .min_by_key(|c| c.limit.saturating_sub(c.used))
        } else {
            checks
                .iter()
                .filter(|c| !c.admits())
                .max_by_key(|c| c.reset_in_ms)
        };

        let Some(quota) = binding else {
            return Self {
                allowed: true,
                limit: 0,
                remaining: 0,
                reset_in_seconds: 0,
                retry_after: None,
            };
        };

        let reset_in_seconds = millis_to_secs(quota.reset_in_ms);

        if allowed {
            Self {
                allowed,
                limit: quota.limit,
                remaining: quota.limit.saturating_sub(quota.used + 1),
                reset_in_seconds,
                retry_after: None,
            }
        } else {
            Self {
                allowed,
                limit: quota.limit,
                remaining: 0,
                reset_in_seconds,
                retry_after: Some(reset_in_seconds.max(1)),
            }
        }
    }
}

/// One window quota as seen before the request is committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCheck {
    pub limit: u32,
    pub used: u32,
    pub reset_in_ms: u64,
}

impl QuotaCheck {
    pub fn admits(&self) -> bool {
        self.used < self.limit
    }
}

/// Raw result of a bucket algorithm step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketOutcome {
    pub allowed: bool,
    pub capacity: u32,
    pub remaining: u32,
    pub reset_in_ms: u64,
    pub retry_in_ms: u64,
}

impl BucketOutcome {
    /// The bucket seen as one more quota next to the window counters
    pub fn as_quota(&self) -> QuotaCheck {
        if self.allowed {
            QuotaCheck {
                limit: self.capacity,
                used: self
                    .capacity
                    .saturating_sub(self.remaining.saturating_add(1)),
                reset_in_ms: self.reset_in_ms,
            }
        } else {
            QuotaCheck {
                limit: self.capacity,
                used: self.capacity,
                reset_in_ms: self.retry_in_ms,
            }
        }
    }
}

impl RateLimitDecision {
    /// Combine a bucket step with the hour and minute window counters
    pub fn from_bucket(outcome: BucketOutcome, windows: [QuotaCheck; 2]) -> Self {
        let [hour, minute] = windows;
        Self::from_windows(&[outcome.as_quota(), hour, minute])
    }
}

fn millis_to_secs(ms: u64) -> u64 {
    ms.div_ceil(1000)
}

/// Counter for a wall-clock aligned window
#[derive(Debug, Clone, Default)]
pub struct FixedCounter {
    window_start: u64,
    count: u32,
}

impl FixedCounter {
    fn check(&mut self, limit: u32, period: u64, now: u64) -> QuotaCheck {
        let start = now / period * period;
        if start != self.window_start {
            self.window_start = start;
            self.count = 0;
        }

        QuotaCheck {
            limit,
            used: self.count,
            reset_in_ms: start + period - now,
        }
    }

    fn commit(&mut self) {
        self.count = self.count.saturating_add(1);
    }
}

/// Ring of sub-window counters, oldest first
#[derive(Debug, Clone, Default)]
pub struct SlidingCounter {
    buckets: VecDeque<(u64, u32)>,
}

impl SlidingCounter {
    fn slot(period: u64, sub_windows: u32, now: u64) -> (u64, u64) {
        let size = (period / u64::from(sub_windows.max(1))).max(1);
        (size, now / size)
    }

    fn check(&mut self, limit: u32, period: u64, sub_windows: u32, now: u64) -> QuotaCheck {
        let n = u64::from(sub_windows.max(1));
        let (size, current) = Self::slot(period, sub_windows, now);
        let oldest_live = (current + 1).saturating_sub(n);

        while matches!(self.buckets.front(), Some((idx, _)) if *idx < oldest_live) {
            self.buckets.pop_front();
        }

        let used = self
            .buckets
            .iter()
            .fold(0u32, |acc, (_, c)| acc.saturating_add(*c));

        // Time until the oldest counted sub-window slides out
        let reset_in_ms = match self.buckets.front() {
            Some((idx, _)) => ((idx + n) * size).saturating_sub(now),
            None => size * n,
        };

        QuotaCheck {
            limit,
            used,
            reset_in_ms,
        }
    }

    fn commit(&mut self, period: u64, sub_windows: u32, now: u64) {
        let (_, current) = Self::slot(period, sub_windows, now);

        match self.buckets.back_mut() {
            Some((idx, count)) if *idx >= current => *count = count.saturating_add(1),
            _ => self.buckets.push_back((current, 1)),
        }
    }
}

/// Fill level of a token or leaky bucket
///
/// `check_*` applies elapsed refill or drain and reports the outcome as if
/// the request were taken; `commit_*` takes it.
#[derive(Debug, Clone)]
pub struct Bucket {
    level: f64,
    last_ms: u64,
}

impl Bucket {
    fn advance(&mut self, now: u64) -> f64 {
        let elapsed = now.saturating_sub(self.last_ms);
        self.last_ms = self.last_ms.max(now);
        elapsed as f64
    }

    /// Token bucket: level is the number of tokens available
    fn check_token(&mut self, capacity: u32, per_hour: u32, now: u64) -> BucketOutcome {
        let cap = f64::from(capacity);
        let per_hour = f64::from(per_hour);
        let hour = HOUR_MS as f64;

        let elapsed = self.advance(now);
        self.level = (self.level + elapsed * per_hour / hour).min(cap);

        let allowed = self.level >= 1.0;
        let after = if allowed { self.level - 1.0 } else { self.level };

        BucketOutcome {
            allowed,
            capacity,
            remaining: after.floor() as u32,
            reset_in_ms: ((cap - after) * hour / per_hour).ceil() as u64,
            retry_in_ms: if allowed {
                0
            } else {
                ((1.0 - self.level) * hour / per_hour).ceil() as u64
            },
        }
    }

    fn commit_token(&mut self) {
        self.level -= 1.0;
    }

    /// Leaky bucket: level is the amount of water queued for draining
    fn check_pour(&mut self, capacity: u32, per_hour: u32, now: u64) -> BucketOutcome {
        let cap = f64::from(capacity);
        let per_hour = f64::from(per_hour);
        let hour = HOUR_MS as f64;

        let elapsed = self.advance(now);
        self.level = (self.level - elapsed * per_hour / hour).max(0.0);

        let allowed = self.level + 1.0 <= cap;
        let after = if allowed { self.level + 1.0 } else { self.level };

        BucketOutcome {
            allowed,
            capacity,
            remaining: (cap - after).max(0.0).floor() as u32,
            reset_in_ms: (after * hour / per_hour).ceil() as u64,
            retry_in_ms: if allowed {
                0
            } else {
                ((self.level + 1.0 - cap) * hour / per_hour).ceil() as u64
            },
        }
    }

    fn commit_pour(&mut self) {
        self.level += 1.0;
    }
}

/// Mutable limiter state for one key under one algorithm
#[derive(Debug, Clone)]
pub enum LimiterState {
    FixedWindow {
        hour: FixedCounter,
        minute: FixedCounter,
    },
    SlidingWindow {
        hour: SlidingCounter,
        minute: SlidingCounter,
    },
    /// Buckets shape the burst; the fixed counters still cap each period
    TokenBucket {
        bucket: Bucket,
        hour: FixedCounter,
        minute: FixedCounter,
    },
    LeakyBucket {
        bucket: Bucket,
        hour: FixedCounter,
        minute: FixedCounter,
    },
}

impl LimiterState {
    /// Fresh state: empty windows, a full token bucket, an empty leaky bucket
    pub fn new(policy: &LimitPolicy, now: u64) -> Self {
        match policy.algorithm {
            Algorithm::FixedWindow => Self::FixedWindow {
                hour: FixedCounter::default(),
                minute: FixedCounter::default(),
            },
            Algorithm::SlidingWindow => Self::SlidingWindow {
                hour: SlidingCounter::default(),
                minute: SlidingCounter::default(),
            },
            Algorithm::TokenBucket => Self::TokenBucket {
                bucket: Bucket {
                    level: f64::from(policy.per_minute),
                    last_ms: now,
                },
                hour: FixedCounter::default(),
                minute: FixedCounter::default(),
            },
            Algorithm::LeakyBucket => Self::LeakyBucket {
                bucket: Bucket {
                    level: 0.0,
                    last_ms: now,
                },
                hour: FixedCounter::default(),
                minute: FixedCounter::default(),
            },
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::FixedWindow { .. } => Algorithm::FixedWindow,
            Self::SlidingWindow { .. } => Algorithm::SlidingWindow,
            Self::TokenBucket { .. } => Algorithm::TokenBucket,
            Self::LeakyBucket { .. } => Algorithm::LeakyBucket,
        }
    }

    /// Decide one request and commit it if admitted
    pub fn acquire(&mut self, policy: &LimitPolicy, now: u64) -> RateLimitDecision {
        if self.algorithm() != policy.algorithm {
            *self = Self::new(policy, now);
        }

        match self {
            Self::FixedWindow { hour, minute } => {
                let checks = [
                    hour.check(policy.per_hour, HOUR_MS, now),
                    minute.check(policy.per_minute, MINUTE_MS, now),
                ];
                let decision = RateLimitDecision::from_windows(&checks);
                if decision.allowed {
                    hour.commit();
                    minute.commit();
                }
                decision
            }
            Self::SlidingWindow { hour, minute } => {
                let n = policy.sub_windows;
                let checks = [
                    hour.check(policy.per_hour, HOUR_MS, n, now),
                    minute.check(policy.per_minute, MINUTE_MS, n, now),
                ];
                let decision = RateLimitDecision::from_windows(&checks);
                if decision.allowed {
                    hour.commit(HOUR_MS, n, now);
                    minute.commit(MINUTE_MS, n, now);
                }
                decision
            }
            Self::TokenBucket {
                bucket,
                hour,
                minute,
            } => {
                let outcome = bucket.check_token(policy.per_minute, policy.per_hour, now);
                let decision = RateLimitDecision::from_bucket(
                    outcome,
                    [
                        hour.check(policy.per_hour, HOUR_MS, now),
                        minute.check(policy.per_minute, MINUTE_MS, now),
                    ],
                );
                if decision.allowed {
                    bucket.commit_token();
                    hour.commit();
                    minute.commit();
                }
                decision
            }
            Self::LeakyBucket {
                bucket,
                hour,
                minute,
            } => {
                let outcome = bucket.check_pour(policy.per_minute, policy.per_hour, now);
                let decision = RateLimitDecision::from_bucket(
                    outcome,
                    [
                        hour.check(policy.per_hour, HOUR_MS, now),
                        minute.check(policy.per_minute, MINUTE_MS, now),
                    ],
                );
                if decision.allowed {
                    bucket.commit_pour();
                    hour.commit();
                    minute.commit();
                }
                decision
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 600 * MINUTE_MS;

    fn policy(algorithm: Algorithm, per_hour: u32, per_minute: u32) -> LimitPolicy {
        LimitPolicy {
            algorithm,
            per_hour,
            per_minute,
            sub_windows: 12,
        }
    }

    fn admitted(state: &mut LimiterState, policy: &LimitPolicy, now: u64, n: usize) -> usize {
        (0..n).filter(|_| state.acquire(policy, now).allowed).count()
    }

    #[test]
    fn test_fixed_window_resets_at_boundary() {
        let p = policy(Algorithm::FixedWindow, 1_000, 3);
        let now = T0 + 15_000;
        let mut state = LimiterState::new(&p, now);

        assert_eq!(admitted(&mut state, &p, now, 3), 3);

        let rejected = state.acquire(&p, now);
        assert!(!rejected.allowed);
        assert_eq!(rejected.retry_after, Some(45));
        assert_eq!(rejected.limit, 3);
        assert_eq!(rejected.remaining, 0);

        assert!(!state.acquire(&p, T0 + MINUTE_MS - 1).allowed);
        assert!(state.acquire(&p, T0 + MINUTE_MS).allowed);
    }

    #[test]
    fn test_fixed_window_hour_quota_binds() {
        let p = policy(Algorithm::FixedWindow, 5, 100);
        let mut state = LimiterState::new(&p, T0);

        assert_eq!(admitted(&mut state, &p, T0, 10), 5);

        let rejected = state.acquire(&p, T0 + MINUTE_MS);
        assert!(!rejected.allowed);
        assert_eq!(rejected.limit, 5);
        assert_eq!(rejected.retry_after, Some((HOUR_MS - MINUTE_MS) / 1000));

        // The rejected requests never reached the minute counter
        if let LimiterState::FixedWindow { minute, .. } = &state {
            assert_eq!(minute.count, 0);
        } else {
            panic!("unexpected state");
        }
    }

    #[test]
    fn test_remaining_reports_tightest_quota() {
        let p = policy(Algorithm::FixedWindow, 1_000, 10);
        let mut state = LimiterState::new(&p, T0);

        let first = state.acquire(&p, T0);
        assert!(first.allowed);
        assert_eq!(first.limit, 10);
        assert_eq!(first.remaining, 9);
        assert_eq!(first.reset_in_seconds, 60);
    }

    #[test]
    fn test_sliding_window_trails_across_boundary() {
        let p = LimitPolicy {
            sub_windows: 4,
            ..policy(Algorithm::SlidingWindow, 1_000, 4)
        };
        let mut state = LimiterState::new(&p, T0);

        assert_eq!(admitted(&mut state, &p, T0, 2), 2);
        assert_eq!(admitted(&mut state, &p, T0 + 15_000, 2), 2);

        let rejected = state.acquire(&p, T0 + 20_000);
        assert!(!rejected.allowed);
        assert_eq!(rejected.retry_after, Some(40));

        // A fixed window would have reset here; the trailing window has not
        assert!(!state.acquire(&p, T0 + 59_999).allowed);

        // The first sub-window slides out
        assert_eq!(admitted(&mut state, &p, T0 + MINUTE_MS, 3), 2);
    }

    #[test]
    fn test_token_bucket_refills_one_token() {
        let p = policy(Algorithm::TokenBucket, 3_600, 5);
        let start = T0 + 59_000;
        let mut state = LimiterState::new(&p, start);

        assert_eq!(admitted(&mut state, &p, start, 5), 5);

        let rejected = state.acquire(&p, start);
        assert!(!rejected.allowed);
        assert_eq!(rejected.retry_after, Some(1));

        // New minute window, but only one token has come back
        let later = T0 + MINUTE_MS;
        assert!(state.acquire(&p, later).allowed);
        assert!(!state.acquire(&p, later).allowed);
    }

    #[test]
    fn test_token_bucket_caps_at_capacity() {
        let p = policy(Algorithm::TokenBucket, 3_600, 5);
        let mut state = LimiterState::new(&p, T0);

        assert_eq!(admitted(&mut state, &p, T0 + HOUR_MS, 10), 5);
    }

    #[test]
    fn test_leaky_bucket_rejects_overflow() {
        let p = policy(Algorithm::LeakyBucket, 3_600, 3);
        let start = T0 + 59_000;
        let mut state = LimiterState::new(&p, start);

        assert_eq!(admitted(&mut state, &p, start, 3), 3);

        let rejected = state.acquire(&p, start);
        assert!(!rejected.allowed);
        assert_eq!(rejected.retry_after, Some(1));

        assert!(state.acquire(&p, T0 + MINUTE_MS).allowed);

        let rejected = state.acquire(&p, T0 + MINUTE_MS + 500);
        assert!(!rejected.allowed);
        assert_eq!(rejected.retry_after, Some(1));
    }

    #[test]
    fn test_algorithm_change_resets_state() {
        let fixed = policy(Algorithm::FixedWindow, 1_000, 1);
        let bucket = policy(Algorithm::TokenBucket, 3_600, 2);
        let mut state = LimiterState::new(&fixed, T0);

        assert!(state.acquire(&fixed, T0).allowed);
        assert!(!state.acquire(&fixed, T0).allowed);

        assert!(state.acquire(&bucket, T0).allowed);
        assert_eq!(state.algorithm(), Algorithm::TokenBucket);
    }

    #[test]
    fn test_rejected_bucket_reports_retry() {
        let rejected = BucketOutcome {
            allowed: false,
            capacity: 10,
            remaining: 0,
            reset_in_ms: 2_500,
            retry_in_ms: 1,
        };
        let open = QuotaCheck {
            limit: 1_000,
            used: 0,
            reset_in_ms: HOUR_MS,
        };

        let decision = RateLimitDecision::from_bucket(rejected, [open, open]);
        assert!(!decision.allowed);
        assert_eq!(decision.limit, 10);
        assert_eq!(decision.retry_after, Some(1));
    }

    /// One request every 500 ms for a minute, then one per second for the
    /// rest of the hour
    fn drive_for_an_hour(algorithm: Algorithm) -> (usize, usize) {
        let p = policy(algorithm, 1_000, 100);
        let mut state = LimiterState::new(&p, T0);

        let first_minute = (0..120u64)
            .filter(|i| state.acquire(&p, T0 + i * 500).allowed)
            .count();
        let rest = (60..3_600u64)
            .filter(|s| state.acquire(&p, T0 + s * 1_000).allowed)
            .count();

        (first_minute, first_minute + rest)
    }

    #[test]
    fn test_buckets_respect_both_quotas() {
        for algorithm in [Algorithm::TokenBucket, Algorithm::LeakyBucket] {
            let (first_minute, first_hour) = drive_for_an_hour(algorithm);

            assert!(first_minute <= 100, "{algorithm}: {first_minute} in one minute");
            assert_eq!(first_hour, 1_000, "{algorithm}: {first_hour} in one hour");
        }
    }

    #[test]
    fn test_bucket_rejected_by_hour_quota_keeps_tokens() {
        let p = policy(Algorithm::TokenBucket, 3, 10);
        let mut state = LimiterState::new(&p, T0);

        assert_eq!(admitted(&mut state, &p, T0, 10), 3);

        let rejected = state.acquire(&p, T0 + MINUTE_MS);
        assert!(!rejected.allowed);
        assert_eq!(rejected.limit, 3);

        // Hour-rejected requests did not spend tokens
        if let LimiterState::TokenBucket { bucket, .. } = &state {
            assert!(bucket.level >= 7.0);
        } else {
            panic!("unexpected state");
        }
    }
}
