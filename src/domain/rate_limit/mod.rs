//! Rate limiting domain
//!
//! Tiers, the four admission algorithms as pure state machines, the clock
//! they read time from and the storage contract for their state.

mod algorithm;
mod clock;
mod store;
mod tier;

pub use algorithm::{
    BucketOutcome, LimitPolicy, LimiterState, QuotaCheck, RateLimitDecision, HOUR_MS, MINUTE_MS,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{state_key, RateLimitStore};
pub use tier::{Algorithm, RateLimitTier, TierTable};
