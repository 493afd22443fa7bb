//! Abuse guards: rate limiting and replay detection.
//!
//! Both guards are pure infrastructure: they report, the risk layer decides.
//! Every time-dependent entry point has an `_at` variant taking an explicit
//! `Instant` so tests fabricate time instead of sleeping.

mod rate_limit;
mod replay;

pub use rate_limit::{RateLimitConfig, RateLimitResult, RateLimiter, RateScope, RateSubject};
pub use replay::{command_hash, ReplayConfig, ReplayGuard};
