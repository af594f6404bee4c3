//! Plumbing shared by the exchange adapters

pub mod rate_limiter;

pub use rate_limiter::{RateLimiter, RateLimiterConfig};
