//! Request-rate throttling.
//!
//! One [`TokenBucket`] is shared by all requests of a connection manager.
//! Every dispatch takes a token before it may acquire a pooled connection;
//! tokens regenerate over time at a configurable rate, up to a configurable
//! capacity. Tokens are consumed, never returned.

mod bucket;
mod config;

pub use bucket::TokenBucket;
pub use config::{RateLimitConfig, DEFAULT_MAX_TOKENS, DEFAULT_REGEN_RATE};
