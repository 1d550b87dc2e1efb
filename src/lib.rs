//! `espalier` is an async client core for the Filevine API.
//! "Hello world" example:
//! ```no_run
//! use espalier::{Client, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let client = Client::connect("keyfile.toml").await?;
//!   let response = client.conn().get("/core/projects", &[]).await?;
//!   println!("{}", response.status());
//!   client.close();
//!   Ok(())
//! }
//! ```
//!
//! For more specific use-cases you can build a client yourself, using the
//! `ClientBuilder` which exposes the rate limit, the connection pool, and
//! the API region and grants full flexibility:
//!
//! ```no_run
//! use espalier::{BaseUrl, ClientBuilder, RateLimitConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let client = ClientBuilder::builder()
//!       .credentials_file("keyfile.toml")
//!       .base_url(BaseUrl::Canada)
//!       .max_connections(5)
//!       .rate_limit(RateLimitConfig::new(20, 5.0))
//!       .build()
//!       .connect()
//!       .await?;
//!
//!   let projects = client.conn().get("/core/projects", &[("limit", "10")]).await?;
//!   println!("{}", projects.status());
//!   client.close();
//!   Ok(())
//! }
//! ```
// #![deny(missing_docs)]

#[cfg(doctest)]
doc_comment::doctest!("../README.md");

mod client;
mod manager;
mod pool;
mod ratelimit;
mod types;

pub use client::{Client, ClientBuilder, DEFAULT_USER_AGENT};
pub use manager::{ConnectionManager, ManagerState};
pub use pool::{EndpointKey, EndpointStats, DEFAULT_MAX_CONNECTIONS};
pub use ratelimit::{RateLimitConfig, TokenBucket, DEFAULT_MAX_TOKENS, DEFAULT_REGEN_RATE};
pub use types::*;
