//! External service clients.
//!
//! - `Catalog` / `StoreClient`: Steam store search and pricing
//! - `EntitlementClient` / `BridgeClient`: the authenticated session
//! - `RateLimiter`: per-endpoint backoff shared by the store client

mod bridge;
mod catalog;
mod rate_limiter;
mod session;

pub use bridge::*;
pub use catalog::*;
pub use rate_limiter::*;
pub use session::*;
