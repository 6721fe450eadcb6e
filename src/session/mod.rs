//! Session module: the authenticated connection and what hangs off it.
//!
//! Provides:
//! - `SessionManager`: Logon, state machine, hand-off to the claim loop
//! - `ActiveProducts`: Serialized writer for the games-played set
//! - `SentryStore`: Persisted session continuity blob
//! - `guard`: Two-factor code generation

pub mod guard;
mod manager;
mod products;
mod sentry;

pub use manager::*;
pub use products::*;
pub use sentry::*;

#[cfg(test)]
pub(crate) use products::fake;
