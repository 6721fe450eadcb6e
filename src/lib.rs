//! freebie - keeps a Steam session idling and claims free games as they appear.
//!
//! ## Architecture
//!
//! freebie runs two cooperating loops on one authenticated session:
//! - **Session Manager**: Logs on, keeps the games-played set alive, refreshes it hourly
//! - **Claim Loop**: Scans the store, claims new free offers, notifies, records them
//!
//! A small HTTP control surface toggles the games-played set on demand.
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): A recorded title is never claimed again (append-only ledger)
//! - B_i (Beliefs): Store, session and mail calls are fallible (Result, Option)
//! - I^R (Resolvable): User-configurable parameters and env-provided secrets
//! - I^B (Bounded): Network uncertainty (retry, backoff, randomized schedule)

pub mod client;
pub mod control;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod session;

// Re-exports for convenience
pub use client::{BridgeClient, Catalog, EntitlementClient, RateLimiter, StoreClient};
pub use ledger::Ledger;
pub use models::{Config, FreebieError, Offer, Result, Secrets};
pub use notify::{LogNotifier, Notifier, SmtpNotifier};
pub use pipeline::{CatalogScanner, ClaimExecutor, ClaimLoop};
pub use session::{ActiveProducts, SentryStore, SessionManager, SessionSettings};
