//! Ledger module for claim deduplication.
//!
//! Provides:
//! - `Ledger`: Durable record of offer titles already claimed

mod store;

pub use store::*;
