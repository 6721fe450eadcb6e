//! Pipeline module - the offer discovery and claim loop.
//!
//! Cycle flow:
//! Catalog search → Scanner (policy + ledger) → Claim batch → Notify → Ledger

mod claim;
mod scanner;
mod scheduler;

pub use claim::*;
pub use scanner::*;
pub use scheduler::*;
