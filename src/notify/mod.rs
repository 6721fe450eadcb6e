//! Operator notification channel.
//!
//! Epistemic foundation:
//! - K_i: One consolidated message per cycle, never one per offer
//! - B_i: The relay accepts the message within the timeout (might fail)
//! - I^B: Delivery beyond the relay is unknowable; a send error is only logged upstream

mod smtp;

pub use smtp::*;

use crate::models::{Offer, Result};
use async_trait::async_trait;
use tracing::info;

/// Outbound `send(subject, body)` capability.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// Mail body listing every claimed offer, separated by a blank line.
pub fn claim_summary(offers: &[Offer]) -> String {
    offers
        .iter()
        .map(Offer::summary_entry)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Notifier that only writes the message to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        info!(subject = subject, "Notification (dry run)\n{}", body);
        Ok(())
    }
}
