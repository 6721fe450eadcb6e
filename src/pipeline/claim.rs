//! Batch license claims.

use crate::client::EntitlementClient;
use crate::models::Offer;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

/// Requests free licenses for a batch of offers.
pub struct ClaimExecutor {
    client: Arc<dyn EntitlementClient>,
}

impl ClaimExecutor {
    pub fn new(client: Arc<dyn EntitlementClient>) -> Self {
        Self { client }
    }

    /// Claim every offer in one request and return the granted app ids.
    ///
    /// A failed request is logged and reported as nothing granted; the
    /// offers stay out of the ledger and are retried next cycle.
    pub async fn claim(&self, offers: &[Offer]) -> Vec<u32> {
        if offers.is_empty() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let app_ids: Vec<u32> = offers
            .iter()
            .map(Offer::app_id)
            .filter(|id| seen.insert(*id))
            .collect();

        match self.client.request_free_licenses(&app_ids).await {
            Ok(granted) if granted.is_empty() => {
                info!("No new games claimed");
                granted
            }
            Ok(granted) => {
                info!(app_ids = ?granted, "Claimed games");
                granted
            }
            Err(e) => {
                error!(error = %e, requested = app_ids.len(), "Error claiming games");
                Vec::new()
            }
        }
    }
}
