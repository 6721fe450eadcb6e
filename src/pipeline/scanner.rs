//! Catalog scanner: one search page → accepted, unseen offers.
//!
//! Epistemic foundation:
//! - K_i: Ledger hits are dropped before any detail request is made
//! - K_i: A failed detail lookup drops that item only, never the page
//! - B_i: Search may fail; the cycle then simply finds nothing

use crate::client::Catalog;
use crate::ledger::Ledger;
use crate::models::{Offer, OfferPolicy, SearchFilter};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Turns catalog search results into offers worth claiming.
pub struct CatalogScanner {
    catalog: Arc<dyn Catalog>,
    policy: OfferPolicy,
    filter: SearchFilter,
}

impl CatalogScanner {
    pub fn new(catalog: Arc<dyn Catalog>, policy: OfferPolicy, max_price: impl Into<String>) -> Self {
        Self {
            catalog,
            policy,
            filter: SearchFilter::specials(max_price),
        }
    }

    /// Scan one page of discounted items.
    ///
    /// Returned offers have distinct app ids and titles, and none of them is
    /// in `ledger`.
    pub async fn scan(&self, ledger: &Ledger) -> Vec<Offer> {
        let items = match self.catalog.search(&self.filter).await {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "Error fetching free games");
                return Vec::new();
            }
        };
        debug!(count = items.len(), "Search page received");

        let mut seen_ids = HashSet::new();
        let mut offers = Vec::new();

        for item in items {
            let Some(app_id) = item.app_id() else {
                debug!(name = %item.name, "No app id, skipping");
                continue;
            };
            if ledger.contains(&item.name) {
                debug!(name = %item.name, "Already recorded, skipping");
                continue;
            }
            if !seen_ids.insert(app_id) {
                continue;
            }

            let detail = match self.catalog.item_detail(app_id).await {
                Ok(Some(detail)) => detail,
                Ok(None) => {
                    debug!(app_id = app_id, "No details available, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(app_id = app_id, error = %e, "Failed to fetch details, skipping");
                    continue;
                }
            };

            if !self.policy.accepts(&detail) {
                continue;
            }
            if offers.iter().any(|o: &Offer| o.title() == item.name) {
                continue;
            }
            offers.push(Offer::new(item.name, app_id, detail));
        }

        offers.retain(|offer| !ledger.contains(offer.title()));
        offers
    }
}
