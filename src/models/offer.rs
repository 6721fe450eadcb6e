//! Offer and catalog types for freebie.
//!
//! K_i: These types represent the core data flow through a claim cycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Store page for an app.
pub fn store_link(app_id: u32) -> String {
    format!("https://store.steampowered.com/app/{app_id}")
}

/// One row of a store search page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Display name
    pub name: String,

    /// Capsule image URL; the app id is embedded in its path
    #[serde(default)]
    pub logo: String,
}

impl CatalogItem {
    /// Extract the app id from the logo URL (`.../apps/<id>/...`).
    ///
    /// Bundles and subs carry no `/apps/` segment and yield `None`.
    pub fn app_id(&self) -> Option<u32> {
        let (_, rest) = self.logo.split_once("/apps/")?;
        rest.split('/').next()?.parse().ok()
    }
}

/// Filter passed to a catalog search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    /// Only discounted items
    pub specials: bool,
    /// Hide items without a price ("no DLC") flag
    pub ndl: bool,
    /// `maxprice` hint, e.g. `free`
    pub max_price: String,
}

impl SearchFilter {
    pub fn specials(max_price: impl Into<String>) -> Self {
        Self {
            specials: true,
            ndl: true,
            max_price: max_price.into(),
        }
    }
}

/// Pricing detail for one app.
///
/// K_i: Amounts are in minor currency units (cents).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceDetail {
    #[serde(default)]
    pub discount_percent: u8,

    /// Final price in cents
    #[serde(default, rename = "final")]
    pub final_price: u64,
}

/// Acceptance policy for discovered items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferPolicy {
    /// Minimum discount for a paid item, in percent
    pub discount_threshold: u8,
}

impl Default for OfferPolicy {
    fn default() -> Self {
        Self {
            discount_threshold: 80,
        }
    }
}

impl OfferPolicy {
    /// Free items always pass; paid items need a deep enough discount.
    pub fn accepts(&self, detail: &PriceDetail) -> bool {
        detail.final_price == 0 || detail.discount_percent >= self.discount_threshold
    }
}

/// A discovered catalog item that meets the offer policy.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    title: String,
    app_id: u32,
    discount_percent: u8,
    price_cents: u64,
}

impl Offer {
    pub fn new(title: impl Into<String>, app_id: u32, detail: PriceDetail) -> Self {
        Self {
            title: title.into(),
            app_id,
            discount_percent: detail.discount_percent.min(100),
            price_cents: detail.final_price,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn app_id(&self) -> u32 {
        self.app_id
    }

    pub fn discount_percent(&self) -> u8 {
        self.discount_percent
    }

    pub fn price_cents(&self) -> u64 {
        self.price_cents
    }

    /// Price in major currency units.
    pub fn price(&self) -> f64 {
        self.price_cents as f64 / 100.0
    }

    pub fn link(&self) -> String {
        store_link(self.app_id)
    }

    /// One entry of the claim summary mail.
    pub fn summary_entry(&self) -> String {
        format!(
            "{} ({}%) - ${:.2}\n{}",
            self.title,
            self.discount_percent,
            self.price(),
            self.link()
        )
    }
}

impl fmt::Display for Offer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.title, self.app_id)
    }
}

/// Outcome of a single claim cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Offers found that were not yet in the ledger
    pub discovered: usize,
    /// Offers the entitlement service granted
    pub claimed: usize,
    /// Titles written to the ledger
    pub recorded: usize,
    /// Whether a summary went out
    pub notified: bool,
}
