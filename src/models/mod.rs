use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Category ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Mainboard,
    Sme,
}

impl Category {
    /// Order in which categories appear in the alert.
    pub const ORDER: [Category; 2] = [Category::Mainboard, Category::Sme];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Category::Mainboard => "Mainboard",
            Category::Sme => "SME",
        })
    }
}

// ── Listing record ────────────────────────────────────────────────────────────

/// One upcoming offering, normalized from a single listing entry.
///
/// `subscription` and `issue_info` stay `None` until the enricher has run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    pub name: String,
    pub category: Category,
    pub close_date: Option<NaiveDate>,
    pub listing_gain_percent: Option<f64>,
    pub detail_url: String,
    pub subscription: Option<Subscription>,
    pub issue_info: Option<IssueInfo>,
}

// ── Enrichment ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Subscription {
    /// Bidding has not opened; carries the text shown to the reader.
    Upcoming(String),
    Bidding(BiddingSnapshot),
}

/// Latest day-wise demand figures, each already rendered as `"<value>x"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BiddingSnapshot {
    pub bidding_day: u32,
    pub retail: Option<String>,
    pub non_institutional: Option<String>,
    pub qualified_institutional: Option<String>,
    pub total: Option<String>,
}

/// Issue economics, copied verbatim from the detail page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IssueInfo {
    pub issue_price: Option<String>,
    pub lot_size: Option<String>,
    pub lot_amount: Option<String>,
    pub issue_size: Option<String>,
}

impl IssueInfo {
    pub fn is_empty(&self) -> bool {
        self.issue_price.is_none()
            && self.lot_size.is_none()
            && self.lot_amount.is_none()
            && self.issue_size.is_none()
    }
}

// ── Raw rows (parser output) ──────────────────────────────────────────────────

/// Listing entry as found in the source document, before any cleaning.
#[derive(Debug, Clone, Default)]
pub struct RawListingRow {
    pub name_html: Option<String>,
    pub category: Option<String>,
    pub gain: Option<String>,
    pub close: Option<String>,
    pub detail_path: Option<String>,
}

/// One day of the subscription series: QIB | NII | Retail | Total
#[derive(Debug, Clone, Default)]
pub struct RawBiddingDay {
    pub qualified_institutional: Option<String>,
    pub non_institutional: Option<String>,
    pub retail: Option<String>,
    pub total: Option<String>,
}
