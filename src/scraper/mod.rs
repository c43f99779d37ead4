pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::config::ScraperConfig;
use crate::models::{IssueInfo, ListingRecord, RawListingRow, Subscription};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use self::cleaner::{View, issue_info_from_pairs, latest_subscription, view_url};
use self::http_client::HttpClient;
use self::parsers::{parse_label_values, parse_listing_document, parse_subscription_document};

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable data source abstraction.
#[async_trait]
pub trait IpoDataSource: Send + Sync {
    /// Raw rows of the live listing, in document order.
    async fn fetch_listing(&self) -> Result<Vec<RawListingRow>>;
    async fn fetch_subscription(&self, record: &ListingRecord) -> Result<Subscription>;
    async fn fetch_issue_info(&self, record: &ListingRecord) -> Result<IssueInfo>;
}

// ── investorgain scraper ──────────────────────────────────────────────────────

pub struct InvestorGainScraper {
    client: HttpClient,
    listing_url: String,
}

impl InvestorGainScraper {
    pub fn new(config: &ScraperConfig, client: HttpClient) -> Self {
        Self {
            client,
            listing_url: config.listing_url.clone(),
        }
    }
}

fn derived_url(record: &ListingRecord, view: View) -> Result<String> {
    view_url(&record.detail_url, view)
        .with_context(|| format!("Cannot derive {:?} page from {}", view, record.detail_url))
}

#[async_trait]
impl IpoDataSource for InvestorGainScraper {
    async fn fetch_listing(&self) -> Result<Vec<RawListingRow>> {
        info!("Fetching live GMP listing ({})", self.listing_url);

        let body = self
            .client
            .get_text(&self.listing_url)
            .await
            .context("Failed to fetch the GMP listing")?;

        let rows = parse_listing_document(&body)?;
        info!("Listing: {} raw rows", rows.len());
        Ok(rows)
    }

    async fn fetch_subscription(&self, record: &ListingRecord) -> Result<Subscription> {
        let url = derived_url(record, View::Subscription)?;
        let body = self.client.get_text(&url).await?;
        let days = parse_subscription_document(&body)
            .with_context(|| format!("Bad subscription page for {}", record.name))?;

        debug!("{}: {} subscription day(s)", record.name, days.len());
        Ok(latest_subscription(&days))
    }

    async fn fetch_issue_info(&self, record: &ListingRecord) -> Result<IssueInfo> {
        let url = derived_url(record, View::Issue)?;
        let body = self.client.get_text(&url).await?;
        let pairs = parse_label_values(&body);

        let info = issue_info_from_pairs(&pairs);
        if info.is_empty() {
            debug!("{}: no issue details on {}", record.name, url);
        }
        Ok(info)
    }
}
