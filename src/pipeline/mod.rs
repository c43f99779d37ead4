//! Pipeline orchestrator: listing → extract → filter → enrich → compose → notify.
//!
//! One `run()` is one alert. Records live only for the duration of the run.
//!
//! Failure modes:
//!   - listing fetch failure aborts the run (nothing to alert on)
//!   - a malformed row is skipped and counted
//!   - an enrichment failure degrades that one candidate
//!   - a delivery failure is returned to the caller, no retry

use crate::composer::compose;
use crate::config::AppConfig;
use crate::enricher::enrich_all;
use crate::filter::select_candidates;
use crate::models::ListingRecord;
use crate::notifier::Notifier;
use crate::scraper::IpoDataSource;
use crate::scraper::cleaner::extract_records;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;
use url::Url;

pub struct Pipeline {
    config: AppConfig,
    source: Arc<dyn IpoDataSource>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub listed: usize,
    pub skipped: usize,
    pub candidates: usize,
    pub used_fallback: bool,
    pub enrichment_failures: usize,
    pub delivered: bool,
}

impl Pipeline {
    pub fn new(config: AppConfig, source: Arc<dyn IpoDataSource>) -> Self {
        Self { config, source }
    }

    /// Fetch the listing and normalize every row. Returns the records and
    /// the number of rows skipped as malformed.
    pub async fn fetch_records(&self, today: NaiveDate) -> Result<(Vec<ListingRecord>, usize)> {
        let site_root = Url::parse(&self.config.scraper.site_root)
            .with_context(|| format!("Invalid site_root {:?}", self.config.scraper.site_root))?;

        let rows = self
            .source
            .fetch_listing()
            .await
            .context("Listing fetch failed")?;

        Ok(extract_records(&rows, &site_root, today))
    }

    pub async fn run(&self, notifier: &dyn Notifier, today: NaiveDate) -> Result<RunStats> {
        let mut stats = RunStats::default();

        // ── 1. Listing ─────────────────────────────────────────────────────────
        info!("=== Step 1: Reading live GMP listing ===");
        let (records, skipped) = self.fetch_records(today).await?;
        stats.listed = records.len();
        stats.skipped = skipped;
        info!("{} offerings listed, {} malformed rows skipped", records.len(), skipped);

        // ── 2. Eligibility ─────────────────────────────────────────────────────
        info!("=== Step 2: Filtering candidates ===");
        let outcome = select_candidates(records, &self.config.filter, today);
        stats.candidates = outcome.candidates.len();
        stats.used_fallback = outcome.used_fallback;

        if outcome.candidates.is_empty() {
            info!("No offering qualifies, nothing to send");
            return Ok(stats);
        }

        // ── 3. Enrichment ──────────────────────────────────────────────────────
        info!("=== Step 3: Enriching {} candidate(s) ===", outcome.candidates.len());
        let (enriched, enrich_stats) = enrich_all(
            Arc::clone(&self.source),
            outcome.candidates,
            self.config.pipeline.concurrency,
        )
        .await;
        stats.enrichment_failures = enrich_stats.failed_fetches;

        // ── 4. Compose + deliver ───────────────────────────────────────────────
        let Some(message) = compose(&enriched, outcome.used_fallback, &self.config.filter) else {
            return Ok(stats);
        };

        info!("=== Step 4: Sending alert via {} ===", notifier.name());
        let delivery = notifier
            .send(&message)
            .await
            .with_context(|| format!("Delivery via {} failed", notifier.name()))?;
        stats.delivered = true;

        info!(
            "=== Done: {} listed | {} skipped | {} candidates{} | {} enrichment failures | {} part(s) via {} ===",
            stats.listed,
            stats.skipped,
            stats.candidates,
            if stats.used_fallback { " (fallback)" } else { "" },
            stats.enrichment_failures,
            delivery.parts,
            delivery.provider,
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use crate::models::{IssueInfo, RawListingRow, Subscription};
    use crate::notifier::Delivery;
    use anyhow::{anyhow, bail};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeSource {
        rows: Option<Vec<RawListingRow>>,
    }

    #[async_trait]
    impl IpoDataSource for FakeSource {
        async fn fetch_listing(&self) -> Result<Vec<RawListingRow>> {
            match &self.rows {
                Some(rows) => Ok(rows.clone()),
                None => bail!("connection refused"),
            }
        }

        async fn fetch_subscription(&self, record: &ListingRecord) -> Result<Subscription> {
            if record.name == "Gamma" {
                return Err(anyhow!("HTTP 500"));
            }
            Ok(Subscription::Upcoming("Bidding not open yet".into()))
        }

        async fn fetch_issue_info(&self, _record: &ListingRecord) -> Result<IssueInfo> {
            Ok(IssueInfo {
                issue_price: Some("₹100".into()),
                ..Default::default()
            })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, text: &str) -> Result<Delivery, NotifyError> {
            if self.fail {
                return Err(NotifyError::Rejected {
                    provider: "recording",
                    status: 401,
                    body: "unauthorized".into(),
                });
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(Delivery { provider: "recording", parts: 1 })
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn row(name: &str, category: &str, gain: &str, close: &str) -> RawListingRow {
        RawListingRow {
            name_html: Some(format!(
                r#"<a href="/gmp/{0}-ipo-gmp/1/" target="_parent">{0} IPO</a>"#,
                name
            )),
            category: Some(category.into()),
            gain: Some(gain.into()),
            close: Some(close.into()),
            detail_path: Some(format!("/gmp/{}-ipo-gmp/1/", name.to_lowercase())),
        }
    }

    fn pipeline(rows: Option<Vec<RawListingRow>>, fallback: Option<f64>) -> Pipeline {
        let mut config = AppConfig::default();
        config.filter.window_days = 5;
        config.filter.gmp_threshold = 20.0;
        config.filter.fallback_threshold = fallback;
        Pipeline::new(config, Arc::new(FakeSource { rows }))
    }

    #[tokio::test]
    async fn test_end_to_end_alpha_beta() {
        let rows = vec![
            row("Alpha", "Mainboard", "(25.0%)", "12-Mar"),
            row("Beta", "SME", "--", "13-Mar"),
            row("Broken", "SME", "(12%", "13-Mar"),
        ];
        let notifier = RecordingNotifier::default();
        let stats = pipeline(Some(rows), None).run(&notifier, today()).await.unwrap();

        assert_eq!(stats.listed, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.candidates, 1);
        assert!(stats.delivered);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("*Alpha*"));
        assert!(!sent[0].contains("Beta"));
        assert!(sent[0].contains("Subscription: Bidding not open yet"));
        assert!(sent[0].contains("Issue price: ₹100"));
    }

    #[tokio::test]
    async fn test_fallback_run_with_enrichment_failure() {
        let rows = vec![
            row("Alpha", "Mainboard", "(25.0%)", "11-Mar"),
            row("Gamma", "SME", "(12.0%)", "12-Mar"),
            row("Delta", "Mainboard", "(15.5%)", "13-Mar"),
        ];
        let notifier = RecordingNotifier::default();
        let stats = pipeline(Some(rows), Some(10.0))
            .run(&notifier, today())
            .await
            .unwrap();

        assert_eq!(stats.candidates, 3);
        assert!(stats.used_fallback);
        assert_eq!(stats.enrichment_failures, 1);

        let sent = notifier.sent.lock().unwrap();
        assert!(sent[0].contains("lowered to 10%"));
        assert!(sent[0].contains("*Gamma*"));
        assert!(sent[0].contains("Subscription: data unavailable"));
        assert!(sent[0].find("*Alpha*").unwrap() < sent[0].find("*Delta*").unwrap());
    }

    #[tokio::test]
    async fn test_nothing_to_send() {
        let rows = vec![row("Alpha", "Mainboard", "(5.0%)", "12-Mar")];
        let notifier = RecordingNotifier::default();
        let stats = pipeline(Some(rows), None).run(&notifier, today()).await.unwrap();

        assert_eq!(stats.candidates, 0);
        assert!(!stats.delivered);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal() {
        let notifier = RecordingNotifier::default();
        let err = pipeline(None, None).run(&notifier, today()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("connection refused"));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_reported() {
        let rows = vec![row("Alpha", "Mainboard", "(25.0%)", "12-Mar")];
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let err = pipeline(Some(rows), None).run(&notifier, today()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("401"));
    }
}
