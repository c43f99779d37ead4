//! Attaches subscription demand and issue economics to each candidate.
//!
//! Candidates are enriched concurrently, bounded by a semaphore. Each fetch
//! fails on its own: the record keeps `None` for that section and stays in
//! the batch. Output order always equals input order.

use crate::models::ListingRecord;
use crate::scraper::IpoDataSource;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnrichStats {
    pub failed_fetches: usize,
}

/// Enrich one record in place. Returns how many of its two fetches failed.
pub async fn enrich_one(source: &dyn IpoDataSource, record: &mut ListingRecord) -> usize {
    let mut failed = 0;

    match source.fetch_subscription(record).await {
        Ok(sub) => record.subscription = Some(sub),
        Err(e) => {
            warn!("{}: subscription lookup failed: {:#}", record.name, e);
            failed += 1;
        }
    }

    match source.fetch_issue_info(record).await {
        Ok(info) => record.issue_info = Some(info),
        Err(e) => {
            warn!("{}: issue info lookup failed: {:#}", record.name, e);
            failed += 1;
        }
    }

    debug!("{}: enriched ({} failed fetch(es))", record.name, failed);
    failed
}

pub async fn enrich_all(
    source: Arc<dyn IpoDataSource>,
    candidates: Vec<ListingRecord>,
    concurrency: usize,
) -> (Vec<ListingRecord>, EnrichStats) {
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(candidates.len());

    for record in candidates {
        let source = Arc::clone(&source);
        let sem = Arc::clone(&sem);
        let fallback = record.clone();

        let handle = tokio::spawn(async move {
            // The semaphore is never closed, so acquire cannot fail.
            let _permit = sem.acquire_owned().await.ok();
            let mut record = record;
            let failed = enrich_one(source.as_ref(), &mut record).await;
            (record, failed)
        });

        handles.push((fallback, handle));
    }

    let mut stats = EnrichStats::default();
    let mut enriched = Vec::with_capacity(handles.len());

    // Awaiting in spawn order keeps the filter's ordering.
    for (fallback, handle) in handles {
        match handle.await {
            Ok((record, failed)) => {
                stats.failed_fetches += failed;
                enriched.push(record);
            }
            Err(e) => {
                error!("Enrichment task for {} panicked: {}", fallback.name, e);
                stats.failed_fetches += 2;
                enriched.push(fallback);
            }
        }
    }

    (enriched, stats)
}
