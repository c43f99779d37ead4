//! Eligibility filter: close-date window plus a GMP threshold, with an
//! optional lower threshold when the first pass finds too few offerings.

use crate::config::FilterConfig;
use crate::models::ListingRecord;
use chrono::NaiveDate;
use tracing::{debug, info};

/// Below this many first-pass candidates the fallback threshold kicks in.
pub const MIN_CANDIDATES: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    /// Survivors in source order.
    pub candidates: Vec<ListingRecord>,
    pub used_fallback: bool,
}

pub fn select_candidates(
    records: Vec<ListingRecord>,
    criteria: &FilterConfig,
    today: NaiveDate,
) -> FilterOutcome {
    let window = i64::from(criteria.window_days);

    // Records without a gain or close date never qualify.
    let timely: Vec<(ListingRecord, f64)> = records
        .into_iter()
        .filter_map(|r| {
            let gain = r.listing_gain_percent?;
            let delta = (r.close_date? - today).num_days();
            if (0..window).contains(&delta) {
                Some((r, gain))
            } else {
                debug!("{}: closes in {} day(s), outside window", r.name, delta);
                None
            }
        })
        .collect();

    let passing = |threshold: f64| timely.iter().filter(|(_, g)| *g >= threshold).count();

    let mut threshold = criteria.gmp_threshold;
    let mut used_fallback = false;

    let primary = passing(threshold);
    if primary < MIN_CANDIDATES {
        if let Some(fallback) = criteria.fallback_threshold {
            info!(
                "Only {} offering(s) at GMP >= {}%, retrying with fallback {}%",
                primary, threshold, fallback
            );
            threshold = fallback;
            used_fallback = true;
        }
    }

    let candidates: Vec<ListingRecord> = timely
        .into_iter()
        .filter(|(_, g)| *g >= threshold)
        .map(|(r, _)| r)
        .collect();

    info!(
        "{} candidate(s) closing within {} day(s) at GMP >= {}%",
        candidates.len(),
        criteria.window_days,
        threshold
    );

    FilterOutcome {
        candidates,
        used_fallback,
    }
}
