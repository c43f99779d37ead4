//! Renders enriched candidates as one chat message.
//!
//! Emphasis uses single asterisks; each offering is a bullet block and
//! blocks are separated by a blank line. Scraped text is escaped so a stray
//! `_` or `*` in a company name cannot open an entity.

use crate::config::FilterConfig;
use crate::filter::MIN_CANDIDATES;
use crate::models::{BiddingSnapshot, Category, IssueInfo, ListingRecord, Subscription};
use crate::utils::fmt_percent;

/// `None` when there is nothing to alert on.
pub fn compose(
    candidates: &[ListingRecord],
    used_fallback: bool,
    criteria: &FilterConfig,
) -> Option<String> {
    if candidates.is_empty() {
        return None;
    }

    let mut sections = vec![format!(
        "*IPO alert: offerings closing within {} day(s)*",
        criteria.window_days
    )];

    if used_fallback {
        let lowered = criteria.fallback_threshold.unwrap_or(criteria.gmp_threshold);
        sections.push(format!(
            "⚠️ *Attention:* fewer than {} offerings cleared {}% GMP, so the bar was lowered to {}%",
            MIN_CANDIDATES,
            fmt_percent(criteria.gmp_threshold),
            fmt_percent(lowered)
        ));
    }

    for category in Category::ORDER {
        let mut in_category = candidates.iter().filter(|r| r.category == category).peekable();
        if in_category.peek().is_none() {
            continue;
        }
        sections.push(format!("*{} IPOs*", category));
        sections.extend(in_category.map(render_block));
    }

    Some(sections.join("\n\n"))
}

/// Backslash-escape the characters chat markdown treats as entity markers.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn render_block(r: &ListingRecord) -> String {
    let mut lines = vec![format!("• *{}*", escape_markdown(&r.name))];

    lines.push(match r.listing_gain_percent {
        Some(g) => format!("GMP: {}%", fmt_percent(g)),
        None => "GMP: n/a".to_string(),
    });

    if let Some(info) = &r.issue_info {
        lines.extend(issue_lines(info));
    }

    if let Some(date) = r.close_date {
        lines.push(format!("Closes: {}", date.format("%d %b %Y")));
    }

    lines.push(match &r.subscription {
        Some(Subscription::Bidding(snap)) => bidding_line(snap),
        Some(Subscription::Upcoming(text)) => format!("Subscription: {}", escape_markdown(text)),
        None => "Subscription: data unavailable".to_string(),
    });

    lines.join("\n")
}

fn issue_lines(info: &IssueInfo) -> Vec<String> {
    let mut lines = Vec::new();
    let esc = |v: &Option<String>| v.as_deref().map(escape_markdown);

    if let Some(price) = esc(&info.issue_price) {
        lines.push(format!("Issue price: {}", price));
    }
    match (esc(&info.lot_size), esc(&info.lot_amount)) {
        (Some(size), Some(amount)) => lines.push(format!("Lot: {} ({})", size, amount)),
        (Some(size), None) => lines.push(format!("Lot: {}", size)),
        (None, Some(amount)) => lines.push(format!("Lot amount: {}", amount)),
        (None, None) => {}
    }
    if let Some(size) = esc(&info.issue_size) {
        lines.push(format!("Issue size: {}", size));
    }
    lines
}

fn bidding_line(snap: &BiddingSnapshot) -> String {
    let parts: Vec<String> = [
        ("QIB", &snap.qualified_institutional),
        ("NII", &snap.non_institutional),
        ("Retail", &snap.retail),
        ("Total", &snap.total),
    ]
    .into_iter()
    .filter_map(|(label, v)| v.as_deref().map(|v| format!("{} {}", label, escape_markdown(v))))
    .collect();

    if parts.is_empty() {
        format!("Subscription (day {}): no figures yet", snap.bidding_day)
    } else {
        format!("Subscription (day {}): {}", snap.bidding_day, parts.join(" | "))
    }
}
