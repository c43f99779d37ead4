use crate::error::ExtractError;
use crate::models::{BiddingSnapshot, Category, IssueInfo, ListingRecord, RawBiddingDay, RawListingRow, Subscription};
use chrono::{Datelike, Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector, node::Node};
use tracing::{debug, warn};
use url::Url;

/// Shown instead of multipliers while bidding has not opened.
pub const UPCOMING_TEXT: &str = "Bidding not open yet";

static GAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\((-?\d+(?:\.\d+)?)%\)").expect("gain regex is valid")
});

static ANCHOR_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("valid selector"));
static SPAN_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("span").expect("valid selector"));

/// Markers the source uses for "not available".
fn is_missing_marker(s: &str) -> bool {
    matches!(s.trim(), "" | "-" | "--" | "—" | "NA" | "N/A")
}

// ── Field parsers ─────────────────────────────────────────────────────────────

/// "₹128 (32.50%)" → Some(32.5) | "--" → None
pub fn parse_gain(s: &str) -> Result<Option<f64>, ExtractError> {
    if is_missing_marker(s) {
        return Ok(None);
    }
    let caps = GAIN_RE
        .captures(s)
        .ok_or_else(|| ExtractError::MalformedGain(s.trim().to_string()))?;
    caps[1]
        .parse()
        .map(Some)
        .map_err(|_| ExtractError::MalformedGain(s.trim().to_string()))
}

/// "12-Mar" → the 12th of March nearest to `today`.
///
/// The year is taken from `today`, then shifted by one when that would put
/// the date more than half a year away (a December run reading a January
/// close, or the reverse).
pub fn parse_close_date(s: &str, today: NaiveDate) -> Result<Option<NaiveDate>, ExtractError> {
    if is_missing_marker(s) {
        return Ok(None);
    }
    let s = s.trim();
    let malformed = || ExtractError::MalformedDate(s.to_string());

    let in_year = |year: i32| NaiveDate::parse_from_str(&format!("{s}-{year}"), "%d-%b-%Y").ok();

    let year = today.year();
    let date = in_year(year).ok_or_else(malformed)?;
    let half_year = Duration::days(183);

    let date = if date < today - half_year {
        in_year(year + 1).unwrap_or(date)
    } else if date > today + half_year {
        in_year(year - 1).unwrap_or(date)
    } else {
        date
    };
    Ok(Some(date))
}

/// "SME" as a whole word anywhere in `raw` ("BSE SME", "NSE-SME") marks an SME issue.
pub fn classify_category(raw: &str) -> Category {
    if raw
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|w| w.eq_ignore_ascii_case("sme"))
    {
        Category::Sme
    } else {
        Category::Mainboard
    }
}

/// Text of the `<span>` badges in a name cell, the part `clean_name` drops.
fn badge_text(html: &str) -> String {
    let frag = Html::parse_fragment(html);
    frag.select(&SPAN_SEL)
        .flat_map(|s| s.text())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Display name from the listing's name cell.
///
/// Decorative `<span>` badges are dropped, the anchor text (or its `title`
/// when the text is empty) is used, and a trailing "IPO" token is removed.
pub fn clean_name(html: &str) -> String {
    let frag = Html::parse_fragment(html);

    let text = match frag.select(&ANCHOR_SEL).next() {
        Some(a) => {
            let t = text_outside_spans(a);
            if t.trim().is_empty() {
                a.value().attr("title").unwrap_or_default().to_string()
            } else {
                t
            }
        }
        None => text_outside_spans(frag.root_element()),
    };

    let mut words: Vec<&str> = text.split_whitespace().collect();
    while words.last().is_some_and(|w| w.eq_ignore_ascii_case("IPO")) {
        words.pop();
    }
    words.join(" ")
}

fn text_outside_spans(el: ElementRef<'_>) -> String {
    el.descendants()
        .filter(|n| {
            !n.ancestors()
                .any(|a| matches!(a.value(), Node::Element(e) if e.name() == "span"))
        })
        .filter_map(|n| n.value().as_text().map(|t| t.to_string()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve a relative detail path against the site root.
pub fn resolve_detail_url(site_root: &Url, path: &str) -> Result<String, ExtractError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(ExtractError::MissingField("detail link"));
    }
    site_root
        .join(path)
        .map(String::from)
        .map_err(|_| ExtractError::BadLink(path.to_string()))
}

// ── View URLs ─────────────────────────────────────────────────────────────────

/// The pages the source publishes per offering. Links look like
/// `/<segment>/<slug><suffix>/<id>/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Gmp,
    Subscription,
    Issue,
}

impl View {
    const ALL: [View; 3] = [View::Gmp, View::Subscription, View::Issue];

    fn segment(self) -> &'static str {
        match self {
            View::Gmp => "gmp",
            View::Subscription => "subscription",
            View::Issue => "ipo",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            View::Gmp => "-gmp",
            View::Subscription => "-subscription",
            View::Issue => "",
        }
    }
}

/// Rewrite a detail URL to point at another view of the same offering.
/// Pure string transform; returns `None` when the path has an unknown shape.
pub fn view_url(detail_url: &str, target: View) -> Option<String> {
    let mut url = Url::parse(detail_url).ok()?;
    let segments: Vec<String> = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if segments.len() < 2 {
        return None;
    }

    let current = View::ALL.into_iter().find(|v| v.segment() == segments[0])?;
    let stem = match current.suffix() {
        "" => segments[1].as_str(),
        sfx => segments[1].strip_suffix(sfx).unwrap_or(&segments[1]),
    };

    let mut path = format!("/{}/{}{}/", target.segment(), stem, target.suffix());
    for rest in &segments[2..] {
        path.push_str(rest);
        path.push('/');
    }
    url.set_path(&path);
    Some(url.into())
}

// ── Listing row → ListingRecord ───────────────────────────────────────────────

/// `Ok(None)` means the row is not an offering (header, spacer, ad).
pub fn extract_record(
    row: &RawListingRow,
    site_root: &Url,
    today: NaiveDate,
) -> Result<Option<ListingRecord>, ExtractError> {
    let name = row.name_html.as_deref().map(clean_name).unwrap_or_default();
    if name.is_empty() {
        return Ok(None);
    }

    // Without a type column the exchange badge next to the name decides.
    let category = match (row.category.as_deref(), row.name_html.as_deref()) {
        (Some(c), _) => classify_category(c),
        (None, Some(html)) => classify_category(&badge_text(html)),
        (None, None) => Category::Mainboard,
    };

    let listing_gain_percent = match row.gain.as_deref() {
        Some(g) => parse_gain(g)?,
        None => None,
    };
    let close_date = match row.close.as_deref() {
        Some(c) => parse_close_date(c, today)?,
        None => None,
    };

    let path = row
        .detail_path
        .as_deref()
        .ok_or(ExtractError::MissingField("detail link"))?;
    let detail_url = resolve_detail_url(site_root, path)?;

    Ok(Some(ListingRecord {
        name,
        category,
        close_date,
        listing_gain_percent,
        detail_url,
        subscription: None,
        issue_info: None,
    }))
}

/// Extract every row, skipping the ones that fail. Returns the records and
/// how many rows were skipped as malformed.
pub fn extract_records(
    rows: &[RawListingRow],
    site_root: &Url,
    today: NaiveDate,
) -> (Vec<ListingRecord>, usize) {
    let mut records = Vec::with_capacity(rows.len());
    let mut skipped = 0;

    for (i, row) in rows.iter().enumerate() {
        match extract_record(row, site_root, today) {
            Ok(Some(r)) => records.push(r),
            Ok(None) => debug!("Row {}: not an offering, discarded", i + 1),
            Err(e) => {
                warn!("Row {} skipped: {}", i + 1, e);
                skipped += 1;
            }
        }
    }
    (records, skipped)
}

// ── Subscription series → Subscription ────────────────────────────────────────

/// "3.21" → "3.21x" | "3.21x" → "3.21x" | "" → None
fn multiplier(v: Option<&String>) -> Option<String> {
    let v = v?.trim().trim_end_matches(['x', 'X']).trim();
    if is_missing_marker(v) { None } else { Some(format!("{v}x")) }
}

/// Only the most recent day counts; an empty series means bidding has not opened.
pub fn latest_subscription(days: &[RawBiddingDay]) -> Subscription {
    let Some(last) = days.last() else {
        return Subscription::Upcoming(UPCOMING_TEXT.to_string());
    };
    Subscription::Bidding(BiddingSnapshot {
        bidding_day: days.len() as u32,
        retail: multiplier(last.retail.as_ref()),
        non_institutional: multiplier(last.non_institutional.as_ref()),
        qualified_institutional: multiplier(last.qualified_institutional.as_ref()),
        total: multiplier(last.total.as_ref()),
    })
}

// ── Detail page pairs → IssueInfo ─────────────────────────────────────────────

enum IssueField {
    Price,
    LotSize,
    LotAmount,
    Size,
}

/// Source labels, matched as case-sensitive substrings.
const ISSUE_LABELS: &[(&str, IssueField)] = &[
    ("Issue Price", IssueField::Price),
    ("Price Band", IssueField::Price),
    ("Lot Size", IssueField::LotSize),
    ("Market Lot", IssueField::LotSize),
    ("Minimum Investment", IssueField::LotAmount),
    ("Lot Amount", IssueField::LotAmount),
    ("Issue Size", IssueField::Size),
];

/// Lower is better: an exact or "Total ..." label beats a plain substring
/// hit such as "Fresh Issue Size". Ties keep the first row.
fn label_rank(label: &str, known: &str) -> u8 {
    let label = label.trim();
    if label == known || label.strip_prefix("Total").is_some_and(|r| r.trim() == known) {
        0
    } else {
        1
    }
}

pub fn issue_info_from_pairs(pairs: &[(String, String)]) -> IssueInfo {
    let mut info = IssueInfo::default();
    let mut ranks = [u8::MAX; 4];

    for (label, value) in pairs {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let Some((known, field)) = ISSUE_LABELS.iter().find(|(l, _)| label.contains(*l)) else {
            continue;
        };
        let (slot, idx) = match field {
            IssueField::Price => (&mut info.issue_price, 0),
            IssueField::LotSize => (&mut info.lot_size, 1),
            IssueField::LotAmount => (&mut info.lot_amount, 2),
            IssueField::Size => (&mut info.issue_size, 3),
        };
        let rank = label_rank(label, known);
        if rank < ranks[idx] {
            ranks[idx] = rank;
            *slot = Some(value.to_string());
        }
    }
    info
}

// ── Tests ─────────────────────────────────────────────────────────────────────
