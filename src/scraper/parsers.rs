use crate::models::{RawBiddingDay, RawListingRow};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use tracing::{debug, warn};

// Selector strings are constants; parse failures cannot happen at runtime.
static TR_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("valid selector"));
static LABELLED_CELL_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[data-label]").expect("valid selector"));
static CELL_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("td, th").expect("valid selector"));
static TABLE_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("valid selector"));
static HEADER_ROW_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("thead tr").expect("valid selector"));
static HREF_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));
static DT_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("dt").expect("valid selector"));
static DD_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("dd").expect("valid selector"));

fn looks_like_json(body: &str) -> bool {
    matches!(body.trim_start().chars().next(), Some('{' | '['))
}

/// Visible text of an element with whitespace collapsed.
fn cell_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_href(html: &str) -> Option<String> {
    let frag = Html::parse_fragment(html);
    frag.select(&HREF_SEL)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

// ── Listing document ──────────────────────────────────────────────────────────

/// Parse the live GMP listing, HTML table or JSON report.
pub fn parse_listing_document(body: &str) -> Result<Vec<RawListingRow>> {
    if looks_like_json(body) {
        let value: Value = serde_json::from_str(body).context("Listing JSON is malformed")?;
        Ok(parse_listing_json(&value))
    } else {
        Ok(parse_listing_html(body))
    }
}

/// Rows whose cells carry `data-label` attributes: IPO | Est Listing | Close | Type
fn parse_listing_html(html: &str) -> Vec<RawListingRow> {
    let doc = Html::parse_document(html);
    let mut rows = Vec::new();

    for tr in doc.select(&TR_SEL) {
        let mut row = RawListingRow::default();
        let mut labelled = 0;

        for cell in tr.select(&LABELLED_CELL_SEL) {
            let Some(label) = cell.value().attr("data-label") else { continue };
            labelled += 1;
            let label = label.trim();

            if label == "IPO" || label.eq_ignore_ascii_case("name") {
                row.detail_path = cell
                    .select(&HREF_SEL)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .map(str::to_string);
                row.name_html = Some(cell.inner_html());
            } else if label.starts_with("Est Listing") {
                row.gain = Some(cell_text(cell));
            } else if label == "Close" {
                row.close = Some(cell_text(cell));
            } else if label == "Type" || label.eq_ignore_ascii_case("category") {
                row.category = Some(cell_text(cell));
            }
        }

        if labelled > 0 {
            rows.push(row);
        }
    }

    debug!("Listing HTML: {} labelled rows", rows.len());
    rows
}

/// Lowercase, alphanumerics only: "~IPO_Category" → "ipocategory"
fn norm_key(k: &str) -> String {
    k.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    obj.iter()
        .find(|(k, _)| keys.contains(&norm_key(k).as_str()))
        .and_then(|(_, v)| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn as_objects(v: &Value) -> Option<&Vec<Value>> {
    v.as_array().filter(|a| a.iter().all(Value::is_object))
}

/// The first array of objects: the value itself, or one level down.
fn object_array<'a>(value: &'a Value, preferred: &str) -> Option<&'a Vec<Value>> {
    if let Some(arr) = as_objects(value) {
        return Some(arr);
    }
    let obj = value.as_object()?;
    obj.get(preferred)
        .and_then(as_objects)
        .or_else(|| obj.values().find_map(as_objects))
}

fn parse_listing_json(value: &Value) -> Vec<RawListingRow> {
    let Some(entries) = object_array(value, "reportTableData") else {
        warn!("Listing JSON has no table of entries");
        return vec![];
    };

    entries
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| {
            let name_html = field(obj, &["name", "ipo", "companyname"]);
            let detail_path = field(obj, &["urlrewritefoldername", "detailurl", "url", "link"])
                .or_else(|| name_html.as_deref().and_then(first_href));
            RawListingRow {
                category: field(obj, &["ipocategory", "category", "type", "ipotype"]),
                gain: field(obj, &["estlisting", "estimatedlisting", "listinggain"]),
                close: field(obj, &["close", "closedate", "closingdate"]),
                name_html,
                detail_path,
            }
        })
        .collect()
}

// ── Subscription document ─────────────────────────────────────────────────────

/// Day-wise subscription series, oldest first. A page without the table
/// yields an empty series.
pub fn parse_subscription_document(body: &str) -> Result<Vec<RawBiddingDay>> {
    if looks_like_json(body) {
        let value: Value =
            serde_json::from_str(body).context("Subscription JSON is malformed")?;
        Ok(parse_subscription_json(&value))
    } else {
        Ok(parse_subscription_html(body))
    }
}

const QIB_KEYS: &[&str] = &["qib", "qibx", "qualifiedinstitutional"];
const NII_KEYS: &[&str] = &["nii", "niix", "hni", "noninstitutional"];
const RETAIL_KEYS: &[&str] = &["rii", "riix", "retail", "retailindividual"];
const TOTAL_KEYS: &[&str] = &["total", "totalx", "overall"];

fn parse_subscription_json(value: &Value) -> Vec<RawBiddingDay> {
    let Some(days) = object_array(value, "ipoBiddingData") else {
        return vec![];
    };
    days.iter()
        .filter_map(Value::as_object)
        .map(|obj| RawBiddingDay {
            qualified_institutional: field(obj, QIB_KEYS),
            non_institutional: field(obj, NII_KEYS),
            retail: field(obj, RETAIL_KEYS),
            total: field(obj, TOTAL_KEYS),
        })
        .collect()
}

fn parse_subscription_html(html: &str) -> Vec<RawBiddingDay> {
    let doc = Html::parse_document(html);

    for table in doc.select(&TABLE_SEL) {
        let header_row = table
            .select(&HEADER_ROW_SEL)
            .next()
            .or_else(|| table.select(&TR_SEL).next());
        let Some(header_row) = header_row else { continue };

        let headers: Vec<String> = header_row
            .select(&CELL_SEL)
            .map(|c| cell_text(c).to_lowercase())
            .collect();

        let col = |needles: &[&str]| headers.iter().position(|h| needles.iter().any(|n| h.contains(n)));
        let (Some(qib_idx), Some(total_idx)) = (col(&["qib"]), col(&["total"])) else {
            continue;
        };
        let nii_idx = col(&["nii", "hni", "non-institutional"]);
        let retail_idx = col(&["retail", "rii"]);

        let mut days = Vec::new();
        // Rows are read with the header's selector so a `<th>` day label keeps its column.
        for tr in table.select(&TR_SEL).filter(|tr| tr.id() != header_row.id()) {
            let cells: Vec<String> = tr.select(&CELL_SEL).map(cell_text).collect();
            if cells.len() <= qib_idx.max(total_idx) || cells.iter().all(String::is_empty) {
                continue;
            }
            let at = |i: Option<usize>| i.and_then(|i| cells.get(i)).cloned();
            days.push(RawBiddingDay {
                qualified_institutional: at(Some(qib_idx)),
                non_institutional: at(nii_idx),
                retail: at(retail_idx),
                total: at(Some(total_idx)),
            });
        }
        debug!("Subscription table: {} day rows", days.len());
        return days;
    }

    vec![]
}

// ── Issue-info page ───────────────────────────────────────────────────────────

/// Every label/value pair on the page: two-cell table rows and `dt`/`dd` pairs.
pub fn parse_label_values(html: &str) -> Vec<(String, String)> {
    let doc = Html::parse_document(html);
    let mut pairs = Vec::new();

    for tr in doc.select(&TR_SEL) {
        let mut cells = tr.select(&CELL_SEL).map(cell_text);
        if let (Some(label), Some(value)) = (cells.next(), cells.next()) {
            if !label.is_empty() {
                pairs.push((label, value));
            }
        }
    }

    let dts = doc.select(&DT_SEL).map(cell_text);
    let dds = doc.select(&DD_SEL).map(cell_text);
    pairs.extend(dts.zip(dds));

    pairs
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Subscription};
    use crate::scraper::cleaner::{extract_records, latest_subscription};
    use chrono::NaiveDate;
    use url::Url;

    const LISTING_HTML: &str = r#"
        <table><thead><tr><th>IPO</th><th>Est Listing</th><th>Close</th></tr></thead>
        <tbody>
          <tr>
            <td data-label="IPO"><a href="/gmp/alpha-ipo-gmp/1/" target="_parent">Alpha IPO <span>O</span></a></td>
            <td data-label="Est Listing">₹125 (25.00%)</td>
            <td data-label="Close">12-Mar</td>
            <td data-label="Type">Mainboard</td>
          </tr>
          <tr>
            <td data-label="IPO"><a href="/gmp/beta-ipo-gmp/2/" target="_parent">Beta IPO <span>BSE SME</span></a></td>
            <td data-label="Est Listing">--</td>
            <td data-label="Close">13-Mar</td>
          </tr>
          <tr><td colspan="3">Advertisement</td></tr>
        </tbody></table>"#;

    #[test]
    fn test_parse_listing_html() {
        let rows = parse_listing_document(LISTING_HTML).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].detail_path.as_deref(), Some("/gmp/alpha-ipo-gmp/1/"));
        assert_eq!(rows[0].gain.as_deref(), Some("₹125 (25.00%)"));
        assert_eq!(rows[0].close.as_deref(), Some("12-Mar"));
        assert_eq!(rows[0].category.as_deref(), Some("Mainboard"));
        assert!(rows[0].name_html.as_deref().unwrap().contains("Alpha IPO"));

        assert_eq!(rows[1].gain.as_deref(), Some("--"));
        assert_eq!(rows[1].category, None);
        assert!(rows[1].name_html.as_deref().unwrap().contains("BSE SME"));
    }

    #[test]
    fn test_parse_listing_json() {
        let body = r#"{"reportTableData": [
            {"Name": "<a href='/gmp/alpha-ipo-gmp/1/' title='Alpha IPO'>Alpha IPO</a>",
             "~IPO_Category": "IPO", "Est Listing": "₹125 (25.00%)", "Close": "12-Mar"},
            {"Name": "Beta IPO", "~IPO_Category": "SME", "Est Listing": "--",
             "Close": "13-Mar", "~urlrewrite_folder_name": "/gmp/beta-ipo-gmp/2/"}
        ]}"#;
        let rows = parse_listing_document(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].detail_path.as_deref(), Some("/gmp/alpha-ipo-gmp/1/"));
        assert_eq!(rows[0].category.as_deref(), Some("IPO"));
        assert_eq!(rows[1].detail_path.as_deref(), Some("/gmp/beta-ipo-gmp/2/"));
        assert_eq!(rows[1].category.as_deref(), Some("SME"));

        assert!(parse_listing_document("{ not json").is_err());
        assert!(parse_listing_document(r#"{"msg": "ok"}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_subscription_html() {
        let html = r#"
            <table><tr><th>Date</th><th>QIB (x)</th><th>NII (x)</th><th>Retail (x)</th><th>Total (x)</th></tr>
            <tr><td>Day 1</td><td>0.01</td><td>0.50</td><td>1.10</td><td>0.60</td></tr>
            <tr><td>Day 2</td><td>2.40</td><td>5.00</td><td>7.25</td><td>4.80</td></tr>
            </table>"#;
        let days = parse_subscription_document(html).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[1].qualified_institutional.as_deref(), Some("2.40"));
        assert_eq!(days[1].non_institutional.as_deref(), Some("5.00"));
        assert_eq!(days[1].retail.as_deref(), Some("7.25"));
        assert_eq!(days[1].total.as_deref(), Some("4.80"));
    }

    #[test]
    fn test_parse_subscription_html_with_th_day_labels() {
        let html = r#"
            <table>
              <thead><tr><th>Day</th><th>QIB</th><th>NII</th><th>Retail</th><th>Total</th></tr></thead>
              <tbody>
                <tr><th>Day 1</th><td>0.01</td><td>0.50</td><td>1.10</td><td>0.60</td></tr>
                <tr><th>Day 2</th><td>2.40</td><td>5.00</td><td>7.25</td><td>4.80</td></tr>
              </tbody>
            </table>"#;
        let days = parse_subscription_document(html).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].qualified_institutional.as_deref(), Some("0.01"));
        assert_eq!(days[1].total.as_deref(), Some("4.80"));

        match latest_subscription(&days) {
            Subscription::Bidding(snap) => {
                assert_eq!(snap.bidding_day, 2);
                assert_eq!(snap.retail.as_deref(), Some("7.25x"));
            }
            other => panic!("open offering reported as {:?}", other),
        }
    }

    #[test]
    fn test_header_written_with_td_cells_is_not_a_day() {
        let html = r#"
            <table>
              <tr><td>Date</td><td>QIB</td><td>NII</td><td>Retail</td><td>Total</td></tr>
              <tr><td>10-Mar</td><td>0.01</td><td>0.50</td><td>1.10</td><td>0.60</td></tr>
            </table>"#;
        let days = parse_subscription_document(html).unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].total.as_deref(), Some("0.60"));
    }

    #[test]
    fn test_listing_without_type_column_keeps_mainboard_names() {
        let html = r#"
            <table><tbody>
              <tr>
                <td data-label="IPO"><a href="/gmp/avanti-cosmetics-ipo-gmp/9/" target="_parent">Avanti Cosmetics IPO <span>O</span></a></td>
                <td data-label="Est Listing">₹130 (30.00%)</td>
                <td data-label="Close">12-Mar</td>
              </tr>
              <tr>
                <td data-label="IPO"><a href="/gmp/beta-ipo-gmp/2/" target="_parent">Beta IPO <span>BSE SME</span></a></td>
                <td data-label="Est Listing">₹60 (20.00%)</td>
                <td data-label="Close">13-Mar</td>
              </tr>
            </tbody></table>"#;
        let rows = parse_listing_document(html).unwrap();
        assert!(rows.iter().all(|r| r.category.is_none()));

        let root = Url::parse("https://www.investorgain.com").unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let (records, skipped) = extract_records(&rows, &root, today);
        assert_eq!(skipped, 0);
        assert_eq!(records[0].name, "Avanti Cosmetics");
        assert_eq!(records[0].category, Category::Mainboard);
        assert_eq!(records[1].name, "Beta");
        assert_eq!(records[1].category, Category::Sme);
    }

    #[test]
    fn test_subscription_without_table_is_empty() {
        let html = "<html><body><p>Subscription opens on 10 Mar</p></body></html>";
        assert!(parse_subscription_document(html).unwrap().is_empty());
        assert!(parse_subscription_document("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_subscription_json() {
        let body = r#"{"ipoBiddingData": [
            {"Date": "10-Mar", "QIB": "0.01", "NII": "0.5", "RII": "1.1", "Total": 0.6},
            {"Date": "11-Mar", "QIB": "2.4", "NII": "5", "RII": "7.25", "Total": 4.8}
        ]}"#;
        let days = parse_subscription_document(body).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[1].retail.as_deref(), Some("7.25"));
        assert_eq!(days[1].total.as_deref(), Some("4.8"));
    }

    #[test]
    fn test_parse_label_values() {
        let html = r#"
            <table>
              <tr><td>Issue Price</td><td>₹95 to ₹100</td></tr>
              <tr><td>Lot Size</td><td>150 Shares</td></tr>
              <tr><td>Lonely cell</td></tr>
            </table>
            <dl><dt>Total Issue Size</dt><dd>₹500 Cr</dd></dl>"#;
        let pairs = parse_label_values(html);
        assert!(pairs.contains(&("Issue Price".into(), "₹95 to ₹100".into())));
        assert!(pairs.contains(&("Lot Size".into(), "150 Shares".into())));
        assert!(pairs.contains(&("Total Issue Size".into(), "₹500 Cr".into())));
        assert_eq!(pairs.len(), 3);
    }
}
