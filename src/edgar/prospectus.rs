use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::record::RecordPatch;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("literal regex"));

static PRICE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)between\s+\$\s?(?P<low>\d{1,4}(?:\.\d{1,2})?)\s+and\s+\$\s?(?P<high>\d{1,4}(?:\.\d{1,2})?)\s+per\s+(?:share|ads|american\s+depositary\s+share)",
    )
    .expect("literal regex")
});

static FINAL_PRICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)public\s+offering\s+price\s+(?:is|of|was)\s+\$\s?(?P<price>\d{1,4}(?:\.\d{1,2})?)\s+per\s+(?:share|ads|american\s+depositary\s+share)",
    )
    .expect("literal regex")
});

static SHARES_OFFERED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\boffering\s+(?:of\s+)?(?P<shares>\d{1,3}(?:,\d{3})+|\d{4,})\s+(?:shares|ordinary\s+shares|class\s+a|american\s+depositary\s+shares|adss)",
    )
    .expect("literal regex")
});

/// Pricing terms printed on a prospectus cover page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferingTerms {
    pub price_range_low: Option<f64>,
    pub price_range_high: Option<f64>,
    pub final_price: Option<f64>,
    pub shares_offered: Option<i64>,
}

impl OfferingTerms {
    pub fn is_empty(&self) -> bool {
        *self == OfferingTerms::default()
    }

    pub fn into_patch(self) -> RecordPatch {
        RecordPatch {
            price_range_low: self.price_range_low,
            price_range_high: self.price_range_high,
            final_price: self.final_price,
            shares_offered: self.shares_offered,
            ..Default::default()
        }
    }
}

/// Locates the primary document on an EDGAR filing index page.
pub fn primary_document_url(index_html: &str, index_url: &Url) -> Option<Url> {
    let document = Html::parse_document(index_html);
    let links = Selector::parse("table.tableFile a[href]").ok()?;

    document
        .select(&links)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| match href.split_once("/ix?doc=") {
            Some((_, doc)) => doc,
            None => href,
        })
        .find(|href| {
            let lower = href.to_ascii_lowercase();
            (lower.ends_with(".htm") || lower.ends_with(".html") || lower.ends_with(".txt"))
                && !lower.contains("-index.htm")
        })
        .and_then(|href| index_url.join(href).ok())
}

fn document_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let text = document.root_element().text().collect::<Vec<_>>().join(" ");
    WHITESPACE.replace_all(&text, " ").into_owned()
}

fn parse_amount(s: &str) -> Option<f64> {
    s.replace(',', "").parse().ok()
}

pub fn extract_offering_terms(html: &str) -> OfferingTerms {
    let text = document_text(html);
    let mut terms = OfferingTerms::default();

    if let Some(c) = PRICE_RANGE.captures(&text) {
        let low = c.name("low").and_then(|m| parse_amount(m.as_str()));
        let high = c.name("high").and_then(|m| parse_amount(m.as_str()));
        if let (Some(low), Some(high)) = (low, high) {
            if low > 0.0 && low <= high {
                terms.price_range_low = Some(low);
                terms.price_range_high = Some(high);
            }
        }
    }

    terms.final_price = FINAL_PRICE
        .captures(&text)
        .and_then(|c| c.name("price"))
        .and_then(|m| parse_amount(m.as_str()))
        .filter(|p| *p > 0.0);

    terms.shares_offered = SHARES_OFFERED
        .captures(&text)
        .and_then(|c| c.name("shares"))
        .and_then(|m| m.as_str().replace(',', "").parse::<i64>().ok())
        .filter(|n| *n > 0);

    terms
}
