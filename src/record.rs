use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::edgar::report::FilingCategory;

/// Central index key of a filer, stored without leading zeros.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrantId(String);

impl RegistrantId {
    /// Accepts a run of ASCII digits, padded or not.
    pub fn parse(digits: &str) -> Option<Self> {
        let digits = digits.trim();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let trimmed = digits.trim_start_matches('0');
        Some(if trimmed.is_empty() {
            RegistrantId("0".to_string())
        } else {
            RegistrantId(trimmed.to_string())
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ten-digit form used in data.sec.gov paths.
    pub fn padded(&self) -> String {
        format!("{:0>10}", self.0)
    }
}

impl fmt::Display for RegistrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Offering lifecycle. Ordering follows the only allowed direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FilingStatus {
    Filed,
    Priced,
    Trading,
}

impl FilingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilingStatus::Filed => "Filed",
            FilingStatus::Priced => "Priced",
            FilingStatus::Trading => "Trading",
        }
    }

    /// Statuses a record may hold for an advance to `self` to take effect.
    pub fn predecessors(&self) -> &'static [FilingStatus] {
        match self {
            FilingStatus::Filed => &[],
            FilingStatus::Priced => &[FilingStatus::Filed],
            FilingStatus::Trading => &[FilingStatus::Filed, FilingStatus::Priced],
        }
    }

    pub fn can_advance_to(&self, next: FilingStatus) -> bool {
        next > *self
    }
}

impl fmt::Display for FilingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FilingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Filed" => Ok(FilingStatus::Filed),
            "Priced" => Ok(FilingStatus::Priced),
            "Trading" => Ok(FilingStatus::Trading),
            other => Err(format!("unknown filing status '{}'", other)),
        }
    }
}

/// Natural identity of a filing row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub registrant_id: RegistrantId,
    pub category: FilingCategory,
    pub filing_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingRecord {
    pub id: i64,
    pub registrant_id: RegistrantId,
    pub category: FilingCategory,
    pub filing_date: NaiveDate,
    pub company_name: String,
    pub ticker_symbol: Option<String>,
    pub industry: Option<String>,
    pub status: FilingStatus,
    pub shares_outstanding: Option<i64>,
    pub shares_offered: Option<i64>,
    pub price_range_low: Option<f64>,
    pub price_range_high: Option<f64>,
    pub final_price: Option<f64>,
    pub valuation_low: Option<f64>,
    pub valuation_high: Option<f64>,
    pub valuation_mid: Option<f64>,
    pub revenue_latest: Option<f64>,
    pub profit_latest: Option<f64>,
    pub total_assets: Option<f64>,
    pub employees_count: Option<i64>,
    pub fiscal_year_end: Option<String>,
    pub price_to_sales: Option<f64>,
    pub price_to_earnings: Option<f64>,
    pub amount_to_raise: Option<f64>,
    pub source_url: String,
    pub last_updated: DateTime<Utc>,
    pub last_enriched: Option<DateTime<Utc>>,
}

impl FilingRecord {
    pub fn key(&self) -> DedupKey {
        DedupKey {
            registrant_id: self.registrant_id.clone(),
            category: self.category,
            filing_date: self.filing_date,
        }
    }

    /// True when any of the enrichment-sourced fields is still unknown.
    pub fn missing_financials(&self) -> bool {
        self.shares_outstanding.is_none()
            || self.revenue_latest.is_none()
            || self.profit_latest.is_none()
    }

    pub fn missing_offering_terms(&self) -> bool {
        self.price_range_low.is_none()
            || self.price_range_high.is_none()
            || self.shares_offered.is_none()
    }
}

/// Row to insert the first time a dedup key is seen.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFiling {
    pub registrant_id: RegistrantId,
    pub category: FilingCategory,
    pub filing_date: NaiveDate,
    pub company_name: String,
    pub source_url: String,
    pub status: FilingStatus,
}

impl NewFiling {
    pub fn key(&self) -> DedupKey {
        DedupKey {
            registrant_id: self.registrant_id.clone(),
            category: self.category,
            filing_date: self.filing_date,
        }
    }

    pub fn into_record(self, id: i64, now: DateTime<Utc>) -> FilingRecord {
        FilingRecord {
            id,
            registrant_id: self.registrant_id,
            category: self.category,
            filing_date: self.filing_date,
            company_name: self.company_name,
            ticker_symbol: None,
            industry: None,
            status: self.status,
            shares_outstanding: None,
            shares_offered: None,
            price_range_low: None,
            price_range_high: None,
            final_price: None,
            valuation_low: None,
            valuation_high: None,
            valuation_mid: None,
            revenue_latest: None,
            profit_latest: None,
            total_assets: None,
            employees_count: None,
            fiscal_year_end: None,
            price_to_sales: None,
            price_to_earnings: None,
            amount_to_raise: None,
            source_url: self.source_url,
            last_updated: now,
            last_enriched: None,
        }
    }
}

/// Field-level update where `None` means "keep what is stored".
///
/// Derived valuation fields are not patchable; they are written whole
/// through [`FilingStore::set_valuation`](crate::storage::FilingStore::set_valuation).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub ticker_symbol: Option<String>,
    pub industry: Option<String>,
    pub shares_outstanding: Option<i64>,
    pub shares_offered: Option<i64>,
    pub price_range_low: Option<f64>,
    pub price_range_high: Option<f64>,
    pub final_price: Option<f64>,
    pub revenue_latest: Option<f64>,
    pub profit_latest: Option<f64>,
    pub total_assets: Option<f64>,
    pub employees_count: Option<i64>,
    pub fiscal_year_end: Option<String>,
}

fn coalesce<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if let Some(value) = incoming {
        *slot = Some(value.clone());
    }
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        *self == RecordPatch::default()
    }

    /// Overlay `other` on top of `self`, later non-null values winning.
    pub fn merge(mut self, other: RecordPatch) -> RecordPatch {
        coalesce(&mut self.ticker_symbol, &other.ticker_symbol);
        coalesce(&mut self.industry, &other.industry);
        coalesce(&mut self.shares_outstanding, &other.shares_outstanding);
        coalesce(&mut self.shares_offered, &other.shares_offered);
        coalesce(&mut self.price_range_low, &other.price_range_low);
        coalesce(&mut self.price_range_high, &other.price_range_high);
        coalesce(&mut self.final_price, &other.final_price);
        coalesce(&mut self.revenue_latest, &other.revenue_latest);
        coalesce(&mut self.profit_latest, &other.profit_latest);
        coalesce(&mut self.total_assets, &other.total_assets);
        coalesce(&mut self.employees_count, &other.employees_count);
        coalesce(&mut self.fiscal_year_end, &other.fiscal_year_end);
        self
    }

    /// COALESCE semantics: a field changes only when the patch carries a value.
    pub fn apply_to(&self, record: &mut FilingRecord) {
        coalesce(&mut record.ticker_symbol, &self.ticker_symbol);
        coalesce(&mut record.industry, &self.industry);
        coalesce(&mut record.shares_outstanding, &self.shares_outstanding);
        coalesce(&mut record.shares_offered, &self.shares_offered);
        coalesce(&mut record.price_range_low, &self.price_range_low);
        coalesce(&mut record.price_range_high, &self.price_range_high);
        coalesce(&mut record.final_price, &self.final_price);
        coalesce(&mut record.revenue_latest, &self.revenue_latest);
        coalesce(&mut record.profit_latest, &self.profit_latest);
        coalesce(&mut record.total_assets, &self.total_assets);
        coalesce(&mut record.employees_count, &self.employees_count);
        coalesce(&mut record.fiscal_year_end, &self.fiscal_year_end);
    }
}
