use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::edgar::report::FilingCategory;
use crate::record::{FilingRecord, FilingStatus, NewFiling, RecordPatch, RegistrantId};
use crate::valuation::Valuation;

/// Relational store behind the pipeline.
///
/// Every mutation refreshes `last_updated`. Implementations must make each
/// method atomic on its own; the pipeline never needs multi-call transactions.
#[async_trait]
pub trait FilingStore: Send + Sync {
    /// Any record of `cik` filed on `date`, whatever its category.
    async fn find_on_date(
        &self,
        cik: &RegistrantId,
        date: NaiveDate,
    ) -> Result<Option<FilingRecord>>;

    /// Most recent record of `cik` by filing date.
    async fn latest_for_registrant(&self, cik: &RegistrantId) -> Result<Option<FilingRecord>>;

    async fn records_for_registrant(&self, cik: &RegistrantId) -> Result<Vec<FilingRecord>>;

    /// Inserts unless the dedup key already exists, in which case `None`.
    async fn insert(&self, filing: NewFiling) -> Result<Option<FilingRecord>>;

    /// Moves a record forward to a newer filing of the same registrant.
    async fn refresh_filing(
        &self,
        id: i64,
        filing_date: NaiveDate,
        source_url: &str,
    ) -> Result<Option<FilingRecord>>;

    /// Advances every record of `cik` in `categories` that sits below
    /// `target`. Returns only the records that actually changed.
    async fn advance_registrant(
        &self,
        cik: &RegistrantId,
        categories: &[FilingCategory],
        target: FilingStatus,
    ) -> Result<Vec<FilingRecord>>;

    /// Advances one record if it sits below `target`.
    async fn advance_record(&self, id: i64, target: FilingStatus) -> Result<Option<FilingRecord>>;

    /// COALESCE update: `None` fields leave stored values untouched.
    async fn apply_patch(&self, id: i64, patch: &RecordPatch) -> Result<Option<FilingRecord>>;

    /// Overwrites every derived valuation field, `None` included.
    async fn set_valuation(&self, id: i64, valuation: &Valuation) -> Result<Option<FilingRecord>>;

    /// Stamps an enrichment attempt, successful or not.
    async fn mark_enriched(&self, id: i64) -> Result<()>;

    /// Up to `limit` records missing financial data, never-attempted first.
    async fn pending_enrichment(&self, limit: usize) -> Result<Vec<FilingRecord>>;

    /// Most recent filings first.
    async fn recent(&self, limit: usize) -> Result<Vec<FilingRecord>>;
}

pub mod memory;
pub mod postgres;

pub use self::memory::InMemoryStore;
pub use self::postgres::PgFilingStore;
