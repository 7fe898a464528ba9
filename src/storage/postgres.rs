use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, Pool, Postgres};

use crate::edgar::report::FilingCategory;
use crate::record::{FilingRecord, FilingStatus, NewFiling, RecordPatch, RegistrantId};
use crate::storage::FilingStore;
use crate::valuation::Valuation;

const COLUMNS: &str = "id, cik, filing_type, filing_date, company_name, ticker_symbol, industry, \
     status, shares_outstanding, shares_offered, price_range_low, price_range_high, final_price, \
     valuation_low, valuation_high, valuation_mid, revenue_latest, profit_latest, total_assets, \
     employees_count, fiscal_year_end, price_to_sales, price_to_earnings, amount_to_raise, \
     source_url, last_updated, last_enriched";

#[derive(Debug, FromRow)]
struct FilingRow {
    id: i64,
    cik: String,
    filing_type: String,
    filing_date: NaiveDate,
    company_name: String,
    ticker_symbol: Option<String>,
    industry: Option<String>,
    status: String,
    shares_outstanding: Option<i64>,
    shares_offered: Option<i64>,
    price_range_low: Option<f64>,
    price_range_high: Option<f64>,
    final_price: Option<f64>,
    valuation_low: Option<f64>,
    valuation_high: Option<f64>,
    valuation_mid: Option<f64>,
    revenue_latest: Option<f64>,
    profit_latest: Option<f64>,
    total_assets: Option<f64>,
    employees_count: Option<i64>,
    fiscal_year_end: Option<String>,
    price_to_sales: Option<f64>,
    price_to_earnings: Option<f64>,
    amount_to_raise: Option<f64>,
    source_url: String,
    last_updated: DateTime<Utc>,
    last_enriched: Option<DateTime<Utc>>,
}

impl TryFrom<FilingRow> for FilingRecord {
    type Error = anyhow::Error;

    fn try_from(row: FilingRow) -> Result<Self> {
        let registrant_id = RegistrantId::parse(&row.cik)
            .ok_or_else(|| anyhow!("row {} has malformed cik '{}'", row.id, row.cik))?;
        let category: FilingCategory = row.filing_type.parse().map_err(|e: String| anyhow!(e))?;
        let status: FilingStatus = row.status.parse().map_err(|e: String| anyhow!(e))?;

        Ok(FilingRecord {
            id: row.id,
            registrant_id,
            category,
            filing_date: row.filing_date,
            company_name: row.company_name,
            ticker_symbol: row.ticker_symbol,
            industry: row.industry,
            status,
            shares_outstanding: row.shares_outstanding,
            shares_offered: row.shares_offered,
            price_range_low: row.price_range_low,
            price_range_high: row.price_range_high,
            final_price: row.final_price,
            valuation_low: row.valuation_low,
            valuation_high: row.valuation_high,
            valuation_mid: row.valuation_mid,
            revenue_latest: row.revenue_latest,
            profit_latest: row.profit_latest,
            total_assets: row.total_assets,
            employees_count: row.employees_count,
            fiscal_year_end: row.fiscal_year_end,
            price_to_sales: row.price_to_sales,
            price_to_earnings: row.price_to_earnings,
            amount_to_raise: row.amount_to_raise,
            source_url: row.source_url,
            last_updated: row.last_updated,
            last_enriched: row.last_enriched,
        })
    }
}

fn into_records(rows: Vec<FilingRow>) -> Result<Vec<FilingRecord>> {
    rows.into_iter().map(FilingRecord::try_from).collect()
}

fn into_record(row: Option<FilingRow>) -> Result<Option<FilingRecord>> {
    row.map(FilingRecord::try_from).transpose()
}

fn status_names(statuses: &[FilingStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// `ipo_filings` table in Postgres.
#[derive(Clone)]
pub struct PgFilingStore {
    pool: Pool<Postgres>,
}

impl PgFilingStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connecting to Postgres")?;
        Ok(Self::new(pool))
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("running ipo_filings migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl FilingStore for PgFilingStore {
    async fn find_on_date(
        &self,
        cik: &RegistrantId,
        date: NaiveDate,
    ) -> Result<Option<FilingRecord>> {
        let row = sqlx::query_as::<_, FilingRow>(&format!(
            "SELECT {} FROM ipo_filings WHERE cik = $1 AND filing_date = $2 ORDER BY id LIMIT 1",
            COLUMNS
        ))
        .bind(cik.as_str())
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        into_record(row)
    }

    async fn latest_for_registrant(&self, cik: &RegistrantId) -> Result<Option<FilingRecord>> {
        let row = sqlx::query_as::<_, FilingRow>(&format!(
            "SELECT {} FROM ipo_filings WHERE cik = $1 \
             ORDER BY filing_date DESC, id DESC LIMIT 1",
            COLUMNS
        ))
        .bind(cik.as_str())
        .fetch_optional(&self.pool)
        .await?;
        into_record(row)
    }

    async fn records_for_registrant(&self, cik: &RegistrantId) -> Result<Vec<FilingRecord>> {
        let rows = sqlx::query_as::<_, FilingRow>(&format!(
            "SELECT {} FROM ipo_filings WHERE cik = $1 ORDER BY filing_date DESC, id DESC",
            COLUMNS
        ))
        .bind(cik.as_str())
        .fetch_all(&self.pool)
        .await?;
        into_records(rows)
    }

    async fn insert(&self, filing: NewFiling) -> Result<Option<FilingRecord>> {
        let row = sqlx::query_as::<_, FilingRow>(&format!(
            "INSERT INTO ipo_filings \
                 (cik, filing_type, filing_date, company_name, source_url, status, last_updated) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
             ON CONFLICT (cik, filing_type, filing_date) DO NOTHING \
             RETURNING {}",
            COLUMNS
        ))
        .bind(filing.registrant_id.as_str())
        .bind(filing.category.code())
        .bind(filing.filing_date)
        .bind(&filing.company_name)
        .bind(&filing.source_url)
        .bind(filing.status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        into_record(row)
    }

    async fn refresh_filing(
        &self,
        id: i64,
        filing_date: NaiveDate,
        source_url: &str,
    ) -> Result<Option<FilingRecord>> {
        let row = sqlx::query_as::<_, FilingRow>(&format!(
            "UPDATE ipo_filings SET filing_date = $2, source_url = $3, last_updated = NOW() \
             WHERE id = $1 RETURNING {}",
            COLUMNS
        ))
        .bind(id)
        .bind(filing_date)
        .bind(source_url)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("moving record {} to {}", id, filing_date))?;
        into_record(row)
    }

    async fn advance_registrant(
        &self,
        cik: &RegistrantId,
        categories: &[FilingCategory],
        target: FilingStatus,
    ) -> Result<Vec<FilingRecord>> {
        let codes: Vec<String> = categories.iter().map(|c| c.code().to_string()).collect();
        let rows = sqlx::query_as::<_, FilingRow>(&format!(
            "UPDATE ipo_filings SET status = $1, last_updated = NOW() \
             WHERE cik = $2 AND filing_type = ANY($3) AND status = ANY($4) \
             RETURNING {}",
            COLUMNS
        ))
        .bind(target.as_str())
        .bind(cik.as_str())
        .bind(codes)
        .bind(status_names(target.predecessors()))
        .fetch_all(&self.pool)
        .await?;
        into_records(rows)
    }

    async fn advance_record(&self, id: i64, target: FilingStatus) -> Result<Option<FilingRecord>> {
        let row = sqlx::query_as::<_, FilingRow>(&format!(
            "UPDATE ipo_filings SET status = $1, last_updated = NOW() \
             WHERE id = $2 AND status = ANY($3) RETURNING {}",
            COLUMNS
        ))
        .bind(target.as_str())
        .bind(id)
        .bind(status_names(target.predecessors()))
        .fetch_optional(&self.pool)
        .await?;
        into_record(row)
    }

    async fn apply_patch(&self, id: i64, patch: &RecordPatch) -> Result<Option<FilingRecord>> {
        let row = sqlx::query_as::<_, FilingRow>(&format!(
            "UPDATE ipo_filings SET \
                 ticker_symbol = COALESCE($2, ticker_symbol), \
                 industry = COALESCE($3, industry), \
                 shares_outstanding = COALESCE($4, shares_outstanding), \
                 shares_offered = COALESCE($5, shares_offered), \
                 price_range_low = COALESCE($6, price_range_low), \
                 price_range_high = COALESCE($7, price_range_high), \
                 final_price = COALESCE($8, final_price), \
                 revenue_latest = COALESCE($9, revenue_latest), \
                 profit_latest = COALESCE($10, profit_latest), \
                 total_assets = COALESCE($11, total_assets), \
                 employees_count = COALESCE($12, employees_count), \
                 fiscal_year_end = COALESCE($13, fiscal_year_end), \
                 last_updated = NOW() \
             WHERE id = $1 RETURNING {}",
            COLUMNS
        ))
        .bind(id)
        .bind(&patch.ticker_symbol)
        .bind(&patch.industry)
        .bind(patch.shares_outstanding)
        .bind(patch.shares_offered)
        .bind(patch.price_range_low)
        .bind(patch.price_range_high)
        .bind(patch.final_price)
        .bind(patch.revenue_latest)
        .bind(patch.profit_latest)
        .bind(patch.total_assets)
        .bind(patch.employees_count)
        .bind(&patch.fiscal_year_end)
        .fetch_optional(&self.pool)
        .await?;
        into_record(row)
    }

    async fn set_valuation(&self, id: i64, valuation: &Valuation) -> Result<Option<FilingRecord>> {
        // plain assignment: a NULL clears a figure whose inputs went away
        let row = sqlx::query_as::<_, FilingRow>(&format!(
            "UPDATE ipo_filings SET \
                 valuation_low = $2, \
                 valuation_high = $3, \
                 valuation_mid = $4, \
                 price_to_sales = $5, \
                 price_to_earnings = $6, \
                 amount_to_raise = $7, \
                 last_updated = NOW() \
             WHERE id = $1 RETURNING {}",
            COLUMNS
        ))
        .bind(id)
        .bind(valuation.valuation_low)
        .bind(valuation.valuation_high)
        .bind(valuation.valuation_mid)
        .bind(valuation.price_to_sales)
        .bind(valuation.price_to_earnings)
        .bind(valuation.amount_to_raise)
        .fetch_optional(&self.pool)
        .await?;
        into_record(row)
    }

    async fn mark_enriched(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE ipo_filings SET last_enriched = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pending_enrichment(&self, limit: usize) -> Result<Vec<FilingRecord>> {
        let rows = sqlx::query_as::<_, FilingRow>(&format!(
            "SELECT {} FROM ipo_filings \
             WHERE shares_outstanding IS NULL OR revenue_latest IS NULL OR profit_latest IS NULL \
             ORDER BY last_enriched ASC NULLS FIRST, filing_date DESC, id DESC \
             LIMIT $1",
            COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        into_records(rows)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<FilingRecord>> {
        let rows = sqlx::query_as::<_, FilingRow>(&format!(
            "SELECT {} FROM ipo_filings ORDER BY filing_date DESC, id DESC LIMIT $1",
            COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        into_records(rows)
    }
}
