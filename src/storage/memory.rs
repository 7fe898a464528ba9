use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::edgar::report::FilingCategory;
use crate::record::{FilingRecord, FilingStatus, NewFiling, RecordPatch, RegistrantId};
use crate::storage::FilingStore;
use crate::valuation::Valuation;

/// Process-local store with the same semantics as the Postgres one.
#[derive(Default)]
pub struct InMemoryStore {
    rows: RwLock<Vec<FilingRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<FilingRecord> {
        self.rows.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    pub async fn get(&self, id: i64) -> Option<FilingRecord> {
        self.rows.read().await.iter().find(|r| r.id == id).cloned()
    }

    async fn mutate<F>(&self, id: i64, f: F) -> Option<FilingRecord>
    where
        F: FnOnce(&mut FilingRecord) -> bool,
    {
        let mut rows = self.rows.write().await;
        let row = rows.iter_mut().find(|r| r.id == id)?;
        if f(row) {
            row.last_updated = Utc::now();
            Some(row.clone())
        } else {
            None
        }
    }
}

fn newest_first(a: &FilingRecord, b: &FilingRecord) -> std::cmp::Ordering {
    b.filing_date.cmp(&a.filing_date).then(b.id.cmp(&a.id))
}

#[async_trait]
impl FilingStore for InMemoryStore {
    async fn find_on_date(
        &self,
        cik: &RegistrantId,
        date: NaiveDate,
    ) -> Result<Option<FilingRecord>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|r| &r.registrant_id == cik && r.filing_date == date)
            .cloned())
    }

    async fn latest_for_registrant(&self, cik: &RegistrantId) -> Result<Option<FilingRecord>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| &r.registrant_id == cik)
            .min_by(|a, b| newest_first(a, b))
            .cloned())
    }

    async fn records_for_registrant(&self, cik: &RegistrantId) -> Result<Vec<FilingRecord>> {
        let rows = self.rows.read().await;
        let mut found: Vec<_> = rows
            .iter()
            .filter(|r| &r.registrant_id == cik)
            .cloned()
            .collect();
        found.sort_by(newest_first);
        Ok(found)
    }

    async fn insert(&self, filing: NewFiling) -> Result<Option<FilingRecord>> {
        let mut rows = self.rows.write().await;
        let key = filing.key();
        if rows.iter().any(|r| r.key() == key) {
            return Ok(None);
        }
        let id = rows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let record = filing.into_record(id, Utc::now());
        rows.push(record.clone());
        Ok(Some(record))
    }

    async fn refresh_filing(
        &self,
        id: i64,
        filing_date: NaiveDate,
        source_url: &str,
    ) -> Result<Option<FilingRecord>> {
        let mut rows = self.rows.write().await;
        let Some(target) = rows.iter().find(|r| r.id == id).map(FilingRecord::key) else {
            return Ok(None);
        };
        let collides = rows.iter().any(|r| {
            r.id != id
                && r.registrant_id == target.registrant_id
                && r.category == target.category
                && r.filing_date == filing_date
        });
        if collides {
            anyhow::bail!(
                "moving record {} to {} would duplicate ({}, {}, {})",
                id,
                filing_date,
                target.registrant_id,
                target.category,
                filing_date
            );
        }
        let Some(row) = rows.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        row.filing_date = filing_date;
        row.source_url = source_url.to_string();
        row.last_updated = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn advance_registrant(
        &self,
        cik: &RegistrantId,
        categories: &[FilingCategory],
        target: FilingStatus,
    ) -> Result<Vec<FilingRecord>> {
        let mut rows = self.rows.write().await;
        let now = Utc::now();
        let mut changed = Vec::new();
        for row in rows.iter_mut().filter(|r| {
            &r.registrant_id == cik
                && categories.contains(&r.category)
                && r.status.can_advance_to(target)
        }) {
            row.status = target;
            row.last_updated = now;
            changed.push(row.clone());
        }
        Ok(changed)
    }

    async fn advance_record(&self, id: i64, target: FilingStatus) -> Result<Option<FilingRecord>> {
        Ok(self
            .mutate(id, |row| {
                if row.status.can_advance_to(target) {
                    row.status = target;
                    true
                } else {
                    false
                }
            })
            .await)
    }

    async fn apply_patch(&self, id: i64, patch: &RecordPatch) -> Result<Option<FilingRecord>> {
        Ok(self
            .mutate(id, |row| {
                patch.apply_to(row);
                true
            })
            .await)
    }

    async fn set_valuation(&self, id: i64, valuation: &Valuation) -> Result<Option<FilingRecord>> {
        Ok(self
            .mutate(id, |row| {
                valuation.apply_to(row);
                true
            })
            .await)
    }

    async fn mark_enriched(&self, id: i64) -> Result<()> {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.last_enriched = Some(Utc::now());
        }
        Ok(())
    }

    async fn pending_enrichment(&self, limit: usize) -> Result<Vec<FilingRecord>> {
        let rows = self.rows.read().await;
        let mut pending: Vec<_> = rows
            .iter()
            .filter(|r| r.missing_financials())
            .cloned()
            .collect();
        // None sorts before Some, so never-attempted records lead
        pending.sort_by(|a, b| {
            a.last_enriched
                .cmp(&b.last_enriched)
                .then_with(|| newest_first(a, b))
        });
        pending.truncate(limit);
        Ok(pending)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<FilingRecord>> {
        let rows = self.rows.read().await;
        let mut all: Vec<_> = rows.iter().cloned().collect();
        all.sort_by(newest_first);
        all.truncate(limit);
        Ok(all)
    }
}
