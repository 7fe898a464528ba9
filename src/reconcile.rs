//! Decides what a classified feed entry means for the stored records.
//!
//! For one registrant the rules are, in order:
//!
//! 1. a record already filed on the entry's date makes the entry a duplicate;
//! 2. with no record at all the entry is inserted as `Filed` under its base
//!    category;
//! 3. a strictly newer entry moves the latest record forward in place;
//! 4. anything older is ignored.
//!
//! Pricing-class entries then promote the registrant's open registrations
//! to `Priced`.

use anyhow::Result;

use crate::edgar::classify::ClassifiedEntry;
use crate::edgar::report::FilingCategory;
use crate::publish::{PipelineEvent, Publisher};
use crate::record::{FilingRecord, FilingStatus, NewFiling};
use crate::storage::FilingStore;

/// Categories a pricing event promotes. Amendments are listed too so rows
/// written before base normalization are still reached.
pub const PROMOTABLE: [FilingCategory; 4] = [
    FilingCategory::PrimaryRegistration,
    FilingCategory::ForeignPrimaryRegistration,
    FilingCategory::AmendmentOfPrimary,
    FilingCategory::AmendmentOfForeignPrimary,
];

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Inserted(FilingRecord),
    UpdatedInPlace(FilingRecord),
    /// An amendment moved the latest record forward.
    Superseded(FilingRecord),
    Skipped,
}

impl Outcome {
    pub fn record(&self) -> Option<&FilingRecord> {
        match self {
            Outcome::Inserted(r) | Outcome::UpdatedInPlace(r) | Outcome::Superseded(r) => Some(r),
            Outcome::Skipped => None,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, Outcome::Inserted(_))
    }
}

/// Result of reconciling one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub outcome: Outcome,
    /// Records this entry advanced to `Priced`.
    pub promoted: Vec<FilingRecord>,
}

impl Reconciliation {
    /// Newly inserted plus newly promoted records.
    pub fn new_records(&self) -> usize {
        usize::from(self.outcome.is_inserted()) + self.promoted.len()
    }
}

pub struct Reconciler<'a> {
    store: &'a dyn FilingStore,
    publisher: &'a dyn Publisher,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn FilingStore, publisher: &'a dyn Publisher) -> Self {
        Self { store, publisher }
    }

    /// Store failures propagate; everything else reduces to an outcome.
    pub async fn reconcile(
        &self,
        entry: &ClassifiedEntry,
        hint: FilingCategory,
    ) -> Result<Reconciliation> {
        let outcome = self.merge(entry, hint).await?;

        let promoted = if hint.is_pricing() {
            self.promote(entry).await?
        } else {
            Vec::new()
        };

        Ok(Reconciliation { outcome, promoted })
    }

    async fn merge(&self, entry: &ClassifiedEntry, hint: FilingCategory) -> Result<Outcome> {
        let cik = &entry.registrant_id;

        if let Some(existing) = self.store.find_on_date(cik, entry.filing_date).await? {
            log::debug!(
                "Skipping {} {} on {}: record {} already covers that day",
                entry.form_code,
                cik,
                entry.filing_date,
                existing.id
            );
            return Ok(Outcome::Skipped);
        }

        let category = entry.effective_category(hint);
        let source_url = source_url(entry);

        match self.store.latest_for_registrant(cik).await? {
            None => {
                let filing = NewFiling {
                    registrant_id: cik.clone(),
                    category: category.base(),
                    filing_date: entry.filing_date,
                    company_name: entry.company_name.clone(),
                    source_url,
                    status: FilingStatus::Filed,
                };
                match self.store.insert(filing).await? {
                    Some(record) => {
                        log::info!(
                            "New {} filing: {} ({}) on {}",
                            record.category,
                            record.company_name,
                            record.registrant_id,
                            record.filing_date
                        );
                        self.publisher
                            .publish(PipelineEvent::NewFiling(record.clone()));
                        Ok(Outcome::Inserted(record))
                    }
                    // lost a race against another writer on the dedup key
                    None => Ok(Outcome::Skipped),
                }
            }
            Some(latest) if entry.filing_date > latest.filing_date => {
                let Some(record) = self
                    .store
                    .refresh_filing(latest.id, entry.filing_date, &source_url)
                    .await?
                else {
                    return Ok(Outcome::Skipped);
                };
                log::debug!(
                    "{} {} moves record {} from {} to {}",
                    category,
                    cik,
                    record.id,
                    latest.filing_date,
                    record.filing_date
                );
                if category.is_amendment() {
                    Ok(Outcome::Superseded(record))
                } else {
                    Ok(Outcome::UpdatedInPlace(record))
                }
            }
            Some(latest) => {
                log::debug!(
                    "Skipping {} {} on {}: latest record {} is from {}",
                    entry.form_code,
                    cik,
                    entry.filing_date,
                    latest.id,
                    latest.filing_date
                );
                Ok(Outcome::Skipped)
            }
        }
    }

    async fn promote(&self, entry: &ClassifiedEntry) -> Result<Vec<FilingRecord>> {
        let promoted = self
            .store
            .advance_registrant(&entry.registrant_id, &PROMOTABLE, FilingStatus::Priced)
            .await?;

        for record in &promoted {
            log::info!(
                "{} ({}) priced: {} record {} promoted",
                record.company_name,
                record.registrant_id,
                record.category,
                record.id
            );
            self.publisher.publish(PipelineEvent::StatusUpdate {
                record: record.clone(),
                // Filed is the only status below Priced
                previous: FilingStatus::Filed,
            });
        }
        Ok(promoted)
    }
}

fn source_url(entry: &ClassifiedEntry) -> String {
    entry.link.clone().unwrap_or_else(|| {
        format!(
            "https://www.sec.gov/cgi-bin/browse-edgar?action=getcompany&CIK={}",
            entry.registrant_id.padded()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::MemoryPublisher;
    use crate::record::RegistrantId;
    use crate::storage::InMemoryStore;
    use chrono::NaiveDate;

    fn entry(cik: &str, code: &str, day: u32) -> ClassifiedEntry {
        ClassifiedEntry {
            company_name: format!("Company {}", cik),
            registrant_id: RegistrantId::parse(cik).unwrap(),
            filing_date: NaiveDate::from_ymd_opt(2024, 4, day).unwrap(),
            form_code: code.to_string(),
            link: Some(format!("https://www.sec.gov/Archives/{}/{}", cik, day)),
        }
    }

    #[tokio::test]
    async fn first_sighting_is_inserted_and_announced() {
        let store = InMemoryStore::new();
        let publisher = MemoryPublisher::new();
        let reconciler = Reconciler::new(&store, &publisher);

        let result = reconciler
            .reconcile(&entry("100", "S-1", 1), FilingCategory::PrimaryRegistration)
            .await
            .unwrap();

        assert!(result.outcome.is_inserted());
        assert_eq!(result.new_records(), 1);
        assert_eq!(publisher.named("new-filing").len(), 1);
    }

    #[tokio::test]
    async fn amendment_with_no_prior_record_is_stored_under_its_base() {
        let store = InMemoryStore::new();
        let publisher = MemoryPublisher::new();
        let reconciler = Reconciler::new(&store, &publisher);

        let result = reconciler
            .reconcile(&entry("5", "S-1/A", 3), FilingCategory::PrimaryRegistration)
            .await
            .unwrap();

        let record = result.outcome.record().unwrap();
        assert_eq!(record.category, FilingCategory::PrimaryRegistration);
        assert_eq!(record.status, FilingStatus::Filed);
    }

    #[tokio::test]
    async fn same_day_entry_is_a_duplicate() {
        let store = InMemoryStore::new();
        let publisher = MemoryPublisher::new();
        let reconciler = Reconciler::new(&store, &publisher);

        reconciler
            .reconcile(&entry("100", "S-1", 1), FilingCategory::PrimaryRegistration)
            .await
            .unwrap();
        let again = reconciler
            .reconcile(&entry("100", "F-1", 1), FilingCategory::ForeignPrimaryRegistration)
            .await
            .unwrap();

        assert_eq!(again.outcome, Outcome::Skipped);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn newer_amendment_supersedes_and_older_entry_is_ignored() {
        let store = InMemoryStore::new();
        let publisher = MemoryPublisher::new();
        let reconciler = Reconciler::new(&store, &publisher);

        reconciler
            .reconcile(&entry("9", "S-1", 5), FilingCategory::PrimaryRegistration)
            .await
            .unwrap();

        let amended = reconciler
            .reconcile(&entry("9", "S-1/A", 12), FilingCategory::PrimaryRegistration)
            .await
            .unwrap();
        match &amended.outcome {
            Outcome::Superseded(record) => {
                assert_eq!(record.filing_date, NaiveDate::from_ymd_opt(2024, 4, 12).unwrap());
                assert!(record.source_url.ends_with("/9/12"));
            }
            other => panic!("expected Superseded, got {:?}", other),
        }
        assert_eq!(amended.new_records(), 0);

        let stale = reconciler
            .reconcile(&entry("9", "S-1", 2), FilingCategory::PrimaryRegistration)
            .await
            .unwrap();
        assert_eq!(stale.outcome, Outcome::Skipped);
        assert_eq!(store.len().await, 1);
        assert_eq!(publisher.named("new-filing").len(), 1);
    }

    #[tokio::test]
    async fn pricing_promotes_registration_once() {
        let store = InMemoryStore::new();
        let publisher = MemoryPublisher::new();
        let reconciler = Reconciler::new(&store, &publisher);

        reconciler
            .reconcile(&entry("77", "S-1", 1), FilingCategory::PrimaryRegistration)
            .await
            .unwrap();
        publisher.clear();

        let priced = reconciler
            .reconcile(&entry("77", "424B4", 20), FilingCategory::PricingSupplement)
            .await
            .unwrap();
        assert!(matches!(priced.outcome, Outcome::UpdatedInPlace(_)));
        assert_eq!(priced.promoted.len(), 1);
        assert_eq!(priced.promoted[0].status, FilingStatus::Priced);
        assert_eq!(publisher.named("status-update").len(), 1);

        // the same pricing entry seen again promotes nothing
        let again = reconciler
            .reconcile(&entry("77", "424B4", 20), FilingCategory::PricingSupplement)
            .await
            .unwrap();
        assert!(again.promoted.is_empty());
        assert_eq!(publisher.named("status-update").len(), 1);
    }

    #[test]
    fn missing_link_falls_back_to_company_page() {
        let mut e = entry("42", "S-1", 1);
        e.link = None;
        assert!(source_url(&e).ends_with("CIK=0000000042"));
    }
}
