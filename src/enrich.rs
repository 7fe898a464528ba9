use anyhow::Result;
use std::collections::HashMap;
use url::Url;

use crate::edgar::client::FactsSource;
use crate::edgar::facts::FinancialFacts;
use crate::edgar::filing::CompanyProfile;
use crate::edgar::prospectus::{extract_offering_terms, primary_document_url, OfferingTerms};
use crate::edgar::rate_limiter::RateLimiter;
use crate::error::EdgarError;
use crate::publish::{PipelineEvent, Publisher};
use crate::record::{FilingRecord, FilingStatus, RecordPatch, RegistrantId};
use crate::storage::FilingStore;
use crate::valuation::Valuation;

impl FinancialFacts {
    pub fn into_patch(self) -> RecordPatch {
        RecordPatch {
            shares_outstanding: self.shares_outstanding,
            revenue_latest: self.revenues,
            profit_latest: self.net_income,
            total_assets: self.total_assets,
            employees_count: self.employees,
            fiscal_year_end: self.fiscal_year_end,
            ..Default::default()
        }
    }
}

impl CompanyProfile {
    pub fn to_patch(&self) -> RecordPatch {
        RecordPatch {
            ticker_symbol: self.ticker().map(str::to_string),
            industry: self.industry().map(str::to_string),
            ..Default::default()
        }
    }
}

fn log_fetch_failure(what: &str, subject: &dyn std::fmt::Display, e: &EdgarError) {
    if e.is_transient() {
        log::warn!("{} fetch failed for {}, will retry on a later pass: {}", what, subject, e);
    } else {
        log::error!("{} fetch rejected for {}: {}", what, subject, e);
    }
}

/// Per-registrant upstream data, fetched once per batch.
#[derive(Debug, Clone, Default)]
struct RegistrantData {
    facts: Option<FinancialFacts>,
    profile: Option<CompanyProfile>,
}

/// Fills financial, profile and offering fields of stored records.
///
/// Upstream failures never escape: a registrant whose documents cannot be
/// fetched or parsed simply gets nothing. Store failures propagate.
pub struct Enricher<'a> {
    source: &'a dyn FactsSource,
    store: &'a dyn FilingStore,
    publisher: &'a dyn Publisher,
    pacer: &'a RateLimiter,
}

impl<'a> Enricher<'a> {
    pub fn new(
        source: &'a dyn FactsSource,
        store: &'a dyn FilingStore,
        publisher: &'a dyn Publisher,
        pacer: &'a RateLimiter,
    ) -> Self {
        Self {
            source,
            store,
            publisher,
            pacer,
        }
    }

    /// Financial facts for one registrant, `None` when unavailable for any reason.
    pub async fn fetch_facts(&self, cik: &RegistrantId) -> Option<FinancialFacts> {
        self.pacer.acquire().await;
        match self.source.company_facts(cik).await {
            Ok(Some(json)) => match FinancialFacts::parse(&json) {
                Ok(facts) => Some(facts),
                Err(e) => {
                    log::warn!("Unreadable company facts for {}: {}", cik, e);
                    None
                }
            },
            Ok(None) => {
                log::debug!("No company facts published for {}", cik);
                None
            }
            Err(e) => {
                log_fetch_failure("Company facts", cik, &e);
                None
            }
        }
    }

    pub async fn fetch_profile(&self, cik: &RegistrantId) -> Option<CompanyProfile> {
        self.pacer.acquire().await;
        match self.source.submissions(cik).await {
            Ok(Some(json)) => match CompanyProfile::parse(&json) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    log::warn!("Unreadable submissions for {}: {}", cik, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log_fetch_failure("Submissions", cik, &e);
                None
            }
        }
    }

    async fn fetch_document(&self, url: &Url) -> Option<String> {
        self.pacer.acquire().await;
        match self.source.document(url).await {
            Ok(body) => body,
            Err(e) => {
                log_fetch_failure("Document", url, &e);
                None
            }
        }
    }

    /// Reads the filing behind `record.source_url`. The URL is normally an
    /// index page; when it has no document table it is scanned directly.
    pub async fn fetch_offering_terms(&self, record: &FilingRecord) -> Option<OfferingTerms> {
        let index_url = match Url::parse(&record.source_url) {
            Ok(url) => url,
            Err(e) => {
                log::debug!("Record {} has no usable source URL: {}", record.id, e);
                return None;
            }
        };
        let index_html = self.fetch_document(&index_url).await?;

        let terms = match primary_document_url(&index_html, &index_url) {
            Some(doc_url) => extract_offering_terms(&self.fetch_document(&doc_url).await?),
            None => extract_offering_terms(&index_html),
        };
        (!terms.is_empty()).then_some(terms)
    }

    async fn registrant_data(&self, cik: &RegistrantId) -> RegistrantData {
        RegistrantData {
            facts: self.fetch_facts(cik).await,
            profile: self.fetch_profile(cik).await,
        }
    }

    async fn enrich_record(&self, record: &FilingRecord, data: &RegistrantData) -> Result<bool> {
        let mut patch = RecordPatch::default();
        if let Some(facts) = &data.facts {
            patch = patch.merge(facts.clone().into_patch());
        }
        if let Some(profile) = &data.profile {
            patch = patch.merge(profile.to_patch());
        }
        if record.missing_offering_terms() {
            if let Some(terms) = self.fetch_offering_terms(record).await {
                patch = patch.merge(terms.into_patch());
            }
        }

        let mut preview = record.clone();
        patch.apply_to(&mut preview);
        let mut changed = false;
        let mut current = record.clone();
        if preview != *record {
            if let Some(updated) = self.store.apply_patch(record.id, &patch).await? {
                current = updated;
                changed = true;
            }
        }

        let valuation = Valuation::derive(&current);
        if valuation != Valuation::stored(&current) {
            if let Some(updated) = self.store.set_valuation(current.id, &valuation).await? {
                current = updated;
                changed = true;
            }
        }

        self.store.mark_enriched(record.id).await?;

        let listed = data.profile.as_ref().is_some_and(CompanyProfile::is_listed);
        if listed && current.status == FilingStatus::Priced {
            if let Some(trading) = self
                .store
                .advance_record(current.id, FilingStatus::Trading)
                .await?
            {
                log::info!(
                    "{} ({}) is now trading as {}",
                    trading.company_name,
                    trading.registrant_id,
                    trading.ticker_symbol.as_deref().unwrap_or("?")
                );
                self.publisher.publish(PipelineEvent::StatusUpdate {
                    record: trading,
                    previous: FilingStatus::Priced,
                });
            }
        }

        Ok(changed)
    }

    /// Enriches up to `limit` records missing financial data. Returns how
    /// many received at least one new value.
    pub async fn enrich(&self, limit: usize) -> Result<usize> {
        let pending = self.store.pending_enrichment(limit).await?;
        log::info!("Enriching {} record(s)", pending.len());

        let mut fetched: HashMap<RegistrantId, RegistrantData> = HashMap::new();
        let mut enriched = 0;
        for record in &pending {
            if !fetched.contains_key(&record.registrant_id) {
                let data = self.registrant_data(&record.registrant_id).await;
                fetched.insert(record.registrant_id.clone(), data);
            }
            let data = fetched
                .get(&record.registrant_id)
                .cloned()
                .unwrap_or_default();

            if self.enrich_record(record, &data).await? {
                enriched += 1;
            } else {
                log::debug!("Nothing new for {} ({})", record.company_name, record.registrant_id);
            }
        }

        log::info!("Enriched {} of {} record(s)", enriched, pending.len());
        Ok(enriched)
    }
}
