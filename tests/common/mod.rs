#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use ipo_tracker::edgar::client::{FactsSource, FeedSource};
use ipo_tracker::edgar::rate_limiter::RateLimiter;
use ipo_tracker::edgar::report::FilingCategory;
use ipo_tracker::error::EdgarError;
use ipo_tracker::publish::MemoryPublisher;
use ipo_tracker::record::{FilingRecord, FilingStatus, NewFiling, RecordPatch, RegistrantId};
use ipo_tracker::storage::{FilingStore, InMemoryStore};
use ipo_tracker::valuation::Valuation;
use ipo_tracker::Pipeline;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use url::Url;

pub fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {:?}: {}", path, e))
}

/// Canned upstream answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Body(String),
    NotFound,
    Status(u16),
}

impl Reply {
    fn into_result(self, url: &str) -> Result<Option<String>, EdgarError> {
        match self {
            Reply::Body(body) => Ok(Some(body)),
            Reply::NotFound => Ok(None),
            Reply::Status(status) => Err(EdgarError::Status {
                status,
                url: url.to_string(),
            }),
        }
    }
}

/// Feed source answering from a per-category table; unknown categories 404.
#[derive(Default)]
pub struct FakeFeeds {
    replies: Mutex<HashMap<FilingCategory, Reply>>,
    calls: Mutex<Vec<(FilingCategory, Option<NaiveDate>)>>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeFeeds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch consumes one permit of `gate` first.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn with(self, category: FilingCategory, reply: Reply) -> Self {
        self.set(category, reply);
        self
    }

    pub fn set(&self, category: FilingCategory, reply: Reply) {
        self.replies.lock().unwrap().insert(category, reply);
    }

    pub fn calls(&self) -> Vec<(FilingCategory, Option<NaiveDate>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSource for FakeFeeds {
    async fn fetch_feed(
        &self,
        category: FilingCategory,
        cursor: Option<NaiveDate>,
    ) -> Result<Option<String>, EdgarError> {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.calls.lock().unwrap().push((category, cursor));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&category)
            .cloned()
            .unwrap_or(Reply::NotFound);
        reply.into_result(category.code())
    }
}

/// Facts source keyed by registrant and by document URL; anything unknown 404s.
#[derive(Default)]
pub struct FakeFacts {
    facts: Mutex<HashMap<String, Reply>>,
    submissions: Mutex<HashMap<String, Reply>>,
    documents: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_facts(self, cik: &str, reply: Reply) -> Self {
        self.facts.lock().unwrap().insert(cik.to_string(), reply);
        self
    }

    /// Replaces the facts answer for `cik` after construction.
    pub fn set_facts(&self, cik: &str, reply: Reply) {
        self.facts.lock().unwrap().insert(cik.to_string(), reply);
    }

    pub fn with_submissions(self, cik: &str, reply: Reply) -> Self {
        self.submissions
            .lock()
            .unwrap()
            .insert(cik.to_string(), reply);
        self
    }

    pub fn with_document(self, url: &str, reply: Reply) -> Self {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), reply);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(
        &self,
        table: &Mutex<HashMap<String, Reply>>,
        key: &str,
        label: &str,
    ) -> Result<Option<String>, EdgarError> {
        self.calls.lock().unwrap().push(format!("{}:{}", label, key));
        table
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or(Reply::NotFound)
            .into_result(key)
    }
}

#[async_trait]
impl FactsSource for FakeFacts {
    async fn company_facts(&self, cik: &RegistrantId) -> Result<Option<String>, EdgarError> {
        self.answer(&self.facts, cik.as_str(), "facts")
    }

    async fn submissions(&self, cik: &RegistrantId) -> Result<Option<String>, EdgarError> {
        self.answer(&self.submissions, cik.as_str(), "submissions")
    }

    async fn document(&self, url: &Url) -> Result<Option<String>, EdgarError> {
        self.answer(&self.documents, url.as_str(), "document")
    }
}

/// In-memory store whose inserts can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    pub fail_inserts: AtomicBool,
}

#[async_trait]
impl FilingStore for FlakyStore {
    async fn find_on_date(
        &self,
        cik: &RegistrantId,
        date: NaiveDate,
    ) -> Result<Option<FilingRecord>> {
        self.inner.find_on_date(cik, date).await
    }

    async fn latest_for_registrant(&self, cik: &RegistrantId) -> Result<Option<FilingRecord>> {
        self.inner.latest_for_registrant(cik).await
    }

    async fn records_for_registrant(&self, cik: &RegistrantId) -> Result<Vec<FilingRecord>> {
        self.inner.records_for_registrant(cik).await
    }

    async fn insert(&self, filing: NewFiling) -> Result<Option<FilingRecord>> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            bail!("connection reset while inserting {}", filing.registrant_id);
        }
        self.inner.insert(filing).await
    }

    async fn refresh_filing(
        &self,
        id: i64,
        filing_date: NaiveDate,
        source_url: &str,
    ) -> Result<Option<FilingRecord>> {
        self.inner.refresh_filing(id, filing_date, source_url).await
    }

    async fn advance_registrant(
        &self,
        cik: &RegistrantId,
        categories: &[FilingCategory],
        target: FilingStatus,
    ) -> Result<Vec<FilingRecord>> {
        self.inner.advance_registrant(cik, categories, target).await
    }

    async fn advance_record(&self, id: i64, target: FilingStatus) -> Result<Option<FilingRecord>> {
        self.inner.advance_record(id, target).await
    }

    async fn apply_patch(&self, id: i64, patch: &RecordPatch) -> Result<Option<FilingRecord>> {
        self.inner.apply_patch(id, patch).await
    }

    async fn set_valuation(&self, id: i64, valuation: &Valuation) -> Result<Option<FilingRecord>> {
        self.inner.set_valuation(id, valuation).await
    }

    async fn mark_enriched(&self, id: i64) -> Result<()> {
        self.inner.mark_enriched(id).await
    }

    async fn pending_enrichment(&self, limit: usize) -> Result<Vec<FilingRecord>> {
        self.inner.pending_enrichment(limit).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<FilingRecord>> {
        self.inner.recent(limit).await
    }
}

pub struct Harness {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<InMemoryStore>,
    pub publisher: Arc<MemoryPublisher>,
    pub feeds: Arc<FakeFeeds>,
    pub facts: Arc<FakeFacts>,
}

pub fn harness(feeds: FakeFeeds, facts: FakeFacts) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let publisher = Arc::new(MemoryPublisher::new());
    let feeds = Arc::new(feeds);
    let facts = Arc::new(facts);
    let pipeline = Arc::new(Pipeline::new(
        store.clone(),
        publisher.clone(),
        feeds.clone(),
        facts.clone(),
        RateLimiter::new(Duration::ZERO),
    ));
    Harness {
        pipeline,
        store,
        publisher,
        feeds,
        facts,
    }
}

pub fn cik(digits: &str) -> RegistrantId {
    RegistrantId::parse(digits).unwrap()
}
