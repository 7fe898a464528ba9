use chrono::{Days, NaiveDate, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::edgar::classify::classify_all;
use crate::edgar::client::{FactsSource, FeedSource};
use crate::edgar::feed::parse_feed;
use crate::edgar::rate_limiter::RateLimiter;
use crate::edgar::report::FilingCategory;
use crate::enrich::Enricher;
use crate::error::PipelineError;
use crate::publish::{PipelineEvent, Publisher};
use crate::reconcile::{Outcome, Reconciler};
use crate::storage::FilingStore;

/// Where a run currently is. Categories are indexed in walk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    FetchingCategory(usize),
    ParsingCategory(usize),
    ReconcilingCategory(usize),
    Done,
}

/// Tally of one ingestion cycle or backfill.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub inserted: usize,
    pub updated: usize,
    pub superseded: usize,
    pub skipped: usize,
    pub promoted: usize,
    /// Entries whose titles could not be classified.
    pub rejected: usize,
    /// Categories skipped because the fetch or parse failed.
    pub failed: Vec<FilingCategory>,
}

impl CycleSummary {
    /// Newly inserted plus newly promoted records.
    pub fn new_records(&self) -> usize {
        self.inserted + self.promoted
    }

    fn record(&mut self, outcome: &Outcome, promoted: usize) {
        match outcome {
            Outcome::Inserted(_) => self.inserted += 1,
            Outcome::UpdatedInPlace(_) => self.updated += 1,
            Outcome::Superseded(_) => self.superseded += 1,
            Outcome::Skipped => self.skipped += 1,
        }
        self.promoted += promoted;
    }
}

/// Clears the run flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, PipelineError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| RunGuard(flag))
            .map_err(|_| PipelineError::AlreadyRunning)
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives feed ingestion and enrichment over explicit collaborators.
///
/// At most one run (cycle, backfill or enrichment) is active at a time; a
/// second caller gets [`PipelineError::AlreadyRunning`] instead of queueing.
pub struct Pipeline {
    store: Arc<dyn FilingStore>,
    publisher: Arc<dyn Publisher>,
    feeds: Arc<dyn FeedSource>,
    facts: Arc<dyn FactsSource>,
    pacer: RateLimiter,
    running: AtomicBool,
    state: Mutex<PipelineState>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn FilingStore>,
        publisher: Arc<dyn Publisher>,
        feeds: Arc<dyn FeedSource>,
        facts: Arc<dyn FactsSource>,
        pacer: RateLimiter,
    ) -> Self {
        Self {
            store,
            publisher,
            feeds,
            facts,
            pacer,
            running: AtomicBool::new(false),
            state: Mutex::new(PipelineState::Idle),
        }
    }

    pub fn store(&self) -> &Arc<dyn FilingStore> {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> PipelineState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(PipelineState::Idle)
    }

    fn set_state(&self, next: PipelineState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    /// One pass over the current feeds. Returns the number of newly
    /// inserted or promoted records.
    pub async fn run_cycle(&self) -> Result<usize, PipelineError> {
        Ok(self.run_cycle_summary().await?.new_records())
    }

    pub async fn run_cycle_summary(&self) -> Result<CycleSummary, PipelineError> {
        let _guard = RunGuard::acquire(&self.running)?;
        log::info!("Starting ingestion cycle");

        let mut summary = CycleSummary::default();
        let result = self
            .walk(&FilingCategory::CYCLE_ORDER, None, &mut summary)
            .await;
        self.finish(result, summary, "Ingestion cycle")
    }

    /// Like [`run_cycle`](Self::run_cycle), announcing any new records with a
    /// `scheduled-update` event.
    pub async fn run_scheduled(&self) -> Result<usize, PipelineError> {
        let count = self.run_cycle().await?;
        if count > 0 {
            self.publisher.publish(PipelineEvent::ScheduledUpdate {
                count,
                at: Utc::now(),
            });
        }
        Ok(count)
    }

    /// Walks the registration feeds day by day over the last `days` days.
    pub async fn backfill(&self, days: u32) -> Result<usize, PipelineError> {
        let today = Utc::now().date_naive();
        let start = today
            .checked_sub_days(Days::new(u64::from(days)))
            .ok_or(PipelineError::BackfillWindow(days))?;
        Ok(self.backfill_range(start, today).await?.new_records())
    }

    /// Backfill over `start..=end`, oldest day first.
    pub async fn backfill_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<CycleSummary, PipelineError> {
        let _guard = RunGuard::acquire(&self.running)?;
        log::info!("Backfilling registrations from {} to {}", start, end);

        let mut summary = CycleSummary::default();
        let mut result = Ok(());
        for day in start.iter_days().take_while(|d| *d <= end) {
            log::debug!("Backfill day {}", day);
            result = self
                .walk(&FilingCategory::BACKFILL_ORDER, Some(day), &mut summary)
                .await;
            if result.is_err() {
                break;
            }
        }
        self.finish(result, summary, "Backfill")
    }

    /// Enriches up to `limit` records missing financial data.
    pub async fn enrich(&self, limit: usize) -> Result<usize, PipelineError> {
        let _guard = RunGuard::acquire(&self.running)?;
        let enricher = Enricher::new(
            self.facts.as_ref(),
            self.store.as_ref(),
            self.publisher.as_ref(),
            &self.pacer,
        );
        enricher.enrich(limit).await.map_err(|e| {
            log::error!("Enrichment aborted by storage failure: {:#}", e);
            PipelineError::Store(e)
        })
    }

    fn finish(
        &self,
        result: Result<(), PipelineError>,
        summary: CycleSummary,
        label: &str,
    ) -> Result<CycleSummary, PipelineError> {
        self.set_state(PipelineState::Idle);
        match result {
            Ok(()) => {
                log::info!(
                    "{} done: {} inserted, {} promoted, {} updated, {} superseded, {} skipped, {} rejected, {} failed categories",
                    label,
                    summary.inserted,
                    summary.promoted,
                    summary.updated,
                    summary.superseded,
                    summary.skipped,
                    summary.rejected,
                    summary.failed.len()
                );
                Ok(summary)
            }
            Err(e) => {
                log::error!("{} aborted: {}", label, e);
                Err(e)
            }
        }
    }

    /// Visits `categories` in order. Upstream failures skip the category;
    /// store failures end the walk.
    async fn walk(
        &self,
        categories: &[FilingCategory],
        cursor: Option<NaiveDate>,
        summary: &mut CycleSummary,
    ) -> Result<(), PipelineError> {
        let reconciler = Reconciler::new(self.store.as_ref(), self.publisher.as_ref());

        for (i, &category) in categories.iter().enumerate() {
            self.set_state(PipelineState::FetchingCategory(i));
            self.pacer.acquire().await;
            let document = match self.feeds.fetch_feed(category, cursor).await {
                Ok(Some(document)) => document,
                Ok(None) => {
                    log::debug!("No {} feed available", category);
                    continue;
                }
                Err(e) => {
                    if e.is_transient() {
                        log::warn!("{} feed unavailable, retrying next cycle: {}", category, e);
                    } else {
                        log::error!("{} feed rejected the request, skipping category: {}", category, e);
                    }
                    summary.failed.push(category);
                    continue;
                }
            };

            self.set_state(PipelineState::ParsingCategory(i));
            let raw = match parse_feed(&document, category) {
                Ok(raw) => raw,
                Err(e) => {
                    log::warn!("Parsing {} feed failed, skipping category: {}", category, e);
                    summary.failed.push(category);
                    continue;
                }
            };
            let entries = classify_all(&raw, category);
            summary.rejected += raw.len() - entries.len();
            log::debug!(
                "{} feed: {} entries, {} classified",
                category,
                raw.len(),
                entries.len()
            );

            self.set_state(PipelineState::ReconcilingCategory(i));
            for entry in &entries {
                let reconciliation = reconciler.reconcile(entry, category).await?;
                summary.record(&reconciliation.outcome, reconciliation.promoted.len());
            }
        }

        self.set_state(PipelineState::Done);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let first = RunGuard::acquire(&flag).unwrap();
        assert!(matches!(
            RunGuard::acquire(&flag),
            Err(PipelineError::AlreadyRunning)
        ));
        drop(first);
        assert!(RunGuard::acquire(&flag).is_ok());
    }

    #[test]
    fn summary_counts_inserts_and_promotions() {
        let mut summary = CycleSummary::default();
        summary.record(&Outcome::Skipped, 2);
        summary.record(&Outcome::Skipped, 0);
        assert_eq!(summary.new_records(), 2);
        assert_eq!(summary.skipped, 2);
    }
}
