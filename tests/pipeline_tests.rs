mod common;

use chrono::NaiveDate;
use common::*;
use ipo_tracker::edgar::rate_limiter::RateLimiter;
use ipo_tracker::edgar::report::FilingCategory;
use ipo_tracker::pipeline::PipelineState;
use ipo_tracker::publish::{MemoryPublisher, PipelineEvent};
use ipo_tracker::storage::FilingStore;
use ipo_tracker::{FilingStatus, Pipeline, PipelineError};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

fn s1_only() -> FakeFeeds {
    FakeFeeds::new().with(
        FilingCategory::PrimaryRegistration,
        Reply::Body(fixture("s1_feed.xml")),
    )
}

#[tokio::test]
async fn test_cycle_skips_bad_title_and_inserts_the_rest() {
    let h = harness(s1_only(), FakeFacts::new());

    let summary = h.pipeline.run_cycle_summary().await.unwrap();

    assert_eq!(summary.inserted, 4);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.new_records(), 4);
    assert!(summary.failed.is_empty());
    assert_eq!(h.publisher.named("new-filing").len(), 4);
    assert_eq!(h.pipeline.state(), PipelineState::Idle);

    let cedar = h.store.latest_for_registrant(&cik("3333333")).await.unwrap().unwrap();
    assert_eq!(cedar.company_name, "Cedar & Pine Holdings");
    assert_eq!(cedar.category, FilingCategory::PrimaryRegistration);
    assert_eq!(cedar.filing_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    assert_eq!(cedar.status, FilingStatus::Filed);
}

#[tokio::test]
async fn test_second_cycle_over_unchanged_feed_adds_nothing() {
    let h = harness(s1_only(), FakeFacts::new());

    assert_eq!(h.pipeline.run_cycle().await.unwrap(), 4);
    assert_eq!(h.pipeline.run_cycle().await.unwrap(), 0);

    let records = h.store.all().await;
    assert_eq!(records.len(), 4);
    let keys: HashSet<_> = records.iter().map(|r| r.key()).collect();
    assert_eq!(keys.len(), records.len());
    assert_eq!(h.publisher.named("new-filing").len(), 4);
}

#[tokio::test]
async fn test_pricing_event_promotes_registration_once() {
    let feeds = s1_only().with(
        FilingCategory::PricingSupplement,
        Reply::Body(fixture("424b4_feed.xml")),
    );
    let h = harness(feeds, FakeFacts::new());

    let summary = h.pipeline.run_cycle_summary().await.unwrap();
    assert_eq!(summary.inserted, 4);
    assert_eq!(summary.promoted, 1);
    assert_eq!(summary.updated, 1);

    let acme = h.store.records_for_registrant(&cik("1111111")).await.unwrap();
    assert_eq!(acme.len(), 1);
    assert_eq!(acme[0].status, FilingStatus::Priced);
    assert_eq!(acme[0].filing_date, NaiveDate::from_ymd_opt(2024, 3, 20).unwrap());
    assert!(acme[0].source_url.contains("000111111124000009"));

    let updates = h.publisher.named("status-update");
    assert_eq!(updates.len(), 1);
    match &updates[0] {
        PipelineEvent::StatusUpdate { record, previous } => {
            assert_eq!(record.registrant_id, cik("1111111"));
            assert_eq!(*previous, FilingStatus::Filed);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let others = h.store.latest_for_registrant(&cik("2222222")).await.unwrap().unwrap();
    assert_eq!(others.status, FilingStatus::Filed);

    // replaying the same feeds changes nothing
    assert_eq!(h.pipeline.run_cycle().await.unwrap(), 0);
    assert_eq!(h.publisher.named("status-update").len(), 1);
}

#[tokio::test]
async fn test_status_never_moves_backwards() {
    let feeds = s1_only().with(
        FilingCategory::PricingSupplement,
        Reply::Body(fixture("424b4_feed.xml")),
    );
    let h = harness(feeds, FakeFacts::new());
    h.pipeline.run_cycle().await.unwrap();

    let acme = h.store.latest_for_registrant(&cik("1111111")).await.unwrap().unwrap();
    h.store.advance_record(acme.id, FilingStatus::Trading).await.unwrap();

    h.pipeline.run_cycle().await.unwrap();
    let after = h.store.get(acme.id).await.unwrap();
    assert_eq!(after.status, FilingStatus::Trading);

    assert!(h
        .store
        .advance_record(acme.id, FilingStatus::Priced)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_failing_categories_do_not_stop_the_cycle() {
    let feeds = FakeFeeds::new()
        .with(
            FilingCategory::PrimaryRegistration,
            Reply::Body("<feed><entry><title>S-1 - Cut".to_string()),
        )
        .with(FilingCategory::ForeignPrimaryRegistration, Reply::Status(503))
        .with(
            FilingCategory::PricingSupplement,
            Reply::Body(fixture("424b4_feed.xml")),
        );
    let h = harness(feeds, FakeFacts::new());

    let summary = h.pipeline.run_cycle_summary().await.unwrap();

    assert_eq!(
        summary.failed,
        vec![
            FilingCategory::PrimaryRegistration,
            FilingCategory::ForeignPrimaryRegistration
        ]
    );
    assert_eq!(summary.inserted, 1);
    let acme = h.store.latest_for_registrant(&cik("1111111")).await.unwrap().unwrap();
    assert_eq!(acme.category, FilingCategory::PricingSupplement);
    assert_eq!(acme.status, FilingStatus::Filed);

    let fetched: Vec<_> = h.feeds.calls().into_iter().map(|(c, _)| c).collect();
    assert_eq!(fetched, FilingCategory::CYCLE_ORDER.to_vec());
}

#[tokio::test]
async fn test_missing_feeds_are_empty_not_failures() {
    let h = harness(FakeFeeds::new(), FakeFacts::new());
    let summary = h.pipeline.run_cycle_summary().await.unwrap();
    assert_eq!(summary.new_records(), 0);
    assert!(summary.failed.is_empty());
}

#[tokio::test]
async fn test_store_failure_reaches_the_caller() {
    let store = Arc::new(FlakyStore::default());
    store.fail_inserts.store(true, Ordering::SeqCst);
    let pipeline = Pipeline::new(
        store.clone(),
        Arc::new(MemoryPublisher::new()),
        Arc::new(s1_only()),
        Arc::new(FakeFacts::new()),
        RateLimiter::new(Duration::ZERO),
    );

    let err = pipeline.run_cycle().await.unwrap_err();
    assert!(matches!(err, PipelineError::Store(_)));
    assert!(!pipeline.is_running());

    // the guard was released, so a healthy retry goes through
    store.fail_inserts.store(false, Ordering::SeqCst);
    assert_eq!(pipeline.run_cycle().await.unwrap(), 4);
}

#[tokio::test]
async fn test_overlapping_run_is_rejected() {
    let gate = Arc::new(Semaphore::new(0));
    let feeds = FakeFeeds::gated(gate.clone()).with(
        FilingCategory::PrimaryRegistration,
        Reply::Body(fixture("s1_feed.xml")),
    );
    let h = harness(feeds, FakeFacts::new());

    let background = {
        let pipeline = h.pipeline.clone();
        tokio::spawn(async move { pipeline.run_cycle().await })
    };
    while !h.pipeline.is_running() {
        tokio::task::yield_now().await;
    }

    assert!(matches!(
        h.pipeline.run_cycle().await,
        Err(PipelineError::AlreadyRunning)
    ));
    assert!(matches!(
        h.pipeline.enrich(5).await,
        Err(PipelineError::AlreadyRunning)
    ));

    // one permit per category fetch
    gate.add_permits(FilingCategory::CYCLE_ORDER.len());
    let count = background.await.unwrap().unwrap();
    assert_eq!(count, 4);
    assert!(!h.pipeline.is_running());
}

#[tokio::test]
async fn test_scheduled_run_announces_new_records() {
    let h = harness(s1_only(), FakeFacts::new());

    assert_eq!(h.pipeline.run_scheduled().await.unwrap(), 4);
    assert_eq!(h.pipeline.run_scheduled().await.unwrap(), 0);

    let scheduled = h.publisher.named("scheduled-update");
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].payload()["count"], 4);
}

#[tokio::test]
async fn test_backfill_walks_each_day_with_a_cursor() {
    let h = harness(s1_only(), FakeFacts::new());
    let start = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

    let summary = h.pipeline.backfill_range(start, end).await.unwrap();

    // the fake ignores the cursor, so only the first day is new
    assert_eq!(summary.inserted, 4);
    assert_eq!(summary.skipped, 8);

    let calls = h.feeds.calls();
    assert_eq!(calls.len(), 6);
    assert!(calls
        .iter()
        .all(|(c, _)| FilingCategory::BACKFILL_ORDER.contains(c)));
    let days: Vec<_> = calls.iter().filter_map(|(_, d)| *d).collect();
    assert_eq!(days.first(), Some(&start));
    assert_eq!(days.last(), Some(&end));
}

#[tokio::test]
async fn test_backfill_window_out_of_range_is_an_error() {
    let h = harness(s1_only(), FakeFacts::new());

    let result = h.pipeline.backfill(400_000_000).await;

    assert!(matches!(result, Err(PipelineError::BackfillWindow(400_000_000))));
    assert!(h.feeds.calls().is_empty());
    assert!(!h.pipeline.is_running());
}

#[tokio::test]
async fn test_rejected_feed_request_is_isolated_like_an_outage() {
    let feeds = s1_only().with(FilingCategory::PricingSupplement, Reply::Status(403));
    let h = harness(feeds, FakeFacts::new());

    let summary = h.pipeline.run_cycle_summary().await.unwrap();

    assert_eq!(summary.failed, vec![FilingCategory::PricingSupplement]);
    assert_eq!(summary.inserted, 4);
    assert_eq!(summary.promoted, 0);
}
