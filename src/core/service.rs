use anyhow::Result;
use reqwest::Client;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use super::config::TrackerConfig;
use crate::edgar::client::EdgarClient;
use crate::edgar::rate_limiter::RateLimiter;
use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::publish::BroadcastPublisher;
use crate::storage::PgFilingStore;

/// Concrete collaborators wired into a [`Pipeline`].
pub struct TrackerService {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<PgFilingStore>,
    pub publisher: Arc<BroadcastPublisher>,
    pub edgar: Arc<EdgarClient>,
    config: TrackerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Startup,
    Timer,
    Manual,
}

impl TrackerService {
    /// Connects to Postgres, applies migrations and builds the pipeline.
    pub async fn connect(config: TrackerConfig) -> Result<Self> {
        let store = Arc::new(
            PgFilingStore::connect(&config.database_url, config.db_max_connections).await?,
        );
        store.migrate().await?;

        let edgar = Arc::new(EdgarClient::new(Client::new(), config.edgar.clone()));
        let publisher = Arc::new(BroadcastPublisher::default());
        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            publisher.clone(),
            edgar.clone(),
            edgar.clone(),
            RateLimiter::new(config.sec_sleep),
        ));

        Ok(Self {
            pipeline,
            store,
            publisher,
            edgar,
            config,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Runs a cycle now, then on every poll tick and on every `run` line read
    /// from stdin, until Ctrl-C.
    pub async fn serve(&self) -> Result<()> {
        self.spawn_event_log();

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;
        let mut first_tick = true;

        log::info!(
            "Serving: polling every {:?}, type 'run' for a manual cycle",
            self.config.poll_interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let trigger = if first_tick { Trigger::Startup } else { Trigger::Timer };
                    first_tick = false;
                    self.spawn_run(trigger);
                }
                line = lines.next_line(), if stdin_open => match line {
                    Ok(Some(line)) if line.trim().eq_ignore_ascii_case("run") => {
                        self.spawn_run(Trigger::Manual);
                    }
                    Ok(Some(line)) if !line.trim().is_empty() => {
                        log::warn!("Unknown command '{}', expected 'run'", line.trim());
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        log::warn!("stdin closed: {}", e);
                        stdin_open = false;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Shutting down");
                    return Ok(());
                }
            }
        }
    }

    fn spawn_run(&self, trigger: Trigger) {
        let pipeline = self.pipeline.clone();
        let batch = self.config.enrich_batch;
        tokio::spawn(async move {
            log::info!("{:?} run triggered", trigger);
            let cycle = match trigger {
                Trigger::Timer => pipeline.run_scheduled().await,
                Trigger::Startup | Trigger::Manual => pipeline.run_cycle().await,
            };
            match cycle {
                Ok(count) => log::info!("{:?} run: {} new or promoted record(s)", trigger, count),
                Err(PipelineError::AlreadyRunning) => {
                    log::warn!("{:?} run skipped: a run is already in progress", trigger);
                    return;
                }
                Err(e) => {
                    log::error!("{:?} run failed: {}", trigger, e);
                    return;
                }
            }
            match pipeline.enrich(batch).await {
                Ok(count) => log::info!("Enriched {} record(s)", count),
                Err(e) => log::warn!("Enrichment after {:?} run failed: {}", trigger, e),
            }
        });
    }

    /// Mirrors published events into the log.
    fn spawn_event_log(&self) {
        let mut events = self.publisher.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => log::info!("event {}: {}", event.name(), event.payload()),
                    Err(RecvError::Lagged(missed)) => {
                        log::warn!("Event log fell behind by {} event(s)", missed)
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}
