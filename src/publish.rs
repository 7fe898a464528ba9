use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::record::{FilingRecord, FilingStatus};

/// Notification pushed to live subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    NewFiling(FilingRecord),
    StatusUpdate {
        record: FilingRecord,
        previous: FilingStatus,
    },
    /// A scheduled cycle that produced new or promoted records.
    ScheduledUpdate {
        count: usize,
        at: DateTime<Utc>,
    },
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::NewFiling(_) => "new-filing",
            PipelineEvent::StatusUpdate { .. } => "status-update",
            PipelineEvent::ScheduledUpdate { .. } => "scheduled-update",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            PipelineEvent::NewFiling(record) => {
                serde_json::to_value(record).unwrap_or(Value::Null)
            }
            PipelineEvent::StatusUpdate { record, previous } => json!({
                "id": record.id,
                "cik": record.registrant_id,
                "company_name": record.company_name,
                "filing_type": record.category,
                "previous_status": previous,
                "status": record.status,
            }),
            PipelineEvent::ScheduledUpdate { count, at } => json!({
                "count": count,
                "timestamp": at.to_rfc3339(),
            }),
        }
    }
}

/// Best-effort outbound channel. Implementations must never block or fail
/// the caller.
pub trait Publisher: Send + Sync {
    fn publish(&self, event: PipelineEvent);
}

/// Fan-out to any number of in-process subscribers.
pub struct BroadcastPublisher {
    sender: broadcast::Sender<PipelineEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Publisher for BroadcastPublisher {
    fn publish(&self, event: PipelineEvent) {
        let name = event.name();
        // Err only means nobody is listening right now
        match self.sender.send(event) {
            Ok(receivers) => log::debug!("Published {} to {} subscriber(s)", name, receivers),
            Err(_) => log::trace!("Dropped {} with no subscribers", name),
        }
    }
}

/// Keeps every event; used by tests and dry runs.
#[derive(Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<PipelineEvent>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn named(&self, name: &str) -> Vec<PipelineEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.name() == name)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&self, event: PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
