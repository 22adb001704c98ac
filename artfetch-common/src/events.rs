//! Event types and the broadcast event bus shared across the pipeline.
//!
//! The bus wraps `tokio::sync::broadcast`: publishing never blocks, slow
//! subscribers lag and drop old events rather than stalling producers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Pipeline event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ArtEvent {
    /// A scan session started
    ScanStarted {
        session_id: i64,
        scope: String,
        timestamp: DateTime<Utc>,
    },

    /// Scan progress update (per collection batch)
    ScanProgress {
        session_id: i64,
        scanned: u64,
        queued: u64,
        current: String,
        timestamp: DateTime<Utc>,
    },

    /// A scan session finished
    ScanCompleted {
        session_id: i64,
        scanned: u64,
        queued: u64,
        timestamp: DateTime<Utc>,
    },

    /// A session transitioned to paused (user cancel or precache gate)
    SessionPaused {
        session_id: i64,
        timestamp: DateTime<Utc>,
    },

    /// Upgrade detection needs a bulk texture caching pass
    PrecacheRequired {
        session_id: i64,
        pending: u64,
        timestamp: DateTime<Utc>,
    },

    /// Bulk texture caching progress
    PrecacheProgress {
        completed: u64,
        total: u64,
        timestamp: DateTime<Utc>,
    },

    /// Artwork was applied to the library (manually or by the processor)
    ArtworkApplied {
        title: String,
        art_type: String,
        url: String,
        auto_applied: bool,
        timestamp: DateTime<Utc>,
    },

    /// An unattended processor run finished
    ProcessRunCompleted {
        session_id: i64,
        processed: u64,
        auto_applied: u64,
        skipped: u64,
        errors: u64,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast event bus shared by the scanner, reviewer, processor and the
/// SSE endpoint.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ArtEvent>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ArtEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns the subscriber count, or an error when nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: ArtEvent) -> Result<usize, broadcast::error::SendError<ArtEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscribers case.
    pub fn emit_lossy(&self, event: ArtEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit_lossy(ArtEvent::PrecacheProgress {
            completed: 1,
            total: 10,
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            ArtEvent::PrecacheProgress { completed, total, .. } => {
                assert_eq!(completed, 1);
                assert_eq!(total, 10);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_lossy() {
        let bus = EventBus::new(4);
        // No subscriber attached; must not panic.
        bus.emit_lossy(ArtEvent::SessionPaused {
            session_id: 1,
            timestamp: Utc::now(),
        });
    }
}
