// crates/p2n-pipeline/src/sink.rs
// ============================================================================
// Module: Run Event Plumbing
// Description: Persist-then-publish sink and the store-backed replay source.
// Purpose: Keep persisted events a prefix of what live subscribers observe.
// Dependencies: p2n-broker, p2n-core, p2n-executor, serde_json
// ============================================================================

//! ## Overview
//! The executor emits events through one sink: each event is persisted to
//! the metadata store first and published to the broker second. Combined with
//! the broker reading replay under its lock, a late subscriber sees exactly
//! replay-then-live with no gap. Store or broker failures never interrupt
//! execution; the run's artifacts are the source of truth.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use p2n_broker::EventReplaySource;
use p2n_broker::RunStreamBroker;
use p2n_core::MetadataStore;
use p2n_core::RunId;
use p2n_core::Timestamp;
use p2n_executor::RunEventSink;
use serde_json::Value;

// ============================================================================
// SECTION: Persisting Sink
// ============================================================================

/// Sink that persists each event and then fans it to subscribers.
///
/// # Invariants
/// - Persist happens before publish for every event.
pub struct PersistingRunSink {
    /// Metadata store for the event log.
    store: Arc<dyn MetadataStore>,
    /// Broker for live fan-out.
    broker: Arc<RunStreamBroker>,
    /// Run this sink belongs to.
    run_id: RunId,
}

impl PersistingRunSink {
    /// Creates a sink for one run.
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>, broker: Arc<RunStreamBroker>, run_id: RunId) -> Self {
        Self {
            store,
            broker,
            run_id,
        }
    }
}

impl RunEventSink for PersistingRunSink {
    fn emit(&self, event_type: &str, payload: &Value) {
        if self
            .store
            .append_run_event(&self.run_id, Timestamp::now(), event_type, payload)
            .is_err()
        {
            // Event-log persistence is best effort during execution; the
            // run's artifacts carry the authoritative record.
        }
        if self.broker.publish(&self.run_id, event_type, payload).is_err() {
            // The channel may already be closed by a terminal path.
        }
    }
}

// ============================================================================
// SECTION: Replay Source
// ============================================================================

/// Replay source reading persisted run events from the metadata store.
pub struct StoreReplaySource {
    /// Metadata store holding the event log.
    store: Arc<dyn MetadataStore>,
}

impl StoreReplaySource {
    /// Creates a replay source over the store.
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
        }
    }
}

impl EventReplaySource for StoreReplaySource {
    fn replay(&self, run_id: &RunId) -> Result<Vec<(String, Value)>, String> {
        let events = self.store.list_run_events(run_id).map_err(|err| err.to_string())?;
        Ok(events.into_iter().map(|event| (event.event_type, event.payload)).collect())
    }
}
