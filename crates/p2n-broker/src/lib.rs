// crates/p2n-broker/src/lib.rs
// ============================================================================
// Module: Paper2Notebook Broker Library
// Description: In-process run-stream pub-sub keyed by run identifier.
// Purpose: Fan events to live consumers with replay for late joiners.
// Dependencies: p2n-core, serde_json, thiserror, tokio, tokio-stream
// ============================================================================

//! ## Overview
//! The run-stream broker is process-wide mutable state with a fixed
//! lifecycle per run: `register`, any number of `publish` calls, `close`.
//! Subscribers attach at any point; on attach they first receive the
//! persisted events replayed from the event store, then follow live
//! publications, with no gap between the two. Publishers never block:
//! a subscriber whose bounded queue is full is disconnected.
//!
//! Ordering: per-run events are delivered in publish order. Nothing is
//! promised across runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use p2n_core::RunId;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Bounded queue capacity per subscriber.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Broker errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The run was never registered or is already closed.
    #[error("unknown run: {0}")]
    UnknownRun(String),
    /// The run is already registered.
    #[error("run already registered: {0}")]
    AlreadyRegistered(String),
    /// The replay source failed.
    #[error("replay failure: {0}")]
    Replay(String),
}

// ============================================================================
// SECTION: Replay Source
// ============================================================================

/// Source of persisted events replayed to late subscribers.
///
/// The executor persists every event before publishing it, so a replay read
/// taken under the broker lock can never miss an event that a live
/// subscription would have seen.
pub trait EventReplaySource: Send + Sync {
    /// Returns the persisted `(type, payload)` pairs for a run, in order.
    ///
    /// # Errors
    ///
    /// Returns a message when the underlying store fails.
    fn replay(&self, run_id: &RunId) -> Result<Vec<(String, Value)>, String>;
}

/// Replay source with no history; suitable for tests and ephemeral runs.
pub struct NoReplay;

impl EventReplaySource for NoReplay {
    fn replay(&self, _run_id: &RunId) -> Result<Vec<(String, Value)>, String> {
        Ok(Vec::new())
    }
}

// ============================================================================
// SECTION: Broker
// ============================================================================

/// Per-run channel state.
struct RunChannel {
    /// Live subscriber queues.
    subscribers: Vec<mpsc::Sender<(String, Value)>>,
}

/// In-process run-stream broker.
///
/// # Invariants
/// - Publishes are O(subscribers) and never await.
/// - Closing a run ends every subscriber stream.
pub struct RunStreamBroker {
    /// Channel table keyed by run identifier.
    channels: Mutex<BTreeMap<RunId, RunChannel>>,
    /// Replay source for late subscribers.
    replay_source: Arc<dyn EventReplaySource>,
}

impl RunStreamBroker {
    /// Creates a broker over the given replay source.
    #[must_use]
    pub fn new(replay_source: Arc<dyn EventReplaySource>) -> Self {
        Self {
            channels: Mutex::new(BTreeMap::new()),
            replay_source,
        }
    }

    /// Registers a run before its background execution starts.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::AlreadyRegistered`] for duplicate registration.
    pub fn register(&self, run_id: &RunId) -> Result<(), BrokerError> {
        let mut channels = self.lock_channels();
        if channels.contains_key(run_id) {
            return Err(BrokerError::AlreadyRegistered(run_id.to_string()));
        }
        channels.insert(
            run_id.clone(),
            RunChannel {
                subscribers: Vec::new(),
            },
        );
        Ok(())
    }

    /// Publishes one event to every live subscriber of a run.
    ///
    /// Subscribers with full queues are disconnected; the publisher never
    /// blocks or fails on their behalf.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownRun`] for unregistered runs.
    pub fn publish(
        &self,
        run_id: &RunId,
        event_type: &str,
        payload: &Value,
    ) -> Result<(), BrokerError> {
        let mut channels = self.lock_channels();
        let Some(channel) = channels.get_mut(run_id) else {
            return Err(BrokerError::UnknownRun(run_id.to_string()));
        };
        channel.subscribers.retain(|subscriber| {
            match subscriber.try_send((event_type.to_string(), payload.clone())) {
                Ok(()) => true,
                // Full or closed: the slow or gone subscriber is dropped.
                Err(_) => false,
            }
        });
        Ok(())
    }

    /// Subscribes to a run, receiving replayed events then live ones.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownRun`] for unregistered runs, or
    /// [`BrokerError::Replay`] when the replay source fails.
    pub fn subscribe(
        &self,
        run_id: &RunId,
    ) -> Result<ReceiverStream<(String, Value)>, BrokerError> {
        let mut channels = self.lock_channels();
        let Some(channel) = channels.get_mut(run_id) else {
            return Err(BrokerError::UnknownRun(run_id.to_string()));
        };
        // Replay is read under the lock: anything persisted before now lands
        // in the replay; anything published after the lock drops is live.
        let replay = self
            .replay_source
            .replay(run_id)
            .map_err(BrokerError::Replay)?;
        let capacity = SUBSCRIBER_QUEUE_CAPACITY.max(replay.len() + 1);
        let (sender, receiver) = mpsc::channel(capacity);
        for event in replay {
            // Capacity covers the full replay; a failure means the receiver
            // vanished already, which only shortens the stream.
            if sender.try_send(event).is_err() {
                break;
            }
        }
        channel.subscribers.push(sender);
        Ok(ReceiverStream::new(receiver))
    }

    /// Closes a run's channel, ending every subscriber stream.
    ///
    /// Closing an unknown run is a no-op so terminal paths stay idempotent.
    pub fn close(&self, run_id: &RunId) {
        let mut channels = self.lock_channels();
        channels.remove(run_id);
    }

    /// Returns the live subscriber count for diagnostics.
    #[must_use]
    pub fn subscriber_count(&self, run_id: &RunId) -> usize {
        let channels = self.lock_channels();
        channels.get(run_id).map_or(0, |channel| channel.subscribers.len())
    }

    /// Locks the channel table, recovering from poisoned locks.
    fn lock_channels(&self) -> std::sync::MutexGuard<'_, BTreeMap<RunId, RunChannel>> {
        match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests;
