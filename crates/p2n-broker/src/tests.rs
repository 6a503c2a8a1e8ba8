// crates/p2n-broker/src/tests.rs
// ============================================================================
// Module: Broker Tests
// Description: Tests for registration, fan-out, replay, and backpressure.
// Purpose: Exercise replay-then-live ordering and slow-subscriber policy.
// Dependencies: p2n-broker, p2n-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! Validates the run-stream broker's lifecycle and delivery guarantees.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;

use p2n_core::RunId;
use serde_json::Value;
use serde_json::json;
use tokio_stream::StreamExt;

use crate::BrokerError;
use crate::EventReplaySource;
use crate::NoReplay;
use crate::RunStreamBroker;
use crate::SUBSCRIBER_QUEUE_CAPACITY;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Replay source backed by an in-memory event list.
struct FixedReplay {
    /// Events returned for every run.
    events: Mutex<Vec<(String, Value)>>,
}

impl EventReplaySource for FixedReplay {
    fn replay(&self, _run_id: &RunId) -> Result<Vec<(String, Value)>, String> {
        Ok(self.events.lock().unwrap().clone())
    }
}

// ============================================================================
// SECTION: Lifecycle Tests
// ============================================================================

/// Tests publishing to an unregistered run is refused.
#[tokio::test]
async fn publish_requires_registration() {
    let broker = RunStreamBroker::new(Arc::new(NoReplay));
    let outcome = broker.publish(&RunId::new("r1"), "progress", &json!({ "percent": 0 }));
    assert!(matches!(outcome, Err(BrokerError::UnknownRun(_))));
}

/// Tests duplicate registration is refused.
#[tokio::test]
async fn duplicate_registration_is_refused() {
    let broker = RunStreamBroker::new(Arc::new(NoReplay));
    broker.register(&RunId::new("r1")).unwrap();
    assert!(matches!(
        broker.register(&RunId::new("r1")),
        Err(BrokerError::AlreadyRegistered(_))
    ));
}

/// Tests live subscribers receive events in publish order.
#[tokio::test]
async fn live_events_arrive_in_order() {
    let broker = RunStreamBroker::new(Arc::new(NoReplay));
    let run_id = RunId::new("r1");
    broker.register(&run_id).unwrap();
    let mut stream = broker.subscribe(&run_id).unwrap();

    for percent in [0, 50, 100] {
        broker.publish(&run_id, "progress", &json!({ "percent": percent })).unwrap();
    }
    broker.close(&run_id);

    let mut seen = Vec::new();
    while let Some((event_type, payload)) = stream.next().await {
        assert_eq!(event_type, "progress");
        seen.push(payload["percent"].as_i64().unwrap());
    }
    assert_eq!(seen, vec![0, 50, 100]);
}

/// Tests late subscribers see replay first, then live events.
#[tokio::test]
async fn late_subscriber_sees_replay_then_live() {
    let replay = Arc::new(FixedReplay {
        events: Mutex::new(vec![
            ("stage_update".to_string(), json!({ "stage": "run" })),
            ("progress".to_string(), json!({ "percent": 50 })),
        ]),
    });
    let broker = RunStreamBroker::new(replay);
    let run_id = RunId::new("r1");
    broker.register(&run_id).unwrap();

    let mut stream = broker.subscribe(&run_id).unwrap();
    broker.publish(&run_id, "progress", &json!({ "percent": 100 })).unwrap();
    broker.close(&run_id);

    let mut kinds = Vec::new();
    while let Some((event_type, payload)) = stream.next().await {
        kinds.push((event_type, payload));
    }
    assert_eq!(kinds.len(), 3);
    assert_eq!(kinds[0].0, "stage_update");
    assert_eq!(kinds[1].1["percent"], 50);
    assert_eq!(kinds[2].1["percent"], 100);
}

/// Tests closing a run ends subscriber streams.
#[tokio::test]
async fn close_ends_streams() {
    let broker = RunStreamBroker::new(Arc::new(NoReplay));
    let run_id = RunId::new("r1");
    broker.register(&run_id).unwrap();
    let mut stream = broker.subscribe(&run_id).unwrap();
    broker.close(&run_id);
    assert!(stream.next().await.is_none());
}

/// Tests closing twice is a no-op.
#[tokio::test]
async fn close_is_idempotent() {
    let broker = RunStreamBroker::new(Arc::new(NoReplay));
    let run_id = RunId::new("r1");
    broker.register(&run_id).unwrap();
    broker.close(&run_id);
    broker.close(&run_id);
}

// ============================================================================
// SECTION: Backpressure Tests
// ============================================================================

/// Tests a slow subscriber is dropped instead of blocking the publisher.
#[tokio::test]
async fn slow_subscriber_is_dropped() {
    let broker = RunStreamBroker::new(Arc::new(NoReplay));
    let run_id = RunId::new("r1");
    broker.register(&run_id).unwrap();
    let stream = broker.subscribe(&run_id).unwrap();
    assert_eq!(broker.subscriber_count(&run_id), 1);

    // Never draining the stream fills the bounded queue.
    for index in 0..=SUBSCRIBER_QUEUE_CAPACITY {
        broker
            .publish(&run_id, "log_line", &json!({ "message": format!("line {index}") }))
            .unwrap();
    }
    assert_eq!(broker.subscriber_count(&run_id), 0, "slow subscriber dropped");
    drop(stream);
}

/// Tests other subscribers keep receiving after one is dropped.
#[tokio::test]
async fn healthy_subscribers_survive_a_drop() {
    let broker = RunStreamBroker::new(Arc::new(NoReplay));
    let run_id = RunId::new("r1");
    broker.register(&run_id).unwrap();

    let slow = broker.subscribe(&run_id).unwrap();
    let mut healthy = broker.subscribe(&run_id).unwrap();

    for index in 0..=SUBSCRIBER_QUEUE_CAPACITY {
        broker
            .publish(&run_id, "log_line", &json!({ "message": format!("line {index}") }))
            .unwrap();
        // Drain the healthy stream as we go.
        let (event_type, _payload) = healthy.next().await.unwrap();
        assert_eq!(event_type, "log_line");
    }
    assert_eq!(broker.subscriber_count(&run_id), 1);
    drop(slow);
}
