// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ordering guarantees of the event plane: historical replay before live
//! events, drop-oldest under pressure.

use qto_broker::{Broker, EventBus as _};
use qto_core::{StageEvent, SystemClock, channel};
use qto_store::Store;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn seed_job(store: &Store) -> Uuid {
    let user = store
        .user_insert(qto_core::User {
            id: Uuid::new_v4(),
            email: "s@r.test".into(),
            password_hash: "h".into(),
            role: qto_core::UserRole::User,
            email_verified: true,
            credits_balance: 0,
            full_name: "S".into(),
            created_at: store.now(),
            last_verification_sent_at: None,
            deactivated: false,
        })
        .unwrap();
    store
        .job_insert(qto_core::Job {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            user_id: user.id,
            file_id: Uuid::new_v4(),
            status: qto_core::JobStatus::Running,
            progress: 10,
            error_code: None,
            price_list_id: None,
            supplier_id: None,
            created_at: store.now(),
            started_at: Some(store.now()),
            finished_at: None,
        })
        .unwrap()
        .id
}

/// Invariant 7: a reconnecting client sees stored events in emission
/// order first, then live events; nothing stored before connect is
/// missed.
#[tokio::test]
async fn replay_then_live_has_no_gaps() {
    let clock = Arc::new(SystemClock);
    let store = Store::in_memory(clock);
    let broker = Broker::new();
    let job_id = seed_job(&store);
    let chan = channel::job(job_id);

    // Events emitted while nobody listens land only in the log.
    for (i, stage) in ["queued", "validating", "parsing"].iter().enumerate() {
        let ev = store
            .job_event_append(job_id, stage, &format!("m{i}"), None)
            .unwrap();
        broker.publish(&chan, serde_json::to_value(StageEvent::from(&ev)).unwrap());
    }

    // Client connects: subscribe first, then snapshot history.
    let live = broker.subscribe(&chan);
    let historical: Vec<Value> = store
        .job_events(job_id)
        .iter()
        .map(|ev| serde_json::to_value(StageEvent::from(ev)).unwrap())
        .collect();

    // More events arrive while the client is attached.
    for stage in ["takeoff", "completed"] {
        let ev = store.job_event_append(job_id, stage, "live", None).unwrap();
        broker.publish(&chan, serde_json::to_value(StageEvent::from(&ev)).unwrap());
    }

    let mut seen: Vec<String> = historical
        .iter()
        .map(|v| v["stage"].as_str().unwrap().to_string())
        .collect();
    while let Some(ev) = live.try_recv() {
        seen.push(ev["stage"].as_str().unwrap().to_string());
    }

    assert_eq!(
        seen,
        vec!["queued", "validating", "parsing", "takeoff", "completed"]
    );
}

/// Invariant 5 / scenario S5 at the fan-out layer: a blocked subscriber
/// keeps the newest `cap` events, drops the oldest, and full-queue
/// heartbeats are skipped entirely.
#[tokio::test]
async fn slow_subscriber_keeps_newest_events_only() {
    let broker = Broker::with_settings(100, Duration::from_millis(5));
    let sub = broker.subscribe("jobs:slow:exports");

    for n in 0..500u32 {
        broker.publish("jobs:slow:exports", json!({"n": n}));
    }
    // Let several heartbeat ticks fire against the saturated queue.
    tokio::time::sleep(Duration::from_millis(30)).await;

    let mut drained = Vec::new();
    while let Some(ev) = sub.try_recv() {
        drained.push(ev);
    }
    assert_eq!(drained.len(), 100);
    assert!(drained.iter().all(|e| !qto_broker::is_heartbeat(e)));
    let ns: Vec<u64> = drained.iter().map(|e| e["n"].as_u64().unwrap()).collect();
    assert_eq!(*ns.first().unwrap(), 400);
    assert_eq!(*ns.last().unwrap(), 499);
    assert!(ns.windows(2).all(|w| w[0] + 1 == w[1]));
}

/// Publishing to one channel never bleeds into another, and both
/// subscribers of a channel observe the same order.
#[tokio::test]
async fn per_channel_total_order_across_subscribers() {
    let broker = Broker::new();
    let a = broker.subscribe("project:p1");
    let b = broker.subscribe("project:p1");
    let other = broker.subscribe("project:p2");

    for n in 0..50u32 {
        broker.publish("project:p1", json!({"n": n}));
    }

    let drain = |sub: &qto_broker::Subscription| {
        let mut out = Vec::new();
        while let Some(ev) = sub.try_recv() {
            out.push(ev["n"].as_u64().unwrap());
        }
        out
    };
    let seq_a = drain(&a);
    let seq_b = drain(&b);
    assert_eq!(seq_a, seq_b);
    assert_eq!(seq_a.len(), 50);
    assert!(drain(&other).is_empty());
}
