mod common;

use common::{LineStore, PERIOD, Report, advance, deps, drain};
use lib_common::channels::{ChannelHandle, ChannelServer};
use lib_common::configs::{Channel, ChannelKind};
use lib_common::loggers::Severity;
use serde_json::{Value, json};
use std::sync::atomic::Ordering;
use std::time::Duration;

const STOP: &str = r#"{"message": "stop"}"#;
const JUST_AFTER: Duration = Duration::from_millis(1);

fn interval(store: &std::sync::Arc<LineStore>) -> (ChannelHandle, std::sync::Arc<common::MemorySink>) {
    let (deps, sink) = deps(store);
    (ChannelServer::spawn(Channel::new(4006, "Interval", ChannelKind::Polling), deps), sink)
}

#[tokio::test(start_paused = true)]
async fn test_stop_from_either_client_halts_both_and_a_new_join_rearms() {
    let store = LineStore::with_events(vec![(1, 0), (1, 0), (1, 0), (1, 2), (1, 1)]);
    let (handle, sink) = interval(&store);

    let (a, mut rx_a) = handle.join();
    let (_b, mut rx_b) = handle.join();
    handle.settled().await;
    assert!(handle.is_active().await);

    advance(PERIOD + JUST_AFTER).await;
    assert_eq!(drain(&mut rx_a).len(), 1);
    assert_eq!(drain(&mut rx_b).len(), 1);

    handle.inbound(a, STOP);
    handle.settled().await;
    assert!(!handle.is_active().await);

    advance(PERIOD * 3).await;
    assert!(drain(&mut rx_a).is_empty());
    assert!(drain(&mut rx_b).is_empty());

    let (_c, mut rx_c) = handle.join();
    handle.settled().await;
    assert!(handle.is_active().await);

    advance(PERIOD + JUST_AFTER).await;
    let frames = drain(&mut rx_c);
    assert_eq!(frames.len(), 1);
    assert_eq!(drain(&mut rx_a).len(), 1);
    assert_eq!(drain(&mut rx_b).len(), 1);

    let rows: Vec<Value> = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(rows.len(), 7);
    assert_eq!(
        rows[0],
        json!({"lane_no": "all_total", "ng_count_today": 2, "ok_count_today": 3, "total": 5})
    );
    assert_eq!(rows[1], json!({"lane_no": 1, "ng_count_today": 2, "ok_count_today": 3, "total": 5}));
    assert_eq!(rows[2], json!({"lane_no": 2, "ng_count_today": 0, "ok_count_today": 0, "total": 0}));
    assert!(sink.take().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_joins_while_active_share_one_timer() {
    let store = LineStore::with_events(vec![(3, 0)]);
    let (handle, _sink) = interval(&store);

    let (_a, mut rx_a) = handle.join();
    handle.settled().await;
    advance(PERIOD / 2).await;
    let (_b, mut rx_b) = handle.join();
    handle.settled().await;

    advance(PERIOD / 2 + JUST_AFTER).await;
    assert_eq!(drain(&mut rx_a).len(), 1);
    assert_eq!(drain(&mut rx_b).len(), 1);
    // Two statements per tick: the total and the per-lane rollup.
    assert_eq!(store.log.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_twice_is_harmless() {
    let store = LineStore::with_events(Vec::new());
    let (handle, sink) = interval(&store);

    let (a, mut rx_a) = handle.join();
    handle.inbound(a, STOP);
    handle.inbound(a, STOP);
    handle.settled().await;

    assert!(!handle.is_active().await);
    assert!(drain(&mut rx_a).is_empty());
    assert!(sink.take().is_empty());

    advance(PERIOD * 2).await;
    assert!(drain(&mut rx_a).is_empty());
    assert!(store.log.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_control_frame_is_answered_to_sender_only() {
    let store = LineStore::with_events(Vec::new());
    let (handle, sink) = interval(&store);

    let (a, mut rx_a) = handle.join();
    let (_b, mut rx_b) = handle.join();
    handle.inbound(a, "stop");
    handle.settled().await;

    let replies = drain(&mut rx_a);
    assert_eq!(replies.len(), 1);
    assert!(replies[0].starts_with("Interval invalid json body: "));
    assert!(drain(&mut rx_b).is_empty());
    assert!(handle.is_active().await);
    assert_eq!(
        sink.take(),
        vec![Report {
            origin: "Interval socket".into(),
            severity: Severity::InvalidValue,
            durable: false,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_other_messages_are_accepted_silently() {
    let store = LineStore::with_events(Vec::new());
    let (handle, sink) = interval(&store);

    let (a, mut rx_a) = handle.join();
    handle.inbound(a, r#"{"message": "hello"}"#);
    handle.inbound(a, "[1, 2, 3]");
    handle.settled().await;

    assert!(handle.is_active().await);
    assert!(drain(&mut rx_a).is_empty());
    assert!(sink.take().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_ticks_are_reported_and_the_timer_keeps_going() {
    let store = LineStore::with_events(vec![(2, 0)]);
    let (handle, sink) = interval(&store);
    let (_a, mut rx_a) = handle.join();
    handle.settled().await;

    store.fail_rollup.store(true, Ordering::SeqCst);
    advance(PERIOD + JUST_AFTER).await;
    assert!(drain(&mut rx_a).is_empty());
    assert_eq!(
        sink.take(),
        vec![Report {
            origin: "Interval socket".into(),
            severity: Severity::QueryFailed,
            durable: true,
        }]
    );

    store.fail_rollup.store(false, Ordering::SeqCst);
    store.down.store(true, Ordering::SeqCst);
    advance(PERIOD).await;
    assert!(drain(&mut rx_a).is_empty());
    assert_eq!(sink.take()[0].severity, Severity::PoolConnectFailed);

    store.down.store(false, Ordering::SeqCst);
    advance(PERIOD).await;
    assert_eq!(drain(&mut rx_a).len(), 1);
    assert!(handle.is_active().await);
    assert_eq!(store.held.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_last_disconnect_leaves_the_timer_running() {
    let store = LineStore::with_events(Vec::new());
    let (handle, _sink) = interval(&store);

    let (a, _rx_a) = handle.join();
    handle.leave(a);
    handle.settled().await;
    assert_eq!(handle.member_count(), 0);
    assert!(handle.is_active().await);

    advance(PERIOD * 2 + JUST_AFTER).await;
    assert_eq!(store.log.lock().unwrap().len(), 4);

    let (_b, mut rx_b) = handle.join();
    handle.settled().await;
    advance(PERIOD).await;
    assert_eq!(drain(&mut rx_b).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_and_rejoin_during_a_running_tick_leave_one_timer() {
    let store = LineStore::with_events(vec![(1, 0)]);
    let (handle, sink) = interval(&store);
    let gate = store.hold_rollups();

    let (a, mut rx_a) = handle.join();
    handle.settled().await;
    advance(PERIOD + JUST_AFTER).await;
    assert_eq!(store.held.load(Ordering::SeqCst), 1);

    handle.inbound(a, STOP);
    let (_b, mut rx_b) = handle.join();
    handle.settled().await;
    assert!(handle.is_active().await);

    // The held tick may still deliver its rollup.
    gate.add_permits(1000);
    advance(JUST_AFTER).await;
    assert_eq!(drain(&mut rx_a).len(), 1);
    assert_eq!(drain(&mut rx_b).len(), 1);
    assert_eq!(store.log.lock().unwrap().len(), 2);

    // A surviving first timer would add two statements at every multiple
    // of the period.
    advance(PERIOD + PERIOD / 3).await;
    assert_eq!(store.log.lock().unwrap().len(), 4);
    advance(PERIOD).await;
    assert_eq!(store.log.lock().unwrap().len(), 6);
    assert_eq!(drain(&mut rx_b).len(), 2);
    assert!(sink.take().is_empty());
    assert_eq!(store.held.load(Ordering::SeqCst), 0);
}
