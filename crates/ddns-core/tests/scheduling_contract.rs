//! Contract Test: Self-Rescheduling Loop
//!
//! Constraints verified:
//! - The first cycle runs immediately on start
//! - The interval for the next timer is read from the state store at the end
//!   of each cycle, so interval changes apply from the following timer on
//! - A failed interval read keeps the last known interval and is reported
//!   as the last error
//! - After stop() no cycle runs, scheduled or forced
//!
//! All tests run on a paused clock; sleeping in the test advances time.

mod common;

use common::*;
use ddns_core::engine::{EngineEvent, EngineStatus};
use ddns_core::model::PollInterval;
use ddns_core::traits::StateStore;
use ddns_core::MemoryStateStore;
use std::sync::Arc;
use std::time::Duration;

const MINUTE: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn first_cycle_runs_immediately_on_start() {
    let source = ScriptedIpSource::new(ip("198.51.100.1"));
    let provider = MockDnsProvider::with_record("198.51.100.1");
    let store = Arc::new(MemoryStateStore::new());

    let (engine, mut events) = build_engine(
        detector_for(ScriptedIpSource::sharing_state_with(&source)),
        MockDnsProvider::sharing_state_with(&provider),
        store,
    );

    assert_eq!(engine.next_check_time(), None);

    engine.start().await.unwrap();
    settle().await;

    assert_eq!(source.call_count(), 1);
    assert_eq!(engine.status(), EngineStatus::Active);
    assert!(engine.next_check_time().is_some());

    let events = drain_events(&mut events);
    assert_eq!(events.first(), Some(&EngineEvent::Started));
    assert!(events.contains(&EngineEvent::CycleStarted));

    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn interval_change_applies_after_the_next_cycle() {
    let source = ScriptedIpSource::new(ip("198.51.100.1"));
    let provider = MockDnsProvider::with_record("198.51.100.1");
    let store = Arc::new(MemoryStateStore::with_interval(PollInterval::new(5).unwrap()));

    let (engine, _events) = build_engine(
        detector_for(ScriptedIpSource::sharing_state_with(&source)),
        provider,
        store.clone(),
    );

    engine.start().await.unwrap();
    settle().await;
    assert_eq!(source.call_count(), 1);

    // t = 1m: shorten the interval while the 5 minute timer is armed
    tokio::time::sleep(MINUTE).await;
    store
        .set_poll_interval(PollInterval::new(1).unwrap())
        .await
        .unwrap();

    // The armed timer is not re-armed
    tokio::time::sleep(3 * MINUTE + Duration::from_secs(58)).await;
    assert_eq!(source.call_count(), 1, "no cycle before t = 5m");

    // t = 5m: cycle 2 runs, then reads the new 1 minute interval
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(source.call_count(), 2);

    // t = 6m: cycle 3
    tokio::time::sleep(MINUTE).await;
    assert_eq!(source.call_count(), 3);

    tokio::time::sleep(MINUTE).await;
    assert_eq!(source.call_count(), 4);

    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_interval_read_keeps_last_known_interval() {
    let source = ScriptedIpSource::new(ip("198.51.100.1"));
    let provider = MockDnsProvider::with_record("198.51.100.1");
    let store = FlakyStateStore::with_interval(PollInterval::new(2).unwrap());

    let (engine, _events) = build_engine(
        detector_for(ScriptedIpSource::sharing_state_with(&source)),
        provider,
        Arc::new(store.clone()),
    );

    engine.start().await.unwrap();
    settle().await;
    assert_eq!(source.call_count(), 1);

    store.fail_settings(true);

    // t = 2m: the cycle fails on the settings read, but is rescheduled at 2m
    tokio::time::sleep(2 * MINUTE).await;
    assert_eq!(source.call_count(), 2);
    assert_eq!(engine.status(), EngineStatus::Error);
    assert!(engine.last_error().is_some());

    tokio::time::sleep(2 * MINUTE).await;
    assert_eq!(source.call_count(), 3);

    // Recovery clears the error on the next cycle
    store.fail_settings(false);
    tokio::time::sleep(2 * MINUTE).await;
    assert_eq!(source.call_count(), 4);
    assert_eq!(engine.status(), EngineStatus::Active);
    assert_eq!(engine.last_error(), None);

    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_interval_read_after_a_good_cycle_is_reported() {
    let source = ScriptedIpSource::new(ip("198.51.100.1"));
    let store = FlakyStateStore::with_interval(PollInterval::default());
    store.set_last_known_ip(ip("198.51.100.1")).await.unwrap();

    let (engine, _events) = build_engine(
        detector_for(ScriptedIpSource::sharing_state_with(&source)),
        MockDnsProvider::with_record("198.51.100.1"),
        Arc::new(store.clone()),
    );

    // The cycle's own settings read succeeds, the interval read after it fails
    store.fail_settings_after(1);
    engine.start().await.unwrap();
    settle().await;

    assert_eq!(source.call_count(), 1);
    assert_eq!(engine.status(), EngineStatus::Error);
    assert!(engine.last_error().unwrap().contains("poll interval"));
    assert!(engine.next_check_time().is_some());

    // Rescheduled with the fallback interval; a clean cycle clears the error
    store.fail_settings(false);
    tokio::time::sleep(PollInterval::default().as_duration()).await;
    assert_eq!(source.call_count(), 2);
    assert_eq!(engine.status(), EngineStatus::Active);
    assert_eq!(engine.last_error(), None);

    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_prevents_further_cycles() {
    let source = ScriptedIpSource::new(ip("198.51.100.1"));
    let provider = MockDnsProvider::with_record("198.51.100.1");
    let store = Arc::new(MemoryStateStore::new());

    let (engine, mut events) = build_engine(
        detector_for(ScriptedIpSource::sharing_state_with(&source)),
        provider,
        store,
    );

    engine.start().await.unwrap();
    settle().await;
    engine.stop().await.unwrap();

    assert_eq!(engine.next_check_time(), None);

    tokio::time::sleep(60 * MINUTE).await;
    assert_eq!(source.call_count(), 1, "no cycle may run after stop");

    let outcome = engine.force_check().await;
    assert!(!outcome.accepted);
    assert_eq!(outcome.message, "engine is stopped");
    assert_eq!(source.call_count(), 1);

    let events = drain_events(&mut events);
    assert!(matches!(events.last(), Some(EngineEvent::Stopped { .. })));
}

#[tokio::test(start_paused = true)]
async fn start_is_rejected_when_running_or_stopped() {
    let store = Arc::new(MemoryStateStore::new());
    let (engine, _events) = build_engine(
        detector_for(ScriptedIpSource::new(ip("198.51.100.1"))),
        MockDnsProvider::with_record("198.51.100.1"),
        store,
    );

    engine.start().await.unwrap();
    assert!(engine.start().await.is_err());

    engine.stop().await.unwrap();
    assert!(engine.start().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn stop_without_start_is_clean() {
    let store = Arc::new(MemoryStateStore::new());
    let (engine, _events) = build_engine(
        detector_for(ScriptedIpSource::new(ip("198.51.100.1"))),
        MockDnsProvider::with_record("198.51.100.1"),
        store,
    );

    engine.stop().await.unwrap();
    assert!(!engine.force_check().await.accepted);
}
