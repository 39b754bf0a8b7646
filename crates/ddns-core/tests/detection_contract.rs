//! Contract Test: Detection Retry & Failover
//!
//! Constraints verified:
//! - Each source gets a bounded number of attempts, each bounded by a timeout
//! - Backoff between attempts follows the policy's delay schedule
//! - An exhausted source falls over to the next one after a pause
//! - Detection failure is reported only once every source is exhausted

mod common;

use common::*;
use ddns_core::traits::StateStore;
use ddns_core::{IpDetector, MemoryStateStore, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn hanging_source_falls_over_to_next_source() {
    let primary = HangingIpSource::new();
    let fallback = ScriptedIpSource::new(ip("203.0.113.7"));

    let detector = IpDetector::new()
        .with_source(Box::new(primary.clone()), RetryPolicy::standard())
        .with_source(
            Box::new(ScriptedIpSource::sharing_state_with(&fallback)),
            RetryPolicy::standard(),
        );

    let start = Instant::now();
    let detected = detector.detect().await.unwrap();

    assert_eq!(detected, ip("203.0.113.7"));
    assert_eq!(primary.call_count(), 4);
    assert_eq!(fallback.call_count(), 1);
    // 4 timeouts of 5s, backoff of 1s + 2s + 4s, 1s pause before failover
    assert_eq!(start.elapsed(), Duration::from_secs(28));
}

#[tokio::test(start_paused = true)]
async fn extended_policy_waits_longer() {
    let primary = HangingIpSource::new();
    let fallback = ScriptedIpSource::new(ip("203.0.113.7"));

    let detector = IpDetector::new()
        .with_source(Box::new(primary.clone()), RetryPolicy::extended())
        .with_source(
            Box::new(ScriptedIpSource::sharing_state_with(&fallback)),
            RetryPolicy::extended(),
        );

    let start = Instant::now();
    detector.detect().await.unwrap();

    // 4 timeouts of 10s, backoff of 2s + 5s + 10s, 2s pause before failover
    assert_eq!(start.elapsed(), Duration::from_secs(59));
}

#[tokio::test(start_paused = true)]
async fn engine_uses_fallback_ip() {
    let primary = HangingIpSource::new();
    let detector = IpDetector::new()
        .with_source(Box::new(primary.clone()), RetryPolicy::standard())
        .with_source(
            Box::new(ScriptedIpSource::new(ip("203.0.113.7"))),
            RetryPolicy::standard(),
        );
    let store = Arc::new(MemoryStateStore::new());
    let provider = MockDnsProvider::with_record("198.51.100.1");

    let (engine, _events) = build_engine(
        detector,
        MockDnsProvider::sharing_state_with(&provider),
        store.clone(),
    );

    let outcome = engine.force_check().await;
    assert_eq!(outcome.current_ip, Some(ip("203.0.113.7")));
    assert_eq!(primary.call_count(), 4);
    assert_eq!(
        provider.current_record().map(|r| r.content),
        Some("203.0.113.7".to_string())
    );
    assert_eq!(
        store.settings().await.unwrap().last_known_ip,
        Some(ip("203.0.113.7"))
    );
}

#[tokio::test(start_paused = true)]
async fn failing_sources_exhaust_before_detection_fails() {
    let first = FailingIpSource::new();
    let second = FailingIpSource::new();
    let policy = RetryPolicy {
        max_attempts: 3,
        ..RetryPolicy::standard()
    };

    let detector = IpDetector::new()
        .with_source(Box::new(first.clone()), policy.clone())
        .with_source(Box::new(second.clone()), policy);

    assert!(detector.detect().await.is_err());
    assert_eq!(first.call_count(), 3);
    assert_eq!(second.call_count(), 3);
}
