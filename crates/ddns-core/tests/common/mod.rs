//! Test doubles and common utilities for engine contract tests
//!
//! Every double shares its counters through `Arc`s so a test can keep one
//! handle while the engine owns another (see `sharing_state_with`).

#![allow(dead_code)]

use ddns_core::config::EngineConfig;
use ddns_core::engine::{EngineEvent, ReconciliationEngine};
use ddns_core::error::{Error, Result};
use ddns_core::model::{PollInterval, Settings, SettingsPatch, Theme, UpdateEntry};
use ddns_core::traits::{DnsProvider, DnsRecord, IpSource, StateStore};
use ddns_core::{IpDetector, MemoryStateStore, RetryPolicy};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const RECORD_NAME: &str = "home.example.com";

pub fn ip(addr: &str) -> IpAddr {
    addr.parse().unwrap()
}

/// An IpSource answering with an IP the test can change between cycles
pub struct ScriptedIpSource {
    ip: Arc<Mutex<IpAddr>>,
    calls: Arc<AtomicUsize>,
    /// Simulated request latency
    delay: Option<Duration>,
}

impl ScriptedIpSource {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip: Arc::new(Mutex::new(ip)),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// Every fetch takes `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_ip(&self, ip: IpAddr) {
        *self.ip.lock().unwrap() = ip;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Create a new source that shares the IP and counters with an existing one
    pub fn sharing_state_with(other: &Self) -> Self {
        Self {
            ip: Arc::clone(&other.ip),
            calls: Arc::clone(&other.calls),
            delay: other.delay,
        }
    }
}

#[async_trait::async_trait]
impl IpSource for ScriptedIpSource {
    async fn fetch(&self) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(*self.ip.lock().unwrap())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// An IpSource whose requests never complete
#[derive(Clone, Default)]
pub struct HangingIpSource {
    calls: Arc<AtomicUsize>,
}

impl HangingIpSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpSource for HangingIpSource {
    async fn fetch(&self) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

/// An IpSource that always answers with a malformed body
#[derive(Clone, Default)]
pub struct FailingIpSource {
    calls: Arc<AtomicUsize>,
}

impl FailingIpSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpSource for FailingIpSource {
    async fn fetch(&self) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::ip_source("malformed response body"))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// A mock DnsProvider holding one record in memory
pub struct MockDnsProvider {
    record: Arc<Mutex<Option<DnsRecord>>>,
    /// Records passed to successful writes, in order
    written: Arc<Mutex<Vec<DnsRecord>>>,
    read_calls: Arc<AtomicUsize>,
    write_calls: Arc<AtomicUsize>,
    /// Reads fail with an authentication error
    fail_reads: Arc<AtomicBool>,
    /// Writes fail with a transport error
    fail_writes: Arc<AtomicBool>,
    writes_enabled: bool,
    /// Store whose last known IP is sampled at the start of every write
    observed_store: Arc<Mutex<Option<Arc<dyn StateStore>>>>,
    persisted_at_write: Arc<Mutex<Vec<Option<IpAddr>>>>,
}

impl MockDnsProvider {
    pub fn new(record: Option<DnsRecord>) -> Self {
        Self {
            record: Arc::new(Mutex::new(record)),
            written: Arc::new(Mutex::new(Vec::new())),
            read_calls: Arc::new(AtomicUsize::new(0)),
            write_calls: Arc::new(AtomicUsize::new(0)),
            fail_reads: Arc::new(AtomicBool::new(false)),
            fail_writes: Arc::new(AtomicBool::new(false)),
            writes_enabled: true,
            observed_store: Arc::new(Mutex::new(None)),
            persisted_at_write: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Provider holding an A record for [`RECORD_NAME`] pointing at `content`
    pub fn with_record(content: &str) -> Self {
        Self::new(Some(a_record(content)))
    }

    /// Dry-run provider: writes are refused
    pub fn dry_run(mut self) -> Self {
        self.writes_enabled = false;
        self
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Sample `store`'s last known IP whenever a write begins
    pub fn observe_store(&self, store: Arc<dyn StateStore>) {
        *self.observed_store.lock().unwrap() = Some(store);
    }

    /// Last known IP the observed store held as each write began
    pub fn persisted_at_write(&self) -> Vec<Option<IpAddr>> {
        self.persisted_at_write.lock().unwrap().clone()
    }

    pub fn read_call_count(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn write_call_count(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<DnsRecord> {
        self.written.lock().unwrap().clone()
    }

    pub fn current_record(&self) -> Option<DnsRecord> {
        self.record.lock().unwrap().clone()
    }

    /// Create a new MockDnsProvider that shares state with an existing one
    pub fn sharing_state_with(other: &Self) -> Self {
        Self {
            record: Arc::clone(&other.record),
            written: Arc::clone(&other.written),
            read_calls: Arc::clone(&other.read_calls),
            write_calls: Arc::clone(&other.write_calls),
            fail_reads: Arc::clone(&other.fail_reads),
            fail_writes: Arc::clone(&other.fail_writes),
            writes_enabled: other.writes_enabled,
            observed_store: Arc::clone(&other.observed_store),
            persisted_at_write: Arc::clone(&other.persisted_at_write),
        }
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn read_record(&self) -> Result<Option<DnsRecord>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::auth("invalid API token"));
        }
        Ok(self.record.lock().unwrap().clone())
    }

    async fn write_record(&self, content: IpAddr, base: &DnsRecord) -> Result<DnsRecord> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        let observed = self.observed_store.lock().unwrap().clone();
        if let Some(store) = observed {
            let persisted = store.settings().await.ok().and_then(|s| s.last_known_ip);
            self.persisted_at_write.lock().unwrap().push(persisted);
        }

        if !self.writes_enabled {
            return Err(Error::writes_disabled("dry-run mode"));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::http("connection reset by peer"));
        }

        let updated = base.with_content(content);
        *self.record.lock().unwrap() = Some(updated.clone());
        self.written.lock().unwrap().push(updated.clone());
        Ok(updated)
    }

    fn writes_enabled(&self) -> bool {
        self.writes_enabled
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A MemoryStateStore whose settings reads and history appends can be made to fail
#[derive(Clone)]
pub struct FlakyStateStore {
    inner: MemoryStateStore,
    fail_settings: Arc<AtomicBool>,
    /// Settings reads that still succeed; `usize::MAX` means unlimited
    settings_reads_left: Arc<AtomicUsize>,
    fail_appends: Arc<AtomicBool>,
}

impl FlakyStateStore {
    pub fn with_interval(interval: PollInterval) -> Self {
        Self {
            inner: MemoryStateStore::with_interval(interval),
            fail_settings: Arc::new(AtomicBool::new(false)),
            settings_reads_left: Arc::new(AtomicUsize::new(usize::MAX)),
            fail_appends: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fail every settings read, or restore them all
    pub fn fail_settings(&self, fail: bool) {
        self.fail_settings.store(fail, Ordering::SeqCst);
        self.settings_reads_left.store(usize::MAX, Ordering::SeqCst);
    }

    /// Let `reads` more settings reads succeed, then fail the rest
    pub fn fail_settings_after(&self, reads: usize) {
        self.settings_reads_left.store(reads, Ordering::SeqCst);
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

impl Default for FlakyStateStore {
    fn default() -> Self {
        Self::with_interval(PollInterval::default())
    }
}

#[async_trait::async_trait]
impl StateStore for FlakyStateStore {
    async fn settings(&self) -> Result<Settings> {
        if self.fail_settings.load(Ordering::SeqCst) {
            return Err(Error::persistence("state file unreadable"));
        }
        let budget = self
            .settings_reads_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                usize::MAX => Some(usize::MAX),
                0 => None,
                n => Some(n - 1),
            });
        if budget.is_err() {
            return Err(Error::persistence("state file unreadable"));
        }
        self.inner.settings().await
    }

    async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings> {
        self.inner.update_settings(patch).await
    }

    async fn set_poll_interval(&self, interval: PollInterval) -> Result<Settings> {
        self.inner.set_poll_interval(interval).await
    }

    async fn set_display_theme(&self, theme: Theme) -> Result<Settings> {
        self.inner.set_display_theme(theme).await
    }

    async fn set_last_known_ip(&self, ip: IpAddr) -> Result<Settings> {
        self.inner.set_last_known_ip(ip).await
    }

    async fn append_history(&self, entry: UpdateEntry) -> Result<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(Error::persistence("disk full"));
        }
        self.inner.append_history(entry).await
    }

    async fn history(&self) -> Result<Vec<UpdateEntry>> {
        self.inner.history().await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}

/// An A record for [`RECORD_NAME`] with non-default ttl and proxied flags
pub fn a_record(content: &str) -> DnsRecord {
    DnsRecord {
        id: "rec-1".to_string(),
        record_type: "A".to_string(),
        name: RECORD_NAME.to_string(),
        content: content.to_string(),
        ttl: 120,
        proxied: true,
    }
}

/// One attempt per source, no delays
pub fn single_attempt_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 1,
        delays: Vec::new(),
        attempt_timeout: Duration::from_secs(30),
        source_pause: Duration::ZERO,
    }
}

/// Detector over a single source with [`single_attempt_policy`]
pub fn detector_for(source: impl IpSource + 'static) -> IpDetector {
    IpDetector::new().with_source(Box::new(source), single_attempt_policy())
}

/// Engine over the given parts with the default engine configuration
pub fn build_engine(
    detector: IpDetector,
    provider: MockDnsProvider,
    store: Arc<dyn StateStore>,
) -> (ReconciliationEngine, mpsc::Receiver<EngineEvent>) {
    ReconciliationEngine::new(detector, Box::new(provider), store, &EngineConfig::default())
        .expect("engine construction succeeds")
}

/// Let spawned tasks run until they block on a timer or I/O
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Drain every event emitted so far
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
