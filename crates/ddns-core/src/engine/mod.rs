//! Reconciliation engine
//!
//! The ReconciliationEngine is responsible for:
//! - Detecting the current public IP via IpDetector
//! - Comparing it with the persisted last known IP and the live DNS record
//! - Updating the DNS record via DnsProvider when they diverge
//! - Recording every change attempt in the bounded history
//! - Rescheduling itself from the interval currently in the state store
//!
//! ## Architecture
//!
//! ```text
//!   timer ──┐                 ┌──────────────┐
//!           ├─ single-flight ─►  run_cycle   │
//!   force ──┘                 └──────┬───────┘
//!                                    │
//!         ┌──────────────────┬───────┴─────────┬──────────────────┐
//!         ▼                  ▼                 ▼                  ▼
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────┐   ┌─────────────┐
//! │ IpDetector  │   │ DnsProvider  │   │ StateStore  │   │   Events    │
//! │ (detect)    │   │ (read/write) │   │ (compare,   │   │  (notify)   │
//! └─────────────┘   └──────────────┘   │  record)    │   └─────────────┘
//!                                      └─────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. Detect the public IP. On failure append a `check_failed` entry and
//!    resolve `Error`.
//! 2. Read the DNS record, best-effort. A failed read marks DNS inaccessible.
//! 3. `changed = persisted != detected || (dns accessible && dns != detected)`
//! 4. On change: persist the detected IP, then write the record, then append
//!    one history entry.
//! 5. Resolve `Active` if the write succeeded or the engine is degraded
//!    (writes disabled, or DNS inaccessible); otherwise `Error`.

pub mod cooldown;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::detector::IpDetector;
use crate::error::{Error, Result};
use crate::model::{PollInterval, UpdateEntry};
use crate::traits::{DnsProvider, DnsRecord, StateStore};

/// Transient engine status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    #[default]
    Active,
    Checking,
    Error,
}

/// Point-in-time view of the engine for the API layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub status: EngineStatus,
    pub next_check_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Events emitted by the ReconciliationEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Scheduling loop started
    Started,

    /// A cycle began
    CycleStarted,

    /// Detected IP matches persisted state and DNS
    IpUnchanged { ip: IpAddr },

    /// Detected IP differs from persisted state or DNS
    IpChanged {
        old_ip: Option<IpAddr>,
        new_ip: IpAddr,
    },

    /// DNS record updated
    DnsUpdated { ip: IpAddr },

    /// DNS record could not be updated
    DnsUpdateFailed { error: String, degraded: bool },

    /// Every IP source failed
    DetectionFailed { error: String },

    /// A scheduled cycle found another cycle running and was skipped
    CycleSkipped,

    /// Scheduling loop stopped
    Stopped { reason: String },
}

/// What one cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Detected public IP (None when detection failed)
    pub detected_ip: Option<IpAddr>,
    /// Whether a divergence was found
    pub changed: bool,
    /// Whether the provider write succeeded
    pub dns_updated: bool,
    /// Status the cycle resolved to
    pub status: EngineStatus,
    /// Cycle-ending failure, if any
    pub error: Option<String>,
}

impl CycleReport {
    fn unchanged(ip: IpAddr) -> Self {
        Self {
            detected_ip: Some(ip),
            changed: false,
            dns_updated: false,
            status: EngineStatus::Active,
            error: None,
        }
    }

    fn failed(error: &Error) -> Self {
        Self {
            detected_ip: None,
            changed: false,
            dns_updated: false,
            status: EngineStatus::Error,
            error: Some(error.to_string()),
        }
    }
}

/// Result of a force-check request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForceCheckOutcome {
    pub accepted: bool,
    pub ip_changed: bool,
    pub current_ip: Option<IpAddr>,
    pub message: String,
}

impl ForceCheckOutcome {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            ip_changed: false,
            current_ip: None,
            message: message.into(),
        }
    }

    fn from_report(report: CycleReport) -> Self {
        let message = match (&report.error, report.changed, report.dns_updated) {
            (Some(error), _, _) => format!("check failed: {}", error),
            (None, true, true) => "IP changed, DNS record updated".to_string(),
            (None, true, false) => "IP changed, DNS record not updated".to_string(),
            (None, false, _) => "IP unchanged".to_string(),
        };
        Self {
            accepted: true,
            ip_changed: report.changed,
            current_ip: report.detected_ip,
            message,
        }
    }
}

/// Outcome of the best-effort DNS read
enum DnsView {
    Accessible(Option<DnsRecord>),
    Inaccessible,
}

impl DnsView {
    fn is_accessible(&self) -> bool {
        matches!(self, DnsView::Accessible(_))
    }

    fn record(&self) -> Option<&DnsRecord> {
        match self {
            DnsView::Accessible(record) => record.as_ref(),
            DnsView::Inaccessible => None,
        }
    }
}

struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct EngineInner {
    detector: IpDetector,
    provider: Box<dyn DnsProvider>,
    state_store: Arc<dyn StateStore>,

    /// Single-flight guard; only ever acquired with `try_lock`
    cycle_guard: Mutex<()>,

    status_tx: watch::Sender<StatusSnapshot>,

    /// Last interval successfully read from the store (minutes)
    last_interval: AtomicU32,

    stopped: AtomicBool,
    scheduler: Mutex<Option<Scheduler>>,
    event_tx: mpsc::Sender<EngineEvent>,
}

/// Core reconciliation engine
///
/// Cloning is cheap; clones share one engine.
///
/// ## Lifecycle
///
/// 1. Create with [`ReconciliationEngine::new()`]
/// 2. [`start()`](Self::start) runs a cycle immediately, then one per interval
/// 3. [`force_check()`](Self::force_check) runs a cycle on demand
/// 4. [`stop()`](Self::stop) cancels the pending timer; no cycle runs afterwards
///
/// ## Concurrency
///
/// At most one cycle executes at any instant. A force check that arrives
/// while a cycle is running is rejected, and a scheduled cycle that finds a
/// force check running is skipped.
#[derive(Clone)]
pub struct ReconciliationEngine {
    inner: Arc<EngineInner>,
}

impl ReconciliationEngine {
    /// Create a new reconciliation engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        detector: IpDetector,
        provider: Box<dyn DnsProvider>,
        state_store: Arc<dyn StateStore>,
        config: &EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;
        if detector.is_empty() {
            return Err(Error::config("IP detector has no sources"));
        }

        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let (status_tx, _) = watch::channel(StatusSnapshot::default());

        let inner = EngineInner {
            detector,
            provider,
            state_store,
            cycle_guard: Mutex::new(()),
            status_tx,
            last_interval: AtomicU32::new(config.default_poll_interval.minutes()),
            stopped: AtomicBool::new(false),
            scheduler: Mutex::new(None),
            event_tx,
        };

        Ok((
            Self {
                inner: Arc::new(inner),
            },
            event_rx,
        ))
    }

    /// Start the scheduling loop
    ///
    /// Runs one cycle immediately, then re-arms a one-shot timer after every
    /// cycle using the interval read from the state store at that moment.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` if the engine is already running or was stopped.
    pub async fn start(&self) -> Result<()> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(Error::invalid_input("engine has been stopped"));
        }

        let mut scheduler = self.inner.scheduler.lock().await;
        if scheduler.is_some() {
            return Err(Error::invalid_input("engine is already running"));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run_loop(shutdown_rx).await });

        *scheduler = Some(Scheduler {
            shutdown_tx,
            handle,
        });
        info!("Reconciliation engine started");
        Ok(())
    }

    /// Stop the engine
    ///
    /// Cancels the pending timer, waits for an in-flight cycle to finish and
    /// flushes the state store. After this returns no cycle will run, and
    /// force checks are rejected.
    pub async fn stop(&self) -> Result<()> {
        self.inner.stopped.store(true, Ordering::SeqCst);

        let scheduler = self.inner.scheduler.lock().await.take();
        if let Some(scheduler) = scheduler {
            let _ = scheduler.shutdown_tx.send(true);
            if let Err(e) = scheduler.handle.await {
                error!("Scheduling task ended abnormally: {}", e);
            }
        }

        // Wait out a force check that may still be running
        let _guard = self.inner.cycle_guard.lock().await;
        self.inner.status_tx.send_modify(|s| s.next_check_time = None);

        self.inner.state_store.flush().await?;
        info!("State flushed, engine stopped");
        Ok(())
    }

    /// Run one cycle now, unless one is already running
    ///
    /// Never queues and never waits for a running cycle.
    pub async fn force_check(&self) -> ForceCheckOutcome {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return ForceCheckOutcome::rejected("engine is stopped");
        }

        let Ok(_guard) = self.inner.cycle_guard.try_lock() else {
            debug!("Force check rejected: check already in progress");
            return ForceCheckOutcome::rejected("check already in progress");
        };
        // stop() may have completed between the first check and the lock
        if self.inner.stopped.load(Ordering::SeqCst) {
            return ForceCheckOutcome::rejected("engine is stopped");
        }

        info!("Running forced check");
        ForceCheckOutcome::from_report(self.inner.run_cycle().await)
    }

    /// Current status
    pub fn status(&self) -> EngineStatus {
        self.inner.status_tx.borrow().status
    }

    /// When the next scheduled cycle fires (None when not scheduled)
    pub fn next_check_time(&self) -> Option<DateTime<Utc>> {
        self.inner.status_tx.borrow().next_check_time
    }

    /// Error that ended the most recent cycle, if it failed
    pub fn last_error(&self) -> Option<String> {
        self.inner.status_tx.borrow().last_error.clone()
    }

    /// Full status snapshot
    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.status_tx.borrow().clone()
    }

    /// Watch status changes
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.inner.status_tx.subscribe()
    }

    /// State store shared with the engine
    pub fn state_store(&self) -> Arc<dyn StateStore> {
        Arc::clone(&self.inner.state_store)
    }

    /// Whether stop() has been called
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Whether provider writes are enabled
    pub fn writes_enabled(&self) -> bool {
        self.inner.provider.writes_enabled()
    }
}

impl EngineInner {
    async fn run_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        self.emit_event(EngineEvent::Started);

        loop {
            if *shutdown_rx.borrow() || self.stopped.load(Ordering::SeqCst) {
                break;
            }

            match self.cycle_guard.try_lock() {
                Ok(_guard) => {
                    self.run_cycle().await;
                }
                Err(_) => {
                    debug!("Scheduled check skipped: check already in progress");
                    self.emit_event(EngineEvent::CycleSkipped);
                }
            }

            let delay = self.next_delay().await;
            let next = chrono::Duration::from_std(delay)
                .ok()
                .map(|d| Utc::now() + d);
            self.status_tx.send_modify(|s| s.next_check_time = next);
            debug!("Next check in {:?}", delay);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.status_tx.send_modify(|s| s.next_check_time = None);
        self.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
    }

    /// Interval for the next timer, read from the store now
    async fn next_delay(&self) -> Duration {
        match self.state_store.settings().await {
            Ok(settings) => {
                self.last_interval
                    .store(settings.poll_interval.minutes(), Ordering::SeqCst);
                settings.poll_interval.as_duration()
            }
            Err(e) => {
                let minutes = self.last_interval.load(Ordering::SeqCst);
                error!(
                    "Failed to read poll interval: {}. Rescheduling with last known interval ({} min)",
                    e, minutes
                );
                self.status_tx.send_modify(|s| {
                    s.status = EngineStatus::Error;
                    s.last_error = Some(format!("failed to read poll interval: {}", e));
                });
                PollInterval::new(minutes)
                    .unwrap_or_default()
                    .as_duration()
            }
        }
    }

    /// Run one cycle; the caller holds the single-flight guard
    async fn run_cycle(&self) -> CycleReport {
        self.status_tx
            .send_modify(|s| s.status = EngineStatus::Checking);
        self.emit_event(EngineEvent::CycleStarted);

        let report = match self.reconcile().await {
            Ok(report) => report,
            Err(e) => {
                error!("Check failed: {}", e);
                CycleReport::failed(&e)
            }
        };

        self.status_tx.send_modify(|s| {
            s.status = report.status;
            s.last_error = report.error.clone();
        });
        report
    }

    async fn reconcile(&self) -> Result<CycleReport> {
        let detected = match self.detector.detect().await {
            Ok(ip) => ip,
            Err(e) => {
                self.emit_event(EngineEvent::DetectionFailed {
                    error: e.to_string(),
                });
                self.state_store
                    .append_history(UpdateEntry::check_failed())
                    .await?;
                return Err(e);
            }
        };

        let persisted_ip = self.state_store.settings().await?.last_known_ip;
        let dns = self.read_dns().await;
        let dns_ip = dns.record().and_then(DnsRecord::ip);

        let changed =
            persisted_ip != Some(detected) || (dns.is_accessible() && dns_ip != Some(detected));

        if !changed {
            debug!("IP unchanged: {}", detected);
            self.emit_event(EngineEvent::IpUnchanged { ip: detected });
            return Ok(CycleReport::unchanged(detected));
        }

        let old_ip = dns_ip.or(persisted_ip);
        info!(
            "IP change detected: {} -> {} (persisted: {:?}, dns: {:?})",
            old_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "none".to_string()),
            detected,
            persisted_ip,
            dns_ip
        );
        self.emit_event(EngineEvent::IpChanged {
            old_ip,
            new_ip: detected,
        });

        // Persisted before the write; the write outcome only affects the entry
        self.state_store.set_last_known_ip(detected).await?;

        let write = match dns.record() {
            Some(base) => self.provider.write_record(detected, base).await,
            None => Err(Error::dns_write("no DNS record available to update")),
        };
        let dns_updated = write.is_ok();

        let recorded = self
            .state_store
            .append_history(UpdateEntry::change(old_ip, detected, dns_updated))
            .await;

        let degraded = !self.provider.writes_enabled() || !dns.is_accessible();

        let mut report = match write {
            Ok(_) => {
                info!("DNS record updated to {}", detected);
                self.emit_event(EngineEvent::DnsUpdated { ip: detected });
                CycleReport {
                    detected_ip: Some(detected),
                    changed: true,
                    dns_updated: true,
                    status: EngineStatus::Active,
                    error: None,
                }
            }
            Err(e) => {
                self.emit_event(EngineEvent::DnsUpdateFailed {
                    error: e.to_string(),
                    degraded,
                });
                if degraded {
                    warn!(
                        "DNS record not updated ({}); running degraded, local IP tracking continues",
                        e
                    );
                    CycleReport {
                        detected_ip: Some(detected),
                        changed: true,
                        dns_updated: false,
                        status: EngineStatus::Active,
                        error: None,
                    }
                } else {
                    let e = Error::dns_write(e.to_string());
                    error!("{}", e);
                    CycleReport {
                        detected_ip: Some(detected),
                        changed: true,
                        dns_updated: false,
                        status: EngineStatus::Error,
                        error: Some(e.to_string()),
                    }
                }
            }
        };

        // The write already happened; keep what the cycle did in the report
        if let Err(e) = recorded {
            error!("Failed to record update history: {}", e);
            report.status = EngineStatus::Error;
            report.error = Some(e.to_string());
        }

        Ok(report)
    }

    /// Best-effort read of the provider's record
    async fn read_dns(&self) -> DnsView {
        match self.provider.read_record().await {
            Ok(record) => {
                if record.is_none() {
                    warn!(
                        "No matching DNS record found at {}",
                        self.provider.provider_name()
                    );
                }
                DnsView::Accessible(record)
            }
            Err(e) => {
                let e = Error::dns_read(e.to_string());
                warn!("{}; comparing against persisted IP only", e);
                DnsView::Inaccessible
            }
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("Failed to emit engine event: {}", e);
        }
    }
}
