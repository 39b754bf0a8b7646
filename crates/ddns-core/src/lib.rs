// # ddns-core
//
// Core library for the DDNS reconciliation engine.
//
// ## Architecture Overview
//
// - **IpSource**: one request against one public-IP echo service
// - **IpDetector**: prioritized sources with bounded retries and failover
// - **DnsProvider**: reads and writes the managed DNS record
// - **StateStore**: durable settings, last known IP and bounded update history
// - **ReconciliationEngine**: self-rescheduling single-flight reconcile loop
//
// ## Design Principles
//
// 1. **Separation of Concerns**: sources and providers never retry or persist
// 2. **Interval From State**: each cycle re-reads the poll interval after it ends
// 3. **Idempotency**: an unchanged IP produces no write and no history entry
// 4. **Library-First**: the daemon is a thin shell over this crate

pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod model;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{
    DdnsConfig, EngineConfig, IpSourceConfig, IpVersion, ProviderConfig, ResponseFormat,
    RetryConfig, RetryProfile, StateStoreConfig,
};
pub use detector::{IpDetector, RetryPolicy};
pub use engine::cooldown::{ForceCheckGate, GateRejection};
pub use engine::{
    CycleReport, EngineEvent, EngineStatus, ForceCheckOutcome, ReconciliationEngine,
    StatusSnapshot,
};
pub use error::{Error, Result};
pub use model::{
    Outcome, PollInterval, RecordedIp, Settings, SettingsPatch, Theme, UpdateEntry,
    UpdateHistory,
};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{DnsProvider, DnsRecord, IpSource, StateStore};
