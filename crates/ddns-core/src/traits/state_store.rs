// # State Store Trait
//
// Defines the interface for persistent state management.
//
// ## Purpose
//
// The state store holds:
// - The settings singleton (poll interval, theme, last known IP)
// - The bounded update history (10 most recent entries, newest first)
//
// Every mutation is a full read-modify-write of the persisted state and is
// serialized against every other mutation, so settings updates coming from
// the API never race with the engine's own writes.
//
// ## Implementations
//
// - File-based: single JSON file with atomic writes and backup recovery
// - In-memory: tests and ephemeral deployments
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::StateStore;
// use ddns_core::model::PollInterval;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* StateStore implementation */;
//
//     let settings = store.settings().await?;
//     store.set_poll_interval(PollInterval::new(10)?).await?;
//
//     for entry in store.history().await? {
//         println!("{} -> {}", entry.timestamp, entry.new_ip);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

use crate::model::{PollInterval, Settings, SettingsPatch, Theme, UpdateEntry};

/// Trait for state store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks; the
/// implementation serializes mutations.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Implement locking for single-writer discipline
///
/// ## Forbidden Capabilities
/// - ❌ Spawn background tasks
/// - ❌ Implement business logic (owned by `ReconciliationEngine`)
///
/// # Errors
///
/// Every method returns `Error::Persistence` when storage cannot be read or
/// written. Callers must not fall back to default data on error.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Current settings
    async fn settings(&self) -> Result<Settings, crate::Error>;

    /// Change the poll interval; returns the updated settings
    async fn set_poll_interval(&self, interval: PollInterval) -> Result<Settings, crate::Error>;

    /// Change the display theme; returns the updated settings
    async fn set_display_theme(&self, theme: Theme) -> Result<Settings, crate::Error>;

    /// Apply every field of `patch` in a single write, or none of them
    async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, crate::Error>;

    /// Record a newly detected public IP; returns the updated settings
    async fn set_last_known_ip(&self, ip: IpAddr) -> Result<Settings, crate::Error>;

    /// Append an entry to the history, trimming it to the retention limit
    async fn append_history(&self, entry: UpdateEntry) -> Result<(), crate::Error>;

    /// Retained history entries, newest first
    async fn history(&self) -> Result<Vec<UpdateEntry>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
