// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Provides a simple, fast state store that doesn't persist across restarts.
// Useful for testing and for deployments where losing the last known IP on
// restart is acceptable (the first cycle after a restart will then compare
// against the DNS record only).

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::PersistedState;
use crate::Error;
use crate::model::{PollInterval, Settings, SettingsPatch, Theme, UpdateEntry};
use crate::traits::state_store::StateStore;

/// In-memory state store implementation
///
/// # Example
///
/// ```rust,no_run
/// use ddns_core::state::MemoryStateStore;
/// use ddns_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///
///     store.set_last_known_ip("192.0.2.1".parse()?).await?;
///     let settings = store.settings().await?;
///     assert_eq!(settings.last_known_ip, Some("192.0.2.1".parse()?));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<PersistedState>>,
}

impl MemoryStateStore {
    /// Create a new memory state store with the default poll interval
    pub fn new() -> Self {
        Self::with_interval(PollInterval::default())
    }

    /// Create a new memory state store with the given poll interval
    pub fn with_interval(poll_interval: PollInterval) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PersistedState::new(poll_interval))),
        }
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn settings(&self) -> Result<Settings, Error> {
        Ok(self.inner.lock().await.settings.clone())
    }

    async fn set_poll_interval(&self, interval: PollInterval) -> Result<Settings, Error> {
        Ok(self.inner.lock().await.set_poll_interval(interval))
    }

    async fn set_display_theme(&self, theme: Theme) -> Result<Settings, Error> {
        Ok(self.inner.lock().await.set_display_theme(theme))
    }

    async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, Error> {
        Ok(self.inner.lock().await.apply_patch(patch))
    }

    async fn set_last_known_ip(&self, ip: IpAddr) -> Result<Settings, Error> {
        Ok(self.inner.lock().await.set_last_known_ip(ip))
    }

    async fn append_history(&self, entry: UpdateEntry) -> Result<(), Error> {
        self.inner.lock().await.append_history(entry);
        Ok(())
    }

    async fn history(&self) -> Result<Vec<UpdateEntry>, Error> {
        Ok(self.inner.lock().await.history.entries().to_vec())
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}
