// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Purpose
//
// Persists the settings singleton and the update history across daemon
// restarts and crashes.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## Single Writer
//
// One mutex is held across every read-modify-write, including the file
// write. The in-memory copy is only replaced once the new file is in place,
// so a failed write leaves both memory and disk at the previous state.
//
// ## File Format
//
// ```json
// {
//   "version": "2.0",
//   "settings": {
//     "poll_interval": 5,
//     "display_theme": "dark",
//     "last_known_ip": "198.51.100.1",
//     "created_at": "2025-01-09T12:00:00Z",
//     "updated_at": "2025-01-09T12:05:00Z"
//   },
//   "history": [
//     {
//       "id": "6f1c...",
//       "timestamp": "2025-01-09T12:05:00Z",
//       "old_ip": "198.51.100.0",
//       "new_ip": "198.51.100.1",
//       "outcome": "success",
//       "dns_record_updated": true
//     }
//   ]
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::PersistedState;
use crate::Error;
use crate::model::{PollInterval, Settings, SettingsPatch, Theme, UpdateEntry, UpdateHistory};
use crate::traits::state_store::StateStore;

/// State file format version
/// Used for future migration if format changes
const STATE_FILE_VERSION: &str = "2.0";

/// File-based state store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use ddns_core::model::PollInterval;
/// use ddns_core::state::FileStateStore;
/// use ddns_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::open("/var/lib/ddns/state.json", PollInterval::new(5)?).await?;
///
///     // Atomically written to disk
///     store.set_last_known_ip("192.0.2.1".parse()?).await?;
///
///     let settings = store.settings().await?;
///     assert_eq!(settings.last_known_ip, Some("192.0.2.1".parse()?));
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    state: Arc<Mutex<PersistedState>>,
}

/// Serializable state file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    settings: Settings,
    #[serde(default)]
    history: UpdateHistory,
}

impl FileStateStore {
    /// Create or load a file state store with the default poll interval
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::open(path, PollInterval::default()).await
    }

    /// Create or load a file state store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing state file
    /// 3. If corruption is detected, try to load from backup
    /// 4. If there is no usable state, start fresh with `initial_interval`
    ///    and write it out immediately
    pub async fn open<P: AsRef<Path>>(
        path: P,
        initial_interval: PollInterval,
    ) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::persistence(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let loaded = Self::load_state_with_recovery(&path).await?;
        let fresh = loaded.is_none();
        let state = loaded.unwrap_or_else(|| PersistedState::new(initial_interval));

        let store = Self {
            path,
            state: Arc::new(Mutex::new(state)),
        };

        if fresh {
            let guard = store.state.lock().await;
            store.write_state(&guard).await?;
        }

        Ok(store)
    }

    /// Load state from file with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main state file
    /// 2. If it does not parse, try loading backup
    /// 3. If backup also fails, start with empty state
    async fn load_state_with_recovery(path: &Path) -> Result<Option<PersistedState>, Error> {
        match Self::load_state(path).await {
            Ok(state) => {
                if let Some(ref state) = state {
                    tracing::debug!(
                        "Loaded state from file: {} history entries",
                        state.history.len()
                    );
                }
                Ok(state)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "State file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty state.");
                    return Ok(None);
                }

                match Self::load_state(&backup_path).await {
                    Ok(Some(state)) => {
                        tracing::info!(
                            "Recovered state from backup: {} history entries",
                            state.history.len()
                        );

                        if let Err(restore_err) =
                            Self::restore_from_backup(path, &backup_path).await
                        {
                            tracing::error!(
                                "Failed to restore state file from backup: {}",
                                restore_err
                            );
                        }

                        Ok(Some(state))
                    }
                    Ok(None) => Ok(None),
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with empty state.",
                            backup_err
                        );
                        Ok(None)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Load state from file
    ///
    /// Returns `Error::Json` when the file exists but does not parse.
    async fn load_state(path: &Path) -> Result<Option<PersistedState>, Error> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            ))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content)?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        let mut history = state_file.history;
        history.normalize();

        Ok(Some(PersistedState {
            settings: state_file.settings,
            history,
        }))
    }

    /// Write `state` to file atomically
    async fn write_state(&self, state: &PersistedState) -> Result<(), Error> {
        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            settings: state.settings.clone(),
            history: state.history.clone(),
        };

        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::persistence(format!("Failed to serialize state: {}", e)))?;

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Create backup of current file (if it exists)
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        // Atomic rename (temp -> actual)
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    /// Apply `change` to a copy of the state, write it, then commit it
    async fn mutate<T, F>(&self, change: F) -> Result<T, Error>
    where
        F: FnOnce(&mut PersistedState) -> T + Send,
        T: Send,
    {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let out = change(&mut next);
        self.write_state(&next).await?;
        *guard = next;
        Ok(out)
    }

    /// Restore state file from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored state file from backup");
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn settings(&self) -> Result<Settings, Error> {
        Ok(self.state.lock().await.settings.clone())
    }

    async fn set_poll_interval(&self, interval: PollInterval) -> Result<Settings, Error> {
        self.mutate(|state| state.set_poll_interval(interval)).await
    }

    async fn set_display_theme(&self, theme: Theme) -> Result<Settings, Error> {
        self.mutate(|state| state.set_display_theme(theme)).await
    }

    async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, Error> {
        self.mutate(|state| state.apply_patch(patch)).await
    }

    async fn set_last_known_ip(&self, ip: IpAddr) -> Result<Settings, Error> {
        self.mutate(|state| state.set_last_known_ip(ip)).await
    }

    async fn append_history(&self, entry: UpdateEntry) -> Result<(), Error> {
        self.mutate(|state| state.append_history(entry)).await
    }

    async fn history(&self) -> Result<Vec<UpdateEntry>, Error> {
        Ok(self.state.lock().await.history.entries().to_vec())
    }

    async fn flush(&self) -> Result<(), Error> {
        let guard = self.state.lock().await;
        self.write_state(&guard).await
    }
}
