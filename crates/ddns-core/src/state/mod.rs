//! State store implementations

pub mod memory;
pub mod file;

pub use memory::MemoryStateStore;
pub use file::FileStateStore;

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::model::{PollInterval, Settings, SettingsPatch, Theme, UpdateEntry, UpdateHistory};

/// Everything a state store persists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct PersistedState {
    pub(crate) settings: Settings,
    #[serde(default)]
    pub(crate) history: UpdateHistory,
}

impl PersistedState {
    pub(crate) fn new(poll_interval: PollInterval) -> Self {
        Self {
            settings: Settings::new(poll_interval),
            history: UpdateHistory::new(),
        }
    }

    pub(crate) fn set_poll_interval(&mut self, interval: PollInterval) -> Settings {
        self.settings.poll_interval = interval;
        self.settings.touch();
        self.settings.clone()
    }

    pub(crate) fn set_display_theme(&mut self, theme: Theme) -> Settings {
        self.settings.display_theme = theme;
        self.settings.touch();
        self.settings.clone()
    }

    pub(crate) fn apply_patch(&mut self, patch: SettingsPatch) -> Settings {
        if let Some(interval) = patch.poll_interval {
            self.settings.poll_interval = interval;
        }
        if let Some(theme) = patch.display_theme {
            self.settings.display_theme = theme;
        }
        self.settings.touch();
        self.settings.clone()
    }

    pub(crate) fn set_last_known_ip(&mut self, ip: IpAddr) -> Settings {
        self.settings.last_known_ip = Some(ip);
        self.settings.touch();
        self.settings.clone()
    }

    pub(crate) fn append_history(&mut self, entry: UpdateEntry) {
        self.history.push(entry);
    }
}
