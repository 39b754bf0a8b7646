//! Persisted data model: settings and the bounded update history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use uuid::Uuid;

/// Number of history entries retained
pub const HISTORY_LIMIT: usize = 10;

/// Sentinel stored as `new_ip` when detection failed
pub const CHECK_FAILED: &str = "check_failed";

/// Poll interval in whole minutes, always within `[MIN, MAX]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PollInterval(u32);

impl PollInterval {
    /// Smallest allowed interval (minutes)
    pub const MIN: u32 = 1;
    /// Largest allowed interval (minutes)
    pub const MAX: u32 = 60;
    /// Interval used when nothing else is configured
    pub const DEFAULT: PollInterval = PollInterval(5);

    /// Create an interval, rejecting values outside `[MIN, MAX]`
    pub fn new(minutes: u32) -> Result<Self, crate::Error> {
        if (Self::MIN..=Self::MAX).contains(&minutes) {
            Ok(Self(minutes))
        } else {
            Err(crate::Error::invalid_input(format!(
                "poll interval must be between {} and {} minutes, got {}",
                Self::MIN,
                Self::MAX,
                minutes
            )))
        }
    }

    /// Interval in minutes
    pub fn minutes(self) -> u32 {
        self.0
    }

    /// Interval as a timer duration
    pub fn as_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.0) * 60)
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for PollInterval {
    type Error = crate::Error;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        Self::new(minutes)
    }
}

impl From<PollInterval> for u32 {
    fn from(interval: PollInterval) -> Self {
        interval.0
    }
}

/// Display theme preference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Singleton configuration persisted by the state store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Minutes between reconciliation cycles
    pub poll_interval: PollInterval,
    /// UI theme preference
    #[serde(default)]
    pub display_theme: Theme,
    /// Last detected public IP
    #[serde(default)]
    pub last_known_ip: Option<IpAddr>,
    /// When the settings were first created
    pub created_at: DateTime<Utc>,
    /// Last modification; strictly increases on every write
    pub updated_at: DateTime<Utc>,
}

impl Settings {
    /// Fresh settings with the given poll interval
    pub fn new(poll_interval: PollInterval) -> Self {
        let now = Utc::now();
        Self {
            poll_interval,
            display_theme: Theme::default(),
            last_known_ip: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance `updated_at`, even if the wall clock has not moved or went back
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + chrono::Duration::microseconds(1)
        };
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(PollInterval::default())
    }
}

/// User-editable settings changed in one write
///
/// `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub poll_interval: Option<PollInterval>,
    pub display_theme: Option<Theme>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.poll_interval.is_none() && self.display_theme.is_none()
    }
}

/// The `new_ip` of a history entry: an address or the check-failed sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RecordedIp {
    Address(IpAddr),
    CheckFailed,
}

impl fmt::Display for RecordedIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordedIp::Address(ip) => write!(f, "{}", ip),
            RecordedIp::CheckFailed => f.write_str(CHECK_FAILED),
        }
    }
}

impl From<RecordedIp> for String {
    fn from(ip: RecordedIp) -> Self {
        ip.to_string()
    }
}

impl TryFrom<String> for RecordedIp {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == CHECK_FAILED {
            return Ok(RecordedIp::CheckFailed);
        }
        value
            .parse()
            .map(RecordedIp::Address)
            .map_err(|_| format!("invalid recorded IP: {}", value))
    }
}

/// Outcome of a recorded cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failed,
}

/// One immutable history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub old_ip: Option<IpAddr>,
    pub new_ip: RecordedIp,
    pub outcome: Outcome,
    pub dns_record_updated: bool,
}

impl UpdateEntry {
    /// Entry for a cycle whose IP detection failed
    pub fn check_failed() -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            old_ip: None,
            new_ip: RecordedIp::CheckFailed,
            outcome: Outcome::Failed,
            dns_record_updated: false,
        }
    }

    /// Entry for a detected change; the outcome follows the write result
    pub fn change(old_ip: Option<IpAddr>, new_ip: IpAddr, dns_record_updated: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            old_ip,
            new_ip: RecordedIp::Address(new_ip),
            outcome: if dns_record_updated {
                Outcome::Success
            } else {
                Outcome::Failed
            },
            dns_record_updated,
        }
    }
}

/// Newest-first, bounded, append-only log of update entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateHistory(Vec<UpdateEntry>);

impl UpdateHistory {
    /// Empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend `entry` and drop anything beyond [`HISTORY_LIMIT`]
    pub fn push(&mut self, entry: UpdateEntry) {
        self.0.insert(0, entry);
        self.0.truncate(HISTORY_LIMIT);
    }

    /// Entries, newest first
    pub fn entries(&self) -> &[UpdateEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Re-establish ordering and the length bound after loading from disk
    pub(crate) fn normalize(&mut self) {
        self.0.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        self.0.truncate(HISTORY_LIMIT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval_bounds() {
        assert!(PollInterval::new(0).is_err());
        assert!(PollInterval::new(1).is_ok());
        assert!(PollInterval::new(60).is_ok());
        assert!(PollInterval::new(61).is_err());
        assert_eq!(PollInterval::new(3).unwrap().as_duration(), Duration::from_secs(180));
    }

    #[test]
    fn test_poll_interval_rejected_on_deserialize() {
        let parsed: Result<PollInterval, _> = serde_json::from_str("0");
        assert!(parsed.is_err());
        let parsed: PollInterval = serde_json::from_str("15").unwrap();
        assert_eq!(parsed.minutes(), 15);
    }

    #[test]
    fn test_touch_is_strictly_monotonic() {
        let mut settings = Settings::default();
        let mut previous = settings.updated_at;
        for _ in 0..100 {
            settings.touch();
            assert!(settings.updated_at > previous);
            previous = settings.updated_at;
        }
    }

    #[test]
    fn test_touch_survives_clock_going_backwards() {
        let mut settings = Settings::default();
        settings.updated_at = Utc::now() + chrono::Duration::hours(1);
        let future = settings.updated_at;
        settings.touch();
        assert!(settings.updated_at > future);
    }

    #[test]
    fn test_recorded_ip_sentinel_serialization() {
        let json = serde_json::to_string(&RecordedIp::CheckFailed).unwrap();
        assert_eq!(json, "\"check_failed\"");

        let ip: RecordedIp = serde_json::from_str("\"203.0.113.7\"").unwrap();
        assert_eq!(ip, RecordedIp::Address(IpAddr::from([203, 0, 113, 7])));

        assert!(serde_json::from_str::<RecordedIp>("\"bogus\"").is_err());
    }

    #[test]
    fn test_history_is_bounded_and_newest_first() {
        let mut history = UpdateHistory::new();
        for i in 0..15u8 {
            history.push(UpdateEntry::change(None, IpAddr::from([10, 0, 0, i]), true));
        }

        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(
            history.entries()[0].new_ip,
            RecordedIp::Address(IpAddr::from([10, 0, 0, 14]))
        );
        assert_eq!(
            history.entries()[HISTORY_LIMIT - 1].new_ip,
            RecordedIp::Address(IpAddr::from([10, 0, 0, 5]))
        );
    }

    #[test]
    fn test_change_entry_outcome_follows_write() {
        let ok = UpdateEntry::change(None, IpAddr::from([1, 1, 1, 1]), true);
        assert_eq!(ok.outcome, Outcome::Success);

        let failed = UpdateEntry::change(None, IpAddr::from([1, 1, 1, 1]), false);
        assert_eq!(failed.outcome, Outcome::Failed);
        assert!(!failed.dns_record_updated);
    }

    #[test]
    fn test_check_failed_entry_shape() {
        let entry = UpdateEntry::check_failed();
        assert_eq!(entry.old_ip, None);
        assert_eq!(entry.new_ip, RecordedIp::CheckFailed);
        assert_eq!(entry.outcome, Outcome::Failed);
        assert!(!entry.dns_record_updated);
    }
}
