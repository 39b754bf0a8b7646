//! Configuration types for the DDNS system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::detector::RetryPolicy;
use crate::model::PollInterval;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Main DDNS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdnsConfig {
    /// IP sources, in priority order
    pub ip_sources: Vec<IpSourceConfig>,

    /// Retry behaviour of the IP detector
    #[serde(default)]
    pub retry: RetryConfig,

    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// State store configuration
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl DdnsConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.ip_sources.is_empty() {
            return Err(crate::Error::config("No IP sources configured"));
        }

        for source in &self.ip_sources {
            source.validate()?;
        }

        self.retry.policy().validate()?;
        self.provider.validate()?;
        self.state_store.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// How an IP source's response body is parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Whole body is the address (surrounding whitespace ignored)
    Text,
    /// JSON object; the address is the string at `field`
    Json {
        /// Top-level field holding the address (e.g. "ip")
        field: String,
    },
}

/// One "what is my IP" service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpSourceConfig {
    /// Name used in logs
    pub name: String,
    /// Request URL
    pub url: String,
    /// Response parsing mode
    pub format: ResponseFormat,
}

impl IpSourceConfig {
    /// Plain-text source
    pub fn text(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            format: ResponseFormat::Text,
        }
    }

    /// JSON source reading the address from `field`
    pub fn json(name: impl Into<String>, url: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            format: ResponseFormat::Json {
                field: field.into(),
            },
        }
    }

    /// Default source list for the standard profile
    pub fn standard_sources(version: IpVersion) -> Vec<Self> {
        match version {
            IpVersion::V4 => vec![
                Self::json("ipify", "https://api.ipify.org?format=json", "ip"),
                Self::json("ipinfo", "https://ipinfo.io/json", "ip"),
                Self::text("icanhazip", "https://ipv4.icanhazip.com"),
                Self::text("ifconfig.me", "https://ifconfig.me/ip"),
            ],
            IpVersion::V6 => vec![
                Self::json("ipify", "https://api6.ipify.org?format=json", "ip"),
                Self::text("icanhazip", "https://ipv6.icanhazip.com"),
                Self::text("ident.me", "https://v6.ident.me"),
                Self::text("ifconfig.co", "https://ifconfig.co/ip"),
            ],
        }
    }

    /// Longer source list for the extended profile
    pub fn extended_sources(version: IpVersion) -> Vec<Self> {
        let mut sources = Self::standard_sources(version);
        match version {
            IpVersion::V4 => {
                sources.push(Self::json("seeip", "https://api.seeip.org/jsonip", "ip"));
                sources.push(Self::text("ident.me", "https://v4.ident.me"));
            }
            IpVersion::V6 => {
                sources.push(Self::json("seeip", "https://ipv6.seeip.org/jsonip", "ip"));
                sources.push(Self::json("ipify64", "https://api64.ipify.org?format=json", "ip"));
            }
        }
        sources
    }

    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.name.is_empty() {
            return Err(crate::Error::config("IP source name cannot be empty"));
        }
        if !self.url.starts_with("https://") && !self.url.starts_with("http://") {
            return Err(crate::Error::config(format!(
                "IP source '{}' URL must use HTTP or HTTPS scheme. Got: {}",
                self.name, self.url
            )));
        }
        if let ResponseFormat::Json { field } = &self.format {
            if field.is_empty() {
                return Err(crate::Error::config(format!(
                    "IP source '{}' JSON field cannot be empty",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Address family of the managed record
///
/// Sources are filtered by it: an answer of the other family is a failed
/// attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    /// IPv4 only (A records)
    #[default]
    V4,
    /// IPv6 only (AAAA records)
    V6,
}

impl IpVersion {
    /// Family written by a DNS record type
    pub fn for_record_type(record_type: &str) -> Result<Self, crate::Error> {
        match record_type {
            "A" => Ok(Self::V4),
            "AAAA" => Ok(Self::V6),
            other => Err(crate::Error::config(format!(
                "DNS record type must be A or AAAA. Got: {}",
                other
            ))),
        }
    }

    /// Whether `ip` belongs to this family
    pub fn matches(&self, ip: &std::net::IpAddr) -> bool {
        match self {
            IpVersion::V4 => ip.is_ipv4(),
            IpVersion::V6 => ip.is_ipv6(),
        }
    }
}

impl std::fmt::Display for IpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpVersion::V4 => write!(f, "IPv4"),
            IpVersion::V6 => write!(f, "IPv6"),
        }
    }
}

/// Named retry profiles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryProfile {
    /// 4 attempts, 1s/2s/4s backoff, 5s per request
    #[default]
    Standard,
    /// 4 attempts, 2s/5s/10s backoff, 10s per request
    Extended,
}

impl RetryProfile {
    /// Parse a profile name
    pub fn parse(name: &str) -> Result<Self, crate::Error> {
        match name.to_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "extended" => Ok(Self::Extended),
            other => Err(crate::Error::config(format!(
                "Unknown retry profile '{}'. Valid profiles: standard, extended",
                other
            ))),
        }
    }
}

/// Retry configuration for the IP detector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Base profile
    #[serde(default)]
    pub profile: RetryProfile,

    /// Override: attempts per source
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Override: per-attempt timeout in seconds
    #[serde(default)]
    pub attempt_timeout_secs: Option<u64>,
}

impl RetryConfig {
    /// Build the effective retry policy
    pub fn policy(&self) -> RetryPolicy {
        let mut policy = match self.profile {
            RetryProfile::Standard => RetryPolicy::standard(),
            RetryProfile::Extended => RetryPolicy::extended(),
        };
        if let Some(max_attempts) = self.max_attempts {
            policy.max_attempts = max_attempts;
        }
        if let Some(secs) = self.attempt_timeout_secs {
            policy.attempt_timeout = Duration::from_secs(secs);
        }
        policy
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token (bearer credential)
        api_token: String,
        /// Zone ID holding the record
        zone_id: String,
        /// Fully qualified record name
        record_name: String,
        /// Record type ("A" or "AAAA")
        #[serde(default = "default_record_type")]
        record_type: String,
        /// API base URL
        #[serde(default = "default_api_base")]
        api_base: String,
        /// Read the record but never write it
        #[serde(default)]
        dry_run: bool,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    ///
    /// An empty token is only accepted in dry-run mode.
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare {
                api_token,
                zone_id,
                record_name,
                record_type,
                api_base,
                dry_run,
            } => {
                if api_token.is_empty() && !dry_run {
                    return Err(crate::Error::config(
                        "Cloudflare API token cannot be empty outside dry-run mode",
                    ));
                }
                if zone_id.is_empty() {
                    return Err(crate::Error::config("Cloudflare zone ID cannot be empty"));
                }
                if record_name.is_empty() {
                    return Err(crate::Error::config("DNS record name cannot be empty"));
                }
                IpVersion::for_record_type(record_type)?;
                if api_base.is_empty() {
                    return Err(crate::Error::config("Cloudflare API base cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
        }
    }

    /// Address family the managed record holds
    pub fn ip_version(&self) -> Result<IpVersion, crate::Error> {
        match self {
            ProviderConfig::Cloudflare { record_type, .. } => IpVersion::for_record_type(record_type),
        }
    }

    /// Whether writes are disabled
    pub fn is_dry_run(&self) -> bool {
        match self {
            ProviderConfig::Cloudflare { dry_run, .. } => *dry_run,
        }
    }
}

fn default_record_type() -> String {
    "A".to_string()
}

fn default_api_base() -> String {
    CLOUDFLARE_API_BASE.to_string()
}

/// State store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    Memory,
}

impl StateStoreConfig {
    /// Validate the state store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StateStoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("State file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        StateStoreConfig::File {
            path: "/var/lib/ddns/state.json".to_string(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Poll interval used when the state store has no settings yet
    #[serde(default)]
    pub default_poll_interval: PollInterval,

    /// Minimum seconds between accepted client force checks
    #[serde(default = "default_force_check_cooldown_secs")]
    pub force_check_cooldown_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Force-check cooldown as a duration
    pub fn force_check_cooldown(&self) -> Duration {
        Duration::from_secs(self.force_check_cooldown_secs)
    }

    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_poll_interval: PollInterval::default(),
            force_check_cooldown_secs: default_force_check_cooldown_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_force_check_cooldown_secs() -> u64 {
    300
}

fn default_event_channel_capacity() -> usize {
    100
}
