// # DNS Provider Trait
//
// Defines the interface for reading and writing the one managed DNS record
// via a provider's HTTP API.
//
// ## Implementations
//
// - Cloudflare: `ddns-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::DnsProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     if let Some(record) = provider.read_record().await? {
//         provider
//             .write_record(std::net::IpAddr::from([192, 0, 2, 1]), &record)
//             .await?;
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A DNS resource record as held by the provider
///
/// Writes carry every field of this struct back to the provider, with only
/// `content` replaced, so provider-side settings are never silently altered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider-specific record ID
    pub id: String,
    /// Record type ("A", "AAAA")
    #[serde(rename = "type")]
    pub record_type: String,
    /// Fully qualified record name
    pub name: String,
    /// Record content (the IP address for A/AAAA records)
    pub content: String,
    /// Time-to-live in seconds (1 = provider "automatic")
    pub ttl: u32,
    /// Whether traffic is proxied through the provider
    #[serde(default)]
    pub proxied: bool,
}

impl DnsRecord {
    /// The record content parsed as an IP address, if it is one
    pub fn ip(&self) -> Option<IpAddr> {
        self.content.trim().parse().ok()
    }

    /// A copy of this record with `content` replaced by `ip`
    pub fn with_content(&self, ip: IpAddr) -> Self {
        Self {
            content: ip.to_string(),
            ..self.clone()
        }
    }
}

/// Trait for DNS provider implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return success or failure (engine interprets it)
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads
/// - ❌ Implement retry logic or backoff
/// - ❌ Access the state store
/// - ❌ Decide whether an update is needed (owned by `ReconciliationEngine`)
/// - ❌ Cache records between calls
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Read the configured record
    ///
    /// # Returns
    ///
    /// - `Ok(Some(DnsRecord))`: The record exists
    /// - `Ok(None)`: No matching record exists (not a failure)
    /// - `Err(Error::Authentication)`: Credentials rejected
    /// - `Err(Error::Access)`: Zone or record not accessible
    /// - `Err(_)`: Transport or protocol failure
    async fn read_record(&self) -> Result<Option<DnsRecord>, crate::Error>;

    /// Replace the content of `base` with `content`
    ///
    /// Issues a single idempotent update carrying all other fields of `base`
    /// unchanged. Never partially applies a write.
    ///
    /// # Returns
    ///
    /// - `Ok(DnsRecord)`: The record as stored by the provider after the write
    /// - `Err(Error)`: Any non-success response or transport error
    async fn write_record(
        &self,
        content: IpAddr,
        base: &DnsRecord,
    ) -> Result<DnsRecord, crate::Error>;

    /// Whether this provider will actually perform writes
    ///
    /// `false` puts the engine in degraded mode: local IP tracking continues
    /// and failed writes are not treated as errors.
    fn writes_enabled(&self) -> bool {
        true
    }

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
