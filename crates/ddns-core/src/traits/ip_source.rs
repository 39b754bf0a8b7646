// # IP Source Trait
//
// Defines the interface for a single external "what is my IP" service.
//
// ## Implementations
//
// - HTTP (JSON field or plain-text body): `ddns-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::IpSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* IpSource implementation */;
//
//     // One request, one answer
//     let ip = source.fetch().await?;
//     println!("{} says {}", source.name(), ip);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

/// Trait for IP source implementations
///
/// An IP source performs exactly one lookup per call against one remote
/// service and parses the service's response format.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform one HTTP request to its own endpoint per call
/// - ✅ Parse the service-specific response body
///
/// ## Forbidden Capabilities
/// - ❌ Retry or back off (owned by `IpDetector`)
/// - ❌ Fall over to other services (owned by `IpDetector`)
/// - ❌ Access the state store
/// - ❌ Cache answers between calls
///
/// A malformed or empty body is an error exactly like a timeout: the
/// detector counts both as one failed attempt.
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Query the service once and return the address it reports
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: A syntactically valid address
    /// - `Err(Error)`: Transport failure, non-success status, or unparseable body
    async fn fetch(&self) -> Result<IpAddr, crate::Error>;

    /// Human-readable source name (for logging)
    fn name(&self) -> &str;
}
