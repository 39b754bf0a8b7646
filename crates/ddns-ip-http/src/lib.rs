// # HTTP IP Source
//
// This crate provides the HTTP "what is my IP" sources used by the detector.
//
// ## Purpose
//
// Each source performs exactly one GET against one echo service and parses
// the body, either as plain text or as a JSON object with the address in a
// named field. An address of the wrong family (IPv4 for an AAAA record, or
// the reverse) is rejected like a malformed body. Retries, timeouts and
// failover between services are owned by `ddns_core::IpDetector`, never by
// the source.
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::{IpSourceConfig, IpVersion, RetryPolicy};
//
// let detector = ddns_ip_http::build_detector(
//     &IpSourceConfig::standard_sources(IpVersion::V4),
//     RetryPolicy::standard(),
//     IpVersion::V4,
// )?;
// let ip = detector.detect().await?;
// ```

use ddns_core::config::{IpSourceConfig, IpVersion, ResponseFormat};
use ddns_core::traits::IpSource;
use ddns_core::{Error, IpDetector, Result, RetryPolicy};

use std::net::IpAddr;
use std::time::Duration;

/// Bound on connection setup; the detector bounds the whole attempt
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP-based public IP source
pub struct HttpIpSource {
    /// Name used in logs
    name: String,

    /// URL to fetch the IP from
    url: String,

    /// How the body is parsed
    format: ResponseFormat,

    /// Address family to accept
    version: IpVersion,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpIpSource {
    /// Create a new HTTP IP source
    ///
    /// # Parameters
    ///
    /// - `name`: label used in logs (e.g., "ipify")
    /// - `url`: URL to fetch the IP from (e.g., "https://api.ipify.org?format=json")
    /// - `format`: how to read the address out of the response body
    /// - `version`: address family the answer must belong to
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        format: ResponseFormat,
        version: IpVersion,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            format,
            version,
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .user_agent(concat!("ddnsd/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create a source from its configuration
    pub fn from_config(config: &IpSourceConfig, version: IpVersion) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            config.name.clone(),
            config.url.clone(),
            config.format.clone(),
            version,
        ))
    }
}

#[async_trait::async_trait]
impl IpSource for HttpIpSource {
    async fn fetch(&self) -> Result<IpAddr> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::ip_source(format!("{}: request failed: {}", self.name, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ip_source(format!(
                "{}: HTTP error: {}",
                self.name, status
            )));
        }

        let body = response.text().await.map_err(|e| {
            Error::ip_source(format!("{}: failed to read response: {}", self.name, e))
        })?;

        let ip = parse_body(&self.format, &body)
            .map_err(|e| Error::ip_source(format!("{}: {}", self.name, e)))?;

        if !self.version.matches(&ip) {
            return Err(Error::ip_source(format!(
                "{}: answered {}, expected an {} address",
                self.name, ip, self.version
            )));
        }

        tracing::debug!("{} answered {}", self.name, ip);
        Ok(ip)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Extract the address from a response body
fn parse_body(format: &ResponseFormat, body: &str) -> std::result::Result<IpAddr, String> {
    let text = match format {
        ResponseFormat::Text => body.trim().to_string(),
        ResponseFormat::Json { field } => {
            let value: serde_json::Value = serde_json::from_str(body)
                .map_err(|e| format!("response is not valid JSON: {}", e))?;
            value
                .get(field)
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .ok_or_else(|| format!("response has no string field '{}'", field))?
        }
    };

    if text.is_empty() {
        return Err("empty response body".to_string());
    }

    text.parse()
        .map_err(|_| format!("invalid IP address: {}", text))
}

/// Build a detector over `sources` in priority order, each with `policy`
///
/// Every source only accepts addresses of `version`.
///
/// # Errors
///
/// `Error::Config` if the list is empty, the policy is invalid, or any
/// source configuration is invalid.
pub fn build_detector(
    sources: &[IpSourceConfig],
    policy: RetryPolicy,
    version: IpVersion,
) -> Result<IpDetector> {
    if sources.is_empty() {
        return Err(Error::config("At least one IP source is required"));
    }
    policy.validate()?;

    let mut detector = IpDetector::new();
    for config in sources {
        detector.push_source(
            Box::new(HttpIpSource::from_config(config, version)?),
            policy.clone(),
        );
    }

    tracing::info!(
        "Configured {} {} source(s): {}",
        sources.len(),
        version,
        sources
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(detector)
}
