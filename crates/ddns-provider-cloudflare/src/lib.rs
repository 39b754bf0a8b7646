// # Cloudflare DNS Provider
//
// This crate provides the Cloudflare implementation of `DnsProvider`.
//
// ## Behaviour
//
// - Reads the single managed record (name + type) from a configured zone
// - Writes by PUT against the record ID, carrying ttl and proxied unchanged
// - One HTTP request per call; every failure is returned to the engine
// - Dry-run mode reads normally and logs the PUT it would have sent
//
// ## Trust Level: Untrusted (DNS Provider)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTP/HTTPS API calls to the Cloudflare API only
// - ✅ Parse provider-specific responses
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Implement retry logic (the engine retries on its next cycle)
// - ❌ Access the state store
// - ❌ Cache records between calls
//
// ## Security Requirements
//
// - API token NEVER appears in logs or Debug output
// - API token is provided via environment variables only
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use ddns_core::config::{CLOUDFLARE_API_BASE, ProviderConfig};
use ddns_core::traits::{DnsProvider, DnsRecord};
use ddns_core::{Error, Result};
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER: &str = "cloudflare";

/// Envelope error codes Cloudflare returns for rejected credentials
///
/// 6003/6111: malformed Authorization header, 9106/9109: missing or invalid
/// token, 10000: authentication error.
const AUTH_ERROR_CODES: &[i64] = &[6003, 6111, 9106, 9109, 10000];

/// Cloudflare API v4 response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl<T> ApiResponse<T> {
    fn is_auth_failure(&self) -> bool {
        self.errors
            .iter()
            .any(|e| AUTH_ERROR_CODES.contains(&e.code))
    }

    fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return "request unsuccessful".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("{} ({})", e.message, e.code))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform the record GET as usual
/// - Log the intended PUT payload
/// - **NOT** modify the record; `write_record` returns `Error::WritesDisabled`
///
/// # Security
///
/// The Debug implementation does NOT expose the API token.
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Zone holding the record
    zone_id: String,

    /// Fully qualified record name
    record_name: String,

    /// "A" or "AAAA"
    record_type: String,

    /// API base URL (overridable for tests)
    api_base: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip PUT updates
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("record_name", &self.record_name)
            .field("record_type", &self.record_type)
            .field("api_base", &self.api_base)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider against the public API
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `zone_id`: Zone holding the record
    /// - `record_name`: Fully qualified record name
    /// - `record_type`: "A" or "AAAA"
    /// - `dry_run`: If true, perform GET requests but skip PUT updates
    ///
    /// # Errors
    ///
    /// `Error::Config` if the token is empty outside dry-run mode, or any
    /// other field is invalid.
    pub fn new(
        api_token: impl Into<String>,
        zone_id: impl Into<String>,
        record_name: impl Into<String>,
        record_type: impl Into<String>,
        dry_run: bool,
    ) -> Result<Self> {
        Self::from_config(&ProviderConfig::Cloudflare {
            api_token: api_token.into(),
            zone_id: zone_id.into(),
            record_name: record_name.into(),
            record_type: record_type.into(),
            api_base: CLOUDFLARE_API_BASE.to_string(),
            dry_run,
        })
    }

    /// Create a provider from its configuration
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;

        let ProviderConfig::Cloudflare {
            api_token,
            zone_id,
            record_name,
            record_type,
            api_base,
            dry_run,
        } = config;

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        if *dry_run {
            tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
        }

        Ok(Self {
            api_token: api_token.clone(),
            zone_id: zone_id.clone(),
            record_name: record_name.clone(),
            record_type: record_type.clone(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
            dry_run: *dry_run,
        })
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.api_base, self.zone_id)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_token)
        }
    }

    /// Read the envelope of a response, mapping failures to typed errors
    async fn read_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        action: &str,
    ) -> Result<ApiResponse<T>> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status.as_u16(), action, &error_text));
        }

        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            Error::provider(PROVIDER, format!("Failed to parse {} response: {}", action, e))
        })?;

        if !envelope.success {
            if envelope.is_auth_failure() {
                return Err(Error::auth(format!(
                    "Cloudflare rejected the API token during {}: {}",
                    action,
                    envelope.error_summary()
                )));
            }
            return Err(Error::provider(
                PROVIDER,
                format!("{} failed: {}", action, envelope.error_summary()),
            ));
        }

        Ok(envelope)
    }
}

/// Map an unsuccessful HTTP status to an error
///
/// Credential errors reported in the body win over the status code; Cloudflare
/// answers a bad token with 400 or 403 as well as 401.
fn status_error(status: u16, action: &str, error_text: &str) -> Error {
    if let Ok(envelope) = serde_json::from_str::<ApiResponse<serde_json::Value>>(error_text)
        && envelope.is_auth_failure()
    {
        return Error::auth(format!(
            "Cloudflare rejected the API token during {}. Status: {} - {}",
            action,
            status,
            envelope.error_summary()
        ));
    }

    match status {
        401 => Error::auth(format!(
            "Cloudflare rejected the API token during {}. Status: {}",
            action, status
        )),
        403 | 404 => Error::access(format!(
            "Cloudflare denied access to the zone or record during {}. Status: {}",
            action, status
        )),
        409 => Error::provider(
            PROVIDER,
            format!(
                "Conflict: Record is being updated by another process. Status: {}",
                status
            ),
        ),
        429 => Error::provider(
            PROVIDER,
            format!("Rate limit exceeded. Please retry later. Status: {}", status),
        ),
        500..=599 => Error::provider(
            PROVIDER,
            format!(
                "Cloudflare server error (transient): {} - {}",
                status, error_text
            ),
        ),
        _ => Error::provider(
            PROVIDER,
            format!("{} failed: {} - {}", action, status, error_text),
        ),
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// Read the managed record
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?name=home.example.com&type=A
    /// Authorization: Bearer <token>
    /// ```
    async fn read_record(&self) -> Result<Option<DnsRecord>> {
        tracing::debug!(
            "Looking up record: {} (type: {})",
            self.record_name,
            self.record_type
        );

        let request = self.client.get(self.records_url()).query(&[
            ("name", self.record_name.as_str()),
            ("type", self.record_type.as_str()),
        ]);

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| Error::http(format!("Record lookup request failed: {}", e)))?;

        let envelope: ApiResponse<Vec<DnsRecord>> =
            Self::read_envelope(response, "record lookup").await?;

        let record = envelope.result.unwrap_or_default().into_iter().next();
        match &record {
            Some(record) => tracing::debug!("Found record {} -> {}", record.id, record.content),
            None => tracing::debug!(
                "No {} record named {} in zone",
                self.record_type,
                self.record_name
            ),
        }
        Ok(record)
    }

    /// Replace the record's content, keeping every other field
    ///
    /// # API Call
    ///
    /// ```http
    /// PUT /zones/:zone_id/dns_records/:record_id
    /// {
    ///   "type": "A",
    ///   "name": "home.example.com",
    ///   "content": "198.51.100.2",
    ///   "ttl": 120,
    ///   "proxied": true
    /// }
    /// ```
    async fn write_record(&self, content: IpAddr, base: &DnsRecord) -> Result<DnsRecord> {
        let family_matches = match base.record_type.as_str() {
            "A" => content.is_ipv4(),
            "AAAA" => content.is_ipv6(),
            _ => false,
        };
        if !family_matches {
            return Err(Error::invalid_input(format!(
                "cannot write {} into a {} record",
                content, base.record_type
            )));
        }

        let updated = base.with_content(content);
        let url = format!("{}/{}", self.records_url(), base.id);
        let payload = serde_json::json!({
            "type": updated.record_type,
            "name": updated.name,
            "content": updated.content,
            "ttl": updated.ttl,
            "proxied": updated.proxied,
        });

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send PUT request to {} with payload: {}",
                url,
                payload
            );
            return Err(Error::writes_disabled(
                "dry-run mode, record left unchanged",
            ));
        }

        tracing::info!(
            "Updating Cloudflare DNS record: {} -> {} (was: {})",
            base.name,
            content,
            base.content
        );

        let response = self
            .authorized(self.client.put(&url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::http(format!("Record update request failed: {}", e)))?;

        let envelope: ApiResponse<DnsRecord> =
            Self::read_envelope(response, "record update").await?;

        tracing::info!("DNS record updated successfully: {} -> {}", base.name, content);
        Ok(envelope.result.unwrap_or(updated))
    }

    fn writes_enabled(&self) -> bool {
        !self.dry_run
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}
