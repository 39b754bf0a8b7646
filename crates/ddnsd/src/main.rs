// # ddnsd - DDNS Daemon
//
// CRITICAL RULES:
// - This is a THIN integration layer ONLY
// - DO NOT add reconciliation, DNS or retry logic here
// - All DDNS logic lives in ddns-core
// - Configuration is via environment variables ONLY
//
// The ddnsd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Building the state store, IP detector and DNS provider
// 4. Starting the reconciliation engine and the HTTP API
// 5. Shutting both down on SIGTERM/SIGINT
//
// ## Configuration
//
// ### DNS Provider
// - `DDNS_PROVIDER_API_TOKEN`: Cloudflare API token (missing or placeholder = dry-run)
// - `DDNS_PROVIDER_ZONE_ID`: Zone ID
// - `DDNS_PROVIDER_API_BASE`: API base URL override
// - `DDNS_RECORD_NAME`: Record to manage
// - `DDNS_RECORD_TYPE`: A (default) or AAAA
// - `DDNS_MODE`: `dry-run` to disable record writes
//
// ### IP Detection
// - `DDNS_RETRY_PROFILE`: standard (default) or extended
// - `DDNS_IP_SOURCES`: JSON array of `{name, url, format}` overriding the profile's list
//
// The default source list follows the record type: IPv4 services for A,
// IPv6 services for AAAA. Answers of the other family are discarded.
//
// ### State Store
// - `DDNS_STATE_STORE_TYPE`: file (default) or memory
// - `DDNS_STATE_STORE_PATH`: Path to state file (for file store)
//
// ### Engine & API
// - `DDNS_POLL_INTERVAL_MINUTES`: Initial poll interval for a fresh state file
// - `DDNS_FORCE_CHECK_COOLDOWN_SECS`: Minimum gap between forced checks
// - `DDNS_API_LISTEN`: API bind address (default 127.0.0.1:8080)
// - `DDNS_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export DDNS_PROVIDER_API_TOKEN=your_token
// export DDNS_PROVIDER_ZONE_ID=023e105f4ecef8ad9ca31a8372d0c353
// export DDNS_RECORD_NAME=home.example.com
// export DDNS_STATE_STORE_PATH=/var/lib/ddns/state.json
//
// ddnsd
// ```

mod api;

use anyhow::{Context, Result};
use ddns_core::config::{
    CLOUDFLARE_API_BASE, DdnsConfig, EngineConfig, IpSourceConfig, IpVersion, ProviderConfig,
    RetryConfig, RetryProfile, StateStoreConfig,
};
use ddns_core::{
    EngineEvent, FileStateStore, MemoryStateStore, PollInterval, ReconciliationEngine, StateStore,
};
use ddns_provider_cloudflare::CloudflareProvider;
use std::env;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Upper bound on the stop sequence after a shutdown signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_API_LISTEN: &str = "127.0.0.1:8080";
const DEFAULT_STATE_PATH: &str = "/var/lib/ddns/state.json";

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// What the configured API token looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenStatus {
    Provided,
    Missing,
    Placeholder,
}

impl TokenStatus {
    fn of(token: &str) -> Self {
        if token.is_empty() {
            TokenStatus::Missing
        } else if is_placeholder_token(token) {
            TokenStatus::Placeholder
        } else {
            TokenStatus::Provided
        }
    }

    /// Unusable credentials put the provider in dry-run instead of failing startup
    fn forces_dry_run(self) -> bool {
        self != TokenStatus::Provided
    }
}

/// Obvious placeholder values copied from examples
fn is_placeholder_token(token: &str) -> bool {
    let token = token.to_lowercase();
    matches!(token.as_str(), "test" | "token" | "changeme" | "dummy")
        || token.contains("your_token")
        || token.contains("replace_me")
        || token.contains("placeholder")
}

/// Application configuration
struct Config {
    ddns: DdnsConfig,
    api_listen: SocketAddr,
    log_level: String,
    token_status: TokenStatus,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut api_token = get("DDNS_PROVIDER_API_TOKEN").unwrap_or_default();
        let token_status = TokenStatus::of(&api_token);
        if token_status == TokenStatus::Placeholder {
            api_token.clear();
        }
        let dry_run_requested = get("DDNS_MODE")
            .map(|mode| mode.eq_ignore_ascii_case("dry-run"))
            .unwrap_or(false);

        let record_type = get("DDNS_RECORD_TYPE")
            .map(|t| t.to_uppercase())
            .unwrap_or_else(|| "A".to_string());
        // Unknown types are reported by validate()
        let ip_version = IpVersion::for_record_type(&record_type).unwrap_or_default();

        let provider = ProviderConfig::Cloudflare {
            api_token,
            zone_id: get("DDNS_PROVIDER_ZONE_ID")
                .context("DDNS_PROVIDER_ZONE_ID is required")?,
            record_name: get("DDNS_RECORD_NAME").context(
                "DDNS_RECORD_NAME is required. \
                Set it via: export DDNS_RECORD_NAME=home.example.com",
            )?,
            record_type,
            api_base: get("DDNS_PROVIDER_API_BASE")
                .unwrap_or_else(|| CLOUDFLARE_API_BASE.to_string()),
            dry_run: dry_run_requested || token_status.forces_dry_run(),
        };

        let profile = match get("DDNS_RETRY_PROFILE") {
            Some(name) => RetryProfile::parse(&name)?,
            None => RetryProfile::default(),
        };

        let ip_sources = match get("DDNS_IP_SOURCES") {
            Some(json) => serde_json::from_str::<Vec<IpSourceConfig>>(&json)
                .context("DDNS_IP_SOURCES must be a JSON array of {name, url, format}")?,
            None => match profile {
                RetryProfile::Standard => IpSourceConfig::standard_sources(ip_version),
                RetryProfile::Extended => IpSourceConfig::extended_sources(ip_version),
            },
        };

        let state_store = match get("DDNS_STATE_STORE_TYPE").as_deref() {
            None | Some("file") => StateStoreConfig::File {
                path: get("DDNS_STATE_STORE_PATH")
                    .unwrap_or_else(|| DEFAULT_STATE_PATH.to_string()),
            },
            Some("memory") => StateStoreConfig::Memory,
            Some(other) => anyhow::bail!(
                "DDNS_STATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                other
            ),
        };

        let mut engine = EngineConfig::default();
        if let Some(minutes) = get("DDNS_POLL_INTERVAL_MINUTES") {
            let minutes = minutes
                .parse::<u32>()
                .with_context(|| format!("DDNS_POLL_INTERVAL_MINUTES is not a number: {}", minutes))?;
            engine.default_poll_interval = PollInterval::new(minutes)
                .context("DDNS_POLL_INTERVAL_MINUTES out of range")?;
        }
        if let Some(secs) = get("DDNS_FORCE_CHECK_COOLDOWN_SECS") {
            engine.force_check_cooldown_secs = secs.parse::<u64>().with_context(|| {
                format!("DDNS_FORCE_CHECK_COOLDOWN_SECS is not a number: {}", secs)
            })?;
        }

        let api_listen = get("DDNS_API_LISTEN")
            .unwrap_or_else(|| DEFAULT_API_LISTEN.to_string());
        let api_listen = api_listen
            .parse::<SocketAddr>()
            .with_context(|| format!("DDNS_API_LISTEN is not a socket address: {}", api_listen))?;

        Ok(Self {
            ddns: DdnsConfig {
                ip_sources,
                retry: RetryConfig {
                    profile,
                    ..RetryConfig::default()
                },
                provider,
                state_store,
                engine,
            },
            api_listen,
            log_level: get("DDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            token_status,
        })
    }

    /// Validate the configuration
    ///
    /// This performs validation beyond `DdnsConfig::validate`:
    /// - Record name format
    /// - State file location
    /// - Log level
    ///
    /// Missing or placeholder tokens are not errors; they force dry-run.
    fn validate(&self) -> Result<()> {
        self.ddns.validate()?;

        let ProviderConfig::Cloudflare { record_name, .. } = &self.ddns.provider;

        validate_domain_name(record_name)?;

        if let StateStoreConfig::File { path } = &self.ddns.state_store {
            if let Some(parent) = std::path::Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                anyhow::bail!(
                    "DDNS_STATE_STORE_PATH parent directory does not exist: {}. \
                        Create it first: sudo mkdir -p {}",
                    parent.display(),
                    parent.display()
                );
            }
        }

        for source in &self.ddns.ip_sources {
            if source.url.starts_with("http://") {
                eprintln!(
                    "WARNING: IP source '{}' uses HTTP (not HTTPS). \
                          This is less secure. Consider using HTTPS.",
                    source.name
                );
            }
        }

        parse_log_level(&self.log_level)?;
        Ok(())
    }
}

/// Validate that a string is a valid domain name
///
/// This implements basic DNS domain name validation per RFC 1035.
/// It's not comprehensive but catches common errors.
fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.is_empty() {
        anyhow::bail!("Domain name cannot be empty");
    }

    // Total length limit (RFC 1035: 253 chars max)
    if domain.len() > 253 {
        anyhow::bail!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        );
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }

        if label.len() > 63 {
            anyhow::bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric and hyphen only.",
                label
            );
        }

        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "DDNS_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return DdnsExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = parse_log_level(&config.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting ddnsd daemon");
    match config.token_status {
        TokenStatus::Missing => {
            warn!("DDNS_PROVIDER_API_TOKEN is not set; running in dry-run mode")
        }
        TokenStatus::Placeholder => warn!(
            "DDNS_PROVIDER_API_TOKEN appears to be a placeholder; running in dry-run mode. \
            Use an actual API token from Cloudflare to enable record updates."
        ),
        TokenStatus::Provided => {}
    }

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let daemon = match Daemon::start(config).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return DdnsExitCode::ConfigError;
            }
        };

        if let Err(e) = daemon.run_until_shutdown().await {
            error!("Daemon error: {:#}", e);
            DdnsExitCode::RuntimeError
        } else {
            DdnsExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Running daemon components
struct Daemon {
    engine: ReconciliationEngine,
    server_shutdown: oneshot::Sender<()>,
    server: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl Daemon {
    /// Build every component, start the engine and serve the API
    async fn start(config: Config) -> Result<Self> {
        let ddns = config.ddns;

        let state_store: Arc<dyn StateStore> = match &ddns.state_store {
            StateStoreConfig::File { path } => {
                info!("Using file state store at {}", path);
                Arc::new(FileStateStore::open(path, ddns.engine.default_poll_interval).await?)
            }
            StateStoreConfig::Memory => {
                warn!("Using in-memory state store; state is lost on restart");
                Arc::new(MemoryStateStore::with_interval(
                    ddns.engine.default_poll_interval,
                ))
            }
        };

        let detector = ddns_ip_http::build_detector(
            &ddns.ip_sources,
            ddns.retry.policy(),
            ddns.provider.ip_version()?,
        )?;
        let provider = CloudflareProvider::from_config(&ddns.provider)?;
        info!(
            "Managing {} record via {} ({})",
            record_label(&ddns.provider),
            ddns.provider.type_name(),
            if ddns.provider.is_dry_run() { "DRY-RUN" } else { "LIVE" }
        );

        let (engine, events) =
            ReconciliationEngine::new(detector, Box::new(provider), state_store, &ddns.engine)?;
        tokio::spawn(log_events(events));

        engine.start().await?;

        let listener = tokio::net::TcpListener::bind(config.api_listen)
            .await
            .with_context(|| format!("Failed to bind API listener on {}", config.api_listen))?;
        info!("API listening on {}", config.api_listen);

        let router = api::create_router(api::AppState::new(
            engine.clone(),
            ddns.engine.force_check_cooldown(),
        ));
        let (server_shutdown, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(Self {
            engine,
            server_shutdown,
            server,
        })
    }

    /// Wait for a shutdown signal, then stop the engine and the API
    async fn run_until_shutdown(self) -> Result<()> {
        let signal = wait_for_shutdown().await?;
        info!("Received shutdown signal: {}", signal);
        info!("Shutting down daemon");

        let stop = async {
            self.engine.stop().await?;
            let _ = self.server_shutdown.send(());
            self.server
                .await
                .context("API server task panicked")?
                .context("API server failed")?;
            Ok::<(), anyhow::Error>(())
        };

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, stop).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "Shutdown timeout after {:?}",
                SHUTDOWN_TIMEOUT
            )),
        }
    }
}

fn record_label(provider: &ProviderConfig) -> String {
    match provider {
        ProviderConfig::Cloudflare {
            record_name,
            record_type,
            ..
        } => format!("{} {}", record_type, record_name),
    }
}

/// Log engine events until the engine drops its sender
async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::IpChanged { old_ip, new_ip } => {
                info!("Public IP changed: {:?} -> {}", old_ip, new_ip)
            }
            EngineEvent::DnsUpdateFailed {
                error,
                degraded: false,
            } => warn!("DNS update failed: {}", error),
            EngineEvent::DetectionFailed { error } => warn!("IP detection failed: {}", error),
            other => debug!("Engine event: {:?}", other),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
