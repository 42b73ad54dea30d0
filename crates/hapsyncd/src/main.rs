// # hapsyncd - appliance bridge daemon
//
// This daemon is a THIN integration layer:
// - DO NOT add sync, command or accessory logic here
// - Registry behaviour lives in hapsync-core, vendor logic in the plugin crates
// - Configuration is via environment variables ONLY
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering plugin factories and instantiating adapters
// 4. Discovering devices and bridging them to the accessory host
// 5. Running the sync loop until SIGTERM/SIGINT
//
// ## Configuration
//
// ### LG ThinQ
// - `HAPSYNC_LG_BASE_URL`: API base URL (default https://api-aic.lgthinq.com)
// - `HAPSYNC_LG_ACCESS_TOKEN`: Personal access token (required)
// - `HAPSYNC_LG_MESSAGE_ID`: Message id header (required)
// - `HAPSYNC_LG_CLIENT_ID`: Client id header (required)
// - `HAPSYNC_LG_COUNTRY`: Country code (default MX)
// - `HAPSYNC_LG_API_KEY`: API key header (required)
//
// ### Sync
// - `HAPSYNC_SYNC_INTERVAL`: Poll interval in seconds (default 30)
// - `HAPSYNC_STOP_TIMEOUT`: Seconds to wait for the sync loop on shutdown (default 5)
//
// ### Accessory host
// - `HAPSYNC_HAP_ADDRESS`, `HAPSYNC_HAP_LISTEN_ADDRESS`: Optional addresses
// - `HAPSYNC_HAP_PORT`: Port (default 51827)
// - `HAPSYNC_HAP_PINCODE`: Setup code (default 031-45-154)
// - `HAPSYNC_HAP_PERSIST_FILE`: Pairing file (default homekit.json)
// - `HAPSYNC_HAP_BRIDGE_NAME`: Bridge name (default "Mi Raspberry Hub")
//
// ### Alerts
// - `HAPSYNC_TELEGRAM_URL`: Bot `sendMessage` URL (optional)
// - `HAPSYNC_TELEGRAM_CHAT_ID`: Chat id (required with the URL)
//
// ### Logging
// - `HAPSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export HAPSYNC_LG_ACCESS_TOKEN=thinqpat_...
// export HAPSYNC_LG_MESSAGE_ID=...
// export HAPSYNC_LG_CLIENT_ID=...
// export HAPSYNC_LG_API_KEY=...
// hapsyncd
// ```

use anyhow::{Context, Result};
use hapsync_accessory::{AccessoryBridge, AccessoryHost, LocalAccessoryHost, TelegramNotifier};
use hapsync_core::{
    BridgeConfig, DeviceRegistry, HostConfig, NotifierConfig, PluginConfig, PluginRegistry,
    RegistryEvent, SyncConfig, discover_all,
};
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

const DEFAULT_LG_BASE_URL: &str = "https://api-aic.lgthinq.com";

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum HapsyncExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<HapsyncExitCode> for ExitCode {
    fn from(code: HapsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    lg_base_url: String,
    lg_access_token: String,
    lg_message_id: String,
    lg_client_id: String,
    lg_country: String,
    lg_api_key: String,
    sync_interval: u64,
    stop_timeout: u64,
    hap_address: Option<String>,
    hap_listen_address: Option<String>,
    hap_port: u16,
    hap_pincode: String,
    hap_persist_file: String,
    hap_bridge_name: String,
    telegram_url: Option<String>,
    telegram_chat_id: Option<String>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let sync_defaults = SyncConfig::default();
        let host_defaults = HostConfig::default();
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            lg_base_url: text("HAPSYNC_LG_BASE_URL", DEFAULT_LG_BASE_URL),
            lg_access_token: lookup("HAPSYNC_LG_ACCESS_TOKEN").unwrap_or_default(),
            lg_message_id: lookup("HAPSYNC_LG_MESSAGE_ID").unwrap_or_default(),
            lg_client_id: lookup("HAPSYNC_LG_CLIENT_ID").unwrap_or_default(),
            lg_country: text("HAPSYNC_LG_COUNTRY", "MX"),
            lg_api_key: lookup("HAPSYNC_LG_API_KEY").unwrap_or_default(),
            sync_interval: parse_var(&lookup, "HAPSYNC_SYNC_INTERVAL")?
                .unwrap_or(sync_defaults.interval_secs),
            stop_timeout: parse_var(&lookup, "HAPSYNC_STOP_TIMEOUT")?
                .unwrap_or(sync_defaults.stop_timeout_secs),
            hap_address: lookup("HAPSYNC_HAP_ADDRESS"),
            hap_listen_address: lookup("HAPSYNC_HAP_LISTEN_ADDRESS"),
            hap_port: parse_var(&lookup, "HAPSYNC_HAP_PORT")?.unwrap_or(host_defaults.port),
            hap_pincode: text("HAPSYNC_HAP_PINCODE", &host_defaults.pincode),
            hap_persist_file: text("HAPSYNC_HAP_PERSIST_FILE", &host_defaults.persist_file),
            hap_bridge_name: text("HAPSYNC_HAP_BRIDGE_NAME", &host_defaults.bridge_name),
            telegram_url: lookup("HAPSYNC_TELEGRAM_URL"),
            telegram_chat_id: lookup("HAPSYNC_TELEGRAM_CHAT_ID"),
            log_level: text("HAPSYNC_LOG_LEVEL", "info"),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("HAPSYNC_LG_ACCESS_TOKEN", &self.lg_access_token),
            ("HAPSYNC_LG_MESSAGE_ID", &self.lg_message_id),
            ("HAPSYNC_LG_CLIENT_ID", &self.lg_client_id),
            ("HAPSYNC_LG_API_KEY", &self.lg_api_key),
        ] {
            if value.is_empty() {
                anyhow::bail!(
                    "{} is required. Set it via: export {}=...",
                    name,
                    name
                );
            }
        }

        let token_lower = self.lg_access_token.to_lowercase();
        if token_lower.contains("your_token") || token_lower.contains("replace_me") {
            anyhow::bail!(
                "HAPSYNC_LG_ACCESS_TOKEN appears to be a placeholder. \
                Use the personal access token from the ThinQ developer site."
            );
        }

        if !self.lg_base_url.starts_with("https://") && !self.lg_base_url.starts_with("http://") {
            anyhow::bail!(
                "HAPSYNC_LG_BASE_URL must use HTTP or HTTPS scheme. Got: {}",
                self.lg_base_url
            );
        }

        if self.lg_country.len() != 2 || !self.lg_country.chars().all(|c| c.is_ascii_uppercase()) {
            anyhow::bail!(
                "HAPSYNC_LG_COUNTRY must be a two-letter country code like MX. Got: {}",
                self.lg_country
            );
        }

        if !(5..=3600).contains(&self.sync_interval) {
            anyhow::bail!(
                "HAPSYNC_SYNC_INTERVAL must be between 5 and 3600 seconds. Got: {}",
                self.sync_interval
            );
        }

        if !(1..=60).contains(&self.stop_timeout) {
            anyhow::bail!(
                "HAPSYNC_STOP_TIMEOUT must be between 1 and 60 seconds. Got: {}",
                self.stop_timeout
            );
        }

        match (&self.telegram_url, &self.telegram_chat_id) {
            (Some(url), _) if !url.starts_with("https://") && !url.starts_with("http://") => {
                anyhow::bail!("HAPSYNC_TELEGRAM_URL must use HTTP or HTTPS scheme. Got: {}", url)
            }
            (Some(_), None) => {
                anyhow::bail!("HAPSYNC_TELEGRAM_CHAT_ID is required when HAPSYNC_TELEGRAM_URL is set")
            }
            (None, Some(_)) => {
                anyhow::bail!("HAPSYNC_TELEGRAM_URL is required when HAPSYNC_TELEGRAM_CHAT_ID is set")
            }
            _ => {}
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "HAPSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.bridge_config()
            .validate()
            .context("Invalid bridge configuration")?;

        Ok(())
    }

    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            plugins: vec![PluginConfig::Lg {
                base_url: self.lg_base_url.clone(),
                access_token: self.lg_access_token.clone(),
                message_id: self.lg_message_id.clone(),
                client_id: self.lg_client_id.clone(),
                country: self.lg_country.clone(),
                api_key: self.lg_api_key.clone(),
            }],
            sync: SyncConfig {
                interval_secs: self.sync_interval,
                stop_timeout_secs: self.stop_timeout,
                ..SyncConfig::default()
            },
            host: HostConfig {
                address: self.hap_address.clone(),
                listen_address: self.hap_listen_address.clone(),
                port: self.hap_port,
                pincode: self.hap_pincode.clone(),
                persist_file: self.hap_persist_file.clone(),
                bridge_name: self.hap_bridge_name.clone(),
            },
            notifier: match (&self.telegram_url, &self.telegram_chat_id) {
                (Some(url), Some(chat_id)) => Some(NotifierConfig::Telegram {
                    url: url.clone(),
                    chat_id: chat_id.clone(),
                }),
                _ => None,
            },
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{} must be a number. Got '{}': {}", key, raw, e))
        })
        .transpose()
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return HapsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return HapsyncExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return HapsyncExitCode::ConfigError.into();
    }

    info!("Starting hapsyncd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return HapsyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(config.bridge_config()).await {
            Ok(()) => HapsyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                HapsyncExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(config: BridgeConfig) -> Result<()> {
    let plugins = Arc::new(PluginRegistry::new());

    #[cfg(feature = "lg")]
    {
        info!("Registering LG ThinQ plugin");
        hapsync_plugin_lg::register(&plugins);
    }

    for plugin_config in &config.plugins {
        plugins
            .instantiate(plugin_config)
            .with_context(|| format!("Failed to create plugin '{}'", plugin_config.type_name()))?;
    }

    let (devices, events) = DeviceRegistry::new(Arc::clone(&plugins), config.sync.clone());
    let event_logger = tokio::spawn(log_events(events));

    let discovered = discover_all(&plugins, &devices).await;
    info!("Discovered {} device(s)", discovered.len());

    let notifier = config
        .notifier
        .as_ref()
        .map(TelegramNotifier::from_config)
        .transpose()
        .context("Failed to create notifier")?;

    let host = Arc::new(LocalAccessoryHost::new(config.host.clone())?);
    let bridge = AccessoryBridge::new(Arc::clone(&devices), host.clone(), notifier);
    let bridged = bridge.add_discovered(&discovered);
    if bridged == 0 {
        warn!("No accessories bridged; the host will only expose the bridge itself");
    }

    host.start()?;

    if !devices.start_sync(config.sync.interval()) {
        warn!("Sync loop was already running");
    }

    info!("Daemon initialized successfully");

    let shutdown_result = wait_for_shutdown().await;

    devices.stop_sync().await;
    bridge.detach();
    host.stop();

    // Accessories hold registry handles; the event channel closes once all are gone
    drop(bridge);
    drop(host);
    drop(devices);
    if tokio::time::timeout(Duration::from_secs(1), event_logger)
        .await
        .is_err()
    {
        debug!("Event logger still draining at shutdown");
    }

    let signal = shutdown_result?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutdown complete");
    Ok(())
}

/// Log registry events until the channel closes
async fn log_events(events: mpsc::Receiver<RegistryEvent>) {
    let mut events = ReceiverStream::new(events);

    while let Some(event) = events.next().await {
        match event {
            RegistryEvent::DeviceAdded { device_id, brand } => {
                info!("Device added: {} ({})", device_id, brand)
            }
            RegistryEvent::StateUpdated {
                device_id,
                changed_keys,
            } => {
                if changed_keys.is_empty() {
                    debug!("{} synced, no changes", device_id)
                } else {
                    info!("{} changed: {}", device_id, changed_keys.join(", "))
                }
            }
            RegistryEvent::DeviceOffline { device_id } => warn!("{} is offline", device_id),
            RegistryEvent::ResyncFailed { device_id, error } => {
                warn!("Resync of {} failed: {}", device_id, error)
            }
            RegistryEvent::CommandSent { device_id } => info!("Command accepted by {}", device_id),
            RegistryEvent::CommandFailed { device_id, reason } => {
                warn!("Command to {} failed: {}", device_id, reason)
            }
            RegistryEvent::CommandResyncFailed { device_id, error } => {
                warn!("Resync after command to {} failed: {}", device_id, error)
            }
            RegistryEvent::SyncStarted { interval } => info!("Sync started every {:?}", interval),
            RegistryEvent::SyncStopped => info!("Sync stopped"),
            RegistryEvent::TickCompleted { report } => debug!(
                "Tick: {} updated, {} unreachable, {} failed",
                report.updated, report.unreachable, report.failed
            ),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("HAPSYNC_LG_ACCESS_TOKEN", "thinqpat_0123456789abcdef"),
            ("HAPSYNC_LG_MESSAGE_ID", "msg-1"),
            ("HAPSYNC_LG_CLIENT_ID", "client-1"),
            ("HAPSYNC_LG_API_KEY", "key-1"),
        ]
    }

    fn config_with(extra: &[(&str, &str)]) -> Config {
        let mut pairs: Vec<(&str, &str)> = required();
        pairs.extend_from_slice(extra);
        Config::from_lookup(lookup_from(&pairs)).unwrap()
    }

    #[test]
    fn defaults_validate() {
        let config = config_with(&[]);
        config.validate().unwrap();

        let bridge = config.bridge_config();
        assert_eq!(bridge.sync.interval_secs, 30);
        assert_eq!(bridge.host.port, 51827);
        assert_eq!(bridge.host.pincode, "031-45-154");
        assert!(bridge.notifier.is_none());
        assert_eq!(bridge.plugins[0].type_name(), "lg");
    }

    #[test]
    fn missing_token_is_rejected() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("HAPSYNC_LG_ACCESS_TOKEN"));
    }

    #[test]
    fn placeholder_token_is_rejected() {
        let mut config = config_with(&[]);
        config.lg_access_token = "YOUR_TOKEN_HERE".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_numeric_interval_is_a_config_error() {
        let mut pairs = required();
        pairs.push(("HAPSYNC_SYNC_INTERVAL", "soon"));
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err().to_string();
        assert!(err.contains("HAPSYNC_SYNC_INTERVAL"));
    }

    #[test]
    fn interval_range_is_enforced() {
        assert!(config_with(&[("HAPSYNC_SYNC_INTERVAL", "1")]).validate().is_err());
        assert!(config_with(&[("HAPSYNC_SYNC_INTERVAL", "60")]).validate().is_ok());
    }

    #[test]
    fn telegram_needs_url_and_chat_id() {
        assert!(
            config_with(&[("HAPSYNC_TELEGRAM_URL", "https://api.telegram.org/botX/sendMessage")])
                .validate()
                .is_err()
        );
        assert!(config_with(&[("HAPSYNC_TELEGRAM_CHAT_ID", "42")]).validate().is_err());

        let config = config_with(&[
            ("HAPSYNC_TELEGRAM_URL", "https://api.telegram.org/botX/sendMessage"),
            ("HAPSYNC_TELEGRAM_CHAT_ID", "42"),
        ]);
        config.validate().unwrap();
        assert!(config.bridge_config().notifier.is_some());
    }

    #[test]
    fn invalid_pincode_surfaces_from_bridge_config() {
        let config = config_with(&[("HAPSYNC_HAP_PINCODE", "1234")]);
        let err = format!("{:#}", config.validate().unwrap_err());
        assert!(err.contains("Pincode"));
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        assert!(config_with(&[("HAPSYNC_LOG_LEVEL", "loud")]).validate().is_err());
    }
}
