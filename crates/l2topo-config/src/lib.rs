//! Configuration for l2topo.
//!
//! A TOML file with reconciler tunables, polling defaults, and a table of
//! devices, layered under `L2TOPO_*` environment overrides. Device tokens
//! resolve through env var, system keyring, then plaintext, and each device
//! translates into an [`HttpEndpointConfig`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use l2topo_api::{HttpEndpointConfig, RetryConfig, TlsMode, TransportConfig};
use l2topo_core::ReconcilerConfig;

/// Keyring service name; entries are keyed `<device>/token`.
pub const KEYRING_SERVICE: &str = "l2topo";

const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no devices configured")]
    NoDevices,

    #[error("unknown device '{name}'")]
    UnknownDevice { name: String },

    #[error("token for device '{device}' expected in ${var}, which is not set")]
    MissingToken { device: String, var: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub reconciler: ReconcilerSection,

    /// Polling defaults applied to every device without an override.
    #[serde(default)]
    pub defaults: Defaults,

    /// Polled devices, keyed by the name the reconciler reports them under.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceProfile>,
}

/// The `[reconciler]` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcilerSection {
    #[serde(default = "default_cycle_secs")]
    pub cycle_secs: u64,

    #[serde(default = "default_grace_cycles")]
    pub grace_cycles: u32,

    #[serde(default = "default_stale_after")]
    pub stale_after_cycles: u32,

    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    #[serde(default)]
    pub discover_neighbors: bool,
}

impl Default for ReconcilerSection {
    fn default() -> Self {
        Self {
            cycle_secs: default_cycle_secs(),
            grace_cycles: default_grace_cycles(),
            stale_after_cycles: default_stale_after(),
            error_threshold: default_error_threshold(),
            discover_neighbors: false,
        }
    }
}

fn default_cycle_secs() -> u64 {
    60
}
fn default_grace_cycles() -> u32 {
    1
}
fn default_stale_after() -> u32 {
    3
}
fn default_error_threshold() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    /// Seconds between polls.
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default)]
    pub insecure: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            timeout: default_timeout(),
            retries: default_retries(),
            insecure: false,
        }
    }
}

fn default_interval() -> u64 {
    60
}
fn default_timeout() -> u64 {
    2
}
fn default_retries() -> u32 {
    3
}

/// One polled device.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceProfile {
    /// URL of the device agent's LLDP document.
    pub url: String,

    /// Bearer token (plaintext, prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable holding the bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    /// Path to a PEM CA certificate for the agent's TLS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "l2topo").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("l2topo");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load config from the canonical path plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path` plus environment. A missing file yields the
/// defaults, still subject to `L2TOPO_*` overrides.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    tracing::debug!(path = %path.display(), exists = path.exists(), "loading config");

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("L2TOPO_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Reconciler tunables, clamped to sane minimums.
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        let section = &self.reconciler;
        ReconcilerConfig {
            cycle: Duration::from_secs(section.cycle_secs),
            grace_cycles: section.grace_cycles,
            stale_after_cycles: section.stale_after_cycles,
            error_threshold: section.error_threshold,
            discover_neighbors: section.discover_neighbors,
        }
        .normalized()
    }

    pub fn device(&self, name: &str) -> Result<&DeviceProfile, ConfigError> {
        self.devices
            .get(name)
            .ok_or_else(|| ConfigError::UnknownDevice { name: name.into() })
    }

    /// Endpoint configuration for one device.
    pub fn endpoint_config(&self, name: &str) -> Result<HttpEndpointConfig, ConfigError> {
        let profile = self.device(name)?;
        device_to_endpoint_config(profile, name, &self.defaults)
    }

    /// Endpoint configurations for every device, in name order.
    pub fn endpoint_configs(&self) -> Result<Vec<HttpEndpointConfig>, ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }
        self.devices
            .iter()
            .map(|(name, profile)| device_to_endpoint_config(profile, name, &self.defaults))
            .collect()
    }

    /// Copy with every plaintext token masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        for profile in config.devices.values_mut() {
            if profile.token.is_some() {
                profile.token = Some(REDACTED.into());
            }
        }
        config
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a device's bearer token: `token_env`, then the system keyring,
/// then plaintext. Devices without any token source poll unauthenticated.
pub fn resolve_token(
    profile: &DeviceProfile,
    device: &str,
) -> Result<Option<SecretString>, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(Some(SecretString::from(val)));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{device}/token")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(Some(SecretString::from(secret)));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(Some(SecretString::from(token.clone())));
    }

    match profile.token_env {
        Some(ref var) => Err(ConfigError::MissingToken {
            device: device.into(),
            var: var.clone(),
        }),
        None => Ok(None),
    }
}

fn device_to_endpoint_config(
    profile: &DeviceProfile,
    name: &str,
    defaults: &Defaults,
) -> Result<HttpEndpointConfig, ConfigError> {
    let url: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: format!("devices.{name}.url"),
        reason: format!("invalid URL: {}", profile.url),
    })?;

    // Zero is allowed here; the endpoint falls back to its own interval.
    let interval = Duration::from_secs(profile.interval.unwrap_or(defaults.interval));
    let timeout = positive_secs(profile.timeout.unwrap_or(defaults.timeout), name, "timeout")?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    let retry = RetryConfig {
        retries: profile.retries.unwrap_or(defaults.retries),
        ..RetryConfig::default()
    };

    let mut config = HttpEndpointConfig::new(name, url);
    config.token = resolve_token(profile, name)?;
    config.interval = interval;
    config.transport = TransportConfig {
        tls,
        timeout,
        retry,
    };
    Ok(config)
}

fn positive_secs(secs: u64, device: &str, key: &str) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Validation {
            field: format!("devices.{device}.{key}"),
            reason: "must be at least 1 second".into(),
        });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    fn profile(url: &str) -> DeviceProfile {
        DeviceProfile {
            url: url.into(),
            token: None,
            token_env: None,
            interval: None,
            timeout: None,
            retries: None,
            ca_cert: None,
            insecure: None,
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.reconciler.cycle_secs, 60);
        assert_eq!(config.defaults.timeout, 2);
        assert!(config.devices.is_empty());
        assert!(matches!(config.endpoint_configs(), Err(ConfigError::NoDevices)));
    }

    #[test]
    fn loads_reconciler_and_devices() {
        let (_dir, path) = write_config(
            r#"
            [reconciler]
            cycle_secs = 10
            grace_cycles = 2
            discover_neighbors = true

            [defaults]
            interval = 15
            retries = 1

            [devices.sw1]
            url = "http://10.0.0.1:8080/lldp"

            [devices.sw2]
            url = "https://10.0.0.2/lldp"
            interval = 5
            insecure = true
            "#,
        );
        let config = load_config_from(&path).unwrap();

        let reconciler = config.reconciler_config();
        assert_eq!(reconciler.cycle, Duration::from_secs(10));
        assert_eq!(reconciler.grace_cycles, 2);
        assert_eq!(reconciler.stale_after_cycles, 3);
        assert!(reconciler.discover_neighbors);

        let endpoints = config.endpoint_configs().unwrap();
        let names: Vec<&str> = endpoints.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["sw1", "sw2"]);

        assert_eq!(endpoints[0].interval, Duration::from_secs(15));
        assert_eq!(endpoints[0].transport.retry.retries, 1);
        assert_eq!(endpoints[0].transport.timeout, Duration::from_secs(2));
        assert!(matches!(endpoints[0].transport.tls, TlsMode::System));

        assert_eq!(endpoints[1].interval, Duration::from_secs(5));
        assert!(matches!(
            endpoints[1].transport.tls,
            TlsMode::DangerAcceptInvalid
        ));
    }

    #[test]
    fn zero_cycle_is_clamped() {
        let mut config = Config::default();
        config.reconciler.cycle_secs = 0;
        config.reconciler.stale_after_cycles = 0;

        let reconciler = config.reconciler_config();
        assert_eq!(reconciler.cycle, Duration::from_secs(1));
        assert_eq!(reconciler.stale_after_cycles, 1);
    }

    #[test]
    fn invalid_url_names_the_device() {
        let mut config = Config::default();
        config.devices.insert("core".into(), profile("not a url"));

        let err = config.endpoint_config("core").unwrap_err();
        match err {
            ConfigError::Validation { field, .. } => assert_eq!(field, "devices.core.url"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_interval_is_passed_through() {
        let mut config = Config::default();
        let mut device = profile("http://10.0.0.1/lldp");
        device.interval = Some(0);
        config.devices.insert("sw1".into(), device);

        let endpoint = config.endpoint_config("sw1").unwrap();
        assert_eq!(endpoint.interval, Duration::ZERO);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = Config::default();
        let mut device = profile("http://10.0.0.1/lldp");
        device.timeout = Some(0);
        config.devices.insert("sw1".into(), device);

        assert!(matches!(
            config.endpoint_config("sw1"),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn defaults_table_carries_no_output_format() {
        let rendered = Config::default().to_toml().unwrap();
        assert!(rendered.contains("[defaults]"));
        assert!(!rendered.contains("output"));
    }

    #[test]
    fn unknown_device() {
        let config = Config::default();
        assert!(matches!(
            config.endpoint_config("nope"),
            Err(ConfigError::UnknownDevice { .. })
        ));
    }

    #[test]
    fn ca_cert_selects_custom_ca() {
        let mut config = Config::default();
        let mut device = profile("https://10.0.0.1/lldp");
        device.ca_cert = Some("/etc/l2topo/ca.pem".into());
        config.devices.insert("sw1".into(), device);

        let endpoint = config.endpoint_config("sw1").unwrap();
        match endpoint.transport.tls {
            TlsMode::CustomCa(path) => assert_eq!(path, PathBuf::from("/etc/l2topo/ca.pem")),
            other => panic!("unexpected TLS mode: {other:?}"),
        }
    }

    #[test]
    fn token_from_env_var() {
        // PATH is set in every test environment.
        let expected = std::env::var("PATH").unwrap();
        let mut device = profile("http://10.0.0.1/lldp");
        device.token_env = Some("PATH".into());
        device.token = Some("plaintext".into());

        let token = resolve_token(&device, "l2topo-test-env-device").unwrap().unwrap();
        assert_eq!(token.expose_secret(), expected);
    }

    #[test]
    fn plaintext_token_is_last_resort() {
        let mut device = profile("http://10.0.0.1/lldp");
        device.token = Some("s3cret".into());

        let token = resolve_token(&device, "l2topo-test-plain-device").unwrap().unwrap();
        assert_eq!(token.expose_secret(), "s3cret");
    }

    #[test]
    fn unset_token_env_is_an_error() {
        let mut device = profile("http://10.0.0.1/lldp");
        device.token_env = Some("L2TOPO_TEST_TOKEN_THAT_IS_NEVER_SET".into());

        let err = resolve_token(&device, "l2topo-test-missing-device").unwrap_err();
        assert!(matches!(err, ConfigError::MissingToken { .. }));
    }

    #[test]
    fn no_token_source_polls_unauthenticated() {
        let device = profile("http://10.0.0.1/lldp");
        assert!(resolve_token(&device, "l2topo-test-anon-device").unwrap().is_none());
    }

    #[test]
    fn redacted_masks_tokens() {
        let mut config = Config::default();
        let mut device = profile("http://10.0.0.1/lldp");
        device.token = Some("s3cret".into());
        config.devices.insert("sw1".into(), device);
        config.devices.insert("sw2".into(), profile("http://10.0.0.2/lldp"));

        let shown = config.redacted().to_toml().unwrap();
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains(REDACTED));
        assert_eq!(config.devices["sw1"].token.as_deref(), Some("s3cret"));
        assert!(config.redacted().devices["sw2"].token.is_none());
    }
}
