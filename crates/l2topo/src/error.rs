//! CLI error types with miette diagnostics.
//!
//! Maps config, endpoint, and topology errors into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use l2topo_api::Error as EndpointError;
use l2topo_config::ConfigError;
use l2topo_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("No devices configured")]
    #[diagnostic(
        code(l2topo::no_devices),
        help(
            "Add a [devices.<name>] table with a `url` to the config file.\n\
             Locate it with: l2topo config path"
        )
    )]
    NoDevices,

    #[error("Device '{name}' not found in configuration")]
    #[diagnostic(
        code(l2topo::unknown_device),
        help("Configured devices: {available}")
    )]
    UnknownDevice { name: String, available: String },

    #[error("Token for device '{device}' is not available")]
    #[diagnostic(
        code(l2topo::missing_token),
        help(
            "The config names ${var} as the token source, but it is not set.\n\
             Export it, or store the token with: l2topo config set-token {device}"
        )
    )]
    MissingToken { device: String, var: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(l2topo::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(l2topo::config))]
    Config(Box<figment::Error>),

    #[error("Failed to render configuration: {0}")]
    #[diagnostic(code(l2topo::serialization))]
    Serialization(String),

    #[error("Keyring access failed: {0}")]
    #[diagnostic(
        code(l2topo::keyring),
        help("Fall back to `token_env` or a plaintext `token` in the config file.")
    )]
    Keyring(String),

    // ── Devices ──────────────────────────────────────────────────────
    #[error("Could not reach device '{device}'")]
    #[diagnostic(
        code(l2topo::unreachable),
        help("Check that the device agent is running and the URL is correct.\n{reason}")
    )]
    Unreachable { device: String, reason: String },

    #[error("Device '{device}' timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(l2topo::timeout),
        help("Raise `timeout` for this device or under [defaults].")
    )]
    Timeout { device: String, timeout_ms: u64 },

    #[error("Device '{device}' rejected the request (HTTP {status})")]
    #[diagnostic(code(l2topo::rejected))]
    Rejected { device: String, status: u16 },

    #[error("TLS setup failed: {0}")]
    #[diagnostic(
        code(l2topo::tls),
        help("Set `ca_cert` for the device, or `insecure = true` for self-signed agents.")
    )]
    Tls(String),

    #[error("Device answered with an unusable document: {0}")]
    #[diagnostic(code(l2topo::invalid_response))]
    InvalidResponse(String),

    // ── Topology ─────────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(l2topo::topology))]
    Topology(#[from] CoreError),

    #[error("Reconciler task failed: {0}")]
    #[diagnostic(code(l2topo::task))]
    Task(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON output failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML output failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unreachable { .. } | Self::Tls(_) => exit_code::CONNECTION,
            Self::MissingToken { .. } | Self::Keyring(_) => exit_code::AUTH,
            Self::Rejected {
                status: 401 | 403, ..
            } => exit_code::AUTH,
            Self::UnknownDevice { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NoDevices => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoDevices => Self::NoDevices,
            ConfigError::UnknownDevice { name } => Self::UnknownDevice {
                name,
                available: "(none)".into(),
            },
            ConfigError::MissingToken { device, var } => Self::MissingToken { device, var },
            ConfigError::Serialization(e) => Self::Serialization(e.to_string()),
            ConfigError::Figment(e) => Self::Config(e),
            ConfigError::Io(e) => Self::Io(e),
        }
    }
}

// ── Endpoint error → CliError mapping ────────────────────────────────

impl From<EndpointError> for CliError {
    fn from(err: EndpointError) -> Self {
        match err {
            EndpointError::Unavailable { device, reason } => Self::Unreachable { device, reason },
            EndpointError::Timeout { device, timeout_ms } => Self::Timeout { device, timeout_ms },
            EndpointError::Rejected { device, status } => Self::Rejected { device, status },
            EndpointError::Tls(reason) => Self::Tls(reason),
            EndpointError::Transport(e) => Self::Unreachable {
                device: e.url().map_or_else(|| "(unknown)".into(), ToString::to_string),
                reason: e.to_string(),
            },
            EndpointError::InvalidUrl(e) => Self::Validation {
                field: "url".into(),
                reason: e.to_string(),
            },
            EndpointError::Deserialization { message, .. } => Self::InvalidResponse(message),
            other @ (EndpointError::AlreadyStarted { .. } | EndpointError::Stopped { .. }) => {
                Self::Topology(CoreError::Endpoint(other))
            }
        }
    }
}
