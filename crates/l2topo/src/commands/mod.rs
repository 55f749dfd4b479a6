//! Command handlers.

pub mod config_cmd;
pub mod probe;
pub mod watch;

use std::path::PathBuf;

use l2topo_config::Config;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file in effect: `--config` / `L2TOPO_CONFIG`, else the platform path.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(l2topo_config::config_path)
}

pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = config_file(global);
    Ok(l2topo_config::load_config_from(&path)?)
}

/// Look up a device, listing the configured names when it is missing.
pub fn require_device<'a>(
    cfg: &'a Config,
    name: &str,
) -> Result<&'a l2topo_config::DeviceProfile, CliError> {
    cfg.devices.get(name).ok_or_else(|| CliError::UnknownDevice {
        name: name.into(),
        available: if cfg.devices.is_empty() {
            "(none)".into()
        } else {
            cfg.devices.keys().cloned().collect::<Vec<_>>().join(", ")
        },
    })
}
