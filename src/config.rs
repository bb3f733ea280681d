//! The daemon's resolved, in-memory configuration: the parsed daemon
//! config plus validated zone entries (spec §6), built from `tdns-cfg`.

use camino::Utf8PathBuf;
use tdns_cfg::zones::ResolvedZone;
use tdns_cfg::{ConfigError, DaemonConfig, ZonesConfig};

/// The fully loaded configuration for one daemon run.
#[derive(Debug, Clone)]
pub struct Config {
    pub daemon: DaemonConfig,
    pub zones: Vec<ResolvedZone>,
    pub zones_config_path: Utf8PathBuf,
}

impl Config {
    /// Load the daemon config, then its referenced zones config, and
    /// validate every zone entry against its template.
    pub fn load(daemon_config_path: &Utf8PathBuf) -> Result<Self, ConfigError> {
        let daemon = DaemonConfig::load(daemon_config_path)?;
        let zones_config_path = daemon.zones_config.clone();
        let zones_config = ZonesConfig::load(&zones_config_path)?;
        let zones = zones_config.resolve_all()?;
        Ok(Config {
            daemon,
            zones,
            zones_config_path,
        })
    }

    /// Re-read only the zones config, e.g. on `SIGHUP` (spec §6: "SIGHUP:
    /// re-parse zone config and force refresh of all zones").
    pub fn reload_zones(&mut self) -> Result<(), ConfigError> {
        let zones_config = ZonesConfig::load(&self.zones_config_path)?;
        self.zones = zones_config.resolve_all()?;
        Ok(())
    }
}
