//! The daemon configuration document (spec §3, §4, §6).

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::{load_yaml, ConfigError, ListenConfig};

/// Top-level daemon configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DaemonConfig {
    /// Where the daemon persists Keystore/Truststore state (spec §6: "a
    /// single relational database file").
    pub database: Utf8PathBuf,

    /// Where the zones config document lives; re-read on SIGHUP.
    pub zones_config: Utf8PathBuf,

    #[serde(default)]
    pub listen: Vec<ListenConfig>,

    #[serde(default)]
    pub service: ServiceConfig,

    /// CHAOS-class `*.server.` response strings (SPEC_FULL §C).
    #[serde(default)]
    pub chaos: ChaosConfig,

    #[serde(default)]
    pub log_level: LogLevel,

    /// Starting points for the Delegation Sync Engine's upward walk to a
    /// parent apex (spec §4.6 `AnalyseZoneDelegation` step 1). Not a
    /// general resolver hint list — just the servers AuthQuery tries
    /// first when asked to find a zone's parent.
    #[serde(default)]
    pub delegation_sync: DelegationSyncConfig,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Refresh-engine wide knobs (spec §4.3).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceConfig {
    /// Upper bound applied to every zone's `soa.refresh`.
    #[serde(default)]
    pub maxrefresh: Option<u32>,
    /// If true, a successful refresh rewrites the SOA serial to the
    /// current Unix time before the zone becomes visible.
    #[serde(default)]
    pub reset_soa_serial: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            maxrefresh: None,
            reset_soa_serial: false,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DelegationSyncConfig {
    #[serde(default)]
    pub parent_hints: Vec<std::net::SocketAddr>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChaosConfig {
    pub id: Option<String>,
    pub version: Option<String>,
    pub hostname: Option<String>,
    pub authors: Option<String>,
}

impl DaemonConfig {
    pub fn load(path: &Utf8PathBuf) -> Result<Self, ConfigError> {
        let config: DaemonConfig = load_yaml(path)?;
        if config.listen.is_empty() {
            return Err(ConfigError {
                message: "daemon config must configure at least one listen address".into(),
            });
        }
        Ok(config)
    }
}
