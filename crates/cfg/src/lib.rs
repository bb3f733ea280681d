//! Parsing and validating the daemon's two YAML configuration documents
//! (spec §6): the daemon config and the zones config.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::net::SocketAddr;

use camino::Utf8PathBuf;
use domain::base::iana::Rtype;
use serde::{Deserialize, Serialize};

pub mod daemon;
pub mod zones;

pub use daemon::DaemonConfig;
pub use zones::{UpdatePolicySpec, ZoneConfig, ZonesConfig};

/// A fatal configuration problem. Per spec §7, configuration errors are
/// always fatal: the process refuses to start.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError {
            message: err.to_string(),
        }
    }
}

fn load_yaml<T: for<'de> Deserialize<'de>>(path: &Utf8PathBuf) -> Result<T, ConfigError> {
    let text = fs::read_to_string(path)
        .map_err(|err| ConfigError {
            message: format!("cannot read {path}: {err}"),
        })?;
    serde_yaml::from_str(&text).map_err(|err| ConfigError {
        message: format!("cannot parse {path}: {err}"),
    })
}

/// A listen socket configuration, covering plain UDP/TCP and the
/// optional encrypted transports (spec §4.8).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "transport")]
pub enum ListenConfig {
    Udp { addr: SocketAddr },
    Tcp { addr: SocketAddr },
    Dot {
        addr: SocketAddr,
        cert: Utf8PathBuf,
        key: Utf8PathBuf,
    },
    Doh {
        addr: SocketAddr,
        cert: Utf8PathBuf,
        key: Utf8PathBuf,
    },
    Doq {
        addr: SocketAddr,
        cert: Utf8PathBuf,
        key: Utf8PathBuf,
    },
}

/// The recognized rrtype names accepted in presentation form inside
/// `updatepolicy.rrtypes`. Kept as a thin wrapper so unrecognized names
/// are rejected at load time rather than silently ignored.
pub fn parse_rtype(name: &str) -> Result<Rtype, ConfigError> {
    name.parse::<Rtype>().map_err(|_| ConfigError {
        message: format!("unrecognized rrtype '{name}' in update policy"),
    })
}

/// A zone template: a named, partial [`ZoneConfig`] merged underneath a
/// zone entry that references it by name (spec §6: "Templates may be
/// referenced by name and are merged with overrides coming from the
/// zone entry").
pub type Templates = HashMap<String, zones::ZoneTemplate>;
