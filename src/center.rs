//! The daemon's central command: shared state every unit is
//! constructed with, mirroring how the daemon wires all engines around
//! a single `Center` value rather than reaching into global statics.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tdns_zonedata::{StoredName, Zone, ZoneStore};
use tokio::sync::mpsc;

use crate::comms::ApplicationCommand;
use crate::config::Config;
use crate::keystore::{DnssecKeyStore, Sig0KeyStore, Sig0TrustStore};
use crate::log::Logger;

/// The daemon's central command.
pub struct Center {
    pub state: Mutex<State>,
    pub config: Config,
    pub logger: &'static Logger,
    pub sig0_keys: Sig0KeyStore,
    pub sig0_trust: Sig0TrustStore,
    pub dnssec_keys: DnssecKeyStore,
    /// A channel to each running unit, keyed by its two-letter tag.
    pub app_cmd_tx: mpsc::UnboundedSender<(String, ApplicationCommand)>,
}

impl fmt::Debug for Center {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Center").finish_non_exhaustive()
    }
}

/// Global mutable state: the zone set. Per spec §5, the zone set itself
/// (`HashMap`/`ZoneStore`) only needs a lock around insert/remove; reads
/// and structural mutation within one zone go through that zone's own
/// `Zone::state` mutex.
#[derive(Debug, Default)]
pub struct State {
    pub zones: ZoneStore,
}

//--- Actions

/// Add a zone to the store (config load, SIGHUP, or a future `zone add`
/// API command).
pub fn add_zone(center: &Arc<Center>, zone: Arc<Zone>) -> Result<(), ZoneAddError> {
    let mut state = center.state.lock().unwrap();
    if state.zones.get(&zone.name).is_some() {
        return Err(ZoneAddError::AlreadyExists);
    }
    state.zones.insert(zone.clone());
    tracing::info!(zone = %zone.name, "added zone");
    Ok(())
}

pub fn remove_zone(center: &Arc<Center>, name: &StoredName) -> Result<(), ZoneRemoveError> {
    let mut state = center.state.lock().unwrap();
    state
        .zones
        .remove(name)
        .ok_or(ZoneRemoveError::NotFound)?;
    tracing::info!(zone = %name, "removed zone");
    Ok(())
}

pub fn get_zone(center: &Center, name: &StoredName) -> Option<Arc<Zone>> {
    let state = center.state.lock().unwrap();
    state.zones.get(name)
}

/// A snapshot of every zone currently served, for units (Refresh Engine,
/// Notifier) that need to iterate the whole set on a tick.
pub fn zones(center: &Center) -> Vec<Arc<Zone>> {
    let state = center.state.lock().unwrap();
    state.zones.iter().cloned().collect()
}

/// Dispatch an [`ApplicationCommand`] to the unit registered under
/// `tag`, logging (rather than panicking) if no such unit is running.
pub fn dispatch(center: &Center, tag: &str, cmd: ApplicationCommand) {
    if center.app_cmd_tx.send((tag.to_string(), cmd)).is_err() {
        tracing::warn!(unit = tag, "no unit is listening for application commands");
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ZoneAddError {
    AlreadyExists,
}

impl std::error::Error for ZoneAddError {}

impl fmt::Display for ZoneAddError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AlreadyExists => "a zone of this name already exists",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ZoneRemoveError {
    NotFound,
}

impl std::error::Error for ZoneRemoveError {}

impl fmt::Display for ZoneRemoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotFound => "no such zone was found",
        })
    }
}

/// Per-tag unit handles used only during startup wiring (see
/// [`crate::manager::spawn`]).
pub type UnitSenders = HashMap<String, mpsc::UnboundedSender<ApplicationCommand>>;
