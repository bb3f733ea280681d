//! Commands sent to units, and the error a unit reports when its
//! channel peer has gone away.

use std::fmt;

use domain::base::iana::Rtype;

use tdns_zonedata::StoredName;

/// A command delivered to a unit's `mpsc` queue.
///
/// Every unit (Refresh Engine, Query Engine helper tasks, Update
/// Pipeline, Delegation Sync Engine, Notifier, AuthQuery, Transport
/// Front-End) is driven by a loop that selects over this queue
/// alongside its own periodic work; see each unit's `run` method.
#[derive(Debug)]
pub enum ApplicationCommand {
    /// Re-read zone config and force a refresh of every zone (SIGHUP).
    ReloadConfig,
    /// A zone was reloaded or its delegation data otherwise changed;
    /// ask the Refresh Engine to refresh it immediately (spec §4.3:
    /// "when a NOTIFY arrives for a known zone, a refresh request is
    /// enqueued and processed immediately").
    RefreshZone { zone: StoredName },
    /// `BumpSerial` (spec §4.3).
    BumpSerial { zone: StoredName },
    /// `DELEGATION-STATUS` / `EXPLICIT-SYNC-DELEGATION` (spec §4.6).
    DelegationStatus {
        zone: StoredName,
        reply_tx: tokio::sync::oneshot::Sender<crate::units::delegation_sync::DelegationReport>,
    },
    ExplicitSyncDelegation {
        zone: StoredName,
        reply_tx: tokio::sync::oneshot::Sender<crate::units::delegation_sync::DelegationReport>,
    },
    /// `SYNC-DELEGATION`: the Update Pipeline or Refresh Engine observed
    /// a local delegation-data change and asks the Delegation Sync
    /// Engine to propagate it upward; no reply is expected (spec §4.6
    /// "implicit" mode).
    SyncDelegation { zone: StoredName },
    /// A validated UPDATE ready for policy approval and application
    /// (spec §4.5).
    ApplyUpdate {
        request: crate::units::update_pipeline::UpdateRequest,
    },
    /// Freeze/thaw a zone against further structural mutation (spec §6
    /// `nsec freeze`/`thaw`).
    Freeze { zone: StoredName },
    Thaw { zone: StoredName },
    /// `nsec sign-zone` / `nsec generate-nsec` (spec §4.4, §6).
    SignZone { zone: StoredName },
    GenerateNsec { zone: StoredName },
    /// Outbound NOTIFY for a changed rrtype (spec §4.7).
    Notify {
        zone: StoredName,
        rtype: Rtype,
        targets: Vec<std::net::SocketAddr>,
    },
    /// Shut the unit down cleanly.
    Terminate,
}

/// A unit's channel peer has gone away; its loop should exit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Terminated;

impl fmt::Display for Terminated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("the unit's channel was closed")
    }
}

impl std::error::Error for Terminated {}
