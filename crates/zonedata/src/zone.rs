//! The zone itself: identity, options, policy, and the per-zone owner
//! index with its serializing mutex (spec §3, §5).

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::SystemTime;

use bytes::Bytes;
use domain::base::Serial;

use crate::name::StoredName;
use crate::owner::OwnerName;
use crate::policy::UpdatePolicy;

/// Whether a zone is served from a local file or transferred in from an
/// upstream primary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ZoneKind {
    /// Loaded (and periodically reloaded) from a zone file.
    Primary { source_file: Box<str> },
    /// Transferred in from an upstream server via SOA-query-then-AXFR.
    Secondary { upstream: SocketAddr },
}

/// How the owner index is represented internally.
///
/// Per spec §4.2, map and slice are semantically identical; they differ
/// only in the data structure used, which is a per-zone sizing decision
/// made at config time. `XfrOnly` zones keep no structured index at all:
/// they exist purely to hold the last AXFR'd wire image for outbound
/// transfer, and refuse every other query type (see the Query Engine's
/// decision in DESIGN.md).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoneStoreKind {
    Map,
    Slice,
    XfrOnly,
}

/// The boolean options recognized on a zone (spec §3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ZoneOptions {
    pub delegation_sync_parent: bool,
    pub delegation_sync_child: bool,
    pub online_signing: bool,
    pub allow_updates: bool,
    pub allow_child_updates: bool,
    pub fold_case: bool,
    pub sign_zone: bool,
    pub black_lies: bool,
    pub publish_key: bool,
}

impl ZoneOptions {
    /// Parse a single recognized option name. Callers (config loading)
    /// are responsible for rejecting unrecognized names per spec §3.
    pub fn set_by_name(&mut self, name: &str) -> bool {
        match name {
            "delegation-sync-parent" => self.delegation_sync_parent = true,
            "delegation-sync-child" => self.delegation_sync_child = true,
            "online-signing" => self.online_signing = true,
            "allow-updates" => self.allow_updates = true,
            "allow-child-updates" => self.allow_child_updates = true,
            "fold-case" => self.fold_case = true,
            "sign-zone" => self.sign_zone = true,
            "black-lies" => self.black_lies = true,
            "publish-key" => self.publish_key = true,
            _ => return false,
        }
        true
    }
}

/// The owner-name index backing a zone.
#[derive(Debug)]
pub enum OwnerIndex {
    /// A hash map keyed by owner name; O(1) lookup, used for large
    /// zones.
    Map(foldhash::HashMap<StoredName, OwnerName>),
    /// A name-ordered slice; used for small zones where the constant
    /// factors of a hash map aren't worth paying, and where ordered
    /// iteration (e.g. for NSEC chain generation) is convenient.
    Slice(Vec<OwnerName>),
    /// No structured index; the zone holds only the last AXFR wire
    /// image, and can only be transferred, never queried directly.
    XfrOnly(Option<Bytes>),
}

impl OwnerIndex {
    pub fn new(kind: ZoneStoreKind) -> Self {
        match kind {
            ZoneStoreKind::Map => OwnerIndex::Map(Default::default()),
            ZoneStoreKind::Slice => OwnerIndex::Slice(Vec::new()),
            ZoneStoreKind::XfrOnly => OwnerIndex::XfrOnly(None),
        }
    }

    pub fn get(&self, name: &StoredName) -> Option<&OwnerName> {
        match self {
            OwnerIndex::Map(m) => m.get(name),
            OwnerIndex::Slice(s) => s
                .binary_search_by(|o| o.name().cmp(name))
                .ok()
                .map(|i| &s[i]),
            OwnerIndex::XfrOnly(_) => None,
        }
    }

    /// Like [`Self::get`], but mutable; used by the Update Pipeline to
    /// mutate an RRset in place without inserting an owner that does not
    /// already exist.
    pub fn get_mut(&mut self, name: &StoredName) -> Option<&mut OwnerName> {
        match self {
            OwnerIndex::Map(m) => m.get_mut(name),
            OwnerIndex::Slice(s) => s
                .binary_search_by(|o| o.name().cmp(name))
                .ok()
                .map(move |i| &mut s[i]),
            OwnerIndex::XfrOnly(_) => None,
        }
    }

    pub fn get_or_insert(&mut self, name: &StoredName) -> &mut OwnerName {
        match self {
            OwnerIndex::Map(m) => m.entry(name.clone()).or_insert_with(|| OwnerName::new(name.clone())),
            OwnerIndex::Slice(s) => {
                match s.binary_search_by(|o| o.name().cmp(name)) {
                    Ok(i) => &mut s[i],
                    Err(i) => {
                        s.insert(i, OwnerName::new(name.clone()));
                        &mut s[i]
                    }
                }
            }
            OwnerIndex::XfrOnly(_) => {
                panic!("an xfr-only zone has no structured owner index")
            }
        }
    }

    /// Drop an owner name entirely (used once its last RRset is
    /// removed).
    pub fn remove_owner(&mut self, name: &StoredName) {
        match self {
            OwnerIndex::Map(m) => {
                m.remove(name);
            }
            OwnerIndex::Slice(s) => {
                if let Ok(i) = s.binary_search_by(|o| o.name().cmp(name)) {
                    s.remove(i);
                }
            }
            OwnerIndex::XfrOnly(_) => {}
        }
    }

    pub fn owner_names(&self) -> Vec<StoredName> {
        match self {
            OwnerIndex::Map(m) => m.keys().cloned().collect(),
            OwnerIndex::Slice(s) => s.iter().map(|o| o.name().clone()).collect(),
            OwnerIndex::XfrOnly(_) => Vec::new(),
        }
    }

    /// Replace the entire index wholesale (a full zone reload or AXFR).
    pub fn replace_all(&mut self, kind: ZoneStoreKind, owners: Vec<OwnerName>) {
        match kind {
            ZoneStoreKind::Map => {
                let map = owners
                    .into_iter()
                    .map(|o| (o.name().clone(), o))
                    .collect();
                *self = OwnerIndex::Map(map);
            }
            ZoneStoreKind::Slice => {
                let mut owners = owners;
                owners.sort_by(|a, b| a.name().cmp(b.name()));
                *self = OwnerIndex::Slice(owners);
            }
            ZoneStoreKind::XfrOnly => *self = OwnerIndex::XfrOnly(None),
        }
    }
}

/// Why a zone currently cannot answer queries normally.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ZoneError {
    #[default]
    None,
    /// A transient refresh failure; the last-good content is still
    /// served.
    RefreshError(String),
    /// A permanent error (e.g. the zone file does not parse); queries
    /// return SERVFAIL.
    Permanent(String),
    /// The zone has never completed its initial load/transfer.
    NotYetLoaded,
}

/// The mutable, mutex-guarded state of a zone (spec §5: structural
/// mutations to a zone are serialized through this single lock; readers
/// only need it for the `OwnerName` lookup itself, since RRset values
/// are immutable snapshots once visible).
#[derive(Debug)]
pub struct ZoneState {
    pub index: OwnerIndex,
    pub serial: Option<Serial>,
    pub dirty: bool,
    pub frozen: bool,
    pub error: ZoneError,
    pub last_refresh: Option<SystemTime>,
    pub refresh_count: u64,
}

impl ZoneState {
    fn new(store_kind: ZoneStoreKind) -> Self {
        Self {
            index: OwnerIndex::new(store_kind),
            serial: None,
            dirty: false,
            frozen: false,
            error: ZoneError::NotYetLoaded,
            last_refresh: None,
            refresh_count: 0,
        }
    }
}

/// A zone (spec §3).
pub struct Zone {
    pub name: StoredName,
    pub kind: ZoneKind,
    pub store_kind: ZoneStoreKind,
    pub downstream_notify: Vec<SocketAddr>,
    pub options: ZoneOptions,
    pub update_policy: Option<UpdatePolicy>,
    pub dnssec_policy: Option<Box<str>>,
    pub state: Mutex<ZoneState>,
}

impl fmt::Debug for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zone").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Zone {
    pub fn new(
        name: StoredName,
        kind: ZoneKind,
        store_kind: ZoneStoreKind,
        options: ZoneOptions,
    ) -> Self {
        Self {
            name,
            kind,
            store_kind,
            downstream_notify: Vec::new(),
            options,
            update_policy: None,
            dnssec_policy: None,
            state: Mutex::new(ZoneState::new(store_kind)),
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self.kind, ZoneKind::Primary { .. })
    }

    /// Increment the SOA serial by one and mark the zone dirty (spec
    /// §4.3 `BumpSerial`). Does not itself send NOTIFY; the caller (the
    /// Refresh Engine) does that once the lock is released.
    pub fn bump_serial(&self) -> Serial {
        let mut state = self.state.lock().unwrap();
        let current = state.serial.unwrap_or(Serial(0));
        let serial = Serial(current.0.wrapping_add(1));
        state.serial = Some(serial);
        state.dirty = true;
        serial
    }

    /// A stable key for use in ordered maps (e.g. [`BTreeMap`]-backed
    /// policy bindings), distinct from hashing on the name itself.
    pub fn sort_key(&self) -> &StoredName {
        &self.name
    }
}

/// A convenience alias for callers that key zones by name in an ordered
/// collection (e.g. the HTTP API's `list-zones`, which wants stable
/// iteration order).
pub type ZonesByName = BTreeMap<StoredName, std::sync::Arc<Zone>>;
