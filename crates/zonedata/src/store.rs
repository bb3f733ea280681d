//! The zone store: the set of zones a daemon instance serves, and the
//! lookups the Query Engine and Delegation Sync Engine need over it
//! (spec §4.2).

use std::sync::Arc;

use domain::base::iana::Rtype;

use crate::delegation::DelegationData;
use crate::name::{fold, in_bailiwick, label_count, StoredName};
use crate::owner::OwnerName;
use crate::zone::{Zone, ZonesByName};

/// The result of finding the zone that encloses a query name.
pub struct FindZoneResult {
    pub zone: Arc<Zone>,
    /// Whether the match required folding the query name's case (i.e.
    /// the zone has `fold-case` set and an exact-case match failed).
    pub case_folded: bool,
}

/// The collection of zones served by this daemon instance.
///
/// Zones are added and removed as whole units (config reload, `stop`
/// management command); lookups within a zone go through the zone's own
/// [`crate::zone::ZoneState`] lock. `ZoneStore` itself only needs to
/// guard the zone *set*, so it is cheap to read concurrently with
/// `arc_swap::ArcSwap`, mirroring how the daemon swaps its zone tree
/// wholesale on reload rather than locking per lookup.
#[derive(Debug, Default, Clone)]
pub struct ZoneStore {
    zones: ZonesByName,
}

impl ZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, zone: Arc<Zone>) {
        self.zones.insert(zone.name.clone(), zone);
    }

    pub fn remove(&mut self, apex: &StoredName) -> Option<Arc<Zone>> {
        self.zones.remove(apex)
    }

    /// `Get(apex)`: look up a zone by its exact apex name.
    pub fn get(&self, apex: &StoredName) -> Option<Arc<Zone>> {
        self.zones.get(apex).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Zone>> {
        self.zones.values()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// `FindZone(qname)`: the most specific zone enclosing `qname`, if
    /// any. Tries an exact-case bailiwick match first; if none is found,
    /// retries against zones with `fold-case` set by folding both the
    /// query name and every candidate apex to lowercase.
    pub fn find_zone(&self, qname: &StoredName) -> Option<FindZoneResult> {
        let mut best: Option<Arc<Zone>> = None;
        for zone in self.zones.values() {
            if in_bailiwick(&zone.name, qname) {
                let better = match &best {
                    Some(b) => label_count(&zone.name) > label_count(&b.name),
                    None => true,
                };
                if better {
                    best = Some(zone.clone());
                }
            }
        }
        if let Some(zone) = best {
            return Some(FindZoneResult {
                zone,
                case_folded: false,
            });
        }

        let folded_qname = fold(qname);
        let mut best: Option<Arc<Zone>> = None;
        for zone in self.zones.values() {
            if !zone.options.fold_case {
                continue;
            }
            let folded_apex = fold(&zone.name);
            if in_bailiwick(&folded_apex, &folded_qname) {
                let better = match &best {
                    Some(b) => label_count(&zone.name) > label_count(&b.name),
                    None => true,
                };
                if better {
                    best = Some(zone.clone());
                }
            }
        }
        best.map(|zone| FindZoneResult {
            zone,
            case_folded: true,
        })
    }

    /// `GetOwner(zone, name)`: look up an owner name's RRsets within a
    /// specific zone. Returns `None` for `xfr-only` zones, which carry
    /// no structured index (see [`crate::zone::ZoneStoreKind::XfrOnly`]).
    pub fn get_owner(&self, zone: &Zone, name: &StoredName) -> Option<OwnerName> {
        let state = zone.state.lock().unwrap();
        state.index.get(name).cloned()
    }

    /// `GetOwnerNames(zone)`: every owner name held in a zone, in no
    /// particular order for `Map`-backed zones, name order for
    /// `Slice`-backed ones.
    pub fn get_owner_names(&self, zone: &Zone) -> Vec<StoredName> {
        let state = zone.state.lock().unwrap();
        state.index.owner_names()
    }

    /// `FindDelegation(zone, qname)`: the zone cut, if any, that is at
    /// or above `qname` and strictly below the zone apex (i.e. an
    /// actual delegation, not the apex's own NS RRset).
    pub fn find_delegation(&self, zone: &Zone, qname: &StoredName) -> Option<DelegationData> {
        let state = zone.state.lock().unwrap();
        let owner_names = state.index.owner_names();
        let mut best: Option<StoredName> = None;
        for owner in &owner_names {
            if owner == &zone.name {
                continue;
            }
            if !in_bailiwick(owner, qname) {
                continue;
            }
            if state.index.get(owner).map(|o| o.get(Rtype::NS).is_some()) != Some(true) {
                continue;
            }
            let better = match &best {
                Some(b) => label_count(owner) > label_count(b),
                None => true,
            };
            if better {
                best = Some(owner.clone());
            }
        }
        let cut = best?;
        let owner = state.index.get(&cut)?;
        let ns = owner.get(Rtype::NS)?.clone();
        let ds = owner.get(Rtype::DS).cloned();
        drop(state);

        let mut in_bailiwick_nameservers = Vec::new();
        let mut glue = Vec::new();
        for rdata in ns.records() {
            if let crate::rrdata::RrData::Known(domain::rdata::ZoneRecordData::Ns(ns_rec)) = rdata
            {
                let target = StoredName::from(ns_rec.nsdname().clone());
                if in_bailiwick(&cut, &target) {
                    in_bailiwick_nameservers.push(target.clone());
                    glue.push((target.clone(), self.find_glue_owned(zone, &target)));
                }
            }
        }

        Some(DelegationData {
            name: cut,
            ns,
            in_bailiwick_nameservers,
            glue,
            ds,
        })
    }

    /// `FindGlue(nsRRset)`: the A/AAAA RRsets held at a nameserver
    /// target name, for use as glue underneath a delegation.
    pub fn find_glue(&self, zone: &Zone, target: &StoredName) -> Vec<crate::rrset::Rrset> {
        self.find_glue_owned(zone, target)
    }

    fn find_glue_owned(&self, zone: &Zone, target: &StoredName) -> Vec<crate::rrset::Rrset> {
        let state = zone.state.lock().unwrap();
        let Some(owner) = state.index.get(target) else {
            return Vec::new();
        };
        [Rtype::A, Rtype::AAAA]
            .into_iter()
            .filter_map(|rtype| owner.get(rtype).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::{ZoneKind, ZoneOptions, ZoneStoreKind};
    use std::str::FromStr;

    fn name(s: &str) -> StoredName {
        StoredName::from_str(s).unwrap()
    }

    fn zone(apex: &str) -> Arc<Zone> {
        Arc::new(Zone::new(
            name(apex),
            ZoneKind::Primary {
                source_file: "test.zone".into(),
            },
            ZoneStoreKind::Map,
            ZoneOptions::default(),
        ))
    }

    #[test]
    fn find_zone_picks_most_specific() {
        let mut store = ZoneStore::new();
        store.insert(zone("example.com."));
        store.insert(zone("sub.example.com."));

        let result = store.find_zone(&name("host.sub.example.com.")).unwrap();
        assert_eq!(result.zone.name, name("sub.example.com."));
        assert!(!result.case_folded);
    }

    #[test]
    fn find_zone_none_when_out_of_bailiwick() {
        let mut store = ZoneStore::new();
        store.insert(zone("example.com."));
        assert!(store.find_zone(&name("example.net.")).is_none());
    }
}
