//! Literal boundary scenarios (spec §8): referral, wildcard, NXDOMAIN.
//!
//! Exercised against [`tdnsd::units::query_engine::answer`] directly,
//! the same public entry point the Transport Front-End calls
//! synchronously for every query (§4.8) — this is the daemon's
//! narrowest true black-box seam, since `tdnsd::units::query_engine` is
//! the only unit not hidden behind a queued, async `run` loop.
//!
//! The SIG(0)-validated-UPDATE scenarios (accepted / rejected) and the
//! delegation-drift-repair scenario are covered in place, alongside the
//! private `approve`/`best_sync_scheme` logic they depend on, by the
//! `#[cfg(test)]` modules in `src/units/update_pipeline.rs` and
//! `src/units/delegation_sync.rs` — that logic isn't reachable from a
//! separate test crate without widening the unit's public surface
//! purely for tests.

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;

use domain::base::iana::{Class, Opcode, Rcode, Rtype};
use domain::base::Ttl;
use domain::rdata::{ZoneRecordData, A};

use tdnsd::keystore::{Db, DnssecKeyStore};
use tdnsd::units::query_engine::answer;

use tdns_zonedata::zone::{ZoneKind, ZoneOptions, ZoneStoreKind};
use tdns_zonedata::{OwnerName, RrData, Rrset, StoredName, Zone, ZoneStore};

fn name(s: &str) -> StoredName {
    StoredName::from_str(s).unwrap()
}

fn a_rrset(octet: u8) -> Rrset {
    Rrset::new(
        Rtype::A,
        Ttl::from_secs(300),
        vec![RrData::Known(ZoneRecordData::A(A::new(Ipv4Addr::new(192, 0, 2, octet))))],
    )
}

/// `test.net.` with a child delegation at `child.test.net.` (plus glue)
/// and a wildcard at `*.wild.test.net.`, matching scenarios 1-3 of §8
/// verbatim.
fn build_test_zone() -> (Arc<Zone>, ZoneStore) {
    let apex = name("test.net.");
    let zone = Arc::new(Zone::new(
        apex.clone(),
        ZoneKind::Primary { source_file: "test.net.zone".into() },
        ZoneStoreKind::Map,
        ZoneOptions::default(),
    ));

    let mut apex_owner = OwnerName::new(apex.clone());
    apex_owner.put(Rrset::new(
        Rtype::SOA,
        Ttl::from_secs(3600),
        vec![RrData::Known(ZoneRecordData::Soa(domain::rdata::Soa::new(
            name("ns1.test.net."),
            name("hostmaster.test.net."),
            domain::base::Serial(1),
            Ttl::from_secs(3600),
            Ttl::from_secs(600),
            Ttl::from_secs(1209600),
            Ttl::from_secs(3600),
        )))],
    ));

    let child_cut = name("child.test.net.");
    let mut child_owner = OwnerName::new(child_cut);
    child_owner.put(Rrset::new(
        Rtype::NS,
        Ttl::from_secs(3600),
        vec![RrData::Known(ZoneRecordData::Ns(domain::rdata::Ns::new(name("ns1.child.test.net."))))],
    ));

    let glue_name = name("ns1.child.test.net.");
    let mut glue_owner = OwnerName::new(glue_name);
    glue_owner.put(a_rrset(1));

    let mut wild_owner = OwnerName::new(name("*.wild.test.net."));
    wild_owner.put(Rrset::new(
        Rtype::TXT,
        Ttl::from_secs(300),
        vec![RrData::Opaque { rtype: Rtype::TXT.to_int(), data: bytes::Bytes::from_static(b"\x03hit") }],
    ));

    {
        let mut state = zone.state.lock().unwrap();
        state
            .index
            .replace_all(ZoneStoreKind::Map, vec![apex_owner, child_owner, glue_owner, wild_owner]);
        state.error = tdns_zonedata::zone::ZoneError::None;
        state.serial = Some(domain::base::Serial(1));
    }

    let mut store = ZoneStore::new();
    store.insert(zone.clone());
    (zone, store)
}

fn dnssec_keys() -> DnssecKeyStore {
    DnssecKeyStore::new(Arc::new(Db::open_in_memory()))
}

/// §8 boundary scenario 1: query `A www.child.test.net.` against a zone
/// delegating `child.test.net.` returns a referral (AA=0) with the
/// child's NS in Authority and its glue in Additional.
#[test]
fn referral_carries_ns_and_glue() {
    let (zone, store) = build_test_zone();
    let ans = answer(
        &store,
        &dnssec_keys(),
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
    assert_eq!(ans.authority[0].0, name("child.test.net."));
    assert_eq!(ans.additional.len(), 1);
    assert_eq!(ans.additional[0].0, name("ns1.child.test.net."));
}

/// §8 boundary scenario 2: a wildcard `*.wild.test.net. TXT "hit"`
/// answers `TXT foo.wild.test.net.` with the owner rewritten to the
/// queried name, AA=1.
#[test]
fn wildcard_match_rewrites_owner() {
    let (zone, store) = build_test_zone();
    let qname = name("foo.wild.test.net.");
    let ans = answer(&store, &dnssec_keys(), Opcode::QUERY, &zone, &qname, Rtype::TXT, Class::IN, false, false);

    assert_eq!(ans.rcode, Rcode::NOERROR);
    assert!(ans.aa);
    assert_eq!(ans.answer.len(), 1);
    assert_eq!(ans.answer[0].0, qname);
}

/// §8 boundary scenario 3: a missing name under an authoritative zone
/// with no matching wildcard returns NXDOMAIN with the apex SOA in
/// Authority.
#[test]
fn nxdomain_carries_apex_soa() {
    let (zone, store) = build_test_zone();
    let ans = answer(
        &store,
        &dnssec_keys(),
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
    assert_eq!(ans.authority[0].0, name("test.net."));
    assert_eq!(ans.authority[0].1.rtype(), Rtype::SOA);
}
