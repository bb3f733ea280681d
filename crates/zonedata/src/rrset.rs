//! RRsets: a set of RRs sharing an owner/class/type, plus the RRSIGs that
//! cover them.

use domain::base::iana::Rtype;
use domain::base::Ttl;
use domain::rdata::dnssec::Rrsig;

use crate::name::StoredName;
use crate::rrdata::RrData;

/// An RRset: the records sharing an owner, class and type, and the
/// RRSIGs that cover them.
///
/// Per spec §3, RRSIGs are always stored alongside the covered RRset,
/// never mixed into `records`. An `Rrset` is never constructed empty;
/// [`crate::owner::OwnerName`] removes the entry instead of leaving a
/// zero-length RRset around.
#[derive(Clone, Debug)]
pub struct Rrset {
    rtype: Rtype,
    ttl: Ttl,
    records: Vec<RrData>,
    rrsigs: Vec<Rrsig<bytes::Bytes, StoredName>>,
}

impl Rrset {
    /// Construct a new, non-empty RRset.
    ///
    /// # Panics
    ///
    /// Panics if `records` is empty; an RRset that holds nothing should
    /// not exist (see the owner-index invariant in spec §3).
    pub fn new(rtype: Rtype, ttl: Ttl, records: Vec<RrData>) -> Self {
        assert!(!records.is_empty(), "an Rrset must not be empty");
        Self {
            rtype,
            ttl,
            records,
            rrsigs: Vec::new(),
        }
    }

    pub fn rtype(&self) -> Rtype {
        self.rtype
    }

    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    pub fn records(&self) -> &[RrData] {
        &self.records
    }

    pub fn rrsigs(&self) -> &[Rrsig<bytes::Bytes, StoredName>] {
        &self.rrsigs
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Add an RR to this RRset, deduplicating exact matches (RFC 1035
    /// round-robin sets never contain the same rdata twice).
    pub fn add(&mut self, rdata: RrData) {
        if !self
            .records
            .iter()
            .any(|r| r.cmp_canonical(&rdata) == std::cmp::Ordering::Equal)
        {
            self.records.push(rdata);
        }
    }

    /// Remove one exact RR (by rdata). Returns whether the RRset became
    /// empty as a result, in which case the caller (the owner index)
    /// should drop this `Rrset` entirely.
    pub fn remove_exact(&mut self, rdata: &RrData) -> bool {
        self.records
            .retain(|r| r.cmp_canonical(rdata) != std::cmp::Ordering::Equal);
        self.records.is_empty()
    }

    /// Replace the cached RRSIGs covering this RRset, e.g. after online
    /// signing (spec §4.4) or a resign (spec §4.1).
    pub fn set_rrsigs(&mut self, rrsigs: Vec<Rrsig<bytes::Bytes, StoredName>>) {
        self.rrsigs = rrsigs;
    }

    pub fn clear_rrsigs(&mut self) {
        self.rrsigs.clear();
    }

    /// Sort the RRset contents into DNSSEC canonical order (RFC 4034
    /// §6.3), as required before computing RRSIGs or streaming AXFR.
    pub fn canonicalize(&mut self) {
        self.records.sort_by(RrData::cmp_canonical);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rrdata::RrData;
    use domain::rdata::ZoneRecordData;
    use std::net::Ipv4Addr;

    fn a(octet: u8) -> RrData {
        RrData::Known(ZoneRecordData::A(domain::rdata::A::new(Ipv4Addr::new(
            192, 0, 2, octet,
        ))))
    }

    #[test]
    fn add_deduplicates() {
        let mut rrset = Rrset::new(Rtype::A, Ttl::from_secs(300), vec![a(1)]);
        rrset.add(a(1));
        assert_eq!(rrset.records().len(), 1);
        rrset.add(a(2));
        assert_eq!(rrset.records().len(), 2);
    }

    #[test]
    fn remove_exact_reports_emptiness() {
        let mut rrset = Rrset::new(Rtype::A, Ttl::from_secs(300), vec![a(1)]);
        assert!(!rrset.remove_exact(&a(2)));
        assert!(rrset.remove_exact(&a(1)));
        assert!(rrset.is_empty());
    }
}
