//! Derived delegation data for a zone cut (spec §3 "DelegationData").

use crate::name::StoredName;
use crate::rrset::Rrset;

/// The delegation data for a zone cut inside some zone: the NS RRset,
/// the in-bailiwick subset of its targets, their glue, and an optional
/// DS RRset.
///
/// This is always *derived* — computed on demand from the owner index
/// at the cut — rather than stored separately, so it can never drift
/// from the authoritative NS/glue/DS data it summarizes.
#[derive(Clone, Debug)]
pub struct DelegationData {
    /// The owner name of the cut (the child apex, as seen from inside
    /// the parent zone).
    pub name: StoredName,
    /// The authoritative NS RRset at the cut.
    pub ns: Rrset,
    /// The subset of `ns`'s targets that are in-bailiwick of the cut.
    pub in_bailiwick_nameservers: Vec<StoredName>,
    /// Glue A/AAAA RRsets for the in-bailiwick nameservers, keyed by
    /// nameserver name.
    pub glue: Vec<(StoredName, Vec<Rrset>)>,
    /// The DS RRset at the cut, if one is published (it usually is not,
    /// for a non-DNSSEC-signed child).
    pub ds: Option<Rrset>,
}

impl DelegationData {
    /// All in-bailiwick A/AAAA RRsets, flattened, in the same order as
    /// `in_bailiwick_nameservers`.
    pub fn glue_rrsets(&self) -> impl Iterator<Item = &Rrset> {
        self.glue.iter().flat_map(|(_, rrsets)| rrsets.iter())
    }
}
