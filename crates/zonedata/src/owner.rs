//! Owner names: the zone-local index key mapping `rrtype -> Rrset`.

use domain::base::iana::Rtype;

use crate::name::StoredName;
use crate::rrset::Rrset;

/// A single owner name inside a zone, with its RRsets indexed by type.
#[derive(Clone, Debug, Default)]
pub struct OwnerName {
    name: Option<StoredName>,
    rrsets: foldhash::HashMap<Rtype, Rrset>,
}

impl OwnerName {
    pub fn new(name: StoredName) -> Self {
        Self {
            name: Some(name),
            rrsets: Default::default(),
        }
    }

    pub fn name(&self) -> &StoredName {
        self.name
            .as_ref()
            .expect("an OwnerName is always constructed with a name")
    }

    pub fn get(&self, rtype: Rtype) -> Option<&Rrset> {
        self.rrsets.get(&rtype)
    }

    pub fn get_mut(&mut self, rtype: Rtype) -> Option<&mut Rrset> {
        self.rrsets.get_mut(&rtype)
    }

    pub fn rrsets(&self) -> impl Iterator<Item = &Rrset> {
        self.rrsets.values()
    }

    pub fn rtypes(&self) -> impl Iterator<Item = Rtype> + '_ {
        self.rrsets.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.rrsets.is_empty()
    }

    /// Insert or replace an RRset wholesale (used by full-zone loads and
    /// AXFR application).
    pub fn put(&mut self, rrset: Rrset) {
        self.rrsets.insert(rrset.rtype(), rrset);
    }

    /// Remove an entire RRset (RFC 2136 `ClassANY` delete-RRset).
    pub fn remove_rrset(&mut self, rtype: Rtype) -> Option<Rrset> {
        self.rrsets.remove(&rtype)
    }

    /// Exactly one rrtype is present at this owner, and it is `CNAME`.
    ///
    /// Per spec §4.4, CNAME is only followed when it is the *sole*
    /// rrtype present; any other type coexisting with CNAME at an owner
    /// is a zone-content error the Refresh Engine should have rejected.
    pub fn sole_cname(&self) -> Option<&Rrset> {
        if self.rrsets.len() == 1 {
            self.rrsets.get(&Rtype::CNAME)
        } else {
            None
        }
    }
}
