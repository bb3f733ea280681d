//! Parsing a zone from RFC 1035 master-file text into the owner index
//! (spec §4.3 "Primary from file").

use std::fs::File;

use camino::Utf8Path;
use domain::base::iana::Class;
use domain::base::Ttl;
use domain::rdata::ZoneRecordData;
use domain::zonefile::inplace::{self, Entry, ScannedRecordData};

use crate::error::Error;
use tdns_zonedata::{fold, OwnerName, RrData, StoredName};

/// The parsed contents of one zone file: every owner name's RRsets,
/// ready to be installed wholesale into a zone's [`OwnerIndex`].
///
/// [`OwnerIndex`]: tdns_zonedata::zone::OwnerIndex
pub struct ParsedZone {
    pub owners: Vec<OwnerName>,
    pub serial: Option<domain::base::Serial>,
}

/// Parse the zone file at `path` for `apex`. Always reads the entire
/// file, regardless of the SOA serial found inside (spec §4.3: a
/// refresh always re-parses the whole file).
pub fn load(apex: &StoredName, path: &Utf8Path, fold_case: bool) -> Result<ParsedZone, Error> {
    let file = File::open(path)
        .map_err(|err| Error::Storage(format!("cannot open zone file {path}: {err}")))?;
    let mut reader = inplace::Zonefile::load(&file)
        .map_err(|err| Error::Protocol(format!("cannot read zone file {path}: {err}")))?;
    reader.set_origin(apex.clone());
    reader.set_default_class(Class::IN);

    let mut owners: Vec<OwnerName> = Vec::new();
    let mut serial = None;

    while let Some(entry) = reader
        .next_entry()
        .map_err(|err| Error::Protocol(format!("malformed zone file {path}: {err}")))?
    {
        let Entry::Record(record) = entry else {
            continue;
        };
        let owner_name = if fold_case {
            fold(&StoredName::from(record.owner().clone()))
        } else {
            StoredName::from(record.owner().clone())
        };
        let ttl = record.ttl();
        let data: ScannedRecordData = record.into_data();
        let zrd: ZoneRecordData<bytes::Bytes, StoredName> = data.flatten_into();

        if let ZoneRecordData::Soa(soa) = &zrd {
            serial = Some(soa.serial());
        }

        let owner = match owners.iter_mut().find(|o| o.name() == &owner_name) {
            Some(owner) => owner,
            None => {
                owners.push(OwnerName::new(owner_name.clone()));
                owners.last_mut().unwrap()
            }
        };

        let rtype = zrd.rtype();
        match owner.get_mut(rtype) {
            Some(rrset) => rrset.add(RrData::Known(zrd)),
            None => {
                owner.put(tdns_zonedata::Rrset::new(rtype, ttl, vec![RrData::Known(zrd)]));
            }
        }
    }

    Ok(ParsedZone { owners, serial })
}
