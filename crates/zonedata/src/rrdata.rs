//! Record data, including the experimental types this system needs that
//! `domain`'s stable `ZoneRecordData` does not carry.

use std::cmp::Ordering;
use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use domain::base::wire::{Compose, ParseError};
use domain::rdata::ZoneRecordData;

use crate::name::StoredName;

/// The record data stored in an [`crate::rrset::Rrset`].
///
/// Everything `domain` already knows how to parse and compose is kept in
/// its native representation (`ZoneRecordData`); the handful of
/// experimental types from spec §6 that `domain` does not carry natively
/// are represented alongside it. Both arms compare and print the way a
/// `domain`-based program expects: canonical ordering for DNSSEC, and
/// round-tripping presentation format for zone files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RrData {
    /// A record type `domain` understands natively.
    Known(ZoneRecordData<Bytes, StoredName>),
    /// `DSYNC` (IANA-assigned type 66).
    Dsync(DsyncData),
    /// The private `NOTIFY-type` record (0x0F9A), advertising a
    /// generalized-NOTIFY scheme the same way DSYNC does.
    NotifyType(DsyncData),
    /// `DELEG`: an experimental alternative delegation record.
    Deleg(DelegData),
    /// An opaque payload for the MANIFEST/CHUNK family, routed like any
    /// other rrtype without being interpreted.
    Opaque { rtype: u16, data: Bytes },
}

impl RrData {
    pub fn rtype(&self) -> domain::base::iana::Rtype {
        use domain::base::iana::Rtype;
        match self {
            RrData::Known(rd) => rd.rtype(),
            RrData::Dsync(_) => Rtype::from_int(DSYNC_RTYPE),
            RrData::NotifyType(_) => Rtype::from_int(NOTIFY_TYPE_RTYPE),
            RrData::Deleg(_) => Rtype::from_int(DELEG_RTYPE),
            RrData::Opaque { rtype, .. } => Rtype::from_int(*rtype),
        }
    }

    /// Canonical ordering of rdata, used when sorting an RRset for AXFR
    /// or signing (RFC 4034 §6.3).
    pub fn cmp_canonical(&self, other: &Self) -> Ordering {
        match (self, other) {
            (RrData::Known(a), RrData::Known(b)) => a.cmp_canonical(b),
            (RrData::Dsync(a), RrData::Dsync(b)) => a.wire_bytes().cmp(&b.wire_bytes()),
            (RrData::NotifyType(a), RrData::NotifyType(b)) => a.wire_bytes().cmp(&b.wire_bytes()),
            (RrData::Deleg(a), RrData::Deleg(b)) => a.wire_bytes().cmp(&b.wire_bytes()),
            (RrData::Opaque { data: a, .. }, RrData::Opaque { data: b, .. }) => a.cmp(b),
            _ => self.rtype().to_int().cmp(&other.rtype().to_int()),
        }
    }
}

impl fmt::Display for RrData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RrData::Known(rd) => rd.fmt(f),
            RrData::Dsync(rd) => rd.fmt(f),
            RrData::NotifyType(rd) => rd.fmt(f),
            RrData::Deleg(rd) => rd.fmt(f),
            RrData::Opaque { data, .. } => {
                write!(f, "\\# {} ", data.len())?;
                for b in data {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// IANA-assigned type number for `DSYNC`.
pub const DSYNC_RTYPE: u16 = 66;
/// Private type number used for the generalized `NOTIFY-type` record.
pub const NOTIFY_TYPE_RTYPE: u16 = 0x0F9A;
/// Private type number used for `DELEG` in this implementation.
pub const DELEG_RTYPE: u16 = 0xFDE1;

/// Shared rdata shape for `DSYNC` and the private `NOTIFY-type` record:
/// `type (u16) | scheme (u8) | port (u16) | target (dname)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DsyncData {
    pub rrtype: u16,
    pub scheme: SyncScheme,
    pub port: u16,
    pub target: StoredName,
}

/// The DSYNC/NOTIFY-type scheme octet.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncScheme {
    /// Synchronize via a SIG(0)-signed DNS UPDATE sent to the target.
    Update,
    /// Synchronize via a generalized NOTIFY sent to the target.
    Notify,
    /// A scheme value this implementation does not recognize.
    Unknown(u8),
}

impl SyncScheme {
    pub fn to_octet(self) -> u8 {
        match self {
            SyncScheme::Update => 1,
            SyncScheme::Notify => 2,
            SyncScheme::Unknown(v) => v,
        }
    }

    pub fn from_octet(v: u8) -> Self {
        match v {
            1 => SyncScheme::Update,
            2 => SyncScheme::Notify,
            v => SyncScheme::Unknown(v),
        }
    }
}

impl DsyncData {
    pub fn parse(mut data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < 5 {
            return Err(ParseError::ShortInput);
        }
        let rrtype = data.get_u16();
        let scheme = SyncScheme::from_octet(data.get_u8());
        let port = data.get_u16();
        let target = StoredName::from_octets(Bytes::copy_from_slice(data))
            .map_err(|_| ParseError::form_error("invalid DSYNC target name"))?;
        Ok(Self {
            rrtype,
            scheme,
            port,
            target,
        })
    }

    pub fn wire_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(5 + self.target.len());
        buf.put_u16(self.rrtype);
        buf.put_u8(self.scheme.to_octet());
        buf.put_u16(self.port);
        self.target
            .compose(&mut buf)
            .expect("name composition into a growable buffer cannot fail");
        buf.freeze()
    }
}

impl fmt::Display for DsyncData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            SyncScheme::Update => "UPDATE",
            SyncScheme::Notify => "NOTIFY",
            SyncScheme::Unknown(_) => "0",
        };
        write!(f, "{} {scheme} {} {}", self.rrtype, self.port, self.target)
    }
}

/// `DELEG` rdata: `priority (u16) | target (dname) | SvcParams`.
///
/// SvcParams are kept as a raw key/value list rather than parsed into
/// per-key types; nothing in this system interprets individual SvcParam
/// keys, it only needs to preserve and re-serialize them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegData {
    pub priority: u16,
    pub target: StoredName,
    pub params: Vec<(u16, Bytes)>,
}

impl DelegData {
    pub fn parse(mut data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < 2 {
            return Err(ParseError::ShortInput);
        }
        let priority = data.get_u16();
        // The target name is length-prefix-free wire-form DNS name; since
        // we don't compress DELEG rdata, find its end by parsing labels.
        let name_len = domain_name_wire_len(data)?;
        let target = StoredName::from_octets(Bytes::copy_from_slice(&data[..name_len]))
            .map_err(|_| ParseError::form_error("invalid DELEG target name"))?;
        data.advance(name_len);

        let mut params = Vec::new();
        while !data.is_empty() {
            if data.len() < 4 {
                return Err(ParseError::ShortInput);
            }
            let key = data.get_u16();
            let len = data.get_u16() as usize;
            if data.len() < len {
                return Err(ParseError::ShortInput);
            }
            let value = Bytes::copy_from_slice(&data[..len]);
            data.advance(len);
            params.push((key, value));
        }

        Ok(Self {
            priority,
            target,
            params,
        })
    }

    pub fn wire_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u16(self.priority);
        self.target
            .compose(&mut buf)
            .expect("name composition into a growable buffer cannot fail");
        for (key, value) in &self.params {
            buf.put_u16(*key);
            buf.put_u16(value.len() as u16);
            buf.put_slice(value);
        }
        buf.freeze()
    }
}

impl fmt::Display for DelegData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.priority, self.target)?;
        for (key, value) in &self.params {
            write!(f, " key{key}={}", hex(value))?;
        }
        Ok(())
    }
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

/// Scan a wire-format DNS name out of `data` and return its length in
/// octets (uncompressed; DELEG rdata does not use name compression).
fn domain_name_wire_len(data: &[u8]) -> Result<usize, ParseError> {
    let mut pos = 0;
    loop {
        if pos >= data.len() {
            return Err(ParseError::ShortInput);
        }
        let len = data[pos] as usize;
        if len == 0 {
            return Ok(pos + 1);
        }
        if len & 0xc0 != 0 {
            return Err(ParseError::form_error("name compression is not allowed here"));
        }
        pos += 1 + len;
    }
}
