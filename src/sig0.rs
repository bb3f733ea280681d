//! SIG(0) (RFC 2931) transaction signatures for outbound messages: the
//! Delegation Sync Engine's signed UPDATE to a parent (spec §4.6).
//!
//! Only Ed25519 (algorithm 15) keys are supported; see DESIGN.md. DNS
//! message signing (as opposed to zone RRSIG signing, which `domain`
//! covers directly) has no corpus precedent here, so the SIG RR is
//! composed by hand the same way [`tdns_zonedata::rrdata`] composes the
//! experimental rrtypes it carries.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use domain::base::wire::Compose;
use domain::base::Message;
use domain::rdata::UnknownRecordData;
use ring::signature::{Ed25519KeyPair, KeyPair as _, UnparsedPublicKey, ED25519};

use tdns_zonedata::StoredName;

use crate::error::Error;
use crate::keystore::sig0::Sig0Key;

const SIG_RTYPE: u16 = 24;
const CLASS_ANY: u16 = 255;
const ED25519_ALGORITHM: u8 = 15;
/// Ed25519 signatures are a fixed 64 bytes (RFC 8032); the only
/// algorithm this system signs or verifies (see DESIGN.md).
const ED25519_SIGNATURE_LEN: usize = 64;

/// How long a freshly computed SIG(0) covers before a recipient should
/// consider it stale. RFC 2931 does not fix a figure; this mirrors the
/// short transaction window other SIG(0) deployments use.
const VALIDITY_SECS: u32 = 300;

/// Append a SIG(0) RR covering `message` (a complete, already-composed
/// DNS message with its header counts set) to the additional section,
/// signing with `key`'s private key, and return the signed wire image.
pub fn sign(message: &[u8], key: &Sig0Key, signer_name: &StoredName) -> Result<Bytes, Error> {
    if key.algorithm != "ED25519" {
        return Err(Error::Configuration(format!(
            "unsupported SIG(0) algorithm '{}' (only ED25519 is supported)",
            key.algorithm
        )));
    }
    let keypair = Ed25519KeyPair::from_pkcs8(&key.private_key)
        .map_err(|_| Error::Invariant("malformed SIG(0) Ed25519 private key".into()))?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32;
    let inception = now;
    let expiration = now.wrapping_add(VALIDITY_SECS);

    // RFC 2931 §3: the SIG RDATA fields preceding the signature are
    // themselves covered by it, prepended to the unsigned message.
    let mut to_sign = BytesMut::new();
    compose_sig_fields(&mut to_sign, expiration, inception, key.keyid, signer_name)?;
    to_sign.extend_from_slice(message);
    let signature = keypair.sign(&to_sign);

    let mut rdata = BytesMut::new();
    compose_sig_fields(&mut rdata, expiration, inception, key.keyid, signer_name)?;
    rdata.extend_from_slice(signature.as_ref());

    let mut out = BytesMut::with_capacity(message.len() + rdata.len() + 11);
    out.extend_from_slice(message);
    out.put_u8(0); // SIG(0) owner is the root name (RFC 2931 §3.1).
    out.put_u16(SIG_RTYPE);
    out.put_u16(CLASS_ANY);
    out.put_u32(0); // TTL 0.
    out.put_u16(rdata.len() as u16);
    out.extend_from_slice(&rdata);

    bump_arcount(&mut out);
    Ok(out.freeze())
}

fn compose_sig_fields(
    buf: &mut BytesMut,
    expiration: u32,
    inception: u32,
    key_tag: u16,
    signer_name: &StoredName,
) -> Result<(), Error> {
    buf.put_u16(0); // type covered: 0, meta-RR (RFC 2931 §3).
    buf.put_u8(ED25519_ALGORITHM);
    buf.put_u8(0); // labels: unused for a message SIG.
    buf.put_u32(0); // original TTL: unused for a message SIG.
    buf.put_u32(expiration);
    buf.put_u32(inception);
    buf.put_u16(key_tag);
    signer_name
        .compose(buf)
        .map_err(|err| Error::Invariant(format!("cannot compose SIG(0) signer name: {err}")))
}

fn bump_arcount(message: &mut BytesMut) {
    let arcount = u16::from_be_bytes([message[10], message[11]]);
    let bumped = (arcount + 1).to_be_bytes();
    message[10] = bumped[0];
    message[11] = bumped[1];
}

fn decrement_arcount(message: &mut [u8]) {
    let arcount = u16::from_be_bytes([message[10], message[11]]);
    let decremented = (arcount - 1).to_be_bytes();
    message[10] = decremented[0];
    message[11] = decremented[1];
}

/// The signer identified by a verified SIG(0) record.
pub struct Sig0Info {
    pub signer_name: StoredName,
    pub keyid: u16,
}

/// The fields of an inbound message's trailing SIG(0) record, plus
/// enough of the surrounding message to reconstruct what was signed.
struct ParsedSig {
    expiration: u32,
    inception: u32,
    keyid: u16,
    signer_name: StoredName,
    signature: Bytes,
    /// The message with the SIG RR itself removed and ARCOUNT
    /// decremented, i.e. exactly what [`sign`] was given to sign.
    unsigned_message: Vec<u8>,
}

/// Look up the trailing SIG(0) record's key tag only, without checking
/// the signature — enough to pick which trust anchor's public key to
/// verify against.
pub fn peek_keyid(message: &[u8]) -> Result<u16, Error> {
    parse_sig(message).map(|sig| sig.keyid)
}

/// Verify the trailing SIG(0) record of an inbound message (RFC 2931)
/// against `public_key`, a raw Ed25519 public key.
///
/// `message` is the complete received wire image, SIG RR included. The
/// SIG RR's rdata is read back the same way [`crate::units::authquery::lookup_dsync`]
/// reads DSYNC rdata: generically, via [`UnknownRecordData`], since the
/// message parser does not need type-specific logic to find an RR's
/// boundary. The `to_sign` bytes are reconstructed exactly as [`sign`]
/// produced them, and checked with `ring`.
pub fn verify(message: &[u8], public_key: &[u8]) -> Result<Sig0Info, Error> {
    let sig = parse_sig(message)?;

    let mut to_verify = BytesMut::new();
    compose_sig_fields(&mut to_verify, sig.expiration, sig.inception, sig.keyid, &sig.signer_name)?;
    to_verify.extend_from_slice(&sig.unsigned_message);

    UnparsedPublicKey::new(&ED25519, public_key)
        .verify(&to_verify, &sig.signature)
        .map_err(|_| Error::Protocol("SIG(0) signature does not verify".into()))?;

    Ok(Sig0Info {
        signer_name: sig.signer_name,
        keyid: sig.keyid,
    })
}

fn parse_sig(message: &[u8]) -> Result<ParsedSig, Error> {
    let parsed = Message::from_octets(message).map_err(|err| Error::Protocol(format!("malformed message: {err}")))?;
    let additional = parsed.additional().map_err(|err| Error::Protocol(err.to_string()))?;

    let mut sig_rdata: Option<Bytes> = None;
    for record in additional.limit_to::<UnknownRecordData<Bytes>>() {
        let record = record.map_err(|err| Error::Protocol(err.to_string()))?;
        if record.data().rtype() == domain::base::iana::Rtype::from_int(SIG_RTYPE) {
            sig_rdata = Some(record.data().data().clone());
        }
    }
    let rdata = sig_rdata.ok_or_else(|| Error::Protocol("no SIG(0) record present".into()))?;

    if rdata.len() < 18 + ED25519_SIGNATURE_LEN + 1 {
        return Err(Error::Protocol("SIG(0) rdata too short".into()));
    }

    let mut fields = rdata.clone();
    let _type_covered = fields.get_u16();
    let algorithm = fields.get_u8();
    if algorithm != ED25519_ALGORITHM {
        return Err(Error::Protocol(format!(
            "unsupported SIG(0) algorithm {algorithm} (only ED25519 is supported)"
        )));
    }
    let _labels = fields.get_u8();
    let _original_ttl = fields.get_u32();
    let expiration = fields.get_u32();
    let inception = fields.get_u32();
    let keyid = fields.get_u16();

    let name_and_sig = fields;
    if name_and_sig.len() < ED25519_SIGNATURE_LEN {
        return Err(Error::Protocol("SIG(0) rdata too short for a signature".into()));
    }
    let name_len = wire_name_len(&name_and_sig[..name_and_sig.len() - ED25519_SIGNATURE_LEN])?;
    if name_len != name_and_sig.len() - ED25519_SIGNATURE_LEN {
        return Err(Error::Protocol("trailing bytes after SIG(0) signer name".into()));
    }
    let signer_name = StoredName::from_octets(name_and_sig.slice(..name_len))
        .map_err(|_| Error::Protocol("invalid SIG(0) signer name".into()))?;
    let signature = name_and_sig.slice(name_len..);

    // The RR this rdata belongs to: root owner + type + class + ttl +
    // rdlength, mirroring the layout `sign` appends.
    let sig_rr_len = 11 + rdata.len();
    if message.len() < sig_rr_len {
        return Err(Error::Protocol("message shorter than its own SIG(0) record".into()));
    }
    let mut unsigned_message = message[..message.len() - sig_rr_len].to_vec();
    decrement_arcount(&mut unsigned_message);

    Ok(ParsedSig {
        expiration,
        inception,
        keyid,
        signer_name,
        signature,
        unsigned_message,
    })
}

/// Scan a wire-format DNS name out of `data` (no compression) and
/// return its length in octets.
fn wire_name_len(data: &[u8]) -> Result<usize, Error> {
    let mut pos = 0;
    loop {
        if pos >= data.len() {
            return Err(Error::Protocol("truncated SIG(0) signer name".into()));
        }
        let len = data[pos] as usize;
        if len == 0 {
            return Ok(pos + 1);
        }
        if len & 0xc0 != 0 {
            return Err(Error::Protocol("compressed SIG(0) signer name is not allowed".into()));
        }
        pos += 1 + len;
    }
}

/// Decode the base64 public-key field out of a stored trust anchor's
/// KEY-RR presentation string (`"<flags> <protocol> <algorithm>
/// <base64>"`, RFC 2535 §3.1).
pub fn decode_public_key(key_rr: &str) -> Result<Vec<u8>, Error> {
    let b64 = key_rr
        .split_whitespace()
        .nth(3)
        .ok_or_else(|| Error::Invariant("trust anchor key_rr is missing its key field".into()))?;
    base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|err| Error::Invariant(format!("trust anchor key_rr is not valid base64: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::KeyState;
    use std::str::FromStr;

    fn test_key() -> Sig0Key {
        // A valid PKCS#8 v2 Ed25519 document generated once for this
        // test fixture; ring only accepts this exact encoding.
        let pkcs8 = ring::signature::Ed25519KeyPair::generate_pkcs8(
            &ring::rand::SystemRandom::new(),
        )
        .unwrap();
        Sig0Key {
            zone: "c.test.net.".into(),
            keyid: 12345,
            algorithm: "ED25519".into(),
            private_key: pkcs8.as_ref().to_vec(),
            public_key: "KEY ...".into(),
            state: KeyState::Active,
            comment: None,
        }
    }

    #[test]
    fn sign_appends_one_rr_and_bumps_arcount() {
        let mut header = vec![0u8; 12];
        header[11] = 1; // qdcount, not arcount, to prove bump targets arcount
        let key = test_key();
        let signer = StoredName::from_str("c.test.net.").unwrap();
        let signed = sign(&header, &key, &signer).unwrap();
        assert!(signed.len() > header.len());
        let arcount = u16::from_be_bytes([signed[10], signed[11]]);
        assert_eq!(arcount, 1);
    }

    #[test]
    fn rejects_non_ed25519_algorithm() {
        let mut key = test_key();
        key.algorithm = "RSASHA256".into();
        let signer = StoredName::from_str("c.test.net.").unwrap();
        assert!(sign(&[0u8; 12], &key, &signer).is_err());
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let key = test_key();
        let keypair = Ed25519KeyPair::from_pkcs8(&key.private_key).unwrap();
        let public_key = keypair.public_key().as_ref().to_vec();
        let signer = StoredName::from_str("c.test.net.").unwrap();
        let header = vec![0u8; 12];

        let signed = sign(&header, &key, &signer).unwrap();
        let info = verify(&signed, &public_key).unwrap();

        assert_eq!(info.keyid, key.keyid);
        assert_eq!(info.signer_name, signer);
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let key = test_key();
        let keypair = Ed25519KeyPair::from_pkcs8(&key.private_key).unwrap();
        let public_key = keypair.public_key().as_ref().to_vec();
        let signer = StoredName::from_str("c.test.net.").unwrap();
        let header = vec![0u8; 12];

        let mut signed = sign(&header, &key, &signer).unwrap().to_vec();
        signed[3] ^= 0xff; // flip a header bit covered by the signature
        assert!(verify(&signed, &public_key).is_err());
    }

    #[test]
    fn verify_rejects_wrong_public_key() {
        let key = test_key();
        let other_keypair = Ed25519KeyPair::generate_pkcs8(&ring::rand::SystemRandom::new()).unwrap();
        let other_keypair = Ed25519KeyPair::from_pkcs8(other_keypair.as_ref()).unwrap();
        let wrong_public_key = other_keypair.public_key().as_ref().to_vec();
        let signer = StoredName::from_str("c.test.net.").unwrap();
        let header = vec![0u8; 12];

        let signed = sign(&header, &key, &signer).unwrap();
        assert!(verify(&signed, &wrong_public_key).is_err());
    }

    #[test]
    fn peek_keyid_matches_signed_keyid() {
        let key = test_key();
        let signer = StoredName::from_str("c.test.net.").unwrap();
        let header = vec![0u8; 12];

        let signed = sign(&header, &key, &signer).unwrap();
        assert_eq!(peek_keyid(&signed).unwrap(), key.keyid);
    }
}
