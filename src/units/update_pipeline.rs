//! Dynamic Update Pipeline (spec §4.5): receive, validate, apply.
//!
//! Deliberately decoupled from the DNS listener by the queue this unit
//! drains (see [`crate::comms::ApplicationCommand::ApplyUpdate`]):
//! expensive SIG(0) validation must never stall the front-end.

use std::sync::Arc;

use bytes::BytesMut;
use domain::base::iana::{Class, Rcode, Rtype};
use domain::base::wire::Compose;
use domain::base::Ttl;
use tokio::sync::{mpsc, oneshot};

use tdns_zonedata::policy::{KeyUploadPolicy, PolicyKind};
use tdns_zonedata::zone::ZoneState;
use tdns_zonedata::{in_bailiwick, RrData, Rrset, StoredName, Zone};

use crate::center;
use crate::center::Center;
use crate::comms::{ApplicationCommand, Terminated};
use crate::keystore::truststore::TrustAnchor;
use crate::log::TAG_UPDATE;

/// One action inside an UPDATE's update section, already split into its
/// RFC 2136 CLASS semantics.
#[derive(Clone, Debug)]
pub struct UpdateAction {
    pub owner: StoredName,
    pub rtype: Rtype,
    pub class: Class,
    pub rdata: Option<RrData>,
}

impl UpdateAction {
    fn is_removal(&self) -> bool {
        matches!(self.class, Class::NONE | Class::ANY)
    }
}

/// `UpdateRequest` (spec §3): a complete UPDATE already stripped of its
/// prerequisite section and validated down to a CLASS-annotated action
/// list, plus the two trust bits the signature-verification step at the
/// front-end already computed against the Truststore.
pub struct UpdateRequest {
    pub zone: StoredName,
    pub signer: Option<StoredName>,
    pub validated: bool,
    pub trusted: bool,
    /// Set by another unit (e.g. the Delegation Sync Engine publishing a
    /// CSYNC) rather than by a signed UPDATE off the wire. Bypasses
    /// signature/policy checks once the per-action `allow-updates` /
    /// `allow-child-updates` permission check passes; it never reaches
    /// the Update Pipeline except through an internal dispatch.
    pub internal: bool,
    pub actions: Vec<UpdateAction>,
    pub reply_tx: oneshot::Sender<Rcode>,
}

impl std::fmt::Debug for UpdateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateRequest")
            .field("zone", &self.zone)
            .field("signer", &self.signer)
            .field("validated", &self.validated)
            .field("trusted", &self.trusted)
            .field("internal", &self.internal)
            .field("actions", &self.actions.len())
            .finish()
    }
}

pub struct UpdatePipelineUnit {
    pub center: Arc<Center>,
}

impl UpdatePipelineUnit {
    pub async fn run(
        self,
        mut cmd_rx: mpsc::UnboundedReceiver<ApplicationCommand>,
        ready_tx: oneshot::Sender<bool>,
    ) -> Result<(), Terminated> {
        ready_tx.send(true).map_err(|_| Terminated)?;
        loop {
            match cmd_rx.recv().await.ok_or(Terminated)? {
                ApplicationCommand::ApplyUpdate { request } => {
                    let rcode = process(&self.center, &request);
                    let _ = request.reply_tx.send(rcode);
                }
                ApplicationCommand::Terminate => return Ok(()),
                other => {
                    tracing::debug!(target: TAG_UPDATE, ?other, "ignoring command not meant for this unit");
                }
            }
        }
    }
}

/// Validate then apply one [`UpdateRequest`] against its zone, returning
/// the RCODE to reply with.
fn process(center: &Center, request: &UpdateRequest) -> Rcode {
    let Some(zone) = center::get_zone(center, &request.zone) else {
        return Rcode::REFUSED;
    };
    if zone.state.lock().unwrap().frozen {
        return Rcode::REFUSED;
    }
    match validate(center, &zone, request) {
        Ok(()) => apply(center, &zone, request),
        Err(rcode) => rcode,
    }
}

/// True if `owner` is itself an existing zone cut inside `zone` — i.e.
/// the update targets child delegation data rather than the zone's own
/// authoritative content.
fn is_child_delegation_name(center: &Center, zone: &Zone, owner: &StoredName) -> bool {
    let state = center.state.lock().unwrap();
    state
        .zones
        .find_delegation(zone, owner)
        .map(|d| &d.name == owner)
        .unwrap_or(false)
}

fn validate(center: &Center, zone: &Arc<Zone>, request: &UpdateRequest) -> Result<(), Rcode> {
    for action in &request.actions {
        let targets_child = is_child_delegation_name(center, zone, &action.owner);
        let permitted = if targets_child {
            zone.options.allow_child_updates
        } else {
            zone.options.allow_updates
        };
        if !permitted {
            return Err(Rcode::REFUSED);
        }
    }

    if request.internal {
        return Ok(());
    }

    if request.validated && request.trusted {
        return approve(zone, request);
    }

    if let Some(action) = unvalidated_key_upload(center, zone, request) {
        record_unvalidated_key(center, zone, action)?;
        return Ok(());
    }

    Err(Rcode::REFUSED)
}

/// The update is exactly one KEY-add at an existing child delegation
/// name, and the zone's policy has `keyupload = unvalidated` (spec
/// §4.5).
fn unvalidated_key_upload<'a>(
    center: &Center,
    zone: &Zone,
    request: &'a UpdateRequest,
) -> Option<&'a UpdateAction> {
    let policy = zone.update_policy.as_ref()?;
    if policy.keyupload != KeyUploadPolicy::Unvalidated {
        return None;
    }
    let [action] = request.actions.as_slice() else {
        return None;
    };
    if matches!(action.class, Class::NONE | Class::ANY) || action.rtype != Rtype::KEY {
        return None;
    }
    if !is_child_delegation_name(center, zone, &action.owner) {
        return None;
    }
    Some(action)
}

/// Store the uploaded KEY as an untrusted, unvalidated trust anchor
/// (spec §4.5: "the resulting stored key is `validated=false,
/// trusted=false` until a separate out-of-band `trust` action").
fn record_unvalidated_key(center: &Center, zone: &Zone, action: &UpdateAction) -> Result<(), Rcode> {
    let Some(rdata) = &action.rdata else {
        return Err(Rcode::FORMERR);
    };
    let RrData::Known(known) = rdata else {
        return Err(Rcode::FORMERR);
    };
    let mut buf = BytesMut::new();
    known
        .compose(&mut buf)
        .map_err(|_| Rcode::FORMERR)?;
    let keyid = keytag(&buf);

    center
        .sig0_trust
        .upsert(&TrustAnchor {
            zone: zone.name.to_string(),
            keyid,
            key_rr: rdata.to_string(),
            validated: false,
            trusted: false,
            comment: Some("unvalidated key upload".into()),
        })
        .map_err(|_| Rcode::SERVFAIL)
}

/// RFC 4034 Appendix B key tag algorithm (non algorithm-1 case), applied
/// to a KEY/DNSKEY RDATA's wire form.
fn keytag(rdata: &[u8]) -> u16 {
    let mut ac: u32 = 0;
    for (i, &byte) in rdata.iter().enumerate() {
        if i & 1 == 0 {
            ac += (byte as u32) << 8;
        } else {
            ac += byte as u32;
        }
    }
    ac += (ac >> 16) & 0xffff;
    (ac & 0xffff) as u16
}

fn approve(zone: &Zone, request: &UpdateRequest) -> Result<(), Rcode> {
    let policy = zone.update_policy.as_ref().ok_or(Rcode::REFUSED)?;
    let signer = request.signer.as_ref().ok_or(Rcode::REFUSED)?;
    for action in &request.actions {
        if !policy.permits_rtype(action.rtype) {
            return Err(Rcode::REFUSED);
        }
        let owner_ok = match policy.kind {
            PolicyKind::SelfOnly => &action.owner == signer,
            PolicyKind::SelfSub => in_bailiwick(signer, &action.owner),
        };
        if !owner_ok {
            return Err(Rcode::REFUSED);
        }
    }
    Ok(())
}

/// A record type that, when added or removed, constitutes a change to
/// delegation data and so may require `SYNC-DELEGATION` (spec §4.5).
fn is_delegation_rtype(rtype: Rtype) -> bool {
    matches!(rtype, Rtype::NS | Rtype::DS | Rtype::A | Rtype::AAAA)
}

fn apply(center: &Center, zone: &Arc<Zone>, request: &UpdateRequest) -> Rcode {
    let mut mutated = false;
    let mut delegation_touched = false;

    {
        let mut state = zone.state.lock().unwrap();
        if state.frozen {
            return Rcode::REFUSED;
        }

        // Removals first, then additions (spec §4.5).
        let mut ordered: Vec<&UpdateAction> = request.actions.iter().collect();
        ordered.sort_by_key(|a| !a.is_removal());

        for action in ordered {
            if is_delegation_rtype(action.rtype) && action.owner != zone.name {
                delegation_touched = true;
            }
            if apply_one(&mut state, action) {
                mutated = true;
            }
        }
    }

    if mutated {
        zone.bump_serial();
        notify_downstreams(center, zone);
    }
    if delegation_touched && zone.options.delegation_sync_parent {
        center::dispatch(
            center,
            "DS",
            ApplicationCommand::SyncDelegation {
                zone: zone.name.clone(),
            },
        );
    }
    Rcode::NOERROR
}

/// Apply one CLASS-annotated action to the owner index, normalizing any
/// addition to class INET / TTL 0 as it is stored (spec §4.5, so that
/// exact-RR removals later match regardless of the transient TTL an
/// UPDATE carried). Returns whether the zone's content actually changed.
fn apply_one(state: &mut ZoneState, action: &UpdateAction) -> bool {
    match action.class {
        Class::NONE => {
            let Some(rdata) = &action.rdata else {
                return false;
            };
            let Some(owner) = state.index.get_mut(&action.owner) else {
                return false;
            };
            let Some(rrset) = owner.get_mut(action.rtype) else {
                return false;
            };
            let emptied = rrset.remove_exact(rdata);
            if emptied {
                owner.remove_rrset(action.rtype);
                if owner.is_empty() {
                    state.index.remove_owner(&action.owner);
                }
            }
            true
        }
        Class::ANY => {
            let Some(owner) = state.index.get_mut(&action.owner) else {
                return false;
            };
            let removed = owner.remove_rrset(action.rtype).is_some();
            if removed && owner.is_empty() {
                state.index.remove_owner(&action.owner);
            }
            removed
        }
        _ => {
            let Some(rdata) = action.rdata.clone() else {
                return false;
            };
            let owner = state.index.get_or_insert(&action.owner);
            match owner.get_mut(action.rtype) {
                Some(rrset) => rrset.add(rdata),
                None => owner.put(Rrset::new(action.rtype, Ttl::from_secs(0), vec![rdata])),
            }
            true
        }
    }
}

fn notify_downstreams(center: &Center, zone: &Arc<Zone>) {
    if zone.downstream_notify.is_empty() {
        return;
    }
    center::dispatch(
        center,
        "NF",
        ApplicationCommand::Notify {
            zone: zone.name.clone(),
            rtype: Rtype::SOA,
            targets: zone.downstream_notify.clone(),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    use domain::rdata::{A, ZoneRecordData};
    use tdns_zonedata::zone::{ZoneKind, ZoneOptions, ZoneStoreKind};
    use tdns_zonedata::policy::UpdatePolicy;

    fn name(s: &str) -> StoredName {
        StoredName::from_str(s).unwrap()
    }

    fn a_rdata(octet: u8) -> RrData {
        RrData::Known(ZoneRecordData::A(A::new(Ipv4Addr::new(192, 0, 2, octet))))
    }

    fn test_zone() -> Arc<Zone> {
        let mut zone = Zone::new(
            name("c.test.net."),
            ZoneKind::Primary {
                source_file: "c.test.net.zone".into(),
            },
            ZoneStoreKind::Map,
            {
                let mut opts = ZoneOptions::default();
                opts.allow_updates = true;
                opts
            },
        );
        zone.update_policy = Some(UpdatePolicy {
            kind: PolicyKind::SelfSub,
            permitted_rrtypes: vec![Rtype::A],
            keyupload: KeyUploadPolicy::None,
        });
        Arc::new(zone)
    }

    #[test]
    fn add_then_remove_is_a_no_op_on_content() {
        let zone = test_zone();
        let mut state = zone.state.lock().unwrap();
        let add = UpdateAction {
            owner: name("host.c.test.net."),
            rtype: Rtype::A,
            class: Class::IN,
            rdata: Some(a_rdata(2)),
        };
        let remove = UpdateAction {
            owner: name("host.c.test.net."),
            rtype: Rtype::A,
            class: Class::NONE,
            rdata: Some(a_rdata(2)),
        };
        assert!(apply_one(&mut state, &add));
        assert!(apply_one(&mut state, &remove));
        assert!(state.index.get(&name("host.c.test.net.")).is_none());
    }

    #[test]
    fn self_sub_policy_accepts_in_bailiwick_owner() {
        let zone = test_zone();
        let request = UpdateRequest {
            zone: zone.name.clone(),
            signer: Some(name("c.test.net.")),
            validated: true,
            trusted: true,
            internal: false,
            actions: vec![UpdateAction {
                owner: name("host.c.test.net."),
                rtype: Rtype::A,
                class: Class::IN,
                rdata: Some(a_rdata(2)),
            }],
            reply_tx: oneshot::channel().0,
        };
        assert!(approve(&zone, &request).is_ok());
    }

    #[test]
    fn self_only_policy_rejects_non_signer_owner() {
        let zone = test_zone();
        let mut zone = Arc::try_unwrap(zone).unwrap();
        zone.update_policy.as_mut().unwrap().kind = PolicyKind::SelfOnly;
        let zone = Arc::new(zone);
        let request = UpdateRequest {
            zone: zone.name.clone(),
            signer: Some(name("c.test.net.")),
            validated: true,
            trusted: true,
            internal: false,
            actions: vec![UpdateAction {
                owner: name("host.c.test.net."),
                rtype: Rtype::A,
                class: Class::IN,
                rdata: Some(a_rdata(2)),
            }],
            reply_tx: oneshot::channel().0,
        };
        assert!(approve(&zone, &request).is_err());
    }

    #[test]
    fn keytag_is_stable_for_same_input() {
        assert_eq!(keytag(&[1, 2, 3, 4]), keytag(&[1, 2, 3, 4]));
    }
}
