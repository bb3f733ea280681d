//! Transport Front-End (spec §4.8): UDP, TCP and DNS-over-TLS listeners,
//! CHAOS-class self-identification, and the opcode dispatch that drives
//! the Authoritative Query Engine synchronously and the Dynamic Update
//! Pipeline / Delegation Sync Engine / Notifier by queued command.
//!
//! Unlike the other units, this one owns no periodic tick: it is purely
//! reactive to inbound datagrams and connections, plus `Terminate`.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use camino::Utf8PathBuf;
use domain::base::iana::{Class, Opcode, Rcode, Rtype};
use domain::base::wire::Compose;
use domain::base::{Message, MessageBuilder, Ttl};
use domain::rdata::{Aaaa, Cname, Key, Ns, UnknownRecordData, ZoneRecordData, A};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, oneshot};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use tdns_cfg::{ChaosConfig, ListenConfig};
use tdns_zonedata::{RrData, Rrset, StoredName, Zone};

use crate::center::{self, Center};
use crate::comms::{ApplicationCommand, Terminated};
use crate::log::TAG_TRANSPORT;
use crate::sig0;
use crate::units::query_engine;
use crate::units::update_pipeline::{UpdateAction, UpdateRequest};

/// spec §4.8: "UDP receive buffer is raised to 4096".
const UDP_RECV_BUFFER: usize = 4096;
/// A UDP datagram larger than this cannot be a valid DNS message; reject
/// before even attempting to parse it.
const UDP_MAX_DATAGRAM: usize = 4096;
/// How many `(owner, Rrset)` pairs go into one streamed AXFR TCP message.
const AXFR_BATCH: usize = 50;

pub struct TransportUnit {
    pub center: Arc<Center>,
}

impl TransportUnit {
    pub async fn run(
        self,
        mut cmd_rx: mpsc::UnboundedReceiver<ApplicationCommand>,
        ready_tx: oneshot::Sender<bool>,
    ) -> Result<(), Terminated> {
        let center = self.center;
        let mut handles = Vec::new();

        for listen in &center.config.daemon.listen {
            match listen {
                ListenConfig::Udp { addr } => match spawn_udp(center.clone(), *addr) {
                    Ok(handle) => handles.push(handle),
                    Err(err) => warn!(target: TAG_TRANSPORT, %addr, error = %err, "failed to bind UDP listener"),
                },
                ListenConfig::Tcp { addr } => match spawn_tcp(center.clone(), *addr).await {
                    Ok(handle) => handles.push(handle),
                    Err(err) => warn!(target: TAG_TRANSPORT, %addr, error = %err, "failed to bind TCP listener"),
                },
                ListenConfig::Dot { addr, cert, key } => match spawn_dot(center.clone(), *addr, cert, key).await {
                    Ok(handle) => handles.push(handle),
                    Err(err) => warn!(target: TAG_TRANSPORT, %addr, error = %err, "failed to start DoT listener"),
                },
                ListenConfig::Doh { addr, .. } => {
                    warn!(target: TAG_TRANSPORT, %addr, "DoH is configured but not implemented in this build");
                }
                ListenConfig::Doq { addr, .. } => {
                    warn!(target: TAG_TRANSPORT, %addr, "DoQ is configured but not implemented in this build");
                }
            }
        }

        ready_tx.send(true).map_err(|_| Terminated)?;

        let result = loop {
            match cmd_rx.recv().await {
                None | Some(ApplicationCommand::Terminate) => break Ok(()),
                Some(other) => {
                    debug!(target: TAG_TRANSPORT, ?other, "ignoring command not meant for this unit");
                }
            }
        };

        for handle in handles {
            handle.abort();
        }
        result
    }
}

fn spawn_udp(center: Arc<Center>, addr: SocketAddr) -> std::io::Result<tokio::task::JoinHandle<()>> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;
    socket.set_nonblocking(true)?;
    socket.set_recv_buffer_size(UDP_RECV_BUFFER)?;
    socket.bind(&addr.into())?;
    let std_socket: std::net::UdpSocket = socket.into();
    let socket = UdpSocket::from_std(std_socket)?;
    let socket = Arc::new(socket);

    info!(target: TAG_TRANSPORT, %addr, "UDP listener bound");
    Ok(tokio::spawn(async move {
        let mut buf = vec![0u8; UDP_MAX_DATAGRAM];
        loop {
            let (len, peer) = match socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(err) => {
                    warn!(target: TAG_TRANSPORT, %addr, error = %err, "UDP recv error");
                    continue;
                }
            };
            let raw = Bytes::copy_from_slice(&buf[..len]);
            let center = center.clone();
            let socket = socket.clone();
            tokio::spawn(async move {
                if let Some(reply) = handle_udp_datagram(&center, &raw, peer.ip()).await {
                    if let Err(err) = socket.send_to(&reply, peer).await {
                        warn!(target: TAG_TRANSPORT, %peer, error = %err, "UDP send error");
                    }
                }
            });
        }
    }))
}

async fn spawn_tcp(center: Arc<Center>, addr: SocketAddr) -> std::io::Result<tokio::task::JoinHandle<()>> {
    let listener = TcpListener::bind(addr).await?;
    info!(target: TAG_TRANSPORT, %addr, "TCP listener bound");
    Ok(tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let center = center.clone();
                    tokio::spawn(async move {
                        if let Err(err) = serve_tcp(center, stream, peer.ip()).await {
                            debug!(target: TAG_TRANSPORT, %peer, error = %err, "TCP connection ended");
                        }
                    });
                }
                Err(err) => warn!(target: TAG_TRANSPORT, %addr, error = %err, "TCP accept error"),
            }
        }
    }))
}

async fn spawn_dot(
    center: Arc<Center>,
    addr: SocketAddr,
    cert: &Utf8PathBuf,
    key: &Utf8PathBuf,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    let acceptor = load_tls_acceptor(cert, key)?;
    let listener = TcpListener::bind(addr).await?;
    info!(target: TAG_TRANSPORT, %addr, "DoT listener bound");
    Ok(tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let center = center.clone();
                    let acceptor = acceptor.clone();
                    tokio::spawn(async move {
                        match acceptor.accept(stream).await {
                            Ok(tls_stream) => {
                                if let Err(err) = serve_tcp(center, tls_stream, peer.ip()).await {
                                    debug!(target: TAG_TRANSPORT, %peer, error = %err, "DoT connection ended");
                                }
                            }
                            Err(err) => warn!(target: TAG_TRANSPORT, %peer, error = %err, "DoT handshake failed"),
                        }
                    });
                }
                Err(err) => warn!(target: TAG_TRANSPORT, %addr, error = %err, "DoT accept error"),
            }
        }
    }))
}

fn load_tls_acceptor(cert: &Utf8PathBuf, key: &Utf8PathBuf) -> std::io::Result<TlsAcceptor> {
    let cert_bytes = std::fs::read(cert.as_std_path())?;
    let key_bytes = std::fs::read(key.as_std_path())?;

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_bytes.as_slice())
        .collect::<Result<_, _>>()
        .map_err(std::io::Error::other)?;
    let mut keys: Vec<_> = rustls_pemfile::pkcs8_private_keys(&mut key_bytes.as_slice())
        .collect::<Result<_, _>>()
        .map_err(std::io::Error::other)?;
    let key = keys
        .pop()
        .map(PrivateKeyDer::Pkcs8)
        .ok_or_else(|| std::io::Error::other("no PKCS#8 private key found in DoT key file"))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(std::io::Error::other)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

// --- Request parsing ----------------------------------------------------

/// A parsed, validated-enough-to-answer DNS request.
struct ParsedRequest {
    id: u16,
    opcode: Opcode,
    qname: StoredName,
    qtype: Rtype,
    qclass: Class,
    do_bit: bool,
}

enum ParseOutcome {
    Ok(ParsedRequest),
    /// Malformed beyond repair; `Some(id)` if at least the header's
    /// message ID could be read, so a FORMERR can echo it back.
    Formerr(Option<u16>),
}

fn parse_request(raw: &[u8]) -> ParseOutcome {
    if raw.len() < 12 {
        return ParseOutcome::Formerr(None);
    }
    let id = u16::from_be_bytes([raw[0], raw[1]]);

    let message = match Message::from_octets(raw) {
        Ok(m) => m,
        Err(_) => return ParseOutcome::Formerr(Some(id)),
    };
    let header = message.header();
    let opcode = header.opcode();

    let question = match message.sole_question() {
        Ok(q) => q,
        Err(_) => return ParseOutcome::Formerr(Some(id)),
    };
    let qname = question.qname().to_bytes();
    let qtype = question.qtype();
    let qclass = question.qclass();
    let do_bit = additional_do_bit(&message);

    ParseOutcome::Ok(ParsedRequest {
        id,
        opcode,
        qname,
        qtype,
        qclass,
        do_bit,
    })
}

/// EDNS0 DO bit (RFC 6891 §6.1): the high bit of the OPT pseudo-RR's TTL
/// field, read the same generic way [`sig0::verify`] reads a SIG RR.
fn additional_do_bit(message: &Message<&[u8]>) -> bool {
    let Ok(additional) = message.additional() else {
        return false;
    };
    for record in additional.limit_to::<UnknownRecordData<&[u8]>>() {
        let Ok(record) = record else { continue };
        if record.data().rtype() == Rtype::OPT {
            return (u32::from(record.ttl()) & 0x0000_8000) != 0;
        }
    }
    false
}

// --- Response composition ------------------------------------------------

fn header_only_response(id: u16, opcode: Opcode, rcode: Rcode) -> BytesMut {
    let mut builder = MessageBuilder::new_vec();
    {
        let header = builder.header_mut();
        header.set_id(id);
        header.set_qr(true);
        header.set_opcode(opcode);
        header.set_rcode(rcode);
    }
    let builder = builder.question();
    let finished = builder.finish();
    BytesMut::from(&finished[..])
}

fn simple_response(req: &ParsedRequest, rcode: Rcode, aa: bool) -> Result<BytesMut, String> {
    compose_response(req, rcode, aa, &[], &[], &[])
}

fn compose_response(
    req: &ParsedRequest,
    rcode: Rcode,
    aa: bool,
    answer: &[(StoredName, Rrset)],
    authority: &[(StoredName, Rrset)],
    additional: &[(StoredName, Rrset)],
) -> Result<BytesMut, String> {
    let mut builder = MessageBuilder::new_vec();
    {
        let header = builder.header_mut();
        header.set_id(req.id);
        header.set_qr(true);
        header.set_opcode(req.opcode);
        header.set_aa(aa);
        header.set_rd(false);
        header.set_ra(false);
        header.set_rcode(rcode);
    }
    let mut builder = builder.question();
    builder
        .push((&req.qname, req.qtype, req.qclass))
        .map_err(|err| err.to_string())?;
    let header_and_question = builder.finish();

    let mut message = BytesMut::with_capacity(header_and_question.len() + 256);
    message.extend_from_slice(&header_and_question);

    for (owner, rrset) in answer {
        push_rrset(&mut message, owner, rrset, 6)?;
    }
    for (owner, rrset) in authority {
        push_rrset(&mut message, owner, rrset, 8)?;
    }
    for (owner, rrset) in additional {
        push_rrset(&mut message, owner, rrset, 10)?;
    }
    Ok(message)
}

fn push_rrset(message: &mut BytesMut, owner: &StoredName, rrset: &Rrset, count_offset: usize) -> Result<(), String> {
    for rdata in rrset.records() {
        push_response_rr(message, owner, rrset.rtype(), Class::IN, rrset.ttl(), rdata, count_offset)?;
    }
    for rrsig in rrset.rrsigs() {
        push_response_rr(
            message,
            owner,
            Rtype::RRSIG,
            Class::IN,
            rrset.ttl(),
            &RrData::Known(ZoneRecordData::Rrsig(rrsig.clone())),
            count_offset,
        )?;
    }
    Ok(())
}

fn push_response_rr(
    message: &mut BytesMut,
    owner: &StoredName,
    rtype: Rtype,
    class: Class,
    ttl: Ttl,
    rdata: &RrData,
    count_offset: usize,
) -> Result<(), String> {
    owner.compose(message).map_err(|err| err.to_string())?;
    message.extend_from_slice(&rtype.to_int().to_be_bytes());
    message.extend_from_slice(&class.to_int().to_be_bytes());
    message.extend_from_slice(&(ttl.as_secs() as u32).to_be_bytes());

    let mut rdata_buf = BytesMut::new();
    compose_rdata(&mut rdata_buf, rdata)?;
    message.extend_from_slice(&(rdata_buf.len() as u16).to_be_bytes());
    message.extend_from_slice(&rdata_buf);

    bump_count(message, count_offset);
    Ok(())
}

fn compose_rdata(buf: &mut BytesMut, rdata: &RrData) -> Result<(), String> {
    match rdata {
        RrData::Known(rd) => rd.compose(buf).map_err(|err| err.to_string()),
        RrData::Dsync(d) => {
            buf.extend_from_slice(&d.wire_bytes());
            Ok(())
        }
        RrData::NotifyType(d) => {
            buf.extend_from_slice(&d.wire_bytes());
            Ok(())
        }
        RrData::Deleg(d) => {
            buf.extend_from_slice(&d.wire_bytes());
            Ok(())
        }
        RrData::Opaque { data, .. } => {
            buf.extend_from_slice(data);
            Ok(())
        }
    }
}

fn bump_count(message: &mut BytesMut, offset: usize) {
    let count = u16::from_be_bytes([message[offset], message[offset + 1]]);
    let bumped = (count + 1).to_be_bytes();
    message[offset] = bumped[0];
    message[offset + 1] = bumped[1];
}

fn error_reply(req: &ParsedRequest, rcode: Rcode, aa: bool) -> BytesMut {
    simple_response(req, rcode, aa).unwrap_or_else(|_| header_only_response(req.id, req.opcode, Rcode::SERVFAIL))
}

// --- CHAOS class ----------------------------------------------------------

fn chaos_response(req: &ParsedRequest, chaos: &ChaosConfig) -> BytesMut {
    if req.qtype != Rtype::TXT {
        return error_reply(req, Rcode::REFUSED, false);
    }
    let qname = req.qname.to_string().to_ascii_lowercase();
    let text = match qname.trim_end_matches('.') {
        "id.server" => chaos.id.as_deref(),
        "version.server" => chaos.version.as_deref(),
        "hostname.server" => chaos.hostname.as_deref(),
        "authors.server" => chaos.authors.as_deref(),
        _ => None,
    };
    let Some(text) = text else {
        return error_reply(req, Rcode::REFUSED, false);
    };

    let rrset = Rrset::new(Rtype::TXT, Ttl::from_secs(0), vec![chaos_txt_rdata(text)]);
    compose_response(req, Rcode::NOERROR, true, &[(req.qname.clone(), rrset)], &[], &[])
        .unwrap_or_else(|_| header_only_response(req.id, req.opcode, Rcode::SERVFAIL))
}

/// A single-character-string TXT rdata, built by hand via [`RrData::Opaque`]
/// rather than `domain::rdata::Txt`'s builder API (no corpus precedent
/// for it here; `Opaque` already composes raw bytes verbatim).
fn chaos_txt_rdata(text: &str) -> RrData {
    let bytes = text.as_bytes();
    let len = bytes.len().min(255) as u8;
    let mut data = BytesMut::with_capacity(1 + len as usize);
    data.extend_from_slice(&[len]);
    data.extend_from_slice(&bytes[..len as usize]);
    RrData::Opaque {
        rtype: Rtype::TXT.to_int(),
        data: data.freeze(),
    }
}

// --- QUERY -----------------------------------------------------------------

enum QueryOutcome {
    Reply(BytesMut),
    Axfr(Arc<Zone>),
}

fn resolve_query(center: &Center, req: &ParsedRequest, peer_ip: IpAddr) -> QueryOutcome {
    let state = center.state.lock().unwrap();
    let Some(found) = state.zones.find_zone(&req.qname) else {
        return QueryOutcome::Reply(error_reply(req, Rcode::REFUSED, false));
    };
    let zone = found.zone;
    let authorized_for_xfr = zone.downstream_notify.iter().any(|t| t.ip() == peer_ip);
    let store = &state.zones;

    let answer = query_engine::answer(
        store,
        &center.dnssec_keys,
        req.opcode,
        &zone,
        &req.qname,
        req.qtype,
        req.qclass,
        req.do_bit,
        authorized_for_xfr,
    );

    if answer.axfr && answer.rcode == Rcode::NOERROR {
        return QueryOutcome::Axfr(zone.clone());
    }

    match compose_response(
        req,
        answer.rcode,
        answer.aa,
        &answer.answer,
        &answer.authority,
        &answer.additional,
    ) {
        Ok(msg) => QueryOutcome::Reply(msg),
        Err(_) => QueryOutcome::Reply(header_only_response(req.id, req.opcode, Rcode::SERVFAIL)),
    }
}

async fn stream_axfr<S: AsyncWrite + Unpin>(stream: &mut S, center: &Center, zone: &Arc<Zone>, req: &ParsedRequest) -> std::io::Result<()> {
    let state = center.state.lock().unwrap();
    let store = &state.zones;
    let Some(apex_owner) = store.get_owner(zone, &zone.name) else {
        write_framed(stream, &header_only_response(req.id, req.opcode, Rcode::SERVFAIL)).await?;
        return Ok(());
    };
    let Some(soa) = apex_owner.get(Rtype::SOA) else {
        write_framed(stream, &header_only_response(req.id, req.opcode, Rcode::SERVFAIL)).await?;
        return Ok(());
    };
    let soa = soa.clone();

    let mut rest: Vec<(StoredName, Rrset)> = Vec::new();
    for name in store.get_owner_names(zone) {
        let Some(owner) = store.get_owner(zone, &name) else { continue };
        for rrset in owner.rrsets() {
            if name == zone.name && rrset.rtype() == Rtype::SOA {
                continue;
            }
            rest.push((name.clone(), rrset.clone()));
        }
    }
    drop(state);

    let mut batch = vec![(zone.name.clone(), soa.clone())];
    for pair in rest {
        batch.push(pair);
        if batch.len() >= AXFR_BATCH {
            flush_axfr_batch(stream, req, &mut batch).await?;
        }
    }
    batch.push((zone.name.clone(), soa));
    flush_axfr_batch(stream, req, &mut batch).await?;
    Ok(())
}

async fn flush_axfr_batch<S: AsyncWrite + Unpin>(
    stream: &mut S,
    req: &ParsedRequest,
    batch: &mut Vec<(StoredName, Rrset)>,
) -> std::io::Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let message = compose_response(req, Rcode::NOERROR, true, batch, &[], &[])
        .unwrap_or_else(|_| header_only_response(req.id, req.opcode, Rcode::SERVFAIL));
    write_framed(stream, &message).await?;
    batch.clear();
    Ok(())
}

// --- NOTIFY ------------------------------------------------------------

fn handle_notify(center: &Center, req: &ParsedRequest) -> BytesMut {
    if center::get_zone(center, &req.qname).is_none() {
        return error_reply(req, Rcode::REFUSED, false);
    }
    center::dispatch(
        center,
        "RE",
        ApplicationCommand::RefreshZone { zone: req.qname.clone() },
    );
    simple_response(req, Rcode::NOERROR, true).unwrap_or_else(|_| header_only_response(req.id, req.opcode, Rcode::SERVFAIL))
}

// --- UPDATE --------------------------------------------------------------

/// The outcome of checking an inbound UPDATE's trailing SIG(0) record.
/// An absent, malformed, untrusted-keyid or signature-failed SIG(0) all
/// collapse to `Absent`: the Update Pipeline's `validate()` already
/// fully decides what an unauthenticated/untrusted update is allowed to
/// do (the unvalidated-key-upload exception, else `REFUSED`), so this
/// front-end reports only the strongest truthful signer/trust state it
/// could establish rather than inventing a second policy.
enum Sig0Outcome {
    Absent,
    Verified { signer: StoredName, trusted: bool },
}

fn verify_sig0(center: &Center, raw: &[u8]) -> Sig0Outcome {
    let Ok(keyid) = sig0::peek_keyid(raw) else {
        return Sig0Outcome::Absent;
    };
    // The zone is not known yet at this point (SIG(0) covers the whole
    // message, including a section we have not parsed into a zone name);
    // the signer name carried in the SIG RR is itself the lookup key's
    // other half, so every zone with a matching keyid is tried in turn.
    let state = center.state.lock().unwrap();
    for zone in state.zones.iter() {
        let Ok(Some(anchor)) = center.sig0_trust.get(&zone.name.to_string(), keyid) else {
            continue;
        };
        let Ok(public_key) = sig0::decode_public_key(&anchor.key_rr) else {
            continue;
        };
        if let Ok(info) = sig0::verify(raw, &public_key) {
            return Sig0Outcome::Verified {
                signer: info.signer_name,
                trusted: anchor.is_usable(),
            };
        }
    }
    Sig0Outcome::Absent
}

async fn handle_update(center: &Arc<Center>, req: &ParsedRequest, raw: &[u8]) -> BytesMut {
    let message = match Message::from_octets(raw) {
        Ok(m) => m,
        Err(_) => return header_only_response(req.id, req.opcode, Rcode::FORMERR),
    };
    let actions = match parse_update_actions(&message) {
        Ok(a) => a,
        Err(rcode) => return error_reply(req, rcode, false),
    };

    let sig0 = verify_sig0(center, raw);
    let (signer, validated, trusted) = match sig0 {
        Sig0Outcome::Absent => (None, false, false),
        Sig0Outcome::Verified { signer, trusted } => (Some(signer), true, trusted),
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    let request = UpdateRequest {
        zone: req.qname.clone(),
        signer,
        validated,
        trusted,
        internal: false,
        actions,
        reply_tx,
    };
    center::dispatch(center, "UP", ApplicationCommand::ApplyUpdate { request });

    let rcode = match reply_rx.await {
        Ok(rcode) => rcode,
        Err(_) => Rcode::SERVFAIL,
    };
    error_reply(req, rcode, rcode == Rcode::NOERROR)
}

/// Split an UPDATE message's update section (RFC 2136 §2.5/§2.6) into
/// [`UpdateAction`]s. Owner/rtype/class/ttl are read generically via
/// [`UnknownRecordData`], the same way [`sig0::verify`] reads its SIG
/// RR; a handful of rtypes with a corpus-established wire shape (the
/// same set the Update Pipeline and Delegation Sync Engine already
/// construct) are decoded into typed [`RrData::Known`] values, and
/// everything else is kept as [`RrData::Opaque`] -- round-tripped
/// correctly without being interpreted, the same role it plays for the
/// MANIFEST/CHUNK family.
fn parse_update_actions(message: &Message<&[u8]>) -> Result<Vec<UpdateAction>, Rcode> {
    let authority = message.authority().map_err(|_| Rcode::FORMERR)?;
    let mut actions = Vec::new();

    for record in authority.limit_to::<UnknownRecordData<&[u8]>>() {
        let record = record.map_err(|_| Rcode::FORMERR)?;
        let owner = record.owner().to_bytes();
        let rtype = record.data().rtype();
        let class = record.class();
        let data = record.data().data();

        let rdata = if data.is_empty() {
            None
        } else {
            Some(decode_known_rdata(rtype, data)?)
        };
        actions.push(UpdateAction { owner, rtype, class, rdata });
    }

    Ok(actions)
}

fn decode_known_rdata(rtype: Rtype, data: &[u8]) -> Result<RrData, Rcode> {
    let fallback = || RrData::Opaque {
        rtype: rtype.to_int(),
        data: Bytes::copy_from_slice(data),
    };

    let decoded = match rtype {
        Rtype::A if data.len() == 4 => {
            let addr = Ipv4Addr::new(data[0], data[1], data[2], data[3]);
            Some(RrData::Known(ZoneRecordData::A(A::new(addr))))
        }
        Rtype::AAAA if data.len() == 16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(data);
            Some(RrData::Known(ZoneRecordData::Aaaa(Aaaa::new(Ipv6Addr::from(octets)))))
        }
        Rtype::NS => wire_name(data).map(|name| RrData::Known(ZoneRecordData::Ns(Ns::new(name)))),
        Rtype::CNAME => wire_name(data).map(|name| RrData::Known(ZoneRecordData::Cname(Cname::new(name)))),
        Rtype::KEY if data.len() >= 4 => {
            // RFC 2535 §3.1: flags(2) protocol(1) algorithm(1) public key.
            let flags = u16::from_be_bytes([data[0], data[1]]);
            let protocol = data[2];
            let algorithm = data[3];
            let public_key = Bytes::copy_from_slice(&data[4..]);
            Some(RrData::Known(ZoneRecordData::Key(Key::new(flags, protocol, algorithm.into(), public_key))))
        }
        _ => None,
    };

    Ok(decoded.unwrap_or_else(fallback))
}

/// Scan an uncompressed wire-format name out of `data`, the same way
/// [`tdns_zonedata::rrdata::DsyncData::parse`] reads its target name --
/// RFC 2136 update-section rdata is not compressed.
fn wire_name(data: &[u8]) -> Option<StoredName> {
    let mut pos = 0;
    loop {
        if pos >= data.len() {
            return None;
        }
        let len = data[pos] as usize;
        if len == 0 {
            let end = pos + 1;
            return if end == data.len() {
                StoredName::from_octets(Bytes::copy_from_slice(data)).ok()
            } else {
                None
            };
        }
        if len & 0xc0 != 0 {
            return None;
        }
        pos += 1 + len;
    }
}

// --- Per-connection / per-datagram dispatch --------------------------------

enum RouteReply {
    Single(BytesMut),
    Axfr(Arc<Zone>),
}

async fn route(center: &Arc<Center>, req: &ParsedRequest, peer_ip: IpAddr, raw: &[u8], via_tcp: bool) -> RouteReply {
    if req.qclass == Class::CH {
        return RouteReply::Single(chaos_response(req, &center.config.daemon.chaos));
    }

    match req.opcode {
        Opcode::QUERY => {
            if !via_tcp && matches!(req.qtype, Rtype::AXFR | Rtype::IXFR) {
                return RouteReply::Single(error_reply(req, Rcode::REFUSED, false));
            }
            match resolve_query(center, req, peer_ip) {
                QueryOutcome::Reply(msg) => RouteReply::Single(msg),
                QueryOutcome::Axfr(zone) if via_tcp => RouteReply::Axfr(zone),
                QueryOutcome::Axfr(_) => RouteReply::Single(error_reply(req, Rcode::REFUSED, false)),
            }
        }
        Opcode::NOTIFY => RouteReply::Single(handle_notify(center, req)),
        Opcode::UPDATE => RouteReply::Single(handle_update(center, req, raw).await),
        _ => RouteReply::Single(error_reply(req, Rcode::NOTIMP, false)),
    }
}

async fn handle_udp_datagram(center: &Arc<Center>, raw: &[u8], peer_ip: IpAddr) -> Option<BytesMut> {
    match parse_request(raw) {
        ParseOutcome::Formerr(Some(id)) => Some(header_only_response(id, Opcode::QUERY, Rcode::FORMERR)),
        ParseOutcome::Formerr(None) => None,
        ParseOutcome::Ok(req) => match route(center, &req, peer_ip, raw, false).await {
            RouteReply::Single(msg) => Some(msg),
            RouteReply::Axfr(_) => unreachable!("AXFR is intercepted before reaching UDP routing"),
        },
    }
}

async fn serve_tcp<S>(center: Arc<Center>, mut stream: S, peer_ip: IpAddr) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let mut len_buf = [0u8; 2];
        match stream.read_exact(&mut len_buf).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        }
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut raw = vec![0u8; len];
        stream.read_exact(&mut raw).await?;

        match parse_request(&raw) {
            ParseOutcome::Formerr(Some(id)) => {
                write_framed(&mut stream, &header_only_response(id, Opcode::QUERY, Rcode::FORMERR)).await?;
            }
            ParseOutcome::Formerr(None) => {}
            ParseOutcome::Ok(req) => match route(&center, &req, peer_ip, &raw, true).await {
                RouteReply::Single(msg) => write_framed(&mut stream, &msg).await?,
                RouteReply::Axfr(zone) => {
                    stream_axfr(&mut stream, &center, &zone, &req).await?;
                }
            },
        }
    }
}

async fn write_framed<S: AsyncWrite + Unpin>(stream: &mut S, message: &[u8]) -> std::io::Result<()> {
    stream.write_all(&(message.len() as u16).to_be_bytes()).await?;
    stream.write_all(message).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chaos_txt_rdata_is_one_character_string() {
        let rdata = chaos_txt_rdata("tdnsd");
        let RrData::Opaque { data, .. } = rdata else {
            panic!("expected opaque rdata");
        };
        assert_eq!(data[0] as usize, data.len() - 1);
        assert_eq!(&data[1..], b"tdnsd");
    }

    #[test]
    fn wire_name_rejects_compression() {
        assert!(wire_name(&[0xc0, 0x0c]).is_none());
    }

    #[test]
    fn wire_name_accepts_root() {
        assert_eq!(wire_name(&[0]).unwrap().to_string(), ".");
    }

    #[test]
    fn decode_known_rdata_falls_back_to_opaque_for_unhandled_rtype() {
        let rdata = decode_known_rdata(Rtype::MX, &[0, 10]).unwrap();
        assert!(matches!(rdata, RrData::Opaque { .. }));
    }
}
