//! AuthQuery (spec §4.7): serialized, never-recursive, targeted DNS
//! lookups against a specific server — finding a parent zone, fetching
//! DSYNC/DNSKEY/DS/NS/A/AAAA. Used by the Delegation Sync Engine and the
//! signed-update path. Every query has a short timeout and a small
//! bounded retry count; this is not a general resolver.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use domain::base::iana::{Class, Rtype};
use domain::base::{Message, MessageBuilder};
use domain::net::client::protocol::UdpConnect;
use domain::net::client::request::{RequestMessage, SendRequest};
use domain::net::client::dgram;
use domain::rdata::{Aaaa, UnknownRecordData, A};

use tdns_zonedata::rrdata::DsyncData;
use tdns_zonedata::StoredName;

const TIMEOUT: Duration = Duration::from_secs(2);
const RETRIES: u32 = 2;

/// Run a single targeted query against `server`, retrying up to
/// [`RETRIES`] times on timeout.
async fn query(server: SocketAddr, qname: &StoredName, qtype: Rtype) -> Result<Message<Bytes>, String> {
    let mut builder = MessageBuilder::new_vec();
    builder.header_mut().set_rd(false);
    let mut builder = builder.question();
    builder
        .push((qname, qtype, Class::IN))
        .map_err(|err| err.to_string())?;
    let wire = builder.finish();
    let message = Message::from_octets(Bytes::from(wire)).map_err(|err| err.to_string())?;

    let mut last_err = String::new();
    for _ in 0..=RETRIES {
        let udp_conn = UdpConnect::new(server);
        let client = dgram::Connection::new(udp_conn);
        let request = RequestMessage::new(message.clone()).map_err(|err| err.to_string())?;
        match tokio::time::timeout(TIMEOUT, client.send_request(request).get_response()).await {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(err)) => last_err = err.to_string(),
            Err(_) => last_err = "query timed out".to_string(),
        }
    }
    Err(format!("query to {server} for {qname} {qtype} failed: {last_err}"))
}

/// The NS RRset (as target names) a specific server holds for `name`.
pub async fn lookup_ns(server: SocketAddr, name: &StoredName) -> Result<Vec<StoredName>, String> {
    let response = query(server, name, Rtype::NS).await?;
    let mut names = Vec::new();
    for record in response
        .answer()
        .map_err(|err| err.to_string())?
        .limit_to::<domain::rdata::Ns<StoredName>>()
    {
        let record = record.map_err(|err| err.to_string())?;
        names.push(StoredName::from(record.data().nsdname().clone()));
    }
    Ok(names)
}

/// A/AAAA glue for `name` as held by a specific server.
pub async fn lookup_glue(
    server: SocketAddr,
    name: &StoredName,
) -> Result<(Vec<std::net::Ipv4Addr>, Vec<std::net::Ipv6Addr>), String> {
    let a_response = query(server, name, Rtype::A).await?;
    let mut v4 = Vec::new();
    for record in a_response
        .answer()
        .map_err(|err| err.to_string())?
        .limit_to::<A>()
    {
        v4.push(record.map_err(|err| err.to_string())?.data().addr());
    }

    let aaaa_response = query(server, name, Rtype::AAAA).await?;
    let mut v6 = Vec::new();
    for record in aaaa_response
        .answer()
        .map_err(|err| err.to_string())?
        .limit_to::<Aaaa>()
    {
        v6.push(record.map_err(|err| err.to_string())?.data().addr());
    }
    Ok((v4, v6))
}

/// The DSYNC records published at `name` by a specific server (spec
/// §4.6 `BestSyncScheme` input). DSYNC (type 66) has no native `domain`
/// rdata type, so its payload is read back out of the generic unknown-RR
/// representation and parsed with [`DsyncData::parse`].
pub async fn lookup_dsync(server: SocketAddr, name: &StoredName) -> Result<Vec<DsyncData>, String> {
    let response = query(server, name, Rtype::from_int(tdns_zonedata::rrdata::DSYNC_RTYPE)).await?;
    let mut out = Vec::new();
    for record in response
        .answer()
        .map_err(|err| err.to_string())?
        .limit_to::<UnknownRecordData<Bytes>>()
    {
        let record = record.map_err(|err| err.to_string())?;
        let data = record.data().data();
        out.push(DsyncData::parse(data).map_err(|err| err.to_string())?);
    }
    Ok(out)
}

/// Walk up `child` label by label looking for the first server in
/// `roots` that answers authoritatively for an enclosing name's SOA;
/// returns that enclosing apex. `roots` is intentionally small (spec
/// §4.6: "walking up to a trust anchor") — this is not a full iterative
/// resolver, only a bounded search from preconfigured starting points.
pub async fn find_parent_apex(
    child: &StoredName,
    roots: &[SocketAddr],
) -> Result<(StoredName, SocketAddr), String> {
    let mut candidate = child.clone();
    loop {
        let Some(parent) = candidate.parent() else {
            return Err(format!("no parent apex found walking up from {child}"));
        };
        for &server in roots {
            if let Ok(response) = query(server, &parent, Rtype::SOA).await {
                let has_soa = response
                    .answer()
                    .ok()
                    .map(|answer| answer.limit_to::<domain::rdata::Soa<StoredName>>().count() > 0)
                    .unwrap_or(false);
                if has_soa {
                    return Ok((parent, server));
                }
            }
        }
        candidate = parent;
    }
}
