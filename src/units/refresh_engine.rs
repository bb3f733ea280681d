//! Refresh Engine (spec §4.3): keeps every zone's content up to date,
//! either by re-parsing its zone file or by SOA-query-then-AXFR against
//! an upstream primary, on a per-zone tick.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use domain::base::iana::{Class, Rtype};
use domain::base::{Message, MessageBuilder, Serial};
use domain::net::client::protocol::UdpConnect;
use domain::net::client::request::{
    RequestMessage, RequestMessageMulti, SendRequest, SendRequestMulti,
};
use domain::net::client::{dgram, stream};
use domain::net::xfr::protocol::XfrResponseInterpreter;
use domain::rdata::ZoneRecordData;
use domain::zonetree::types::ZoneUpdate;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use tdns_zonedata::zone::{ZoneError, ZoneKind};
use tdns_zonedata::{OwnerName, RrData, Rrset, StoredName, Zone};

use crate::center;
use crate::center::Center;
use crate::comms::{ApplicationCommand, Terminated};
use crate::log::TAG_REFRESH;
use crate::zoneload;

const TICK: Duration = Duration::from_secs(1);
/// A primary zone with no explicit refresh interval is re-read at this
/// cadence (spec §4.3 names no default; this mirrors the SOA default
/// refresh used across the pack's zone examples).
const DEFAULT_REFRESH_SECS: u32 = 3600;

/// Per-zone refresh bookkeeping (spec §4.3 `RefreshCounter`).
struct RefreshCounter {
    /// The interval, in seconds, between refreshes once steady-state.
    soa_refresh: u32,
    /// Seconds remaining until the next refresh attempt.
    cur_refresh: u32,
}

impl RefreshCounter {
    fn new(refresh: u32) -> Self {
        Self {
            soa_refresh: refresh,
            cur_refresh: 0,
        }
    }
}

pub struct RefreshEngineUnit {
    pub center: Arc<Center>,
}

impl RefreshEngineUnit {
    pub async fn run(
        self,
        cmd_rx: mpsc::UnboundedReceiver<ApplicationCommand>,
        ready_tx: oneshot::Sender<bool>,
    ) -> Result<(), Terminated> {
        let engine = RefreshEngine {
            center: self.center,
            counters: Mutex::new(HashMap::new()),
        };
        ready_tx.send(true).map_err(|_| Terminated)?;
        engine.run(cmd_rx).await
    }
}

struct RefreshEngine {
    center: Arc<Center>,
    counters: Mutex<HashMap<StoredName, RefreshCounter>>,
}

impl RefreshEngine {
    async fn run(
        self,
        mut cmd_rx: mpsc::UnboundedReceiver<ApplicationCommand>,
    ) -> Result<(), Terminated> {
        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        None | Some(ApplicationCommand::Terminate) => return Err(Terminated),
                        Some(ApplicationCommand::RefreshZone { zone }) => {
                            self.force(&zone);
                        }
                        Some(ApplicationCommand::BumpSerial { zone }) => {
                            self.bump_serial(&zone);
                        }
                        Some(_) => {}
                    }
                }
            }
        }
    }

    /// Force a zone's counter to fire on the next tick (a NOTIFY-driven
    /// immediate refresh, spec §4.3 "trigger an immediate refresh").
    fn force(&self, zone: &StoredName) {
        let mut counters = self.counters.lock().unwrap();
        if let Some(counter) = counters.get_mut(zone) {
            counter.cur_refresh = 0;
        }
    }

    fn bump_serial(&self, zone: &StoredName) {
        let Some(zone) = center::get_zone(&self.center, zone) else {
            return;
        };
        if !zone.is_primary() {
            warn!(target: TAG_REFRESH, zone = %zone.name, "refusing to bump serial on a non-primary zone");
            return;
        }
        let serial = zone.bump_serial();
        info!(target: TAG_REFRESH, zone = %zone.name, %serial, "serial bumped");
        self.notify_downstreams(&zone);
    }

    async fn tick(&self) {
        let zones: Vec<Arc<Zone>> = center::zones(&self.center);
        let present: std::collections::HashSet<StoredName> =
            zones.iter().map(|z| z.name.clone()).collect();
        self.counters.lock().unwrap().retain(|name, _| present.contains(name));

        for zone in zones {
            let due = {
                let mut counters = self.counters.lock().unwrap();
                let counter = counters
                    .entry(zone.name.clone())
                    .or_insert_with(|| RefreshCounter::new(DEFAULT_REFRESH_SECS));
                if counter.cur_refresh == 0 {
                    true
                } else {
                    counter.cur_refresh -= 1;
                    false
                }
            };
            if due {
                let next = self.refresh_one(&zone).await;
                let mut counters = self.counters.lock().unwrap();
                let counter = counters
                    .entry(zone.name.clone())
                    .or_insert_with(|| RefreshCounter::new(DEFAULT_REFRESH_SECS));
                if let Some(next) = next {
                    counter.soa_refresh = next.max(1);
                }
                counter.cur_refresh = counter.soa_refresh;
            }
        }
    }

    /// Refresh one zone, returning the SOA `refresh` field to use for the
    /// next interval (when known).
    async fn refresh_one(&self, zone: &Arc<Zone>) -> Option<u32> {
        let result = match &zone.kind {
            ZoneKind::Primary { source_file } => self.refresh_primary(zone, source_file).await,
            ZoneKind::Secondary { upstream } => self.refresh_secondary(zone, *upstream).await,
        };

        let mut state = zone.state.lock().unwrap();
        match result {
            Ok(Some(refresh)) => {
                state.error = ZoneError::None;
                state.last_refresh = Some(std::time::SystemTime::now());
                state.refresh_count += 1;
                drop(state);
                self.notify_downstreams(zone);
                Some(refresh)
            }
            Ok(None) => {
                // Up to date; nothing changed.
                state.error = ZoneError::None;
                state.last_refresh = Some(std::time::SystemTime::now());
                state.refresh_count += 1;
                None
            }
            Err(RefreshFailure::Permanent(msg)) => {
                error!(target: TAG_REFRESH, zone = %zone.name, error = %msg, "permanent zone error");
                state.error = ZoneError::Permanent(msg);
                None
            }
            Err(RefreshFailure::Transient(msg)) => {
                warn!(target: TAG_REFRESH, zone = %zone.name, error = %msg, "transient refresh failure, serving stale content");
                if matches!(state.error, ZoneError::None) {
                    state.error = ZoneError::RefreshError(msg);
                }
                None
            }
        }
    }

    /// Primary from file (spec §4.3): always re-parse the whole file.
    async fn refresh_primary(
        &self,
        zone: &Arc<Zone>,
        source_file: &str,
    ) -> Result<Option<u32>, RefreshFailure> {
        let path = camino::Utf8PathBuf::from(source_file);
        let apex = zone.name.clone();
        let fold_case = zone.options.fold_case;
        let parsed = tokio::task::spawn_blocking(move || zoneload::load(&apex, &path, fold_case))
            .await
            .map_err(|err| RefreshFailure::Transient(format!("load task panicked: {err}")))?
            .map_err(|err| RefreshFailure::Permanent(err.to_string()))?;

        let reset_soa = self.center.config.daemon.service.reset_soa_serial;
        let mut owners = parsed.owners;
        let mut serial = parsed.serial;

        if reset_soa {
            if let Some(apex_owner) = owners.iter_mut().find(|o| o.name() == &zone.name) {
                if let Some(soa_rrset) = apex_owner.get_mut(Rtype::SOA) {
                    let bumped = Serial(serial.map(|s| s.0).unwrap_or(0).wrapping_add(1));
                    serial = Some(bumped);
                    rewrite_soa_serial(soa_rrset, bumped);
                }
            }
        }

        let Some(serial) = serial else {
            return Err(RefreshFailure::Permanent(
                "zone file has no SOA record".into(),
            ));
        };

        let mut state = zone.state.lock().unwrap();
        let unchanged = state.serial == Some(serial) && !matches!(state.error, ZoneError::NotYetLoaded);
        if unchanged {
            return Ok(None);
        }
        state.index.replace_all(zone.store_kind, owners);
        state.serial = Some(serial);
        state.dirty = true;
        drop(state);

        Ok(Some(DEFAULT_REFRESH_SECS))
    }

    /// Secondary from upstream (spec §4.3): query the upstream's SOA,
    /// compare serials per RFC 1982, and AXFR only when newer.
    async fn refresh_secondary(
        &self,
        zone: &Arc<Zone>,
        upstream: SocketAddr,
    ) -> Result<Option<u32>, RefreshFailure> {
        let local_serial = zone.state.lock().unwrap().serial;

        let remote_soa = query_soa(&zone.name, upstream)
            .await
            .map_err(|err| RefreshFailure::Transient(format!("SOA query to {upstream} failed: {err}")))?;

        let Some((remote_serial, refresh)) = remote_soa else {
            return Err(RefreshFailure::Transient(format!(
                "{upstream} returned no SOA for this zone"
            )));
        };

        if let Some(local) = local_serial {
            if !remote_serial.gt(&local) {
                return Ok(None);
            }
        }

        let owners = axfr(&zone.name, upstream, zone.options.fold_case)
            .await
            .map_err(|err| RefreshFailure::Transient(format!("AXFR from {upstream} failed: {err}")))?;

        let mut state = zone.state.lock().unwrap();
        state.index.replace_all(zone.store_kind, owners);
        state.serial = Some(remote_serial);
        state.dirty = true;
        drop(state);

        Ok(Some(refresh))
    }

    fn notify_downstreams(&self, zone: &Arc<Zone>) {
        if zone.downstream_notify.is_empty() {
            return;
        }
        let cmd = ApplicationCommand::Notify {
            zone: zone.name.clone(),
            rtype: Rtype::SOA,
            targets: zone.downstream_notify.clone(),
        };
        center::dispatch(&self.center, "NF", cmd);
    }
}

enum RefreshFailure {
    Transient(String),
    Permanent(String),
}

fn rewrite_soa_serial(rrset: &mut Rrset, serial: Serial) {
    let Some(RrData::Known(ZoneRecordData::Soa(soa))) = rrset.records().first().cloned() else {
        return;
    };
    let new_soa = domain::rdata::Soa::new(
        soa.mname().clone(),
        soa.rname().clone(),
        serial,
        soa.refresh(),
        soa.retry(),
        soa.expire(),
        soa.minimum(),
    );
    let ttl = rrset.ttl();
    *rrset = Rrset::new(
        Rtype::SOA,
        ttl,
        vec![RrData::Known(ZoneRecordData::Soa(new_soa))],
    );
}

/// Query `upstream` for the zone's SOA over UDP and return `(serial,
/// refresh)` when a SOA answer comes back.
async fn query_soa(
    apex: &StoredName,
    upstream: SocketAddr,
) -> Result<Option<(Serial, u32)>, String> {
    let mut builder = MessageBuilder::new_vec();
    builder.header_mut().set_rd(false);
    let mut builder = builder.question();
    builder
        .push((apex, Rtype::SOA, Class::IN))
        .map_err(|err| err.to_string())?;
    let message = builder.finish();
    let message = Message::from_octets(Bytes::from(message)).map_err(|err| err.to_string())?;

    let udp_conn = UdpConnect::new(upstream);
    let client = dgram::Connection::new(udp_conn);
    let request = RequestMessage::new(message).map_err(|err| err.to_string())?;
    let response = client
        .send_request(request)
        .get_response()
        .await
        .map_err(|err| err.to_string())?;

    for record in response.answer().map_err(|err| err.to_string())?.limit_to::<domain::rdata::Soa<StoredName>>() {
        let record = record.map_err(|err| err.to_string())?;
        let soa = record.data();
        return Ok(Some((soa.serial(), soa.refresh().as_secs() as u32)));
    }
    Ok(None)
}

/// AXFR the whole zone from `upstream` over TCP and return its owner
/// index. IXFR is never attempted (spec §9: always a full transfer).
async fn axfr(
    apex: &StoredName,
    upstream: SocketAddr,
    fold_case: bool,
) -> Result<Vec<OwnerName>, String> {
    let mut builder = MessageBuilder::new_vec();
    builder.header_mut().set_rd(false);
    let mut builder = builder.question();
    builder
        .push((apex, Rtype::AXFR, Class::IN))
        .map_err(|err| err.to_string())?;
    let message = builder.finish();
    let message = Message::from_octets(Bytes::from(message)).map_err(|err| err.to_string())?;

    let tcp_conn = TcpStream::connect(upstream)
        .await
        .map_err(|err| err.to_string())?;
    let (client, transport) =
        stream::Connection::<RequestMessage<Bytes>, RequestMessageMulti<Bytes>>::new(tcp_conn);
    tokio::task::spawn(transport.run());

    let request = RequestMessageMulti::new(message).map_err(|err| err.to_string())?;
    let mut response = SendRequestMulti::send_request(&client, request);
    let mut interpreter = XfrResponseInterpreter::new();

    let mut owners: Vec<OwnerName> = Vec::new();

    let initial = response
        .get_response()
        .await
        .map_err(|err| err.to_string())?
        .ok_or_else(|| "AXFR stream ended with no data".to_string())?;
    let mut updates = interpreter
        .interpret_response(initial)
        .map_err(|err| err.to_string())?;

    loop {
        for update in updates {
            let update = update.map_err(|err| err.to_string())?;
            match update {
                ZoneUpdate::DeleteAllRecords => {}
                ZoneUpdate::AddRecord(record) => {
                    let owner_name = if fold_case {
                        tdns_zonedata::fold(&StoredName::from(record.owner().clone()))
                    } else {
                        StoredName::from(record.owner().clone())
                    };
                    let ttl = record.ttl();
                    let zrd = record.data().clone();

                    let owner = match owners.iter_mut().find(|o| o.name() == &owner_name) {
                        Some(owner) => owner,
                        None => {
                            owners.push(OwnerName::new(owner_name));
                            owners.last_mut().unwrap()
                        }
                    };
                    match owner.get_mut(zrd.rtype()) {
                        Some(rrset) => rrset.add(RrData::Known(zrd)),
                        None => owner.put(Rrset::new(zrd.rtype(), ttl, vec![RrData::Known(zrd)])),
                    }
                }
                ZoneUpdate::Finished(_) => {}
                _ => {}
            }
        }
        if interpreter.is_finished() {
            break;
        }
        let message = response
            .get_response()
            .await
            .map_err(|err| err.to_string())?
            .ok_or_else(|| "AXFR stream ended mid-transfer".to_string())?;
        updates = interpreter
            .interpret_response(message)
            .map_err(|err| err.to_string())?;
    }

    debug!(target: TAG_REFRESH, apex = %apex, owners = owners.len(), "AXFR complete");
    Ok(owners)
}
