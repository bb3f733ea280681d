use std::process::ExitCode;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;
use clap::Parser;
use domain::base::iana::Rtype;
use tokio::sync::mpsc;

use tdnsd::center::{self, Center, State};
use tdnsd::comms::ApplicationCommand;
use tdnsd::config::Config;
use tdnsd::error::Error;
use tdnsd::keystore::{Db, DnssecKeyStore, Sig0KeyStore, Sig0TrustStore};
use tdnsd::log::Logger;
use tdnsd::manager;
use tdnsd::zoneload;

use tdns_cfg::zones::{KeyUploadSpec, PolicyKindSpec, ResolvedZone, StoreSpec, ZoneTypeSpec};
use tdns_cfg::UpdatePolicySpec;
use tdns_zonedata::policy::{KeyUploadPolicy, PolicyKind, UpdatePolicy};
use tdns_zonedata::{StoredName, Zone, ZoneKind, ZoneOptions, ZoneStore, ZoneStoreKind};

/// TDNS: an authoritative DNS name server with delegation-synchronization
/// agent functions.
#[derive(Parser, Debug)]
#[command(name = "tdnsd", version)]
struct Args {
    /// Path to the daemon configuration document.
    config: Utf8PathBuf,

    /// Parse and validate the configuration, then exit.
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let logger = Logger::launch("info");

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("tdnsd couldn't be configured: {err}");
            return ExitCode::FAILURE;
        }
    };

    if args.check_config {
        println!("configuration OK");
        return ExitCode::SUCCESS;
    }

    if let Err(err) = logger.set_level(config.daemon.log_level.as_str()) {
        eprintln!("invalid log level: {err}");
    }

    let (app_cmd_tx, app_cmd_rx) = mpsc::unbounded_channel();
    let center = match build_center(config, logger, app_cmd_tx) {
        Ok(center) => Arc::new(center),
        Err(err) => {
            tracing::error!("tdnsd couldn't start: {err}");
            return ExitCode::FAILURE;
        }
    };

    run(center, app_cmd_rx).await
}

/// Build every piece of shared state a unit needs: the keystores and the
/// zone store (loading each primary zone's file up front).
fn build_center(
    config: Config,
    logger: &'static Logger,
    app_cmd_tx: mpsc::UnboundedSender<(String, ApplicationCommand)>,
) -> Result<Center, Error> {
    let db = Arc::new(Db::open(&config.daemon.database)?);
    let sig0_keys = Sig0KeyStore::new(db.clone());
    let sig0_trust = Sig0TrustStore::new(db.clone());
    let dnssec_keys = DnssecKeyStore::new(db.clone());

    let mut zones = ZoneStore::new();
    for resolved in &config.zones {
        zones.insert(Arc::new(build_zone(resolved)?));
    }

    Ok(Center {
        state: Mutex::new(State { zones }),
        config,
        logger,
        sig0_keys,
        sig0_trust,
        dnssec_keys,
        app_cmd_tx,
    })
}

/// Turn one resolved zone-config entry into a `Zone`, loading its zone
/// file up front for primaries (spec §4.3 "Primary from file"; secondary
/// content is filled in by the Refresh Engine's first tick).
fn build_zone(resolved: &ResolvedZone) -> Result<Zone, Error> {
    let name = StoredName::from_str(&resolved.name)
        .map_err(|err| Error::Configuration(format!("zone '{}' has an invalid name: {err}", resolved.name)))?;

    let mut options = ZoneOptions::default();
    for option in &resolved.options {
        options.set_by_name(option);
    }
    let fold_case = options.fold_case;

    let store_kind = match resolved.store {
        StoreSpec::Map => ZoneStoreKind::Map,
        StoreSpec::Slice => ZoneStoreKind::Slice,
        StoreSpec::XfrOnly => ZoneStoreKind::XfrOnly,
    };

    let kind = match resolved.kind {
        ZoneTypeSpec::Primary => {
            let source_file = resolved.zonefile.as_ref().ok_or_else(|| {
                Error::Configuration(format!("primary zone '{}' has no zonefile configured", resolved.name))
            })?;
            ZoneKind::Primary { source_file: source_file.as_str().into() }
        }
        ZoneTypeSpec::Secondary => {
            let upstream = resolved.primary.ok_or_else(|| {
                Error::Configuration(format!("secondary zone '{}' has no primary configured", resolved.name))
            })?;
            ZoneKind::Secondary { upstream }
        }
    };

    let mut zone = Zone::new(name.clone(), kind.clone(), store_kind, options);
    zone.downstream_notify = resolved.notify.clone();
    zone.dnssec_policy = resolved.dnssec_policy.as_deref().map(Into::into);
    zone.update_policy = resolved
        .updatepolicy
        .as_ref()
        .map(resolve_update_policy)
        .transpose()?;

    if let ZoneKind::Primary { source_file } = &kind {
        let path = Utf8PathBuf::from(&**source_file);
        let parsed = zoneload::load(&name, &path, fold_case)?;
        let mut state = zone.state.lock().unwrap();
        state.index.replace_all(store_kind, parsed.owners);
        state.serial = parsed.serial;
    }

    Ok(zone)
}

fn resolve_update_policy(spec: &UpdatePolicySpec) -> Result<UpdatePolicy, Error> {
    let kind = match spec.kind {
        PolicyKindSpec::SelfOnly => PolicyKind::SelfOnly,
        PolicyKindSpec::SelfSub => PolicyKind::SelfSub,
    };
    let keyupload = match spec.keyupload {
        KeyUploadSpec::None => KeyUploadPolicy::None,
        KeyUploadSpec::Unvalidated => KeyUploadPolicy::Unvalidated,
    };
    let permitted_rrtypes: Vec<Rtype> = spec
        .rrtypes
        .iter()
        .map(|name| tdns_cfg::parse_rtype(name))
        .collect::<Result<_, _>>()
        .map_err(|err| Error::Configuration(err.to_string()))?;
    Ok(UpdatePolicy { kind, permitted_rrtypes, keyupload })
}

/// Spawn every unit and run until a termination signal arrives, then
/// shut everything down cleanly (spec §6 "Signals").
async fn run(center: Arc<Center>, mut app_cmd_rx: mpsc::UnboundedReceiver<(String, ApplicationCommand)>) -> ExitCode {
    let (unit_txs, unit_handles) = match manager::spawn(&center).await {
        Ok(units) => units,
        Err(_) => {
            tracing::error!("failed to start all units");
            return ExitCode::FAILURE;
        }
    };

    #[cfg(unix)]
    let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        .expect("failed to install SIGHUP handler");
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");

    let exit = loop {
        #[cfg(unix)]
        {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    if res.is_err() {
                        tracing::error!("failed to listen for SIGINT");
                        break ExitCode::FAILURE;
                    }
                    tracing::info!("received SIGINT, shutting down");
                    break ExitCode::SUCCESS;
                }
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, shutting down");
                    break ExitCode::SUCCESS;
                }
                _ = sighup.recv() => {
                    tracing::info!("received SIGHUP, reloading zone config");
                    reload_zones(&center);
                }
                () = manager::forward_app_cmds(&mut app_cmd_rx, &unit_txs) => {}
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    if res.is_err() {
                        tracing::error!("failed to listen for SIGINT");
                        break ExitCode::FAILURE;
                    }
                    break ExitCode::SUCCESS;
                }
                () = manager::forward_app_cmds(&mut app_cmd_rx, &unit_txs) => {}
            }
        }
    };

    manager::shutdown(unit_txs, unit_handles).await;
    exit
}

/// `SIGHUP`: re-parse the zones config and force a refresh of every
/// zone (spec §6). Newly added zones are installed; zones removed from
/// the config are left running until an operator removes them
/// explicitly (no implicit deletion of live state on reload).
fn reload_zones(center: &Arc<Center>) {
    let mut config = center.config.clone();
    if let Err(err) = config.reload_zones() {
        tracing::error!(%err, "failed to reload zones config, keeping previous zone set");
        return;
    }
    for resolved in &config.zones {
        let Ok(name) = StoredName::from_str(&resolved.name) else {
            tracing::error!(zone = %resolved.name, "skipping zone with an invalid name on reload");
            continue;
        };
        if center::get_zone(center, &name).is_none() {
            match build_zone(resolved) {
                Ok(zone) => {
                    let _ = center::add_zone(center, Arc::new(zone));
                }
                Err(err) => tracing::error!(zone = %resolved.name, %err, "failed to load new zone on reload"),
            }
        }
        center::dispatch(center, "RE", ApplicationCommand::RefreshZone { zone: name });
    }
}
