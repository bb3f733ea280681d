//! Spawning and wiring the five queue-driven units around one shared
//! [`Center`] (spec §4.3, §4.5-§4.8), and relaying application commands
//! to whichever unit they're addressed to.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use crate::center::{Center, UnitSenders};
use crate::comms::{ApplicationCommand, Terminated};
use crate::units::delegation_sync::DelegationSyncUnit;
use crate::units::notifier::NotifierUnit;
use crate::units::refresh_engine::RefreshEngineUnit;
use crate::units::transport::TransportUnit;
use crate::units::update_pipeline::UpdatePipelineUnit;

/// Every unit's join handle, keyed by its two-letter tag, so the caller
/// can notice an early exit and await clean shutdown.
pub type UnitHandles = HashMap<String, JoinHandle<Result<(), Terminated>>>;

/// Spawn every unit, wait for each to report ready, and return the
/// senders the caller forwards application commands through plus the
/// join handles it waits on at shutdown.
pub async fn spawn(center: &Arc<Center>) -> Result<(UnitSenders, UnitHandles), Terminated> {
    let mut unit_txs = UnitSenders::default();
    let mut unit_handles = UnitHandles::default();
    let mut ready_rxs = Vec::new();

    macro_rules! spawn_unit {
        ($tag:expr, $unit:expr) => {{
            info!(target: "manager", unit = $tag, "starting unit");
            let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
            let (ready_tx, ready_rx) = oneshot::channel();
            ready_rxs.push(ready_rx);
            unit_handles.insert($tag.to_string(), tokio::spawn($unit.run(cmd_rx, ready_tx)));
            unit_txs.insert($tag.to_string(), cmd_tx);
        }};
    }

    spawn_unit!("RE", RefreshEngineUnit { center: center.clone() });
    spawn_unit!("DS", DelegationSyncUnit { center: center.clone() });
    spawn_unit!("UP", UpdatePipelineUnit { center: center.clone() });
    spawn_unit!("NF", NotifierUnit { center: center.clone() });
    spawn_unit!("TF", TransportUnit { center: center.clone() });

    for ready_rx in ready_rxs {
        ready_rx.await.map_err(|_| Terminated)?;
    }

    if let Some(failed) = unit_handles.iter().find_map(|(tag, handle)| handle.is_finished().then_some(tag)) {
        tracing::error!(unit = failed, "unit terminated unexpectedly during startup");
        return Err(Terminated);
    }

    info!(target: "manager", "all units report ready");
    Ok((unit_txs, unit_handles))
}

/// Forward `(tag, command)` pairs from the daemon's single inbound
/// queue to the unit registered under `tag`. Runs for the lifetime of
/// the daemon; returns once every sender has been dropped.
pub async fn forward_app_cmds(
    rx: &mut mpsc::UnboundedReceiver<(String, ApplicationCommand)>,
    unit_txs: &UnitSenders,
) {
    while let Some((tag, cmd)) = rx.recv().await {
        match unit_txs.get(&tag) {
            Some(tx) => {
                if tx.send(cmd).is_err() {
                    tracing::warn!(unit = %tag, "unit's command channel is closed");
                }
            }
            None => tracing::debug!(unit = %tag, "no such unit"),
        }
    }
}

/// Ask every running unit to terminate, then wait for its channel to
/// close and its task to finish.
pub async fn shutdown(unit_txs: UnitSenders, unit_handles: UnitHandles) {
    for (tag, tx) in &unit_txs {
        if tx.send(ApplicationCommand::Terminate).is_err() {
            tracing::debug!(unit = %tag, "unit already gone");
        }
        tx.closed().await;
    }
    for (tag, handle) in unit_handles {
        if let Err(err) = handle.await {
            tracing::warn!(unit = %tag, %err, "unit task panicked");
        }
    }
}
