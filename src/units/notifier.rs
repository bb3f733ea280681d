//! Notifier (spec §4.7): a bounded, backpressuring queue of outbound
//! NOTIFY sends, one per target, with bounded retries and backoff.
//!
//! Fire-and-forget from the caller's point of view: whatever enqueued
//! the `Notify` command does not wait on the outcome. Only the final
//! success or failure of each send is logged. The queue this unit
//! drains internally is bounded (spec: "the Notifier's queue is bounded
//! and backpressures its producers"), unlike the unbounded per-unit
//! command relay every other unit shares.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use domain::base::iana::{Rcode, Rtype};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use tdns_zonedata::StoredName;

use crate::center::Center;
use crate::comms::{ApplicationCommand, Terminated};
use crate::log::TAG_NOTIFIER;
use crate::units::delegation_sync::send_notify;

const QUEUE_CAPACITY: usize = 256;
const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(500);

struct NotifyJob {
    zone: StoredName,
    rtype: Rtype,
    target: SocketAddr,
}

pub struct NotifierUnit {
    pub center: Arc<Center>,
}

impl NotifierUnit {
    pub async fn run(
        self,
        mut cmd_rx: mpsc::UnboundedReceiver<ApplicationCommand>,
        ready_tx: oneshot::Sender<bool>,
    ) -> Result<(), Terminated> {
        let (job_tx, mut job_rx) = mpsc::channel::<NotifyJob>(QUEUE_CAPACITY);

        let worker = tokio::spawn(async move {
            while let Some(job) = job_rx.recv().await {
                run_job(job).await;
            }
        });

        ready_tx.send(true).map_err(|_| Terminated)?;

        let result = loop {
            match cmd_rx.recv().await {
                None | Some(ApplicationCommand::Terminate) => break Ok(()),
                Some(ApplicationCommand::Notify { zone, rtype, targets }) => {
                    for target in targets {
                        let job = NotifyJob { zone: zone.clone(), rtype, target };
                        // A full queue stalls this loop rather than
                        // dropping the notify or growing unbounded.
                        if job_tx.send(job).await.is_err() {
                            break;
                        }
                    }
                }
                Some(_) => {}
            }
        };

        drop(job_tx);
        let _ = worker.await;
        result
    }
}

async fn run_job(job: NotifyJob) {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match send_notify(job.target, &job.zone, job.rtype).await {
            Ok(Rcode::NOERROR) => {
                info!(target: TAG_NOTIFIER, zone = %job.zone, target = %job.target, "NOTIFY acknowledged");
                return;
            }
            Ok(rcode) => {
                warn!(target: TAG_NOTIFIER, zone = %job.zone, target = %job.target, %rcode, "NOTIFY rejected");
                return;
            }
            Err(err) if attempt < MAX_ATTEMPTS => {
                warn!(target: TAG_NOTIFIER, zone = %job.zone, target = %job.target, attempt, error = %err, "NOTIFY attempt failed, retrying");
                tokio::time::sleep(backoff_duration(attempt)).await;
            }
            Err(err) => {
                warn!(target: TAG_NOTIFIER, zone = %job.zone, target = %job.target, error = %err, "NOTIFY failed, giving up");
                return;
            }
        }
    }
}

fn backoff_duration(attempt: u32) -> Duration {
    BASE_BACKOFF * 2u32.pow(attempt.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_each_attempt() {
        assert_eq!(backoff_duration(1), BASE_BACKOFF);
        assert_eq!(backoff_duration(2), BASE_BACKOFF * 2);
        assert_eq!(backoff_duration(3), BASE_BACKOFF * 4);
    }
}
