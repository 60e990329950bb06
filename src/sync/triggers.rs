use std::future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Sleep, sleep};
use tracing::{debug, warn};

use crate::remote::api::RemoteApi;
use crate::storage::record_store::SecretStore;
use crate::sync::engine::SyncEngine;

/// Quiet period after the last realtime notification before a cycle runs.
/// A burst of notifications collapses into one cycle.
pub const REALTIME_DEBOUNCE: Duration = Duration::from_millis(500);

/// Change notification delivered over the server's realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteChange {
    #[serde(rename = "type")]
    pub kind: String,
    pub secret_id: String,
    pub user_id: i64,
    pub timestamp: String,
}

impl<S: SecretStore, R: RemoteApi> SyncEngine<S, R> {
    /// Records device connectivity. The trigger loop reacts only to an
    /// actual offline-to-online transition, not to repeated reports.
    pub fn set_online(&self, online: bool) {
        self.online_sender().send_if_modified(|value| {
            if *value == online {
                false
            } else {
                *value = online;
                true
            }
        });
    }

    /// Records whether the server answered its last health probe.
    pub fn set_server_reachable(&self, reachable: bool) {
        self.reachable_sender().send_if_modified(|value| {
            if *value == reachable {
                false
            } else {
                *value = reachable;
                true
            }
        });
    }

    /// Feeds a realtime notification into the debounce window.
    pub fn notify_remote_change(&self, change: RemoteChange) {
        let _ = self.realtime_tx.send(change);
    }
}

impl<S, R> SyncEngine<S, R>
where
    S: SecretStore + 'static,
    R: RemoteApi + 'static,
{
    /// Starts the trigger loop: one attempt at startup, then a cycle on
    /// every offline-to-online or unreachable-to-reachable transition, on
    /// the pending count rising above zero, and after the realtime
    /// debounce window closes. Each trigger spawns a cycle attempt; the
    /// engine's reentrancy guard collapses overlapping attempts.
    pub fn run(self: Arc<Self>) -> JoinHandle<()> {
        let taken = self
            .realtime_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut realtime_rx) = taken else {
            warn!("trigger loop already running");
            return tokio::spawn(async {});
        };

        tokio::spawn(async move {
            let mut online_rx = self.online_sender().subscribe();
            let mut reachable_rx = self.reachable_sender().subscribe();
            let mut pending_rx = self.pending_sender().subscribe();

            if let Err(err) = self.bootstrap().await {
                warn!(error = %err, "store bootstrap failed");
            }
            self.spawn_cycle();

            let mut debounce: Option<Pin<Box<Sleep>>> = None;

            loop {
                tokio::select! {
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *online_rx.borrow_and_update() {
                            debug!("connectivity regained");
                            self.spawn_cycle();
                        }
                    }
                    changed = reachable_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *reachable_rx.borrow_and_update() {
                            debug!("server reachable again");
                            self.spawn_cycle();
                        }
                    }
                    changed = pending_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *pending_rx.borrow_and_update() > 0 {
                            self.spawn_cycle();
                        }
                    }
                    event = realtime_rx.recv() => {
                        let Some(change) = event else {
                            break;
                        };
                        debug!(kind = %change.kind, secret_id = %change.secret_id, "realtime change");
                        // A fresh notification restarts the window.
                        debounce = Some(Box::pin(sleep(REALTIME_DEBOUNCE)));
                    }
                    () = async {
                        match debounce.as_mut() {
                            Some(timer) => timer.await,
                            None => future::pending().await,
                        }
                    } => {
                        debounce = None;
                        self.spawn_cycle();
                    }
                }
            }
        })
    }

    fn spawn_cycle(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            // Failures are published on the event channel and reflected
            // in the engine state.
            let _ = engine.sync().await;
        });
    }
}
