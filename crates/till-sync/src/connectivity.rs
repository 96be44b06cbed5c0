//! # Connectivity Gate
//!
//! Single source of truth for "are we online?". Connectivity is probed, not
//! assumed: a positive answer requires an actual round-trip to the remote's
//! health endpoint within a bounded timeout. A manual force-offline switch
//! overrides everything, which is how cashiers keep the till responsive on
//! flaky links.
//!
//! ## State Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Connectivity Gate                                 │
//! │                                                                         │
//! │   forced_offline == true ──────────────────────────► OFFLINE (always)  │
//! │                                                                         │
//! │   otherwise: probe /health with probe_timeout                          │
//! │       reply in time  ──► ONLINE                                        │
//! │       error/timeout  ──► OFFLINE                                       │
//! │                                                                         │
//! │   refresh() compares against the last published value and reports      │
//! │   the EDGE (CameOnline / WentOffline) exactly once per flip - the      │
//! │   coordinator drains on CameOnline.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::remote::RemoteClient;

/// The result of re-evaluating connectivity against the last published value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Offline → online edge. Fired exactly once per recovery.
    CameOnline,
    /// Online → offline edge.
    WentOffline,
    /// No change; the payload is the current online flag.
    Unchanged(bool),
}

/// Probes the remote and publishes online/offline transitions.
pub struct ConnectivityGate {
    remote: Arc<dyn RemoteClient>,
    probe_timeout: Duration,
    forced_offline: AtomicBool,
    online_tx: watch::Sender<bool>,
}

impl ConnectivityGate {
    /// Creates a gate that starts pessimistic (offline) until the first
    /// successful probe.
    pub fn new(remote: Arc<dyn RemoteClient>, probe_timeout: Duration) -> Self {
        let (online_tx, _) = watch::channel(false);
        ConnectivityGate {
            remote,
            probe_timeout,
            forced_offline: AtomicBool::new(false),
            online_tx,
        }
    }

    /// Flips the manual offline switch.
    ///
    /// Forcing offline publishes the offline edge immediately; releasing the
    /// switch does NOT publish online - the next probe decides that.
    pub fn force_offline(&self, forced: bool) {
        let was = self.forced_offline.swap(forced, Ordering::SeqCst);
        if was != forced {
            info!(forced_offline = forced, "Manual offline switch changed");
        }
        if forced {
            self.online_tx.send_if_modified(|online| {
                if *online {
                    *online = false;
                    true
                } else {
                    false
                }
            });
        }
    }

    /// Whether the manual offline switch is set.
    pub fn is_forced_offline(&self) -> bool {
        self.forced_offline.load(Ordering::SeqCst)
    }

    /// Probes the remote now. Forced-offline short-circuits to `false`
    /// without touching the network.
    pub async fn is_online(&self) -> bool {
        if self.is_forced_offline() {
            return false;
        }
        self.probe().await
    }

    /// The most recently published value, without probing.
    pub fn last_known(&self) -> bool {
        *self.online_tx.borrow()
    }

    /// A receiver that observes every published online/offline flip.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online_tx.subscribe()
    }

    /// Probes, publishes, and reports whether an edge fired.
    pub async fn refresh(&self) -> Transition {
        let now_online = self.is_online().await;
        let changed = self.online_tx.send_if_modified(|online| {
            if *online != now_online {
                *online = now_online;
                true
            } else {
                false
            }
        });

        match (changed, now_online) {
            (true, true) => {
                info!("Connectivity restored");
                Transition::CameOnline
            }
            (true, false) => {
                info!("Connectivity lost");
                Transition::WentOffline
            }
            (false, online) => Transition::Unchanged(online),
        }
    }

    async fn probe(&self) -> bool {
        match tokio::time::timeout(self.probe_timeout, self.remote.health()).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                debug!(error = %err, "Health probe failed");
                false
            }
            Err(_) => {
                debug!(timeout = ?self.probe_timeout, "Health probe timed out");
                false
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mock::MockRemote;

    fn gate(remote: Arc<MockRemote>) -> ConnectivityGate {
        ConnectivityGate::new(remote, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_probe_reflects_remote_health() {
        let remote = Arc::new(MockRemote::online());
        let gate = gate(remote.clone());

        assert!(gate.is_online().await);

        remote.set_healthy(false);
        assert!(!gate.is_online().await);
    }

    #[tokio::test]
    async fn test_force_offline_overrides_healthy_remote() {
        let remote = Arc::new(MockRemote::online());
        let gate = gate(remote);

        gate.force_offline(true);
        assert!(!gate.is_online().await);

        gate.force_offline(false);
        assert!(gate.is_online().await);
    }

    #[tokio::test]
    async fn test_refresh_fires_edge_exactly_once() {
        let remote = Arc::new(MockRemote::offline());
        let gate = gate(remote.clone());

        // Starts offline, stays offline: no edge
        assert_eq!(gate.refresh().await, Transition::Unchanged(false));

        remote.set_healthy(true);
        assert_eq!(gate.refresh().await, Transition::CameOnline);
        // Second refresh while still online is not an edge
        assert_eq!(gate.refresh().await, Transition::Unchanged(true));

        remote.set_healthy(false);
        assert_eq!(gate.refresh().await, Transition::WentOffline);
    }

    #[tokio::test]
    async fn test_forcing_offline_publishes_edge_to_subscribers() {
        let remote = Arc::new(MockRemote::online());
        let gate = gate(remote);
        let mut rx = gate.subscribe();

        gate.refresh().await;
        assert!(*rx.borrow_and_update());

        gate.force_offline(true);
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
    }
}
