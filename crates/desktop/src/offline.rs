//! Connectivity tracking.

use tokio::sync::watch;

pub use crate::types::ConnectivityState;

/// Last observed connectivity, shared by the interceptor and the replay worker.
///
/// Every transition is published on a watch channel; the replay worker wakes on
/// `Offline -> Online`.
#[derive(Debug)]
pub struct Connectivity {
    tx: watch::Sender<ConnectivityState>,
}

impl Connectivity {
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    pub fn is_offline(&self) -> bool {
        self.state() == ConnectivityState::Offline
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }

    pub fn mark_online(&self) {
        self.transition(ConnectivityState::Online);
    }

    pub fn mark_offline(&self) {
        self.transition(ConnectivityState::Offline);
    }

    fn transition(&self, next: ConnectivityState) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            tracing::info!(state = ?next, "connectivity changed");
        }
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(ConnectivityState::Online)
    }
}
