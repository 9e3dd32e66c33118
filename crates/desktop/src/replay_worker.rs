//! Background task that replays the mutation queue when connectivity returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::offline::{Connectivity, ConnectivityState};
use crate::reconcile::{Reconciler, ReplayReport};
use crate::transport::Transport;

/// Exponential backoff between failed replay windows.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: None,
        }
    }

    /// Delay before the next attempt after one more failure.
    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.initial,
            Some(d) => d.saturating_mul(2).min(self.max),
        };
        self.current = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

pub struct ReplayWorker<T> {
    reconciler: Arc<Reconciler<T>>,
    connectivity: Arc<Connectivity>,
    probe_interval: Duration,
    backoff: Backoff,
    shutdown: CancellationToken,
    reports: broadcast::Sender<ReplayReport>,
}

impl<T: Transport + 'static> ReplayWorker<T> {
    pub fn new(
        reconciler: Arc<Reconciler<T>>,
        connectivity: Arc<Connectivity>,
        probe_interval: Duration,
        backoff: Backoff,
        shutdown: CancellationToken,
    ) -> Self {
        let (reports, _) = broadcast::channel(16);
        Self {
            reconciler,
            connectivity,
            probe_interval,
            backoff,
            shutdown,
            reports,
        }
    }

    /// Reports of every replay run the worker performs.
    pub fn subscribe(&self) -> broadcast::Receiver<ReplayReport> {
        self.reports.subscribe()
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Wakes on `Offline -> Online` transitions and on every probe tick.
    /// Cancelling `shutdown` also cancels a replay in progress.
    pub async fn run(mut self) {
        tracing::info!(probe_interval = ?self.probe_interval, "replay worker started");

        let mut connectivity_rx = self.connectivity.subscribe();
        let mut probe = tokio::time::interval(self.probe_interval);
        probe.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut not_before: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                changed = connectivity_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *connectivity_rx.borrow_and_update() != ConnectivityState::Online {
                        continue;
                    }
                }
                _ = probe.tick() => {
                    if self.reconciler.transport().probe().await {
                        self.connectivity.mark_online();
                    } else {
                        self.connectivity.mark_offline();
                        continue;
                    }
                }
            }

            if not_before.is_some_and(|t| Instant::now() < t) {
                continue;
            }
            match self.reconciler.queue().is_empty().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(error = %e, "failed to read the mutation queue");
                    continue;
                }
            }

            match self.reconciler.replay(&self.shutdown.child_token()).await {
                Ok(report) => {
                    if report.failed.is_some() {
                        let delay = self.backoff.next_delay();
                        tracing::debug!(?delay, "backing off before the next replay window");
                        not_before = Some(Instant::now() + delay);
                    } else {
                        self.backoff.reset();
                        not_before = None;
                    }
                    // No subscribers is fine.
                    let _ = self.reports.send(report);
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    tracing::error!(error = %e, ?delay, "replay aborted by a local error");
                    not_before = Some(Instant::now() + delay);
                }
            }
        }

        tracing::info!("replay worker stopped");
    }
}
