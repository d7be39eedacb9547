//! Periodic connectivity sweep across the whole fleet
//!
//! Every sweep probes each known node and persists the outcome. A failed
//! check, including a timeout or a panic, counts as offline. Events are
//! edge-triggered: a status-change event is published only when a node's
//! state actually flips, never on every tick.
//!
//! At most one sweep runs at a time. A tick that fires while the previous
//! sweep is still in flight is skipped outright, not queued.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::{stream, FutureExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::task::JoinHandle;

use common::event::FleetEvent;
use common::node::{ConnectivityState, NodeRecord};

use crate::event_bus::EventBus;
use crate::node_client::NodeProbe;
use crate::node_store::{NodeStore, NodeStoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between sweeps
    pub interval_secs: u64,
    /// Upper bound on a single node check, in seconds
    pub check_timeout_secs: u64,
    /// Nodes probed concurrently within one sweep
    pub max_concurrent_checks: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            check_timeout_secs: 10,
            max_concurrent_checks: 8,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("failed to list nodes: {0}")]
    ListNodes(#[from] NodeStoreError),
}

/// Result of a single [`HealthPoller::poll`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sweep {
    /// Another sweep was already running
    Skipped,
    Completed(SweepSummary),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub checked: usize,
    pub online: usize,
    pub offline: usize,
    /// Events published because a node changed state
    pub transitions: usize,
}

enum PollerState {
    Stopped,
    Running(JoinHandle<()>),
}

struct PollerInner {
    store: Arc<dyn NodeStore>,
    probe: Arc<dyn NodeProbe>,
    bus: EventBus,
    config: PollerConfig,
    sweeping: AtomicBool,
    state: Mutex<PollerState>,
}

impl Drop for PollerInner {
    fn drop(&mut self) {
        if let PollerState::Running(handle) = &*self.state.lock() {
            handle.abort();
        }
    }
}

/// Cheap-clone handle to the fleet health poller
#[derive(Clone)]
pub struct HealthPoller {
    inner: Arc<PollerInner>,
}

impl std::fmt::Debug for HealthPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthPoller")
            .field("config", &self.inner.config)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Clears the re-entrancy flag however the sweep ends
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum CheckOutcome {
    Online { transitioned: bool },
    Offline { transitioned: bool },
}

impl HealthPoller {
    pub fn new(
        store: Arc<dyn NodeStore>,
        probe: Arc<dyn NodeProbe>,
        bus: EventBus,
        config: PollerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                store,
                probe,
                bus,
                config,
                sweeping: AtomicBool::new(false),
                state: Mutex::new(PollerState::Stopped),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.inner.state.lock(), PollerState::Running(_))
    }

    /// Start polling: one sweep right away, then one per interval
    ///
    /// No-op if already running. The timer task only holds a weak reference,
    /// so dropping every poller handle also ends it.
    pub fn start(&self) {
        let mut state = self.inner.state.lock();
        if let PollerState::Running(_) = *state {
            tracing::debug!("health poller already running");
            return;
        }

        let period = Duration::from_secs(self.inner.config.interval_secs.max(1));
        let weak: Weak<PollerInner> = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let poller = HealthPoller { inner };
                // spawned so a slow sweep meets the re-entrancy guard on the next tick
                tokio::spawn(async move {
                    match poller.poll().await {
                        Ok(Sweep::Skipped) => {
                            tracing::debug!("previous sweep still running, skipping tick")
                        }
                        Ok(Sweep::Completed(_)) => {}
                        Err(e) => tracing::error!("health sweep aborted: {}", e),
                    }
                });
            }
        });

        tracing::info!(interval_secs = period.as_secs(), "health poller started");
        *state = PollerState::Running(handle);
    }

    /// Stop the timer; a sweep already in flight runs to completion
    ///
    /// No-op if already stopped.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if let PollerState::Running(handle) = std::mem::replace(&mut *state, PollerState::Stopped)
        {
            handle.abort();
            tracing::info!("health poller stopped");
        }
    }

    /// Run one full sweep over every known node
    pub async fn poll(&self) -> Result<Sweep, PollError> {
        if self
            .inner
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(Sweep::Skipped);
        }
        let _guard = SweepGuard(&self.inner.sweeping);

        let nodes = self.inner.store.list_nodes().await?;
        let concurrency = self.inner.config.max_concurrent_checks.max(1);
        tracing::debug!(nodes = nodes.len(), concurrency, "starting health sweep");

        let outcomes: Vec<CheckOutcome> = stream::iter(nodes)
            .map(|node| self.check_node(node))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut summary = SweepSummary {
            checked: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                CheckOutcome::Online { transitioned } => {
                    summary.online += 1;
                    summary.transitions += usize::from(transitioned);
                }
                CheckOutcome::Offline { transitioned } => {
                    summary.offline += 1;
                    summary.transitions += usize::from(transitioned);
                }
            }
        }

        tracing::info!(
            checked = summary.checked,
            online = summary.online,
            offline = summary.offline,
            transitions = summary.transitions,
            "health sweep complete"
        );
        Ok(Sweep::Completed(summary))
    }

    async fn check_node(&self, node: NodeRecord) -> CheckOutcome {
        let previous = node.status;
        let timeout = Duration::from_secs(self.inner.config.check_timeout_secs.max(1));

        let probe = AssertUnwindSafe(self.inner.probe.probe(&node)).catch_unwind();
        let reachable = match tokio::time::timeout(timeout, probe).await {
            Ok(Ok(Ok(_))) => true,
            Ok(Ok(Err(e))) => {
                tracing::debug!(node_id = %node.id, "node check failed: {}", e);
                false
            }
            Ok(Err(_)) => {
                tracing::error!(node_id = %node.id, "node check panicked");
                false
            }
            Err(_) => {
                tracing::debug!(node_id = %node.id, timeout_secs = timeout.as_secs(), "node check timed out");
                false
            }
        };

        let now = OffsetDateTime::now_utc();
        let (status, persisted) = if reachable {
            (
                ConnectivityState::Online,
                self.inner.store.record_online(&node.id, now).await,
            )
        } else {
            (
                ConnectivityState::Offline,
                self.inner.store.record_offline(&node.id).await,
            )
        };
        if let Err(e) = persisted {
            tracing::warn!(node_id = %node.id, "failed to persist node status: {}", e);
        }

        let transitioned = previous != status;
        if transitioned {
            tracing::info!(node_id = %node.id, %previous, %status, "node status changed");
            let event = FleetEvent::NodeStatusChanged {
                node_id: node.id.clone(),
                organization_id: node.organization_id.clone(),
                status,
                previous,
                at: now,
            };
            self.inner
                .bus
                .broadcast_to_scope(&node.organization_id, &event);
        }

        if reachable {
            CheckOutcome::Online { transitioned }
        } else {
            CheckOutcome::Offline { transitioned }
        }
    }
}
