//! Model backend connectivity monitor
//!
//! A background task probes the backend on a fixed interval and publishes the
//! result on a watch channel. Queries wait on that channel before they touch
//! the backend.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::providers::ModelBackend;

/// Backend reachability as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No probe has completed yet
    Unknown,
    Connected,
    Disconnected,
}

/// Read side of the connection state
#[derive(Debug, Clone)]
pub struct ReadinessSignal {
    rx: watch::Receiver<ConnectionState>,
}

impl ReadinessSignal {
    pub fn state(&self) -> ConnectionState {
        *self.rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Wait until the backend is connected.
    ///
    /// `None` waits indefinitely. A timeout, or a monitor that stopped while
    /// waiting, yields `BackendUnavailable`.
    pub async fn wait_ready(&self, timeout: Option<Duration>) -> Result<()> {
        let mut rx = self.rx.clone();
        let wait = async move {
            rx.wait_for(|state| *state == ConnectionState::Connected)
                .await
                .map(|_| ())
                .map_err(|_| Error::BackendUnavailable("connectivity monitor stopped".into()))
        };

        match timeout {
            None => wait.await,
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result,
                Err(_) => Err(Error::BackendUnavailable(format!(
                    "backend not reachable within {:?}",
                    limit
                ))),
            },
        }
    }
}

/// Probes the backend and owns the connection state
pub struct ConnectivityMonitor {
    backend: Arc<dyn ModelBackend>,
    interval: Duration,
    probe_timeout: Duration,
    tx: watch::Sender<ConnectionState>,
}

impl ConnectivityMonitor {
    pub fn new(backend: Arc<dyn ModelBackend>, config: &MonitorConfig) -> Self {
        Self::with_intervals(backend, config.probe_interval(), config.probe_timeout())
    }

    pub fn with_intervals(
        backend: Arc<dyn ModelBackend>,
        interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        let (tx, _) = watch::channel(ConnectionState::Unknown);
        Self {
            backend,
            interval,
            probe_timeout,
            tx,
        }
    }

    pub fn signal(&self) -> ReadinessSignal {
        ReadinessSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Run one probe and record the outcome
    pub async fn probe_once(&self) -> ConnectionState {
        let next = match tokio::time::timeout(self.probe_timeout, self.backend.health_check()).await
        {
            Ok(Ok(true)) => ConnectionState::Connected,
            Ok(Ok(false)) => ConnectionState::Disconnected,
            Ok(Err(e)) => {
                tracing::debug!("Health probe failed: {}", e);
                ConnectionState::Disconnected
            }
            Err(_) => {
                tracing::debug!("Health probe timed out after {:?}", self.probe_timeout);
                ConnectionState::Disconnected
            }
        };

        let changed = self.tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });

        if changed {
            match next {
                ConnectionState::Connected => {
                    tracing::info!("Model backend '{}' connected", self.backend.name())
                }
                _ => tracing::warn!("Model backend '{}' disconnected", self.backend.name()),
            }
        }
        next
    }

    /// Start the probe loop on the runtime
    pub fn spawn(self) -> MonitorHandle {
        let signal = self.signal();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(shutdown_rx));

        MonitorHandle {
            signal,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                // Fires on an explicit shutdown and when the handle is dropped
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.probe_once().await;
                }
            }
        }
        tracing::debug!("Connectivity monitor stopped");
    }
}

/// Owner of the running probe loop
pub struct MonitorHandle {
    signal: ReadinessSignal,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn signal(&self) -> ReadinessSignal {
        self.signal.clone()
    }

    /// Stop the probe loop and wait for it to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::warn!("Connectivity monitor task failed: {}", e);
        }
    }
}
