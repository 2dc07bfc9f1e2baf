use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::monitor::{Monitor, MonitorError};

/// Runs monitor cycles on a fixed interval in a background task.
///
/// Owned by the process entry point; `stop` must be awaited before shutdown so
/// an in-flight cycle ends at a post boundary.
pub struct MonitorScheduler {
    monitor: Arc<Monitor>,
    running: Mutex<Option<Running>>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl MonitorScheduler {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self {
            monitor,
            running: Mutex::new(None),
        }
    }

    /// Spawn the loop: run a cycle, sleep `interval`, repeat. Returns false
    /// (and changes nothing) when already started.
    pub fn start(&self, interval: Duration) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_loop(
            self.monitor.clone(),
            interval,
            shutdown_rx,
            cancel.clone(),
        ));

        info!(interval_secs = interval.as_secs(), "Monitor scheduler started");
        *running = Some(Running {
            shutdown,
            cancel,
            handle,
        });
        true
    }

    /// Signal shutdown, cancel any in-flight cycle and wait for the task.
    /// Returns false when nothing was running.
    pub async fn stop(&self) -> bool {
        let taken = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(running) = taken else {
            return false;
        };

        running.cancel.store(true, Ordering::Relaxed);
        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            warn!(error = %e, "Monitor scheduler task ended abnormally");
        }
        info!("Monitor scheduler stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

async fn run_loop(
    monitor: Arc<Monitor>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    cancel: Arc<AtomicBool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match monitor.run_cycle_with_cancel(&cancel).await {
            Ok(report) => info!("{report}"),
            Err(MonitorError::Cancelled) => break,
            // A manual trigger holds the run guard; try again next tick.
            Err(MonitorError::AlreadyRunning) => {
                info!("Scheduled cycle skipped, another cycle is running")
            }
            Err(e) => warn!(error = %e, "Scheduled monitor cycle failed"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
    }
}
