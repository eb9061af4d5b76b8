//! Asynchronous report handoff.
//!
//! The dispatcher owns a bounded queue and a single worker that fans each
//! [`AuditRecord`] out to notifiers and sinks. Every collaborator call runs
//! under a time budget, so a slow or failing collaborator can only lose
//! reports. It never alters a decision or holds up shutdown past its budget.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::collaborators::{AuditRecord, Notifier, ReportSink};
use crate::metrics::METRICS;

/// Handle to the reporting worker.
pub struct ReportDispatcher {
    tx: Mutex<Option<mpsc::Sender<AuditRecord>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ReportDispatcher {
    /// Start the worker. Must be called from within a Tokio runtime.
    /// Each notifier and sink call is given `call_timeout`.
    pub fn spawn(
        capacity: usize,
        call_timeout: Duration,
        notifiers: Vec<Arc<dyn Notifier>>,
        sinks: Vec<Arc<dyn ReportSink>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(rx, call_timeout, notifiers, sinks));
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// A dispatcher with no collaborators.
    pub fn disabled() -> Self {
        Self::spawn(1, Duration::from_secs(1), Vec::new(), Vec::new())
    }

    /// Queue a record without waiting. Returns `false` if it was dropped.
    pub fn dispatch(&self, record: AuditRecord) -> bool {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(tx) = tx else {
            METRICS.inc_reports_dropped();
            warn!(decision_id = %record.decision.id(), "report queue closed; dropping report");
            return false;
        };
        match tx.try_send(record) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(record)) => {
                METRICS.inc_reports_dropped();
                warn!(decision_id = %record.decision.id(), "report queue full; dropping report");
                false
            }
            Err(mpsc::error::TrySendError::Closed(record)) => {
                METRICS.inc_reports_dropped();
                warn!(decision_id = %record.decision.id(), "report worker gone; dropping report");
                false
            }
        }
    }

    /// Close the queue and wait for already-queued reports to drain.
    pub async fn shutdown(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "report worker ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for ReportDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let open = self
            .tx
            .lock()
            .map(|tx| tx.is_some())
            .unwrap_or(false);
        f.debug_struct("ReportDispatcher").field("open", &open).finish()
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<AuditRecord>,
    call_timeout: Duration,
    notifiers: Vec<Arc<dyn Notifier>>,
    sinks: Vec<Arc<dyn ReportSink>>,
) {
    let timeout_ms = call_timeout.as_millis() as u64;
    while let Some(record) = rx.recv().await {
        let decision_id = record.decision.id();
        for notifier in &notifiers {
            match tokio::time::timeout(call_timeout, notifier.notify(&record.decision)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    METRICS.inc_report_failures();
                    warn!(notifier = notifier.name(), %decision_id, error = %e, "notifier failed");
                }
                Err(_) => {
                    METRICS.inc_report_failures();
                    warn!(notifier = notifier.name(), %decision_id, timeout_ms, "notifier timed out");
                }
            }
        }
        for sink in &sinks {
            match tokio::time::timeout(call_timeout, sink.write(&record)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    METRICS.inc_report_failures();
                    warn!(sink = sink.name(), %decision_id, error = %e, "report sink failed");
                }
                Err(_) => {
                    METRICS.inc_report_failures();
                    warn!(sink = sink.name(), %decision_id, timeout_ms, "report sink timed out");
                }
            }
        }
        debug!(%decision_id, "report delivered");
    }
    debug!("report queue closed");
}
