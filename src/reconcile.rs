//! Reconciliation pass, arms every reminder that should be armed

use std::fmt;

use serde::Serialize;

use crate::scheduler::Result;
use crate::scheduler::Scheduler;
use crate::storage::Storage;

/// Why the reconciliation pass runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// The process just started, nothing is armed yet
    Startup,

    /// Reload signal (SIGHUP), e.g. after an update
    Signal,

    /// Requested through the management API
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Startup => "startup",
            Self::Signal => "signal",
            Self::Manual => "manual",
        })
    }
}

/// Result of a reconciliation pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Reminders with a pending alarm
    pub armed: usize,

    /// Reminders left alone, their item is gone or inactive
    pub skipped: usize,

    /// Reminders that could not be armed
    pub failed: usize,
}

/// Run a reconciliation pass
///
/// Safe to run any number of times, every reminder ends up with at most one pending alarm.
///
/// # Errors
///
/// Will return `Err` when the reminders to arm can not be listed
pub async fn run<S: Storage>(scheduler: &Scheduler<S>, trigger: Trigger) -> Result<ReconcileReport> {
    tracing::debug!("Reconciliation pass ({trigger}) started");

    match scheduler.rearm_all().await {
        Ok(report) => {
            if report.failed > 0 {
                tracing::warn!(
                    "Reconciliation pass ({trigger}): {} armed, {} skipped, {} failed",
                    report.armed,
                    report.skipped,
                    report.failed
                );
            } else {
                tracing::info!(
                    "Reconciliation pass ({trigger}): {} armed, {} skipped",
                    report.armed,
                    report.skipped
                );
            }

            Ok(report)
        }
        Err(err) => {
            tracing::error!("Reconciliation pass ({trigger}) failed: {err}");

            Err(err)
        }
    }
}

/// Run a reconciliation pass on every reload signal (SIGHUP)
///
/// Returns right away on platforms without the signal.
pub async fn on_reload_signal<S: Storage>(scheduler: Scheduler<S>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;
        use tokio::signal::unix::signal;

        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(err) => {
                tracing::error!("Could not listen for the reload signal: {err}");
                return;
            }
        };

        while hangup.recv().await.is_some() {
            // failures are logged by the pass itself
            let _ = run(&scheduler, Trigger::Signal).await;
        }
    }

    #[cfg(not(unix))]
    drop(scheduler);
}
