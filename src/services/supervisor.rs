//! Cancellation and timeout supervision for running pipelines.
//!
//! Every running job is wrapped in a `RunControl`: a shared cancel signal
//! carrying the reason plus the wall-clock deadline armed at admission.
//! Termination is cooperative at the process-group level — the current
//! stage's group gets SIGTERM, then SIGKILL once the grace period elapses;
//! no further stages are started and the job reaches a terminal state within
//! the grace bound.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Why a run was terminated early. Timeout is a policy boundary, not a tool
/// error, so both reasons end the job `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    UserRequested,
    Timeout,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserRequested => "user_requested",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct ControlInner {
    cancel_tx: watch::Sender<Option<CancelReason>>,
    deadline: Instant,
    grace: Duration,
}

/// Shared handle supervising one pipeline run.
#[derive(Clone)]
pub struct RunControl {
    inner: Arc<ControlInner>,
}

impl RunControl {
    /// Arm a control with a deadline `timeout` from now.
    pub fn new(timeout: Duration, grace: Duration) -> Self {
        let (cancel_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(ControlInner {
                cancel_tx,
                deadline: Instant::now() + timeout,
                grace,
            }),
        }
    }

    /// Request termination. Idempotent: the first reason wins, later calls
    /// are no-ops.
    pub fn cancel(&self, reason: CancelReason) {
        self.inner.cancel_tx.send_if_modified(|current| {
            if current.is_none() {
                debug!(reason = %reason, "Run cancellation requested");
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }

    /// Reason recorded so far, if any.
    pub fn cancelled(&self) -> Option<CancelReason> {
        *self.inner.cancel_tx.borrow()
    }

    /// Watch for a cancellation request.
    pub fn subscribe(&self) -> watch::Receiver<Option<CancelReason>> {
        self.inner.cancel_tx.subscribe()
    }

    /// Wall-clock deadline for the whole run.
    pub fn deadline(&self) -> Instant {
        self.inner.deadline
    }

    /// SIGTERM → SIGKILL grace period.
    pub fn grace(&self) -> Duration {
        self.inner.grace
    }
}

/// Signal an entire process group. Failures (typically ESRCH once the group
/// is gone) are logged and swallowed.
#[cfg(unix)]
pub fn signal_process_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(pid as i32);
    if let Err(e) = killpg(pgid, signal) {
        debug!(pid, signal = %signal, error = %e, "Process group signal not delivered");
    }
}

/// Terminate a stage's process group: SIGTERM immediately, SIGKILL once the
/// grace period elapses. The kill escalation runs detached so the caller can
/// keep draining the child's output.
#[cfg(unix)]
pub fn terminate_process_group(pid: u32, grace: Duration) {
    use nix::sys::signal::Signal;

    warn!(pid, "Terminating stage process group");
    signal_process_group(pid, Signal::SIGTERM);

    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        signal_process_group(pid, Signal::SIGKILL);
    });
}

#[cfg(not(unix))]
pub fn terminate_process_group(pid: u32, _grace: Duration) {
    warn!(pid, "Process-group termination is only supported on unix");
}
