//! License gatekeeper.
//!
//! A single background ticker task owns the process-wide license snapshot;
//! everything else reads it through `status()` or forces a fresh probe with
//! `check_now()` before admitting a queued job. A license-server connectivity
//! failure means "unavailable" — it is a retry condition, never an error of
//! the job asking for admission.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::models::{LicenseStatus, WsEvent};
use crate::services::EventBroadcaster;

/// Seam for asking the license server whether a seat could be had.
#[async_trait]
pub trait LicenseProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

/// Production probe: TCP-connect to the license daemon.
///
/// Accepts the FlexLM-style `port@host` syntax as well as plain `host:port`.
/// With no server configured it reports available, which is only acceptable
/// in development (production config validation enforces a server).
pub struct TcpLicenseProbe {
    server: Option<String>,
    connect_timeout: Duration,
}

impl TcpLicenseProbe {
    pub fn new(server: Option<String>, connect_timeout: Duration) -> Self {
        Self {
            server,
            connect_timeout,
        }
    }

    /// Resolve the configured server string to a `host:port` connect target.
    fn target(&self) -> Option<String> {
        let server = self.server.as_deref()?;
        if let Some((port, host)) = server.split_once('@') {
            Some(format!("{}:{}", host, port))
        } else {
            Some(server.to_string())
        }
    }
}

#[async_trait]
impl LicenseProbe for TcpLicenseProbe {
    async fn probe(&self) -> bool {
        let Some(addr) = self.target() else {
            debug!("No license server configured, reporting available");
            return true;
        };

        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(server = %addr, error = %e, "License server unreachable");
                false
            }
            Err(_) => {
                warn!(server = %addr, "License probe timed out");
                false
            }
        }
    }
}

/// Cluster-wide license availability monitor.
#[derive(Clone)]
pub struct LicenseMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    probe: Arc<dyn LicenseProbe>,
    status: RwLock<LicenseStatus>,
    poll_interval: Duration,
    broadcaster: EventBroadcaster,
}

impl LicenseMonitor {
    pub fn new(
        probe: Arc<dyn LicenseProbe>,
        poll_interval: Duration,
        broadcaster: EventBroadcaster,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                probe,
                status: RwLock::new(LicenseStatus::unknown()),
                poll_interval,
                broadcaster,
            }),
        }
    }

    /// Start the background refresh task.
    pub fn start(&self) {
        let monitor = self.clone();
        tokio::spawn(async move {
            info!(
                "License monitor started (poll interval: {:?})",
                monitor.inner.poll_interval
            );
            let mut ticker = interval(monitor.inner.poll_interval);
            loop {
                ticker.tick().await;
                monitor.check_now().await;
            }
        });
    }

    /// Probe the license server and update the shared snapshot.
    ///
    /// Broadcasts `license-status-changed` when availability flips.
    pub async fn check_now(&self) -> bool {
        let available = self.inner.probe.probe().await;
        let now = Utc::now();
        let next_check = chrono::Duration::from_std(self.inner.poll_interval)
            .ok()
            .map(|d| now + d);

        let snapshot = {
            let mut status = self.inner.status.write().await;
            let flipped = status.available != available;
            *status = LicenseStatus {
                available,
                checked_at: now,
                next_check,
            };
            flipped.then(|| status.clone())
        };

        if let Some(status) = snapshot {
            info!(available = status.available, "License availability changed");
            self.inner
                .broadcaster
                .publish(WsEvent::LicenseStatusChanged(status));
        }

        available
    }

    /// Last known availability snapshot.
    pub async fn status(&self) -> LicenseStatus {
        self.inner.status.read().await.clone()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedProbe;
    use super::*;

    #[test]
    fn flexlm_syntax_resolves_to_connect_target() {
        let probe = TcpLicenseProbe::new(Some("1717@licbox".into()), Duration::from_secs(1));
        assert_eq!(probe.target().as_deref(), Some("licbox:1717"));

        let probe = TcpLicenseProbe::new(Some("licbox:1717".into()), Duration::from_secs(1));
        assert_eq!(probe.target().as_deref(), Some("licbox:1717"));

        let probe = TcpLicenseProbe::new(None, Duration::from_secs(1));
        assert_eq!(probe.target(), None);
    }

    #[tokio::test]
    async fn unconfigured_probe_reports_available() {
        let probe = TcpLicenseProbe::new(None, Duration::from_secs(1));
        assert!(probe.probe().await);
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable_not_an_error() {
        // Find a port that is free, then probe it after the listener is gone.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = TcpLicenseProbe::new(Some(addr.to_string()), Duration::from_secs(1));
        assert!(!probe.probe().await);
    }

    #[tokio::test]
    async fn reachable_server_is_available() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let probe = TcpLicenseProbe::new(Some(addr.to_string()), Duration::from_secs(1));
        assert!(probe.probe().await);
    }

    #[tokio::test]
    async fn availability_flip_broadcasts_event() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        let monitor = LicenseMonitor::new(
            Arc::new(ScriptedProbe::new([true, true, false])),
            Duration::from_secs(30),
            broadcaster,
        );

        // unknown -> available: one event
        assert!(monitor.check_now().await);
        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg.event, WsEvent::LicenseStatusChanged(ref s) if s.available));

        // available -> available: no event
        assert!(monitor.check_now().await);

        // available -> unavailable: one event
        assert!(!monitor.check_now().await);
        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg.event, WsEvent::LicenseStatusChanged(ref s) if !s.available));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn snapshot_carries_next_check() {
        let monitor = LicenseMonitor::new(
            Arc::new(ScriptedProbe::new([true])),
            Duration::from_secs(30),
            EventBroadcaster::new(),
        );
        monitor.check_now().await;

        let status = monitor.status().await;
        assert!(status.available);
        let next = status.next_check.expect("next_check set");
        assert!(next > status.checked_at);
    }
}
