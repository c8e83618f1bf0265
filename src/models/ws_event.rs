//! WebSocket event types for real-time updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{JobStatus, LicenseStatus, LogStage, SystemStatus};

/// WebSocket event sent to connected clients.
///
/// Job-scoped events carry their job id and are delivered only to sessions
/// subscribed to that job; the license/system events go to every client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "kebab-case")]
pub enum WsEvent {
    /// Pipeline progress changed.
    JobProgress(JobProgressPayload),
    /// Lifecycle status transition. For terminal transitions, parsed results
    /// are stored before this event is published.
    JobStatus(JobStatusPayload),
    /// A log line was captured from the running stage.
    JobLogs(JobLogsPayload),
    /// License availability flipped.
    LicenseStatusChanged(LicenseStatus),
    /// Queue or run-slot state changed.
    SystemStatusChanged(SystemStatus),
}

/// Payload for job-progress events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgressPayload {
    pub job_id: Uuid,
    pub progress: u8,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
}

/// Payload for job-status events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusPayload {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Payload for job-logs events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogsPayload {
    pub job_id: Uuid,
    pub stage: LogStage,
    pub line: String,
}

impl WsEvent {
    /// Job id this event is scoped to, or `None` for broadcast-to-all events.
    pub fn scope(&self) -> Option<Uuid> {
        match self {
            Self::JobProgress(p) => Some(p.job_id),
            Self::JobStatus(p) => Some(p.job_id),
            Self::JobLogs(p) => Some(p.job_id),
            Self::LicenseStatusChanged(_) | Self::SystemStatusChanged(_) => None,
        }
    }

    pub fn job_progress(
        job_id: Uuid,
        progress: u8,
        status: JobStatus,
        current_step: Option<String>,
    ) -> Self {
        Self::JobProgress(JobProgressPayload {
            job_id,
            progress,
            status,
            current_step,
        })
    }

    pub fn job_status(job_id: Uuid, status: JobStatus) -> Self {
        Self::JobStatus(JobStatusPayload { job_id, status })
    }

    pub fn job_logs(job_id: Uuid, stage: LogStage, line: String) -> Self {
        Self::JobLogs(JobLogsPayload {
            job_id,
            stage,
            line,
        })
    }
}

/// Wrapper that includes a timestamp with every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEventMessage {
    #[serde(flatten)]
    pub event: WsEvent,
    pub timestamp: DateTime<Utc>,
}

impl WsEventMessage {
    /// Create a new event message with the current timestamp.
    pub fn new(event: WsEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }
}

/// Message a client may send over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WsClientMessage {
    /// Opt in to events for one job.
    SubscribeJob { job_id: Uuid },
    /// Release a previous subscription.
    UnsubscribeJob { job_id: Uuid },
}
