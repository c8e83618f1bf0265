//! Process-wide status snapshots: license availability and scheduler state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{JobStatus, JobType};

/// Last known license-server availability.
///
/// Owned by the license monitor's ticker task; everything else reads it
/// through an accessor.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LicenseStatus {
    pub available: bool,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_check: Option<DateTime<Utc>>,
}

impl LicenseStatus {
    /// Status before the first probe has completed.
    pub fn unknown() -> Self {
        Self {
            available: false,
            checked_at: Utc::now(),
            next_check: None,
        }
    }
}

/// Summary of the job currently holding the run slot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentJobSummary {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub project_id: String,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
}

/// Cluster-wide status exposed to observers. `current_job` is singular by
/// construction: the toolchain license admits one running job.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SystemStatus {
    pub license: LicenseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_job: Option<CurrentJobSummary>,
    pub queued_jobs: usize,
    pub total_jobs: usize,
}
