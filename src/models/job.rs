//! Job domain models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{CdcReportData, LintReportData, VsimResultSummary};

/// Kind of verification job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Compile/optimize/simulate pipeline (vlog → vopt → vsim).
    Simulation,
    /// Compile/analyze pipeline (vlog → qverify).
    Formal,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simulation => "simulation",
            Self::Formal => "formal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "simulation" => Some(Self::Simulation),
            "formal" => Some(Self::Formal),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Analysis mode for formal jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FormalMode {
    /// Static design-rule checking.
    Lint,
    /// Clock-domain-crossing analysis.
    Cdc,
    /// Reset-domain-crossing analysis.
    Rdc,
}

impl FormalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lint => "lint",
            Self::Cdc => "cdc",
            Self::Rdc => "rdc",
        }
    }
}

impl std::fmt::Display for FormalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job lifecycle status.
///
/// Transitions are monotonic: `pending → queued → running → terminal`.
/// Terminal states are `completed`, `failed` and `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, not yet queued.
    Pending,
    /// Waiting for the run slot and a toolchain license.
    Queued,
    /// Pipeline executing.
    Running,
    /// Pipeline succeeded; parsed results are available.
    Completed,
    /// A stage failed or could not be spawned.
    Failed,
    /// Cancelled by the user or by the timeout supervisor.
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// True for `completed`, `failed` and `cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Position in the lifecycle partial order. Terminal states share a rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Queued => 1,
            Self::Running => 2,
            Self::Completed | Self::Failed | Self::Cancelled => 3,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-job run configuration, supplied at submission.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobConfig {
    /// Top-level DUT/testbench module name.
    pub dut_top: String,
    /// Analysis mode; required for formal jobs, ignored for simulation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formal_mode: Option<FormalMode>,
    /// Wall-clock ceiling in seconds, measured from admission.
    pub timeout_secs: u64,
    /// Run-control directive passed to vsim (default `run -all`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_time: Option<String>,
    /// Raw define/flag string appended to the compile command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_options: Option<String>,
    /// Extra include directories. Order matters for the tool search path;
    /// duplicates are preserved.
    #[serde(default)]
    pub include_directories: Vec<String>,
}

/// A verification job and everything it owns.
///
/// Jobs are mutated exclusively by the dispatcher (and, for cancellation, the
/// supervisor acting through it). Reports are populated once, at completion,
/// and are immutable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub project_id: String,
    pub config: JobConfig,
    /// Overall pipeline progress, 0–100, monotonically non-decreasing.
    pub progress: u8,
    /// Name of the stage currently executing.
    pub current_step: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Populated only when status is `failed`.
    pub error: Option<String>,
    pub cdc_report: Option<CdcReportData>,
    pub lint_report: Option<LintReportData>,
    pub test_results: Option<VsimResultSummary>,
    /// Set when a report could not be fully parsed; the job still completes.
    pub parse_warning: Option<String>,
}

impl Job {
    /// Create a new job in `pending` state.
    pub fn new(job_type: JobType, project_id: String, config: JobConfig) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_type,
            status: JobStatus::Pending,
            project_id,
            config,
            progress: 0,
            current_step: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            cdc_report: None,
            lint_report: None,
            test_results: None,
            parse_warning: None,
        }
    }

    /// True once any parsed report has been attached.
    pub fn has_results(&self) -> bool {
        self.cdc_report.is_some() || self.lint_report.is_some() || self.test_results.is_some()
    }
}

/// Job snapshot returned by the API. Parsed reports are fetched through their
/// dedicated endpoints and only flagged here.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobResponse {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub project_id: String,
    pub config: JobConfig,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub has_results: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_warning: Option<String>,
}

impl From<&Job> for JobResponse {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type,
            status: job.status,
            project_id: job.project_id.clone(),
            config: job.config.clone(),
            progress: job.progress,
            current_step: job.current_step.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error: job.error.clone(),
            has_results: job.has_results(),
            parse_warning: job.parse_warning.clone(),
        }
    }
}

/// Job list response.
#[derive(Debug, Serialize, ToSchema)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
    pub total: usize,
}

/// Query parameters for the job list endpoint.
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryJobsParams {
    /// Filter by owning project.
    pub project_id: Option<String>,
}
