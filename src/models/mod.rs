//! Domain models for the verification job server.

pub mod cdc_report;
pub mod job;
pub mod lint_report;
pub mod log_file;
pub mod system_status;
pub mod test_results;
pub mod ws_event;

// Re-export commonly used types
pub use cdc_report::{CdcDetail, CdcEndpoint, CdcReportData, CdcSummary};
pub use job::{
    FormalMode, Job, JobConfig, JobListResponse, JobResponse, JobStatus, JobType, QueryJobsParams,
};
pub use lint_report::{LintCheck, LintReportData, LintSeverity, LintSummary, LintViolation};
pub use log_file::{LogContentResponse, LogFile, LogListResponse, LogStage};
pub use system_status::{CurrentJobSummary, LicenseStatus, SystemStatus};
pub use test_results::{TestCaseResult, TestOccurrence, TestStatus, VsimResultSummary};
pub use ws_event::{
    JobLogsPayload, JobProgressPayload, JobStatusPayload, WsClientMessage, WsEvent, WsEventMessage,
};
