//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Questa Verify Server",
        version = "0.4.0",
        description = "API server for running HDL simulation and formal verification jobs against a licensed Questa toolchain"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        // Job endpoints
        api::jobs::submit_simulation_job,
        api::jobs::submit_formal_job,
        api::jobs::list_jobs,
        api::jobs::get_job,
        api::jobs::cancel_job,
        api::jobs::force_delete_job,
        // Log and source endpoints
        api::logs::list_job_logs,
        api::logs::get_log_content,
        api::logs::download_log,
        api::logs::get_source_file,
        // Report endpoints
        api::reports::get_cdc_report,
        api::reports::get_lint_report,
        api::reports::get_test_results,
        // System endpoints
        api::system::get_system_status,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            error::ErrorBody,
            // Health
            api::health::HealthResponse,
            // Jobs
            models::JobType,
            models::JobStatus,
            models::FormalMode,
            models::JobConfig,
            models::JobResponse,
            models::JobListResponse,
            models::QueryJobsParams,
            // Logs
            models::LogStage,
            models::LogFile,
            models::LogListResponse,
            models::LogContentResponse,
            api::logs::SourceFileResponse,
            // Reports
            models::CdcReportData,
            models::CdcSummary,
            models::CdcDetail,
            models::CdcEndpoint,
            models::LintReportData,
            models::LintSummary,
            models::LintCheck,
            models::LintViolation,
            models::LintSeverity,
            models::VsimResultSummary,
            models::TestCaseResult,
            models::TestOccurrence,
            models::TestStatus,
            api::reports::CdcReportResponse,
            api::reports::LintReportResponse,
            api::reports::TestResultsResponse,
            // System
            models::SystemStatus,
            models::LicenseStatus,
            models::CurrentJobSummary,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Jobs", description = "Job submission and lifecycle"),
        (name = "Logs", description = "Stage logs and referenced source files"),
        (name = "Reports", description = "Parsed verification results"),
        (name = "System", description = "License and scheduler status")
    )
)]
pub struct ApiDoc;
