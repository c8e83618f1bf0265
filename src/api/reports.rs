//! Parsed-report API handlers.
//!
//! Reports exist only on completed jobs of the matching type and mode;
//! anything else is a 404. A report that failed to parse is still present in
//! degraded (default-shaped) form, with the parse warning alongside it.

use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::ok_json;
use crate::error::{AppError, AppResult};
use crate::models::{CdcReportData, Job, JobStatus, LintReportData, VsimResultSummary};
use crate::services::JobDispatcher;

/// CDC report payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct CdcReportResponse {
    pub job_id: Uuid,
    pub report: CdcReportData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Lint report payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct LintReportResponse {
    pub job_id: Uuid,
    pub report: LintReportData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Test-result payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct TestResultsResponse {
    pub job_id: Uuid,
    pub results: VsimResultSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

fn completed_job(job: &Job) -> AppResult<()> {
    if job.status != JobStatus::Completed {
        return Err(AppError::NotFound(format!(
            "Results for job {} (status: {})",
            job.id, job.status
        )));
    }
    Ok(())
}

/// Get the parsed CDC (or RDC) report of a completed formal job.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/cdc-report",
    tag = "Reports",
    params(
        ("id" = Uuid, Path, description = "Job UUID")
    ),
    responses(
        (status = 200, description = "Parsed CDC report", body = CdcReportResponse),
        (status = 404, description = "Job not completed or wrong job type", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_cdc_report(
    dispatcher: web::Data<JobDispatcher>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let job = dispatcher.get_job(path.into_inner()).await?;
    completed_job(&job)?;
    let report = job
        .cdc_report
        .ok_or_else(|| AppError::NotFound(format!("CDC report for job {}", job.id)))?;
    Ok(ok_json(CdcReportResponse {
        job_id: job.id,
        report,
        warning: job.parse_warning,
    }))
}

/// Get the parsed lint report of a completed formal lint job.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/lint-report",
    tag = "Reports",
    params(
        ("id" = Uuid, Path, description = "Job UUID")
    ),
    responses(
        (status = 200, description = "Parsed lint report", body = LintReportResponse),
        (status = 404, description = "Job not completed or wrong job type", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_lint_report(
    dispatcher: web::Data<JobDispatcher>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let job = dispatcher.get_job(path.into_inner()).await?;
    completed_job(&job)?;
    let report = job
        .lint_report
        .ok_or_else(|| AppError::NotFound(format!("Lint report for job {}", job.id)))?;
    Ok(ok_json(LintReportResponse {
        job_id: job.id,
        report,
        warning: job.parse_warning,
    }))
}

/// Get the aggregated test results of a completed simulation job.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/test-results",
    tag = "Reports",
    params(
        ("id" = Uuid, Path, description = "Job UUID")
    ),
    responses(
        (status = 200, description = "Aggregated test results", body = TestResultsResponse),
        (status = 404, description = "Job not completed or wrong job type", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_test_results(
    dispatcher: web::Data<JobDispatcher>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let job = dispatcher.get_job(path.into_inner()).await?;
    completed_job(&job)?;
    let results = job
        .test_results
        .ok_or_else(|| AppError::NotFound(format!("Test results for job {}", job.id)))?;
    Ok(ok_json(TestResultsResponse {
        job_id: job.id,
        results,
        warning: job.parse_warning,
    }))
}

/// Configure report routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/jobs/{id}/cdc-report").route(web::get().to(get_cdc_report)))
        .service(web::resource("/jobs/{id}/lint-report").route(web::get().to(get_lint_report)))
        .service(web::resource("/jobs/{id}/test-results").route(web::get().to(get_test_results)));
}
