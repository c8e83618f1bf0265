//! Job API handlers: submission, lifecycle and snapshots.

use actix_web::{web, HttpResponse};
use tracing::info;
use uuid::Uuid;

use crate::api::{created_json, ok_json};
use crate::error::AppResult;
use crate::models::{JobConfig, JobListResponse, JobResponse, JobType, QueryJobsParams};
use crate::services::JobDispatcher;

/// Submit a simulation job (vlog → vopt → vsim pipeline).
///
/// The job is validated, queued and picked up by the dispatcher once the run
/// slot is free and a toolchain license is reachable.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/simulation/{project_id}",
    tag = "Jobs",
    params(
        ("project_id" = String, Path, description = "Owning project directory name")
    ),
    request_body = JobConfig,
    responses(
        (status = 201, description = "Job queued", body = JobResponse),
        (status = 400, description = "Invalid configuration", body = crate::error::ErrorResponse),
        (status = 404, description = "Project not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn submit_simulation_job(
    dispatcher: web::Data<JobDispatcher>,
    path: web::Path<String>,
    body: web::Json<JobConfig>,
) -> AppResult<HttpResponse> {
    let project_id = path.into_inner();
    let job = dispatcher
        .submit(JobType::Simulation, &project_id, body.into_inner())
        .await?;
    info!(job_id = %job.id, project = %project_id, "Simulation job submitted");
    Ok(created_json(job))
}

/// Submit a formal verification job (vlog → qverify pipeline).
#[utoipa::path(
    post,
    path = "/api/v1/jobs/formal/{project_id}",
    tag = "Jobs",
    params(
        ("project_id" = String, Path, description = "Owning project directory name")
    ),
    request_body = JobConfig,
    responses(
        (status = 201, description = "Job queued", body = JobResponse),
        (status = 400, description = "Invalid configuration (formalMode required)", body = crate::error::ErrorResponse),
        (status = 404, description = "Project not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn submit_formal_job(
    dispatcher: web::Data<JobDispatcher>,
    path: web::Path<String>,
    body: web::Json<JobConfig>,
) -> AppResult<HttpResponse> {
    let project_id = path.into_inner();
    let job = dispatcher
        .submit(JobType::Formal, &project_id, body.into_inner())
        .await?;
    info!(job_id = %job.id, project = %project_id, "Formal job submitted");
    Ok(created_json(job))
}

/// Get a single job snapshot.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    tag = "Jobs",
    params(
        ("id" = Uuid, Path, description = "Job UUID")
    ),
    responses(
        (status = 200, description = "Job snapshot", body = JobResponse),
        (status = 404, description = "Job not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_job(
    dispatcher: web::Data<JobDispatcher>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let job = dispatcher.get_job(path.into_inner()).await?;
    Ok(ok_json(JobResponse::from(&job)))
}

/// List jobs, newest first, optionally filtered by project.
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    tag = "Jobs",
    params(
        ("project_id" = Option<String>, Query, description = "Filter by owning project")
    ),
    responses(
        (status = 200, description = "Job list", body = JobListResponse),
    )
)]
pub async fn list_jobs(
    dispatcher: web::Data<JobDispatcher>,
    query: web::Query<QueryJobsParams>,
) -> AppResult<HttpResponse> {
    let jobs = dispatcher.list_jobs(query.project_id.as_deref()).await;
    let total = jobs.len();
    Ok(ok_json(JobListResponse { jobs, total }))
}

/// Cooperatively cancel a job.
///
/// Queued jobs are dequeued immediately; a running job's process group is
/// signalled and reaches `cancelled` within the grace period. Cancelling an
/// already-terminal job is a no-op.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/cancel",
    tag = "Jobs",
    params(
        ("id" = Uuid, Path, description = "Job UUID")
    ),
    responses(
        (status = 200, description = "Cancellation accepted", body = JobResponse),
        (status = 404, description = "Job not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn cancel_job(
    dispatcher: web::Data<JobDispatcher>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let job_id = path.into_inner();
    let job = dispatcher.cancel(job_id).await?;
    info!(job_id = %job_id, "Cancellation requested");
    Ok(ok_json(job))
}

/// Unconditionally tear a job down: kill any active process tree, then
/// remove the record and its workspace. Administrative escape hatch.
#[utoipa::path(
    delete,
    path = "/api/v1/jobs/{id}/force",
    tag = "Jobs",
    params(
        ("id" = Uuid, Path, description = "Job UUID")
    ),
    responses(
        (status = 200, description = "Job deleted"),
        (status = 404, description = "Job not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn force_delete_job(
    dispatcher: web::Data<JobDispatcher>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let job_id = path.into_inner();
    dispatcher.force_delete(job_id).await?;
    info!(job_id = %job_id, "Job force-deleted");
    Ok(ok_json(serde_json::json!({ "deleted": job_id })))
}

/// Configure job routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/jobs/simulation/{project_id}")
            .route(web::post().to(submit_simulation_job)),
    )
    .service(web::resource("/jobs/formal/{project_id}").route(web::post().to(submit_formal_job)))
    .service(web::resource("/jobs").route(web::get().to(list_jobs)))
    .service(web::resource("/jobs/{id}").route(web::get().to(get_job)))
    .service(web::resource("/jobs/{id}/cancel").route(web::post().to(cancel_job)))
    .service(web::resource("/jobs/{id}/force").route(web::delete().to(force_delete_job)));
}
