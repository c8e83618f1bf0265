//! Log and source-file API handlers.
//!
//! Logs remain readable for completed, failed and cancelled jobs alike;
//! partial logs captured before a termination are part of the contract.

use actix_files::NamedFile;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::ok_json;
use crate::error::AppResult;
use crate::models::{LogContentResponse, LogFile, LogListResponse, LogStage};
use crate::services::JobDispatcher;

/// Source file content referenced by a report's file/line pointer.
#[derive(Debug, Serialize, ToSchema)]
pub struct SourceFileResponse {
    pub filename: String,
    pub content: String,
}

/// List a job's log files with stage and size metadata.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/logs",
    tag = "Logs",
    params(
        ("id" = Uuid, Path, description = "Job UUID")
    ),
    responses(
        (status = 200, description = "Log metadata", body = LogListResponse),
        (status = 404, description = "Job not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn list_job_logs(
    dispatcher: web::Data<JobDispatcher>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let workspace = dispatcher.workspace(path.into_inner()).await?;
    let logs: Vec<LogFile> = workspace.list_logs().await?;
    Ok(ok_json(LogListResponse { logs }))
}

/// Fetch one log file's content.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/logs/{filename}",
    tag = "Logs",
    params(
        ("id" = Uuid, Path, description = "Job UUID"),
        ("filename" = String, Path, description = "Log filename, e.g. compile.log")
    ),
    responses(
        (status = 200, description = "Log content", body = LogContentResponse),
        (status = 404, description = "Job or log not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_log_content(
    dispatcher: web::Data<JobDispatcher>,
    path: web::Path<(Uuid, String)>,
) -> AppResult<HttpResponse> {
    let (job_id, filename) = path.into_inner();
    let workspace = dispatcher.workspace(job_id).await?;
    let content = workspace.read_log(&filename).await?;
    Ok(ok_json(LogContentResponse {
        stage: LogStage::from_filename(&filename),
        filename,
        content,
    }))
}

/// Download a log file as an attachment.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/logs/{filename}/download",
    tag = "Logs",
    params(
        ("id" = Uuid, Path, description = "Job UUID"),
        ("filename" = String, Path, description = "Log filename")
    ),
    responses(
        (status = 200, description = "Raw log file"),
        (status = 404, description = "Job or log not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn download_log(
    dispatcher: web::Data<JobDispatcher>,
    path: web::Path<(Uuid, String)>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let (job_id, filename) = path.into_inner();
    let workspace = dispatcher.workspace(job_id).await?;
    let log_path = workspace.resolve_log(&filename)?;

    let file = NamedFile::open_async(log_path)
        .await?
        .set_content_disposition(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        });
    Ok(file.into_response(&req))
}

/// Fetch a source file referenced by a report. The job workspace is searched
/// first, then the owning project's source tree.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/src/{filename}",
    tag = "Logs",
    params(
        ("id" = Uuid, Path, description = "Job UUID"),
        ("filename" = String, Path, description = "Source path, relative")
    ),
    responses(
        (status = 200, description = "Source content", body = SourceFileResponse),
        (status = 404, description = "Job or file not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_source_file(
    dispatcher: web::Data<JobDispatcher>,
    path: web::Path<(Uuid, String)>,
) -> AppResult<HttpResponse> {
    let (job_id, filename) = path.into_inner();
    let workspace = dispatcher.workspace(job_id).await?;
    let source_path = workspace.resolve_source(&filename)?;
    let content = tokio::fs::read_to_string(source_path).await?;
    Ok(ok_json(SourceFileResponse { filename, content }))
}

/// Configure log and source routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/jobs/{id}/logs").route(web::get().to(list_job_logs)))
        .service(web::resource("/jobs/{id}/logs/{filename}").route(web::get().to(get_log_content)))
        .service(
            web::resource("/jobs/{id}/logs/{filename}/download")
                .route(web::get().to(download_log)),
        )
        .service(
            web::resource("/jobs/{id}/src/{filename:.*}").route(web::get().to(get_source_file)),
        );
}
