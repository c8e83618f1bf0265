//! System status endpoint.

use actix_web::{web, HttpResponse};

use crate::api::ok_json;
use crate::error::AppResult;
use crate::models::SystemStatus;
use crate::services::JobDispatcher;

/// Cluster-wide status: license availability, the (singular) current job,
/// queue depth and total job count.
#[utoipa::path(
    get,
    path = "/api/v1/system/status",
    tag = "System",
    responses(
        (status = 200, description = "System status snapshot", body = SystemStatus),
    )
)]
pub async fn get_system_status(dispatcher: web::Data<JobDispatcher>) -> AppResult<HttpResponse> {
    let status = dispatcher.system_status().await;
    Ok(ok_json(status))
}

/// Configure system routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/system/status").route(web::get().to(get_system_status)));
}
