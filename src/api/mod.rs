//! API endpoint modules.

pub mod health;
pub mod jobs;
pub mod logs;
pub mod openapi;
pub mod reports;
pub mod system;
pub mod websocket;

pub use health::configure_health_routes;
pub use jobs::configure_routes as configure_job_routes;
pub use logs::configure_routes as configure_log_routes;
pub use openapi::ApiDoc;
pub use reports::configure_routes as configure_report_routes;
pub use system::configure_routes as configure_system_routes;
pub use websocket::configure_routes as configure_websocket_routes;

use actix_web::HttpResponse;
use serde::Serialize;

/// Success envelope: every REST payload is wrapped as
/// `{"success": true, "data": ...}`; errors mirror it with
/// `{"success": false, "error": {...}}` (see `error::ErrorResponse`).
pub(crate) fn ok_json<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "success": true, "data": data }))
}

/// Like `ok_json` but with a 201 status for resource creation.
pub(crate) fn created_json<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(serde_json::json!({ "success": true, "data": data }))
}
