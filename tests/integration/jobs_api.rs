//! HTTP-level tests for the REST surface: envelopes, validation, lifecycle
//! endpoints, logs and reports.

use std::time::Duration;

use actix_web::{test, web, App};
use questa_verify_lib::api;
use serde_json::{json, Value};

use crate::helpers::{happy_sim_tools, test_server, wait_for_terminal};

macro_rules! init_app {
    ($server:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($server.broadcaster.clone()))
                .app_data(web::Data::new($server.dispatcher.clone()))
                .service(
                    web::scope("/api/v1")
                        .configure(api::configure_health_routes)
                        .configure(api::configure_job_routes)
                        .configure(api::configure_log_routes)
                        .configure(api::configure_report_routes)
                        .configure(api::configure_system_routes),
                ),
        )
        .await
    };
}

fn sim_body(timeout_secs: u64) -> Value {
    json!({
        "dut_top": "tb_top",
        "timeout_secs": timeout_secs,
    })
}

#[actix_rt::test]
async fn submit_returns_created_envelope() {
    let server = test_server([true]);
    happy_sim_tools(&server.bin);
    let app = init_app!(server);

    let req = test::TestRequest::post()
        .uri("/api/v1/jobs/simulation/demo")
        .set_json(sim_body(60))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "queued");
    assert_eq!(body["data"]["job_type"], "simulation");
    assert_eq!(body["data"]["project_id"], "demo");
}

#[actix_rt::test]
async fn validation_failures_are_bad_requests() {
    let server = test_server([true]);
    let app = init_app!(server);

    // Empty dut_top.
    let req = test::TestRequest::post()
        .uri("/api/v1/jobs/simulation/demo")
        .set_json(json!({ "dut_top": "", "timeout_secs": 60 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // Formal job without a mode.
    let req = test::TestRequest::post()
        .uri("/api/v1/jobs/formal/demo")
        .set_json(sim_body(60))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // Zero timeout.
    let req = test::TestRequest::post()
        .uri("/api/v1/jobs/simulation/demo")
        .set_json(sim_body(0))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // Unknown project.
    let req = test::TestRequest::post()
        .uri("/api/v1/jobs/simulation/no_such_project")
        .set_json(sim_body(60))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_rt::test]
async fn unknown_job_is_not_found() {
    let server = test_server([true]);
    let app = init_app!(server);

    let req = test::TestRequest::get()
        .uri("/api/v1/jobs/0195fbbb-0000-7000-8000-000000000000")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[actix_rt::test]
async fn completed_job_exposes_logs_and_results() {
    let server = test_server([true]);
    happy_sim_tools(&server.bin);
    let app = init_app!(server);

    let req = test::TestRequest::post()
        .uri("/api/v1/jobs/simulation/demo")
        .set_json(sim_body(60))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let job_id = body["data"]["id"].as_str().unwrap().to_string();

    let done = wait_for_terminal(
        &server.dispatcher,
        job_id.parse().unwrap(),
    )
    .await;
    assert_eq!(done.status.as_str(), "completed");

    // Snapshot flags results without inlining them.
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/jobs/{job_id}"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["progress"], 100);
    assert_eq!(body["data"]["has_results"], true);

    // Log metadata for all three stages.
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/jobs/{job_id}/logs"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let logs = body["data"]["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 3);

    // Log content.
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/jobs/{job_id}/logs/compile.log"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["stage"], "compile");
    assert!(body["data"]["content"]
        .as_str()
        .unwrap()
        .contains("Compiling"));

    // Raw download.
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/jobs/{job_id}/logs/compile.log/download"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    // Aggregated test results.
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/jobs/{job_id}/test-results"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["results"]["total_tests"], 1);
    assert_eq!(body["data"]["results"]["passed_tests"], 1);

    // Wrong report type for a simulation job.
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/jobs/{job_id}/cdc-report"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    // Source file referenced from the project tree.
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/jobs/{job_id}/src/top.sv"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["data"]["content"]
        .as_str()
        .unwrap()
        .contains("module top"));
}

#[actix_rt::test]
async fn reports_404_until_job_completes() {
    // License never grants: the job stays queued.
    let server = test_server([false]);
    happy_sim_tools(&server.bin);
    let app = init_app!(server);

    let req = test::TestRequest::post()
        .uri("/api/v1/jobs/simulation/demo")
        .set_json(sim_body(60))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let job_id = body["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/jobs/{job_id}/test-results"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_rt::test]
async fn cancel_and_force_delete_endpoints() {
    // Keep the job queued so cancellation is immediate.
    let server = test_server([false]);
    happy_sim_tools(&server.bin);
    let app = init_app!(server);

    let req = test::TestRequest::post()
        .uri("/api/v1/jobs/simulation/demo")
        .set_json(sim_body(60))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let job_id = body["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/jobs/{job_id}/cancel"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["status"], "cancelled");

    // Second cancel: same terminal state, no error.
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/jobs/{job_id}/cancel"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["status"], "cancelled");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/jobs/{job_id}/force"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/jobs/{job_id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_rt::test]
async fn system_status_endpoint_reports_license_and_queue() {
    let server = test_server([false]);
    let app = init_app!(server);

    let req = test::TestRequest::get()
        .uri("/api/v1/system/status")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], true);
    assert!(body["data"]["license"].is_object());
    assert_eq!(body["data"]["total_jobs"], 0);
    assert_eq!(body["data"]["queued_jobs"], 0);

    // Give the scheduler a moment, then submit and observe the queue.
    let req = test::TestRequest::post()
        .uri("/api/v1/jobs/simulation/demo")
        .set_json(sim_body(60))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let req = test::TestRequest::get()
        .uri("/api/v1/system/status")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["total_jobs"], 1);
}

#[actix_rt::test]
async fn health_endpoint_is_unwrapped() {
    let server = test_server([true]);
    let app = init_app!(server);

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
}
