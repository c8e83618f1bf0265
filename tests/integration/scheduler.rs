//! End-to-end scheduler behavior, driven through the background loop.

use std::time::Duration;

use questa_verify_lib::models::{JobStatus, JobType, LogStage};

use crate::helpers::{happy_sim_tools, sim_config, stub_tool, test_server, wait_for_terminal};

/// A 1-second timeout against a compile stage that sleeps 5 seconds: the job
/// ends cancelled promptly and the partial compile log survives.
#[tokio::test]
async fn timeout_cancels_job_within_grace_period() {
    let server = test_server([true]);
    stub_tool(&server.bin, "vlog", "echo 'compile starting'; sleep 5");
    stub_tool(&server.bin, "vopt", "echo unreachable");
    stub_tool(&server.bin, "vsim", "echo unreachable");

    let started = std::time::Instant::now();
    let job = server
        .dispatcher
        .submit(JobType::Simulation, "demo", sim_config(1))
        .await
        .unwrap();

    let done = wait_for_terminal(&server.dispatcher, job.id).await;
    assert_eq!(done.status, JobStatus::Cancelled);
    assert!(
        started.elapsed() < Duration::from_secs(4),
        "termination exceeded the grace bound"
    );

    let workspace = server.dispatcher.workspace(job.id).await.unwrap();
    let log = std::fs::read_to_string(workspace.log_path(LogStage::Compile)).unwrap();
    assert!(log.contains("compile starting"), "partial log must survive");
    assert!(!workspace.log_path(LogStage::Optimize).exists());
}

/// License denied for several polls, then granted: the job is observed
/// queued throughout the denials and running/completed afterwards.
#[tokio::test]
async fn job_waits_queued_for_license_grant() {
    let server = test_server([false, false, false, true]);
    happy_sim_tools(&server.bin);

    let job = server
        .dispatcher
        .submit(JobType::Simulation, "demo", sim_config(60))
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    // Two scheduler passes in, the license is still denied.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        server.dispatcher.get_job(job.id).await.unwrap().status,
        JobStatus::Queued,
        "job must stay queued while the license is unavailable"
    );

    let done = wait_for_terminal(&server.dispatcher, job.id).await;
    assert_eq!(done.status, JobStatus::Completed);
}

/// Three submissions, one run slot: at no sampled instant are two jobs
/// running, and all of them complete.
#[tokio::test]
async fn run_slot_is_single_occupancy() {
    let server = test_server([true]);
    stub_tool(&server.bin, "vlog", "sleep 0.3");
    stub_tool(&server.bin, "vopt", "true");
    stub_tool(
        &server.bin,
        "vsim",
        "echo '# TEST_RESULT: TC_A PASS @ 1.0ns - ok'",
    );

    let mut ids = Vec::new();
    for _ in 0..3 {
        let job = server
            .dispatcher
            .submit(JobType::Simulation, "demo", sim_config(60))
            .await
            .unwrap();
        ids.push(job.id);
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(15);
    loop {
        let mut running = 0;
        let mut terminal = 0;
        for id in &ids {
            let job = server.dispatcher.get_job(*id).await.unwrap();
            if job.status == JobStatus::Running {
                running += 1;
            }
            if job.status.is_terminal() {
                terminal += 1;
            }
        }
        assert!(running <= 1, "observed {running} jobs running concurrently");
        if terminal == ids.len() {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "jobs did not drain in time"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    for id in ids {
        let job = server.dispatcher.get_job(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }
}

/// Subscribing to the broadcast stream: per-job status events arrive in
/// lifecycle order and the terminal event never precedes stored results.
#[tokio::test]
async fn status_events_are_ordered_and_results_precede_terminal() {
    let server = test_server([true]);
    happy_sim_tools(&server.bin);
    let mut rx = server.broadcaster.subscribe();

    let job = server
        .dispatcher
        .submit(JobType::Simulation, "demo", sim_config(60))
        .await
        .unwrap();

    let mut last_rank = 0u8;
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("event stream stalled")
            .unwrap();
        if let questa_verify_lib::models::WsEvent::JobStatus(payload) = msg.event {
            if payload.job_id != job.id {
                continue;
            }
            assert!(
                payload.status.rank() >= last_rank,
                "status transition moved backward"
            );
            last_rank = payload.status.rank();
            if payload.status.is_terminal() {
                assert_eq!(payload.status, JobStatus::Completed);
                let job = server.dispatcher.get_job(job.id).await.unwrap();
                assert!(job.test_results.is_some());
                break;
            }
        }
    }
}

/// Cancelling twice yields the same terminal state with no error.
#[tokio::test]
async fn cancel_is_idempotent_end_to_end() {
    let server = test_server([true]);
    stub_tool(&server.bin, "vlog", "sleep 5");
    stub_tool(&server.bin, "vopt", "echo unreachable");
    stub_tool(&server.bin, "vsim", "echo unreachable");

    let job = server
        .dispatcher
        .submit(JobType::Simulation, "demo", sim_config(60))
        .await
        .unwrap();

    // Wait for admission, then cancel mid-stage.
    for _ in 0..50 {
        if server.dispatcher.get_job(job.id).await.unwrap().status == JobStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    server.dispatcher.cancel(job.id).await.unwrap();

    let done = wait_for_terminal(&server.dispatcher, job.id).await;
    assert_eq!(done.status, JobStatus::Cancelled);

    let again = server.dispatcher.cancel(job.id).await.unwrap();
    assert_eq!(again.status, JobStatus::Cancelled);
}
