//! Shared fixtures: stub tool binaries, a demo project tree and a scripted
//! license probe.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use questa_verify_lib::models::JobConfig;
use questa_verify_lib::services::dispatcher::DispatcherConfig;
use questa_verify_lib::services::{
    EventBroadcaster, JobDispatcher, LicenseMonitor, LicenseProbe,
};

/// License probe replaying a scripted answer sequence, repeating the last.
pub struct ScriptedProbe {
    answers: Mutex<VecDeque<bool>>,
    last: Mutex<bool>,
}

impl ScriptedProbe {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            last: Mutex::new(false),
        }
    }
}

#[async_trait]
impl LicenseProbe for ScriptedProbe {
    async fn probe(&self) -> bool {
        let mut answers = self.answers.lock().unwrap();
        match answers.pop_front() {
            Some(answer) => {
                *self.last.lock().unwrap() = answer;
                answer
            }
            None => *self.last.lock().unwrap(),
        }
    }
}

/// Everything a test needs to drive the dispatcher end to end.
pub struct TestServer {
    pub dispatcher: JobDispatcher,
    pub broadcaster: EventBroadcaster,
    pub bin: PathBuf,
    _tmp: tempfile::TempDir,
}

/// Write an executable shell script standing in for a tool binary.
pub fn stub_tool(dir: &Path, name: &str, script: &str) {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Stubs for a simulation pipeline that completes quickly and emits one
/// passing test case.
pub fn happy_sim_tools(bin: &Path) {
    stub_tool(bin, "vlog", "echo '-- Compiling module top'");
    stub_tool(bin, "vopt", "echo 'Optimized design name is tb_top_opt'");
    stub_tool(
        bin,
        "vsim",
        "echo '# TEST_PLAN: TC_A basic check'; echo '# TEST_RESULT: TC_A PASS @ 10.0ns - ok'",
    );
}

/// Build a server fixture with a `demo` project and a scripted license.
/// The dispatcher's scheduler loop is started with a fast poll interval.
pub fn test_server(license_answers: impl IntoIterator<Item = bool>) -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let data_dir = tmp.path().join("data");
    let bin = tmp.path().join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    std::fs::create_dir_all(data_dir.join("projects/demo/src")).unwrap();
    std::fs::create_dir_all(data_dir.join("projects/demo/tb")).unwrap();
    std::fs::write(
        data_dir.join("projects/demo/src/top.sv"),
        "module top; endmodule\n",
    )
    .unwrap();
    std::fs::write(
        data_dir.join("projects/demo/tb/tb_top.sv"),
        "module tb_top; endmodule\n",
    )
    .unwrap();

    let broadcaster = EventBroadcaster::new();
    let license = LicenseMonitor::new(
        Arc::new(ScriptedProbe::new(license_answers)),
        Duration::from_secs(3600),
        broadcaster.clone(),
    );
    let dispatcher = JobDispatcher::new(
        DispatcherConfig {
            data_dir,
            bin_dir: Some(bin.clone()),
            poll_interval: Duration::from_millis(100),
            termination_grace: Duration::from_millis(200),
        },
        broadcaster.clone(),
        license,
    );
    dispatcher.start();

    TestServer {
        dispatcher,
        broadcaster,
        bin,
        _tmp: tmp,
    }
}

/// Simulation job config with sensible test defaults.
pub fn sim_config(timeout_secs: u64) -> JobConfig {
    JobConfig {
        dut_top: "tb_top".to_string(),
        formal_mode: None,
        timeout_secs,
        simulation_time: None,
        compile_options: None,
        include_directories: vec![],
    }
}

/// Poll a job until it reaches a terminal state (bounded).
pub async fn wait_for_terminal(
    dispatcher: &JobDispatcher,
    job_id: uuid::Uuid,
) -> questa_verify_lib::models::Job {
    for _ in 0..100 {
        let job = dispatcher.get_job(job_id).await.unwrap();
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job never reached a terminal state");
}
