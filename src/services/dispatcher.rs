//! Job queue and dispatcher.
//!
//! Owns the job registry, the FIFO admission queue and the single global run
//! slot. The run slot is an explicit `Mutex<Option<ActiveRun>>` rather than a
//! scan over the registry: the underlying toolchain license is single-seat,
//! so at most one job is ever `running`. All job-state mutation funnels
//! through this service; the API layer only reads snapshots.
//!
//! Completion ordering guarantee: parsed results are stored on the job
//! before the terminal `job-status` event is published, so a client that
//! reacts to `completed` can immediately fetch results.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    CurrentJobSummary, FormalMode, Job, JobConfig, JobResponse, JobStatus, JobType, LogStage,
    SystemStatus, WsEvent,
};
use crate::services::pipeline::{self, PipelineError, PipelineEvent, PipelineSpec};
use crate::services::supervisor::{CancelReason, RunControl};
use crate::services::workspace::JobWorkspace;
use crate::services::{
    cdc_extraction, lint_extraction, result_extraction, EventBroadcaster, LicenseMonitor,
};

/// How long force-delete waits for an active run to drain before removing
/// the workspace out from under it.
const FORCE_DELETE_DRAIN: Duration = Duration::from_secs(10);

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Root holding `projects/` and `jobs/`.
    pub data_dir: PathBuf,
    /// Tool binary directory; `None` resolves via `$PATH`.
    pub bin_dir: Option<PathBuf>,
    /// Scheduler pass interval.
    pub poll_interval: Duration,
    /// SIGTERM → SIGKILL grace for stage teardown.
    pub termination_grace: Duration,
}

/// The job currently holding the run slot.
struct ActiveRun {
    job_id: Uuid,
    control: RunControl,
}

struct DispatcherInner {
    config: DispatcherConfig,
    jobs: RwLock<HashMap<Uuid, Job>>,
    queue: Mutex<VecDeque<Uuid>>,
    active: Mutex<Option<ActiveRun>>,
    wake: Notify,
    broadcaster: EventBroadcaster,
    license: LicenseMonitor,
}

/// Shared handle to the dispatcher.
#[derive(Clone)]
pub struct JobDispatcher {
    inner: Arc<DispatcherInner>,
}

impl JobDispatcher {
    pub fn new(
        config: DispatcherConfig,
        broadcaster: EventBroadcaster,
        license: LicenseMonitor,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                config,
                jobs: RwLock::new(HashMap::new()),
                queue: Mutex::new(VecDeque::new()),
                active: Mutex::new(None),
                wake: Notify::new(),
                broadcaster,
                license,
            }),
        }
    }

    /// Start the background scheduler loop.
    pub fn start(&self) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            info!(
                "Job dispatcher started (poll interval: {:?})",
                dispatcher.inner.config.poll_interval
            );
            let mut ticker = tokio::time::interval(dispatcher.inner.config.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = dispatcher.inner.wake.notified() => {}
                    _ = ticker.tick() => {}
                }
                dispatcher.tick().await;
            }
        });
    }

    /// Submit a new job. Validation failures are the only synchronous
    /// errors; everything later is observed through job state and events.
    pub async fn submit(
        &self,
        job_type: JobType,
        project_id: &str,
        config: JobConfig,
    ) -> AppResult<JobResponse> {
        validate_submission(job_type, project_id, &config)?;

        let project_dir = self.project_dir(project_id);
        if !project_dir.is_dir() {
            return Err(AppError::NotFound(format!("Project {}", project_id)));
        }

        let mut job = Job::new(job_type, project_id.to_string(), config);
        // Basic validation passed: pending is immediately promoted to queued.
        job.status = JobStatus::Queued;
        let snapshot = job.clone();
        let job_id = job.id;

        self.inner.jobs.write().await.insert(job_id, job);
        self.inner.queue.lock().await.push_back(job_id);

        info!(job_id = %job_id, job_type = %job_type, project = %project_id, "Job queued");
        self.inner
            .broadcaster
            .publish(WsEvent::job_status(job_id, JobStatus::Queued));
        self.publish_system_status().await;
        self.inner.wake.notify_one();

        Ok(JobResponse::from(&snapshot))
    }

    /// Full job clone, including any parsed reports.
    pub async fn get_job(&self, job_id: Uuid) -> AppResult<Job> {
        self.inner
            .jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Job {}", job_id)))
    }

    /// Snapshots of all jobs, newest first, optionally filtered by project.
    pub async fn list_jobs(&self, project_id: Option<&str>) -> Vec<JobResponse> {
        let jobs = self.inner.jobs.read().await;
        let mut snapshots: Vec<JobResponse> = jobs
            .values()
            .filter(|job| project_id.map_or(true, |p| job.project_id == p))
            .map(JobResponse::from)
            .collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        snapshots
    }

    /// Cooperative cancellation. Valid for any non-terminal job; a no-op on
    /// an already-terminal one (idempotent).
    pub async fn cancel(&self, job_id: Uuid) -> AppResult<JobResponse> {
        let status = self.get_job(job_id).await?.status;

        match status {
            status if status.is_terminal() => {
                // Idempotent: report the terminal state, no error.
                Ok(JobResponse::from(&self.get_job(job_id).await?))
            }
            JobStatus::Pending | JobStatus::Queued => {
                self.inner.queue.lock().await.retain(|id| *id != job_id);
                let snapshot = match self.finalize(job_id, JobStatus::Cancelled, |_| {}).await {
                    Some(job) => job,
                    // Lost a race against another transition; report whatever
                    // the job settled on.
                    None => self.get_job(job_id).await?,
                };
                self.publish_system_status().await;
                Ok(JobResponse::from(&snapshot))
            }
            JobStatus::Running => {
                if let Some(active) = self.inner.active.lock().await.as_ref() {
                    if active.job_id == job_id {
                        active.control.cancel(CancelReason::UserRequested);
                    }
                }
                // Terminal transition is published by the run task once the
                // process group is down.
                Ok(JobResponse::from(&self.get_job(job_id).await?))
            }
            _ => Ok(JobResponse::from(&self.get_job(job_id).await?)),
        }
    }

    /// Administrative escape hatch: tear down any active process tree, then
    /// remove the job record and its workspace regardless of status.
    pub async fn force_delete(&self, job_id: Uuid) -> AppResult<()> {
        let job = self.get_job(job_id).await?;

        self.inner.queue.lock().await.retain(|id| *id != job_id);

        let was_active = {
            let active = self.inner.active.lock().await;
            match active.as_ref() {
                Some(run) if run.job_id == job_id => {
                    run.control.cancel(CancelReason::UserRequested);
                    true
                }
                _ => false,
            }
        };

        if was_active {
            // Wait for the run task to drain so the workspace is not deleted
            // under a live process tree.
            let deadline = tokio::time::Instant::now() + FORCE_DELETE_DRAIN;
            loop {
                {
                    let active = self.inner.active.lock().await;
                    if !active.as_ref().is_some_and(|run| run.job_id == job_id) {
                        break;
                    }
                }
                if tokio::time::Instant::now() >= deadline {
                    warn!(job_id = %job_id, "Force delete proceeding before run drain");
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }

        self.inner.jobs.write().await.remove(&job_id);

        let workspace = self.workspace_for_job(&job);
        if let Err(e) = workspace.remove().await {
            warn!(job_id = %job_id, error = %e, "Failed to remove workspace");
        }

        info!(job_id = %job_id, "Job force-deleted");
        self.publish_system_status().await;
        Ok(())
    }

    /// Workspace handle for an existing job.
    pub async fn workspace(&self, job_id: Uuid) -> AppResult<JobWorkspace> {
        let job = self.get_job(job_id).await?;
        Ok(self.workspace_for_job(&job))
    }

    /// Compose the cluster-wide status snapshot.
    pub async fn system_status(&self) -> SystemStatus {
        let license = self.inner.license.status().await;
        let queued_jobs = self.inner.queue.lock().await.len();
        let jobs = self.inner.jobs.read().await;
        let total_jobs = jobs.len();

        let current_job = {
            let active = self.inner.active.lock().await;
            active
                .as_ref()
                .and_then(|run| jobs.get(&run.job_id))
                .map(|job| CurrentJobSummary {
                    id: job.id,
                    job_type: job.job_type,
                    status: job.status,
                    project_id: job.project_id.clone(),
                    progress: job.progress,
                    current_step: job.current_step.clone(),
                })
        };

        SystemStatus {
            license,
            current_job,
            queued_jobs,
            total_jobs,
        }
    }

    // ------------------------------------------------------------------
    // Scheduler internals
    // ------------------------------------------------------------------

    /// One scheduling pass: expire stale queued jobs, then admit the oldest
    /// queued job if the slot is free and a license seat is reachable.
    pub(crate) async fn tick(&self) {
        self.expire_stale_queued().await;

        if self.inner.active.lock().await.is_some() {
            return;
        }

        let Some(job_id) = self.inner.queue.lock().await.front().copied() else {
            return;
        };

        // Denial is a retry condition: the job stays queued for the next
        // pass, bounded only by its own admission deadline.
        if !self.inner.license.check_now().await {
            return;
        }

        self.inner.queue.lock().await.retain(|id| *id != job_id);
        self.admit(job_id).await;
    }

    /// Cancel queued jobs whose admission deadline has passed. The deadline
    /// is measured from when admission attempts started, not from any
    /// license grant.
    async fn expire_stale_queued(&self) {
        let expired: Vec<Uuid> = {
            let queue = self.inner.queue.lock().await;
            let jobs = self.inner.jobs.read().await;
            let now = Utc::now();
            queue
                .iter()
                .filter(|id| {
                    jobs.get(id).is_some_and(|job| {
                        let deadline =
                            job.created_at + chrono::Duration::seconds(job.config.timeout_secs as i64);
                        now > deadline
                    })
                })
                .copied()
                .collect()
        };

        for job_id in expired {
            warn!(job_id = %job_id, "Queued job exceeded its timeout waiting for admission");
            self.inner.queue.lock().await.retain(|id| *id != job_id);
            self.finalize(job_id, JobStatus::Cancelled, |_| {}).await;
            self.publish_system_status().await;
        }
    }

    /// Move a job into the run slot and spawn its run task.
    async fn admit(&self, job_id: Uuid) {
        // Occupy the slot before the job turns `running` so a cancel that
        // observes `running` always finds a control to signal.
        let Ok(timeout_secs) = self.get_job(job_id).await.map(|j| j.config.timeout_secs) else {
            return;
        };
        let control = RunControl::new(
            Duration::from_secs(timeout_secs),
            self.inner.config.termination_grace,
        );
        *self.inner.active.lock().await = Some(ActiveRun {
            job_id,
            control: control.clone(),
        });

        // A concurrent cancel may have already finalized the job between the
        // queue pop and here; never overwrite that.
        let mut admitted = false;
        let job = self
            .with_job(job_id, |job| {
                if job.status != JobStatus::Queued {
                    return;
                }
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
                admitted = true;
            })
            .await;
        let Some(job) = job.filter(|_| admitted) else {
            *self.inner.active.lock().await = None;
            return;
        };

        info!(job_id = %job_id, "Job admitted to run slot");
        self.inner
            .broadcaster
            .publish(WsEvent::job_status(job_id, JobStatus::Running));

        let workspace = self.workspace_for_job(&job);
        if let Err(e) = workspace.prepare(&job.config.include_directories).await {
            error!(job_id = %job_id, error = %e, "Workspace preparation failed");
            self.finalize(job_id, JobStatus::Failed, |job| {
                job.error = Some(format!("workspace preparation failed: {}", e));
            })
            .await;
            *self.inner.active.lock().await = None;
            self.publish_system_status().await;
            return;
        }

        self.publish_system_status().await;

        let spec = PipelineSpec {
            job_type: job.job_type,
            config: job.config.clone(),
            bin_dir: self.inner.config.bin_dir.clone(),
        };

        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.run_job(job_id, spec, workspace, control).await;
        });
    }

    /// Drive one job's pipeline to a terminal state.
    async fn run_job(
        &self,
        job_id: Uuid,
        spec: PipelineSpec,
        workspace: JobWorkspace,
        control: RunControl,
    ) {
        let (event_tx, event_rx) = mpsc::channel::<PipelineEvent>(256);
        let forwarder = tokio::spawn(self.clone().forward_events(job_id, event_rx));

        let outcome = pipeline::run(&spec, &workspace, &control, &event_tx).await;

        // Close the channel and drain the forwarder so every progress/log
        // event is published before the terminal status.
        drop(event_tx);
        let _ = forwarder.await;

        self.finish_job(job_id, &spec, &workspace, outcome).await;

        *self.inner.active.lock().await = None;
        self.publish_system_status().await;
        self.inner.wake.notify_one();
    }

    /// Publish pipeline events as they stream in, keeping job progress
    /// monotonic.
    async fn forward_events(self, job_id: Uuid, mut events: mpsc::Receiver<PipelineEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                PipelineEvent::StageStarted { stage } => {
                    if let Some(job) = self
                        .with_job(job_id, |job| {
                            job.current_step = Some(stage.to_string());
                        })
                        .await
                    {
                        self.inner.broadcaster.publish(WsEvent::job_progress(
                            job_id,
                            job.progress,
                            job.status,
                            job.current_step,
                        ));
                    }
                }
                PipelineEvent::Progress { percent, .. } => {
                    if let Some(job) = self
                        .with_job(job_id, |job| {
                            job.progress = job.progress.max(percent);
                        })
                        .await
                    {
                        self.inner.broadcaster.publish(WsEvent::job_progress(
                            job_id,
                            job.progress,
                            job.status,
                            job.current_step,
                        ));
                    }
                }
                PipelineEvent::LogLine { stage, line } => {
                    self.inner
                        .broadcaster
                        .publish(WsEvent::job_logs(job_id, stage, line));
                }
            }
        }
    }

    /// Map the pipeline outcome onto the job's terminal state. On success
    /// the relevant report parser runs first so results are in place before
    /// the terminal event.
    async fn finish_job(
        &self,
        job_id: Uuid,
        spec: &PipelineSpec,
        workspace: &JobWorkspace,
        outcome: Result<(), PipelineError>,
    ) {
        match outcome {
            Ok(()) => {
                let (reports, warning) = self.extract_reports(spec, workspace).await;
                self.finalize(job_id, JobStatus::Completed, |job| {
                    job.progress = 100;
                    job.cdc_report = reports.cdc;
                    job.lint_report = reports.lint;
                    job.test_results = reports.tests;
                    job.parse_warning = warning;
                })
                .await;
            }
            Err(PipelineError::Cancelled(reason)) => {
                info!(job_id = %job_id, reason = %reason, "Job cancelled");
                self.finalize(job_id, JobStatus::Cancelled, |_| {}).await;
            }
            Err(err @ PipelineError::Spawn { .. }) => {
                error!(job_id = %job_id, error = %err, "Tool spawn failed");
                self.finalize(job_id, JobStatus::Failed, |job| {
                    job.error = Some(err.to_string());
                })
                .await;
            }
            Err(PipelineError::StageExit {
                stage,
                code,
                stderr_tail,
            }) => {
                warn!(job_id = %job_id, stage = %stage, code, "Stage failed");
                self.finalize(job_id, JobStatus::Failed, |job| {
                    job.error = Some(if stderr_tail.is_empty() {
                        format!("{} stage exited with code {}", stage, code)
                    } else {
                        format!(
                            "{} stage exited with code {}\n{}",
                            stage, code, stderr_tail
                        )
                    });
                })
                .await;
            }
        }
    }

    /// Run the report parser matching the job type. Parser failure never
    /// fails the job: it degrades to a default-shaped report plus a warning.
    async fn extract_reports(
        &self,
        spec: &PipelineSpec,
        workspace: &JobWorkspace,
    ) -> (ParsedReports, Option<String>) {
        let mut reports = ParsedReports::default();

        let warning = match spec.job_type {
            JobType::Simulation => {
                let transcript = workspace.log_path(LogStage::Simulate);
                match tokio::fs::read_to_string(&transcript).await {
                    Ok(content) => match result_extraction::parse_vsim_results(&content) {
                        Ok(summary) => {
                            reports.tests = Some(summary);
                            None
                        }
                        Err(e) => {
                            warn!(error = %e, "Test-result parsing degraded");
                            reports.tests = Some(Default::default());
                            Some(format!("test results unavailable: {}", e))
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "Simulation transcript unreadable");
                        reports.tests = Some(Default::default());
                        Some(format!("simulation transcript unreadable: {}", e))
                    }
                }
            }
            JobType::Formal => {
                let mode = spec.config.formal_mode.unwrap_or(FormalMode::Lint);
                let report_file = workspace.reports_dir().join(match mode {
                    FormalMode::Lint => "lint_report.rpt",
                    FormalMode::Cdc | FormalMode::Rdc => "cdc_report.rpt",
                });
                match tokio::fs::read_to_string(&report_file).await {
                    Ok(content) => match mode {
                        FormalMode::Lint => match lint_extraction::parse_lint_report(&content) {
                            Ok(report) => {
                                reports.lint = Some(report);
                                None
                            }
                            Err(e) => {
                                warn!(error = %e, "Lint report parsing degraded");
                                reports.lint = Some(Default::default());
                                Some(format!("lint report unparseable: {}", e))
                            }
                        },
                        FormalMode::Cdc | FormalMode::Rdc => {
                            match cdc_extraction::parse_cdc_report(&content) {
                                Ok(report) => {
                                    reports.cdc = Some(report);
                                    None
                                }
                                Err(e) => {
                                    warn!(error = %e, "CDC report parsing degraded");
                                    reports.cdc = Some(Default::default());
                                    Some(format!("CDC report unparseable: {}", e))
                                }
                            }
                        }
                    },
                    Err(e) => {
                        warn!(report = %report_file.display(), error = %e, "Report file unreadable");
                        match mode {
                            FormalMode::Lint => reports.lint = Some(Default::default()),
                            FormalMode::Cdc | FormalMode::Rdc => {
                                reports.cdc = Some(Default::default())
                            }
                        }
                        Some(format!("report file unreadable: {}", e))
                    }
                }
            }
        };

        (reports, warning)
    }

    // ------------------------------------------------------------------
    // Shared state helpers
    // ------------------------------------------------------------------

    /// Mutate a job and return the updated snapshot.
    async fn with_job<F>(&self, job_id: Uuid, f: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.inner.jobs.write().await;
        let job = jobs.get_mut(&job_id)?;
        f(job);
        Some(job.clone())
    }

    /// Apply a terminal (or forward) transition, run extra mutation under
    /// the same lock, and publish the status event. Backward or
    /// terminal-overwriting transitions are dropped.
    async fn finalize<F>(&self, job_id: Uuid, status: JobStatus, extra: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut applied = false;
        let snapshot = self
            .with_job(job_id, |job| {
                if job.status.is_terminal() || status.rank() <= job.status.rank() {
                    return;
                }
                job.status = status;
                if status.is_terminal() {
                    job.completed_at = Some(Utc::now());
                }
                extra(job);
                applied = true;
            })
            .await?;

        if applied {
            self.inner
                .broadcaster
                .publish(WsEvent::job_status(job_id, status));
            Some(snapshot)
        } else {
            None
        }
    }

    async fn publish_system_status(&self) {
        let status = self.system_status().await;
        self.inner
            .broadcaster
            .publish(WsEvent::SystemStatusChanged(status));
    }

    fn project_dir(&self, project_id: &str) -> PathBuf {
        self.inner.config.data_dir.join("projects").join(project_id)
    }

    fn workspace_for_job(&self, job: &Job) -> JobWorkspace {
        JobWorkspace::new(
            &self.inner.config.data_dir.join("jobs"),
            self.project_dir(&job.project_id),
            job.id,
        )
    }
}

/// Reports produced at completion; at most one field is populated, matching
/// the job type and mode.
#[derive(Default)]
struct ParsedReports {
    cdc: Option<crate::models::CdcReportData>,
    lint: Option<crate::models::LintReportData>,
    tests: Option<crate::models::VsimResultSummary>,
}

/// Submission validation: the only error surfaced synchronously.
fn validate_submission(job_type: JobType, project_id: &str, config: &JobConfig) -> AppResult<()> {
    if config.dut_top.trim().is_empty() {
        return Err(AppError::Validation(
            "dutTop (top module) is required".to_string(),
        ));
    }
    if job_type == JobType::Formal && config.formal_mode.is_none() {
        return Err(AppError::Validation(
            "formalMode is required for formal jobs".to_string(),
        ));
    }
    if config.timeout_secs == 0 {
        return Err(AppError::Validation(
            "timeout must be greater than zero".to_string(),
        ));
    }
    if project_id.is_empty()
        || project_id.contains(['/', '\\'])
        || project_id.contains("..")
    {
        return Err(AppError::Validation("invalid project id".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::license::testing::ScriptedProbe;
    use crate::services::license::LicenseMonitor;
    use std::path::Path;
    use std::sync::Arc;

    fn stub_tool(dir: &Path, name: &str, script: &str) {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        dispatcher: JobDispatcher,
        broadcaster: EventBroadcaster,
        bin: PathBuf,
    }

    fn fixture(license_answers: impl IntoIterator<Item = bool>) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = tmp.path().join("data");
        let bin = tmp.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::create_dir_all(data_dir.join("projects/demo/src")).unwrap();
        std::fs::write(
            data_dir.join("projects/demo/src/top.sv"),
            "module top; endmodule\n",
        )
        .unwrap();

        let broadcaster = EventBroadcaster::new();
        let license = LicenseMonitor::new(
            Arc::new(ScriptedProbe::new(license_answers)),
            Duration::from_secs(30),
            broadcaster.clone(),
        );
        let dispatcher = JobDispatcher::new(
            DispatcherConfig {
                data_dir,
                bin_dir: Some(bin.clone()),
                poll_interval: Duration::from_millis(50),
                termination_grace: Duration::from_millis(200),
            },
            broadcaster.clone(),
            license,
        );

        Fixture {
            _tmp: tmp,
            dispatcher,
            broadcaster,
            bin,
        }
    }

    fn happy_sim_tools(bin: &Path) {
        stub_tool(bin, "vlog", "echo '-- Compiling module top'");
        stub_tool(bin, "vopt", "echo 'Optimized design name is tb_top_opt'");
        stub_tool(
            bin,
            "vsim",
            "echo '# TEST_PLAN: TC_A basic check'; echo '# TEST_RESULT: TC_A PASS @ 10.0ns - ok'",
        );
    }

    fn sim_config(timeout_secs: u64) -> JobConfig {
        JobConfig {
            dut_top: "tb_top".to_string(),
            formal_mode: None,
            timeout_secs,
            simulation_time: None,
            compile_options: None,
            include_directories: vec![],
        }
    }

    async fn wait_for_terminal(dispatcher: &JobDispatcher, job_id: Uuid) -> Job {
        for _ in 0..100 {
            let job = dispatcher.get_job(job_id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("job never reached a terminal state");
    }

    #[tokio::test]
    async fn submission_validation_rejects_bad_configs() {
        let fx = fixture([true]);

        let mut config = sim_config(60);
        config.dut_top = "  ".to_string();
        let err = fx
            .dispatcher
            .submit(JobType::Simulation, "demo", config)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = fx
            .dispatcher
            .submit(JobType::Formal, "demo", sim_config(60))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = fx
            .dispatcher
            .submit(JobType::Simulation, "demo", sim_config(0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = fx
            .dispatcher
            .submit(JobType::Simulation, "../demo", sim_config(60))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = fx
            .dispatcher
            .submit(JobType::Simulation, "no_such_project", sim_config(60))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn job_stays_queued_until_license_grants() {
        // Scenario: three denied checks, then availability.
        let fx = fixture([false, false, false, true]);
        happy_sim_tools(&fx.bin);

        let job = fx
            .dispatcher
            .submit(JobType::Simulation, "demo", sim_config(60))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        for _ in 0..3 {
            fx.dispatcher.tick().await;
            let job = fx.dispatcher.get_job(job.id).await.unwrap();
            assert_eq!(job.status, JobStatus::Queued, "denied tick must not admit");
        }

        fx.dispatcher.tick().await;
        let admitted = fx.dispatcher.get_job(job.id).await.unwrap();
        assert!(matches!(
            admitted.status,
            JobStatus::Running | JobStatus::Completed
        ));

        let done = wait_for_terminal(&fx.dispatcher, job.id).await;
        assert_eq!(done.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn at_most_one_job_runs_at_a_time() {
        let fx = fixture([true]);
        stub_tool(&fx.bin, "vlog", "sleep 0.4");
        stub_tool(&fx.bin, "vopt", "true");
        stub_tool(&fx.bin, "vsim", "echo '# TEST_RESULT: TC_A PASS @ 1.0ns - ok'");

        let first = fx
            .dispatcher
            .submit(JobType::Simulation, "demo", sim_config(60))
            .await
            .unwrap();
        let second = fx
            .dispatcher
            .submit(JobType::Simulation, "demo", sim_config(60))
            .await
            .unwrap();

        fx.dispatcher.tick().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        fx.dispatcher.tick().await;

        let a = fx.dispatcher.get_job(first.id).await.unwrap();
        let b = fx.dispatcher.get_job(second.id).await.unwrap();
        assert_eq!(a.status, JobStatus::Running);
        assert_eq!(b.status, JobStatus::Queued, "slot is single-occupancy");

        wait_for_terminal(&fx.dispatcher, first.id).await;
        fx.dispatcher.tick().await;
        let done = wait_for_terminal(&fx.dispatcher, second.id).await;
        assert_eq!(done.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn completed_job_has_results_before_terminal_event() {
        let fx = fixture([true]);
        happy_sim_tools(&fx.bin);
        let mut rx = fx.broadcaster.subscribe();

        let job = fx
            .dispatcher
            .submit(JobType::Simulation, "demo", sim_config(60))
            .await
            .unwrap();
        fx.dispatcher.tick().await;

        // Watch the event stream: on the terminal job-status, results must
        // already be attached and status ranks must never move backward.
        let mut last_rank = 0u8;
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("event stream stalled")
                .unwrap();
            if let WsEvent::JobStatus(payload) = msg.event {
                assert_eq!(payload.job_id, job.id);
                assert!(payload.status.rank() >= last_rank, "status moved backward");
                last_rank = payload.status.rank();
                if payload.status.is_terminal() {
                    assert_eq!(payload.status, JobStatus::Completed);
                    let job = fx.dispatcher.get_job(job.id).await.unwrap();
                    assert!(job.has_results(), "results must precede terminal event");
                    let tests = job.test_results.unwrap();
                    assert_eq!(tests.total_tests, 1);
                    assert_eq!(tests.passed_tests, 1);
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn failing_stage_fails_job_with_stderr_tail() {
        let fx = fixture([true]);
        stub_tool(&fx.bin, "vlog", "echo 'ERROR: syntax' >&2; exit 1");
        stub_tool(&fx.bin, "vopt", "echo unreachable");
        stub_tool(&fx.bin, "vsim", "echo unreachable");

        let job = fx
            .dispatcher
            .submit(JobType::Simulation, "demo", sim_config(60))
            .await
            .unwrap();
        fx.dispatcher.tick().await;

        let done = wait_for_terminal(&fx.dispatcher, job.id).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.unwrap().contains("syntax"));

        // Later stages never produced log files.
        let workspace = fx.dispatcher.workspace(job.id).await.unwrap();
        assert!(workspace.log_path(LogStage::Compile).is_file());
        assert!(!workspace.log_path(LogStage::Optimize).exists());
        assert!(!workspace.log_path(LogStage::Simulate).exists());
    }

    #[tokio::test]
    async fn timeout_cancels_job_and_keeps_partial_logs() {
        let fx = fixture([true]);
        stub_tool(&fx.bin, "vlog", "echo 'compile starting'; sleep 5");
        stub_tool(&fx.bin, "vopt", "echo unreachable");
        stub_tool(&fx.bin, "vsim", "echo unreachable");

        let job = fx
            .dispatcher
            .submit(JobType::Simulation, "demo", sim_config(1))
            .await
            .unwrap();
        let started = std::time::Instant::now();
        fx.dispatcher.tick().await;

        let done = wait_for_terminal(&fx.dispatcher, job.id).await;
        assert_eq!(done.status, JobStatus::Cancelled);
        assert!(done.error.is_none(), "timeout is cancellation, not failure");
        assert!(started.elapsed() < Duration::from_secs(4));

        let workspace = fx.dispatcher.workspace(job.id).await.unwrap();
        let log = std::fs::read_to_string(workspace.log_path(LogStage::Compile)).unwrap();
        assert!(!log.is_empty());
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let fx = fixture([false]);
        happy_sim_tools(&fx.bin);

        let job = fx
            .dispatcher
            .submit(JobType::Simulation, "demo", sim_config(60))
            .await
            .unwrap();

        let first = fx.dispatcher.cancel(job.id).await.unwrap();
        assert_eq!(first.status, JobStatus::Cancelled);

        let second = fx.dispatcher.cancel(job.id).await.unwrap();
        assert_eq!(second.status, JobStatus::Cancelled);

        // Cancelled while queued: never admitted afterwards.
        fx.dispatcher.tick().await;
        let job = fx.dispatcher.get_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_running_job_terminates_it() {
        let fx = fixture([true]);
        stub_tool(&fx.bin, "vlog", "sleep 5");
        stub_tool(&fx.bin, "vopt", "echo unreachable");
        stub_tool(&fx.bin, "vsim", "echo unreachable");

        let job = fx
            .dispatcher
            .submit(JobType::Simulation, "demo", sim_config(60))
            .await
            .unwrap();
        fx.dispatcher.tick().await;
        assert_eq!(
            fx.dispatcher.get_job(job.id).await.unwrap().status,
            JobStatus::Running
        );

        fx.dispatcher.cancel(job.id).await.unwrap();
        let done = wait_for_terminal(&fx.dispatcher, job.id).await;
        assert_eq!(done.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn queued_job_expires_after_its_own_timeout() {
        let fx = fixture([false]);
        happy_sim_tools(&fx.bin);

        let job = fx
            .dispatcher
            .submit(JobType::Simulation, "demo", sim_config(1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1200)).await;
        fx.dispatcher.tick().await;

        let done = fx.dispatcher.get_job(job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn force_delete_removes_record_and_workspace() {
        let fx = fixture([true]);
        happy_sim_tools(&fx.bin);

        let job = fx
            .dispatcher
            .submit(JobType::Simulation, "demo", sim_config(60))
            .await
            .unwrap();
        fx.dispatcher.tick().await;
        wait_for_terminal(&fx.dispatcher, job.id).await;

        let workspace = fx.dispatcher.workspace(job.id).await.unwrap();
        assert!(workspace.root().exists());

        fx.dispatcher.force_delete(job.id).await.unwrap();
        assert!(matches!(
            fx.dispatcher.get_job(job.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(!workspace.root().exists());
    }

    #[tokio::test]
    async fn formal_cdc_job_parses_tool_report() {
        let fx = fixture([true]);
        stub_tool(&fx.bin, "vlog", "echo '-- Compiling module top'");
        // The qverify stub writes a minimal CDC report into reports/.
        stub_tool(
            &fx.bin,
            "qverify",
            concat!(
                "mkdir -p reports\n",
                "cat > reports/cdc_report.rpt <<'RPT'\n",
                "Design: demo\n",
                "==== Violations ====\n",
                "Check: missing_synchronizer\n",
                "  Start: clk_a : a\n",
                "    File: a.sv\n",
                "    Line: 1\n",
                "  End: clk_b : b\n",
                "    File: b.sv\n",
                "    Line: 2\n",
                "==== Cautions ====\n",
                "==== Evaluations ====\n",
                "RPT",
            ),
        );

        let mut config = sim_config(60);
        config.formal_mode = Some(FormalMode::Cdc);
        let job = fx
            .dispatcher
            .submit(JobType::Formal, "demo", config)
            .await
            .unwrap();
        fx.dispatcher.tick().await;

        let done = wait_for_terminal(&fx.dispatcher, job.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.parse_warning.is_none());
        let report = done.cdc_report.unwrap();
        assert_eq!(report.summary.violations, 1);
        assert_eq!(report.summary.total_checks, 1);
    }

    #[tokio::test]
    async fn missing_report_degrades_to_default_with_warning() {
        let fx = fixture([true]);
        stub_tool(&fx.bin, "vlog", "true");
        // qverify succeeds but writes no report file.
        stub_tool(&fx.bin, "qverify", "true");

        let mut config = sim_config(60);
        config.formal_mode = Some(FormalMode::Lint);
        let job = fx
            .dispatcher
            .submit(JobType::Formal, "demo", config)
            .await
            .unwrap();
        fx.dispatcher.tick().await;

        let done = wait_for_terminal(&fx.dispatcher, job.id).await;
        assert_eq!(done.status, JobStatus::Completed, "parse issues never fail the job");
        assert!(done.parse_warning.is_some());
        let lint = done.lint_report.unwrap();
        assert_eq!(lint.check_details.len(), 0);
    }

    #[tokio::test]
    async fn system_status_reflects_queue_and_slot() {
        let fx = fixture([true]);
        stub_tool(&fx.bin, "vlog", "sleep 0.4");
        stub_tool(&fx.bin, "vopt", "true");
        stub_tool(&fx.bin, "vsim", "echo '# TEST_RESULT: TC_A PASS @ 1.0ns - ok'");

        let status = fx.dispatcher.system_status().await;
        assert!(status.current_job.is_none());
        assert_eq!(status.total_jobs, 0);

        let job = fx
            .dispatcher
            .submit(JobType::Simulation, "demo", sim_config(60))
            .await
            .unwrap();
        let status = fx.dispatcher.system_status().await;
        assert_eq!(status.queued_jobs, 1);
        assert_eq!(status.total_jobs, 1);

        fx.dispatcher.tick().await;
        let status = fx.dispatcher.system_status().await;
        let current = status.current_job.expect("run slot occupied");
        assert_eq!(current.id, job.id);
        assert_eq!(status.queued_jobs, 0);

        wait_for_terminal(&fx.dispatcher, job.id).await;
        let status = fx.dispatcher.system_status().await;
        assert!(status.current_job.is_none());
    }
}
