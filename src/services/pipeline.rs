//! Multi-stage external-tool pipeline execution.
//!
//! A pipeline is an ordered list of stages, each one external tool invocation
//! running in the job workspace with its own process group and log file.
//! Stage output is scanned line-by-line against an ordered marker table to
//! derive a monotonically non-decreasing progress percentage; stages own
//! disjoint progress bands so advancing to the next stage never regresses.
//! A non-zero exit aborts the pipeline — later stages are never attempted —
//! and the stderr tail becomes the job error. Whether the *design* passed is
//! decided by the report parsers, not here.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::{FormalMode, JobConfig, JobType, LogStage};
use crate::services::supervisor::{terminate_process_group, CancelReason, RunControl};
use crate::services::workspace::JobWorkspace;

/// Lines of stderr retained for a failed stage's error summary.
const STDERR_TAIL_LINES: usize = 20;

/// Pipeline failure taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Tool binary missing or not executable. Fails the job immediately.
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// A stage exited non-zero. Remaining stages are skipped.
    #[error("{stage} stage exited with code {code}")]
    StageExit {
        stage: LogStage,
        code: i32,
        stderr_tail: String,
    },

    /// Terminated by the supervisor (user cancel or timeout).
    #[error("run cancelled ({0})")]
    Cancelled(CancelReason),
}

/// Events streamed to the dispatcher while a pipeline runs.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StageStarted { stage: LogStage },
    Progress { stage: LogStage, percent: u8 },
    LogLine { stage: LogStage, line: String },
}

/// What the orchestrator needs to know to run a job's pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSpec {
    pub job_type: JobType,
    pub config: JobConfig,
    /// Directory holding the tool binaries; `None` resolves via `$PATH`.
    pub bin_dir: Option<PathBuf>,
}

/// One external tool invocation.
struct StageSpec {
    stage: LogStage,
    tool: &'static str,
    args: Vec<String>,
    /// Overall progress band `[floor, ceil]` allotted to this stage.
    band: (u8, u8),
    /// Ordered `(substring, target % within band)` milestones.
    markers: &'static [(&'static str, u8)],
}

// Milestone strings the tools print, with the within-band percentage each
// one pins. Matching takes the maximum target seen so far, never regressing.
const VLOG_MARKERS: &[(&str, u8)] = &[
    ("Start time:", 10),
    ("-- Compiling", 45),
    ("Top level modules:", 85),
    ("End time:", 100),
];
const VOPT_MARKERS: &[(&str, u8)] = &[
    ("Start time:", 10),
    ("-- Loading", 40),
    ("Optimized design name", 90),
    ("End time:", 100),
];
const VSIM_MARKERS: &[(&str, u8)] = &[
    ("Start time:", 5),
    ("# Loading", 20),
    ("# run", 45),
    ("$finish", 90),
    ("End time:", 100),
];
const QVERIFY_MARKERS: &[(&str, u8)] = &[
    ("Start time:", 5),
    ("Compiling", 25),
    ("Analyzing", 55),
    ("Writing report", 90),
    ("End time:", 100),
];

/// Default vsim run-control directive.
const DEFAULT_SIMULATION_TIME: &str = "run -all";

impl PipelineSpec {
    /// Build the ordered stage list for this job type.
    fn stages(&self) -> Vec<StageSpec> {
        let config = &self.config;
        let compile_args = {
            let mut args = vec![
                "-f".to_string(),
                "filelist.f".to_string(),
                "-f".to_string(),
                "compile_options.txt".to_string(),
            ];
            if let Some(options) = &config.compile_options {
                args.extend(options.split_whitespace().map(String::from));
            }
            args
        };

        match self.job_type {
            JobType::Simulation => {
                let optimized = format!("{}_opt", config.dut_top);
                let directive = config
                    .simulation_time
                    .as_deref()
                    .unwrap_or(DEFAULT_SIMULATION_TIME);
                vec![
                    StageSpec {
                        stage: LogStage::Compile,
                        tool: "vlog",
                        args: compile_args,
                        band: (0, 30),
                        markers: VLOG_MARKERS,
                    },
                    StageSpec {
                        stage: LogStage::Optimize,
                        tool: "vopt",
                        args: vec![config.dut_top.clone(), "-o".to_string(), optimized.clone()],
                        band: (30, 50),
                        markers: VOPT_MARKERS,
                    },
                    StageSpec {
                        stage: LogStage::Simulate,
                        tool: "vsim",
                        args: vec![
                            "-c".to_string(),
                            optimized,
                            "-do".to_string(),
                            format!("{}; quit -f", directive),
                        ],
                        band: (50, 100),
                        markers: VSIM_MARKERS,
                    },
                ]
            }
            JobType::Formal => {
                // Validation guarantees a mode for formal jobs; lint is the
                // defensive fallback.
                let mode = config.formal_mode.unwrap_or(FormalMode::Lint);
                vec![
                    StageSpec {
                        stage: LogStage::Compile,
                        tool: "vlog",
                        args: compile_args,
                        band: (0, 40),
                        markers: VLOG_MARKERS,
                    },
                    StageSpec {
                        stage: LogStage::Formal,
                        tool: "qverify",
                        args: vec![
                            "-c".to_string(),
                            "-od".to_string(),
                            "reports".to_string(),
                            "-do".to_string(),
                            format!("{} run -d {}; exit 0", mode, config.dut_top),
                        ],
                        band: (40, 100),
                        markers: QVERIFY_MARKERS,
                    },
                ]
            }
        }
    }

    fn tool_path(&self, tool: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(tool),
            None => PathBuf::from(tool),
        }
    }
}

/// Run the full pipeline for a job. Events are streamed through `events`;
/// dropping the receiver only mutes them, it does not stop the run.
pub async fn run(
    spec: &PipelineSpec,
    workspace: &JobWorkspace,
    control: &RunControl,
    events: &mpsc::Sender<PipelineEvent>,
) -> Result<(), PipelineError> {
    for stage_spec in spec.stages() {
        // A cancel between stages must not start the next one.
        if let Some(reason) = control.cancelled() {
            return Err(PipelineError::Cancelled(reason));
        }

        let _ = events
            .send(PipelineEvent::StageStarted {
                stage: stage_spec.stage,
            })
            .await;
        let _ = events
            .send(PipelineEvent::Progress {
                stage: stage_spec.stage,
                percent: stage_spec.band.0,
            })
            .await;

        run_stage(spec, &stage_spec, workspace, control, events).await?;

        let _ = events
            .send(PipelineEvent::Progress {
                stage: stage_spec.stage,
                percent: stage_spec.band.1,
            })
            .await;
    }
    Ok(())
}

/// Execute one stage to completion, streaming its output.
async fn run_stage(
    spec: &PipelineSpec,
    stage_spec: &StageSpec,
    workspace: &JobWorkspace,
    control: &RunControl,
    events: &mpsc::Sender<PipelineEvent>,
) -> Result<(), PipelineError> {
    let stage = stage_spec.stage;
    let tool_path = spec.tool_path(stage_spec.tool);
    let log_path = workspace.log_path(stage);

    info!(stage = %stage, tool = %tool_path.display(), "Stage starting");

    let mut log_file = tokio::fs::File::create(&log_path)
        .await
        .map_err(|source| PipelineError::Spawn {
            tool: stage_spec.tool.to_string(),
            source,
        })?;

    let mut cmd = Command::new(&tool_path);
    cmd.args(&stage_spec.args)
        .current_dir(workspace.root())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| PipelineError::Spawn {
        tool: stage_spec.tool.to_string(),
        source,
    })?;
    let pid = child.id();

    let (line_tx, mut line_rx) = mpsc::channel::<(String, bool)>(256);
    if let Some(stdout) = child.stdout.take() {
        spawn_line_reader(stdout, line_tx.clone(), false);
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_line_reader(stderr, line_tx.clone(), true);
    }
    drop(line_tx);

    let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut max_target: u8 = 0;
    let mut last_percent: u8 = stage_spec.band.0;
    let mut killed: Option<CancelReason> = None;
    let mut cancel_rx = control.subscribe();

    // A cancel signalled before the subscription was created would not wake
    // the watch below; catch it here so the fresh child dies immediately.
    if let Some(reason) = control.cancelled() {
        killed = Some(reason);
        if let Some(pid) = pid {
            terminate_process_group(pid, control.grace());
        }
    }

    loop {
        tokio::select! {
            maybe_line = line_rx.recv() => {
                let Some((line, is_stderr)) = maybe_line else {
                    // Both pipes closed: the process is exiting.
                    break;
                };

                if let Err(e) = log_file.write_all(line.as_bytes()).await {
                    warn!(stage = %stage, error = %e, "Failed to append to stage log");
                } else {
                    let _ = log_file.write_all(b"\n").await;
                }

                if is_stderr {
                    if stderr_tail.len() == STDERR_TAIL_LINES {
                        stderr_tail.pop_front();
                    }
                    stderr_tail.push_back(line.clone());
                }

                for (marker, target) in stage_spec.markers {
                    if *target > max_target && line.contains(marker) {
                        max_target = *target;
                    }
                }
                let percent = band_percent(stage_spec.band, max_target);
                if percent > last_percent {
                    last_percent = percent;
                    let _ = events.send(PipelineEvent::Progress { stage, percent }).await;
                }

                let _ = events.send(PipelineEvent::LogLine { stage, line }).await;
            }

            changed = cancel_rx.changed(), if killed.is_none() => {
                if changed.is_ok() {
                    if let Some(reason) = *cancel_rx.borrow() {
                        killed = Some(reason);
                        if let Some(pid) = pid {
                            terminate_process_group(pid, control.grace());
                        }
                    }
                }
            }

            _ = tokio::time::sleep_until(control.deadline()), if killed.is_none() => {
                control.cancel(CancelReason::Timeout);
                killed = Some(control.cancelled().unwrap_or(CancelReason::Timeout));
                if let Some(pid) = pid {
                    terminate_process_group(pid, control.grace());
                }
            }
        }
    }

    if let Err(e) = log_file.flush().await {
        warn!(stage = %stage, error = %e, "Failed to flush stage log");
    }

    let status = child.wait().await.map_err(|source| PipelineError::Spawn {
        tool: stage_spec.tool.to_string(),
        source,
    })?;

    if let Some(reason) = killed.or_else(|| control.cancelled()) {
        info!(stage = %stage, reason = %reason, "Stage terminated");
        return Err(PipelineError::Cancelled(reason));
    }

    if !status.success() {
        let code = status.code().unwrap_or(-1);
        warn!(stage = %stage, code, "Stage failed");
        return Err(PipelineError::StageExit {
            stage,
            code,
            stderr_tail: stderr_tail.into_iter().collect::<Vec<_>>().join("\n"),
        });
    }

    debug!(stage = %stage, "Stage completed");
    Ok(())
}

/// Map a within-band target to an overall percentage.
fn band_percent(band: (u8, u8), target: u8) -> u8 {
    let (floor, ceil) = band;
    let span = (ceil - floor) as u16;
    floor + (span * target as u16 / 100) as u8
}

fn spawn_line_reader(
    stream: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    tx: mpsc::Sender<(String, bool)>,
    is_stderr: bool,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send((line, is_stderr)).await.is_err() {
                break;
            }
        }
    });
}
