//! Log file metadata for a job workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Pipeline stage a log file belongs to, inferred from its filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogStage {
    Compile,
    Optimize,
    Simulate,
    Formal,
    Other,
}

impl LogStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::Optimize => "optimize",
            Self::Simulate => "simulate",
            Self::Formal => "formal",
            Self::Other => "other",
        }
    }

    /// Map a log filename back to its stage.
    pub fn from_filename(name: &str) -> Self {
        match name.strip_suffix(".log").unwrap_or(name) {
            "compile" => Self::Compile,
            "optimize" => Self::Optimize,
            "simulate" => Self::Simulate,
            "formal" => Self::Formal,
            _ => Self::Other,
        }
    }

    /// Human-readable description of what the stage log contains.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Compile => "HDL compilation output (vlog)",
            Self::Optimize => "Design optimization output (vopt)",
            Self::Simulate => "Simulation transcript (vsim)",
            Self::Formal => "Formal analysis output (qverify)",
            Self::Other => "Auxiliary output",
        }
    }
}

impl std::fmt::Display for LogStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata for one log file. Append-only while its stage runs, immutable
/// once the stage exits.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogFile {
    pub filename: String,
    pub stage: LogStage,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    pub description: String,
}

/// Log listing response.
#[derive(Debug, Serialize, ToSchema)]
pub struct LogListResponse {
    pub logs: Vec<LogFile>,
}

/// Log content response.
#[derive(Debug, Serialize, ToSchema)]
pub struct LogContentResponse {
    pub filename: String,
    pub stage: LogStage,
    pub content: String,
}
