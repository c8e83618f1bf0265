//! Parsed lint report schema.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Severity assigned to a lint check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LintSeverity {
    Error,
    Warning,
    Info,
}

impl LintSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

impl std::fmt::Display for LintSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single rule violation within a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LintViolation {
    pub description: String,
    /// Basename only; long absolute tool paths are stripped before surfacing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<String>,
}

/// One lint check block with its violations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LintCheck {
    pub check_name: String,
    pub category: String,
    pub alias: String,
    pub message: String,
    pub severity: LintSeverity,
    pub violations: Vec<LintViolation>,
}

/// Per-severity counts. Counts checks, not individual violations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LintSummary {
    pub error: u32,
    pub warning: u32,
    pub info: u32,
}

/// Full parsed lint report.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LintReportData {
    pub design: String,
    pub timestamp: String,
    /// Tool-reported quality score, 0–100.
    pub design_quality_score: f64,
    pub summary: LintSummary,
    pub check_details: Vec<LintCheck>,
}

impl LintReportData {
    /// Recompute the per-severity summary from the check list.
    pub fn recount(&mut self) {
        let mut summary = LintSummary::default();
        for check in &self.check_details {
            match check.severity {
                LintSeverity::Error => summary.error += 1,
                LintSeverity::Warning => summary.warning += 1,
                LintSeverity::Info => summary.info += 1,
            }
        }
        self.summary = summary;
    }
}
