//! Parsed clock-domain-crossing report schema.
//!
//! Produced by the CDC extraction service from a qverify report; also used
//! for reset-domain-crossing analysis, which emits the same report shape.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One endpoint of a crossing (start or end side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CdcEndpoint {
    pub clock: String,
    pub signal: String,
    pub file: String,
    pub line: u32,
}

/// A single CDC finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CdcDetail {
    /// Tool-reported issue type, e.g. `missing_synchronizer`.
    pub issue_type: String,
    pub start: CdcEndpoint,
    pub end: CdcEndpoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synchronizer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synchronizer_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

/// Counts derived from successfully parsed entries, never from the header
/// the tool prints (tool-reported totals may be stale).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CdcSummary {
    pub total_checks: u32,
    pub violations: u32,
    pub cautions: u32,
    pub evaluations: u32,
}

/// Full parsed CDC report.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CdcReportData {
    pub design: String,
    pub timestamp: String,
    pub summary: CdcSummary,
    pub violations: Vec<CdcDetail>,
    pub cautions: Vec<CdcDetail>,
    pub evaluations: Vec<CdcDetail>,
}

impl CdcReportData {
    /// Recompute the summary from the parsed entry lists.
    pub fn recount(&mut self) {
        self.summary = CdcSummary {
            total_checks: (self.violations.len() + self.cautions.len() + self.evaluations.len())
                as u32,
            violations: self.violations.len() as u32,
            cautions: self.cautions.len() as u32,
            evaluations: self.evaluations.len() as u32,
        };
    }
}
