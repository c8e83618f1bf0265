//! Parsed simulation test-result schema.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Outcome of a test case across all its runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Pass,
    Fail,
    NotTested,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::NotTested => "NOT_TESTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PASS" => Some(Self::Pass),
            "FAIL" => Some(Self::Fail),
            "NOT_TESTED" => Some(Self::NotTested),
            _ => None,
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One pass/fail marker observed in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TestOccurrence {
    /// Simulation time, not wall clock.
    pub time_stamp: f64,
    pub status: TestStatus,
    pub description: String,
}

/// Aggregated result for a single test id.
///
/// Invariants: `pass_count + fail_count <= total_runs`, and
/// `total_runs == 0` iff `status == NOT_TESTED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TestCaseResult {
    pub test_id: String,
    pub name: String,
    pub status: TestStatus,
    pub pass_count: u32,
    pub fail_count: u32,
    pub total_runs: u32,
    pub occurrences: Vec<TestOccurrence>,
}

/// Full parsed transcript summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct VsimResultSummary {
    pub test_results: Vec<TestCaseResult>,
    pub total_tests: u32,
    pub passed_tests: u32,
    pub failed_tests: u32,
    pub not_tested_tests: u32,
}

impl VsimResultSummary {
    /// Recompute aggregate totals from the per-test list.
    pub fn recount(&mut self) {
        self.total_tests = self.test_results.len() as u32;
        self.passed_tests = 0;
        self.failed_tests = 0;
        self.not_tested_tests = 0;
        for result in &self.test_results {
            match result.status {
                TestStatus::Pass => self.passed_tests += 1,
                TestStatus::Fail => self.failed_tests += 1,
                TestStatus::NotTested => self.not_tested_tests += 1,
            }
        }
    }
}
