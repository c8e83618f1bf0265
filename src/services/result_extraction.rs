//! Extraction service for simulation transcripts.
//!
//! The testbench tags each check with a test id and a simulation timestamp:
//!
//! ```text
//! # TEST_PLAN: TC_RESET Reset sequence releases cleanly
//! # TEST_RESULT: TC_RESET PASS @ 125.5ns - reset deasserted
//! ```
//!
//! Occurrences are grouped by test id, sorted ascending by simulation time
//! (a float, not wall clock) and aggregated into pass/fail/total counts. A
//! planned test with no occurrences is reported `NOT_TESTED`.

use std::collections::HashMap;

use crate::models::{TestCaseResult, TestOccurrence, TestStatus, VsimResultSummary};
use crate::services::ExtractionError;

const PLAN_MARKER: &str = "TEST_PLAN:";
const RESULT_MARKER: &str = "TEST_RESULT:";

/// Parse a vsim transcript into aggregated per-test results.
///
/// Returns an error when the transcript carries no test markers at all.
pub fn parse_vsim_results(content: &str) -> Result<VsimResultSummary, ExtractionError> {
    // Insertion order: planned tests first, then unplanned ids as seen.
    let mut order: Vec<String> = Vec::new();
    let mut names: HashMap<String, String> = HashMap::new();
    let mut occurrences: HashMap<String, Vec<TestOccurrence>> = HashMap::new();

    for line in content.lines() {
        if let Some(rest) = marker_payload(line, PLAN_MARKER) {
            let mut parts = rest.splitn(2, char::is_whitespace);
            let Some(test_id) = parts.next().filter(|id| !id.is_empty()) else {
                continue;
            };
            if !names.contains_key(test_id) {
                order.push(test_id.to_string());
            }
            let name = parts.next().map(str::trim).unwrap_or("");
            names.insert(
                test_id.to_string(),
                if name.is_empty() {
                    test_id.to_string()
                } else {
                    name.to_string()
                },
            );
        } else if let Some(rest) = marker_payload(line, RESULT_MARKER) {
            let Some((test_id, occurrence)) = parse_result(rest) else {
                continue;
            };
            if !names.contains_key(&test_id) {
                order.push(test_id.clone());
                names.insert(test_id.clone(), test_id.clone());
            }
            occurrences.entry(test_id).or_default().push(occurrence);
        }
    }

    if order.is_empty() {
        return Err(ExtractionError::MalformedReport(
            "no test markers found in transcript".to_string(),
        ));
    }

    let mut summary = VsimResultSummary::default();
    for test_id in order {
        let mut runs = occurrences.remove(&test_id).unwrap_or_default();
        runs.sort_by(|a, b| a.time_stamp.total_cmp(&b.time_stamp));

        let pass_count = runs.iter().filter(|o| o.status == TestStatus::Pass).count() as u32;
        let fail_count = runs.iter().filter(|o| o.status == TestStatus::Fail).count() as u32;
        let total_runs = runs.len() as u32;
        let status = if total_runs == 0 {
            TestStatus::NotTested
        } else if fail_count > 0 {
            TestStatus::Fail
        } else {
            TestStatus::Pass
        };

        summary.test_results.push(TestCaseResult {
            name: names.remove(&test_id).unwrap_or_else(|| test_id.clone()),
            test_id,
            status,
            pass_count,
            fail_count,
            total_runs,
            occurrences: runs,
        });
    }

    summary.recount();
    Ok(summary)
}

/// Strip transcript prefixes (`# `) and return the text after a marker.
fn marker_payload<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let idx = line.find(marker)?;
    Some(line[idx + marker.len()..].trim())
}

/// Parse `<id> <PASS|FAIL> @ <time><unit> - <description>`.
fn parse_result(rest: &str) -> Option<(String, TestOccurrence)> {
    let (head, description) = match rest.split_once(" - ") {
        Some((head, desc)) => (head, desc.trim()),
        None => (rest, ""),
    };

    let mut tokens = head.split_whitespace();
    let test_id = tokens.next()?.to_string();
    let status = match tokens.next()? {
        "PASS" => TestStatus::Pass,
        "FAIL" => TestStatus::Fail,
        _ => return None,
    };

    // Accept `@ 125.5ns`, `@125.5ns` and a bare time token.
    let mut time_token = tokens.next()?;
    if time_token == "@" {
        time_token = tokens.next()?;
    } else if let Some(stripped) = time_token.strip_prefix('@') {
        time_token = stripped;
    }
    let time_stamp = parse_sim_time(time_token)?;

    Some((
        test_id,
        TestOccurrence {
            time_stamp,
            status,
            description: description.to_string(),
        },
    ))
}

/// Parse a simulation time token, dropping a trailing unit suffix (ns, ps, …).
fn parse_sim_time(token: &str) -> Option<f64> {
    let digits_end = token
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+')
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    token[..digits_end].parse().ok()
}
