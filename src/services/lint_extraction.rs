//! Extraction service for qverify lint check-database dumps.
//!
//! The dump carries a quality score line followed by one block per check
//! with severity, category, alias and message, each nesting its violations.
//! Per the report contract, severity summary counts are per *check*, not per
//! violation, and absolute tool paths are reduced to basenames before being
//! surfaced.

use tracing::debug;

use crate::models::{LintCheck, LintReportData, LintSeverity, LintViolation};
use crate::services::ExtractionError;

/// Parse a full lint report.
///
/// Returns an error when neither a quality score nor any check block is
/// present; otherwise salvages whatever parses.
pub fn parse_lint_report(content: &str) -> Result<LintReportData, ExtractionError> {
    let mut report = LintReportData::default();
    let mut current_check: Option<LintCheck> = None;
    let mut current_violation: Option<LintViolation> = None;
    let mut saw_score = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(value) = trimmed.strip_prefix("Check:") {
            finish_check(&mut report, &mut current_check, &mut current_violation);
            current_check = parse_check_header(value);
            if current_check.is_none() {
                debug!("Skipping lint check with unparseable header");
            }
            continue;
        }

        if let Some(value) = trimmed.strip_prefix("Violation:") {
            if let Some(check) = current_check.as_mut() {
                if let Some(violation) = current_violation.take() {
                    check.violations.push(violation);
                }
                current_violation = Some(LintViolation {
                    description: strip_paths(value.trim()),
                    file: None,
                    line: None,
                    module: None,
                    hierarchy: None,
                });
            }
            continue;
        }

        if let Some(violation) = current_violation.as_mut() {
            if let Some(value) = trimmed.strip_prefix("Module:") {
                violation.module = Some(value.trim().to_string());
                continue;
            } else if let Some(value) = trimmed.strip_prefix("File:") {
                violation.file = Some(basename(value.trim()).to_string());
                continue;
            } else if let Some(value) = trimmed.strip_prefix("Line:") {
                violation.line = value.trim().parse().ok();
                continue;
            } else if let Some(value) = trimmed.strip_prefix("Hierarchy:") {
                violation.hierarchy = Some(value.trim().to_string());
                continue;
            }
        }

        if let Some(check) = current_check.as_mut() {
            if let Some(value) = trimmed.strip_prefix("Category:") {
                check.category = value.trim().to_string();
            } else if let Some(value) = trimmed.strip_prefix("Message:") {
                check.message = strip_paths(value.trim());
            }
            continue;
        }

        // Preamble lines.
        if let Some(value) = trimmed.strip_prefix("Design:") {
            report.design = value.trim().to_string();
        } else if let Some(value) = trimmed.strip_prefix("Timestamp:") {
            report.timestamp = value.trim().to_string();
        } else if let Some(value) = trimmed.strip_prefix("Design Quality Score:") {
            if let Ok(score) = value.trim().parse::<f64>() {
                report.design_quality_score = score.clamp(0.0, 100.0);
                saw_score = true;
            }
        }
    }
    finish_check(&mut report, &mut current_check, &mut current_violation);

    if !saw_score && report.check_details.is_empty() {
        return Err(ExtractionError::MalformedReport(
            "no quality score or check blocks found".to_string(),
        ));
    }

    report.recount();
    Ok(report)
}

fn finish_check(
    report: &mut LintReportData,
    check: &mut Option<LintCheck>,
    violation: &mut Option<LintViolation>,
) {
    if let Some(mut check) = check.take() {
        if let Some(violation) = violation.take() {
            check.violations.push(violation);
        }
        report.check_details.push(check);
    }
    *violation = None;
}

/// Parse `name [alias] (severity)`. The alias is optional; a check with an
/// unrecognizable severity is skipped entirely.
fn parse_check_header(value: &str) -> Option<LintCheck> {
    let value = value.trim();

    let (severity_start, severity_end) = (value.rfind('(')?, value.rfind(')')?);
    if severity_end < severity_start {
        return None;
    }
    let severity = LintSeverity::parse(value[severity_start + 1..severity_end].trim())?;

    let head = value[..severity_start].trim();
    let (name, alias) = match (head.find('['), head.rfind(']')) {
        (Some(open), Some(close)) if close > open => (
            head[..open].trim().to_string(),
            head[open + 1..close].trim().to_string(),
        ),
        _ => (head.to_string(), String::new()),
    };
    if name.is_empty() {
        return None;
    }

    Some(LintCheck {
        check_name: name,
        category: String::new(),
        alias,
        message: String::new(),
        severity,
        violations: Vec::new(),
    })
}

/// Last path component, handling both separators.
fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Replace absolute path tokens embedded in free text with their basename.
fn strip_paths(text: &str) -> String {
    text.split(' ')
        .map(|token| {
            let quoted = token.starts_with('\'') && token.ends_with('\'') && token.len() >= 2;
            let inner = if quoted {
                &token[1..token.len() - 1]
            } else {
                token
            };
            if inner.starts_with('/') && inner.len() > 1 {
                let base = basename(inner);
                if quoted {
                    format!("'{}'", base)
                } else {
                    base.to_string()
                }
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
