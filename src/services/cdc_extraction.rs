//! Extraction service for qverify clock-domain-crossing reports.
//!
//! The report format is an unversioned external protocol: three fixed
//! sections (Violations / Cautions / Evaluations) delimited by `====`
//! header markers, each holding `Check:`-delimited entry blocks. Unknown
//! lines are ignored and partial entries are skipped rather than aborting
//! the parse. Summary counts always derive from the entries that actually
//! parsed — the totals printed in the report header may be stale.
//!
//! Reset-domain-crossing analysis emits the same shape and reuses this
//! parser.

use tracing::debug;

use crate::models::{CdcDetail, CdcEndpoint, CdcReportData};
use crate::services::ExtractionError;

/// Which of the three fixed sections entries are being collected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Violations,
    Cautions,
    Evaluations,
}

/// Parse a full CDC report.
///
/// Returns an error only when the text has none of the expected section
/// markers at all; anything partially recognizable yields a report with the
/// salvageable entries.
pub fn parse_cdc_report(content: &str) -> Result<CdcReportData, ExtractionError> {
    let mut report = CdcReportData::default();
    let mut current_section: Option<Section> = None;
    let mut entry_lines: Vec<&str> = Vec::new();
    let mut saw_section = false;

    for line in content.lines() {
        if let Some(section) = section_header(line) {
            flush_entry(&mut report, current_section, &mut entry_lines);
            current_section = Some(section);
            saw_section = true;
            continue;
        }

        if current_section.is_none() {
            // Report preamble.
            let trimmed = line.trim();
            if let Some(value) = trimmed.strip_prefix("Design:") {
                report.design = value.trim().to_string();
            } else if let Some(value) = trimmed.strip_prefix("Generated:") {
                report.timestamp = value.trim().to_string();
            }
            continue;
        }

        if line.trim_start().starts_with("Check:") {
            flush_entry(&mut report, current_section, &mut entry_lines);
            entry_lines.push(line);
        } else if !entry_lines.is_empty() {
            entry_lines.push(line);
        }
    }
    flush_entry(&mut report, current_section, &mut entry_lines);

    if !saw_section {
        return Err(ExtractionError::MalformedReport(
            "no CDC section markers found".to_string(),
        ));
    }

    report.recount();
    Ok(report)
}

/// Recognize `==== <Section> ====` delimiter lines.
fn section_header(line: &str) -> Option<Section> {
    let trimmed = line.trim();
    if !trimmed.starts_with("====") {
        return None;
    }
    if trimmed.contains("Violations") {
        Some(Section::Violations)
    } else if trimmed.contains("Cautions") {
        Some(Section::Cautions)
    } else if trimmed.contains("Evaluations") {
        Some(Section::Evaluations)
    } else {
        None
    }
}

fn flush_entry(report: &mut CdcReportData, section: Option<Section>, lines: &mut Vec<&str>) {
    if lines.is_empty() {
        return;
    }
    let entry = parse_entry(lines);
    lines.clear();

    let (Some(section), Some(detail)) = (section, entry) else {
        debug!("Skipping unparseable CDC entry");
        return;
    };
    match section {
        Section::Violations => report.violations.push(detail),
        Section::Cautions => report.cautions.push(detail),
        Section::Evaluations => report.evaluations.push(detail),
    }
}

/// Endpoint under construction while scanning an entry block.
#[derive(Default)]
struct PendingEndpoint {
    clock: Option<String>,
    signal: Option<String>,
    file: Option<String>,
    line: Option<u32>,
}

impl PendingEndpoint {
    fn from_clock_signal(value: &str) -> Option<Self> {
        let (clock, signal) = value.split_once(':')?;
        let clock = clock.trim();
        let signal = signal.trim();
        if clock.is_empty() || signal.is_empty() {
            return None;
        }
        Some(Self {
            clock: Some(clock.to_string()),
            signal: Some(signal.to_string()),
            file: None,
            line: None,
        })
    }

    fn build(self) -> Option<CdcEndpoint> {
        Some(CdcEndpoint {
            clock: self.clock?,
            signal: self.signal?,
            file: self.file?,
            line: self.line?,
        })
    }
}

#[derive(Clone, Copy)]
enum Side {
    Start,
    End,
}

/// Parse one `Check:` entry block. Returns `None` when a required field is
/// missing; the caller skips the entry.
fn parse_entry(lines: &[&str]) -> Option<CdcDetail> {
    let issue_type = lines
        .first()?
        .trim()
        .strip_prefix("Check:")?
        .trim()
        .to_string();
    if issue_type.is_empty() {
        return None;
    }

    let mut start: Option<PendingEndpoint> = None;
    let mut end: Option<PendingEndpoint> = None;
    let mut current: Option<Side> = None;
    let mut synchronizer_id = None;
    let mut synchronizer_length = None;
    let mut additional: Vec<String> = Vec::new();

    for line in &lines[1..] {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(value) = trimmed.strip_prefix("Start:") {
            start = PendingEndpoint::from_clock_signal(value);
            current = start.is_some().then_some(Side::Start);
        } else if let Some(value) = trimmed.strip_prefix("End:") {
            end = PendingEndpoint::from_clock_signal(value);
            current = end.is_some().then_some(Side::End);
        } else if let Some(value) = trimmed.strip_prefix("File:") {
            if let Some(pending) = pending_mut(&mut start, &mut end, current) {
                pending.file = Some(value.trim().to_string());
            }
        } else if let Some(value) = trimmed.strip_prefix("Line:") {
            if let Some(pending) = pending_mut(&mut start, &mut end, current) {
                pending.line = value.trim().parse().ok();
            }
        } else if let Some(value) = trimmed.strip_prefix("Synchronizer ID:") {
            synchronizer_id = Some(value.trim().to_string());
        } else if let Some(value) = trimmed.strip_prefix("Synchronizer Length:") {
            synchronizer_length = value.trim().parse().ok();
        } else {
            additional.push(trimmed.to_string());
        }
    }

    Some(CdcDetail {
        issue_type,
        start: start?.build()?,
        end: end?.build()?,
        synchronizer_id,
        synchronizer_length,
        additional_info: if additional.is_empty() {
            None
        } else {
            Some(additional.join(" "))
        },
    })
}

fn pending_mut<'a>(
    start: &'a mut Option<PendingEndpoint>,
    end: &'a mut Option<PendingEndpoint>,
    current: Option<Side>,
) -> Option<&'a mut PendingEndpoint> {
    match current? {
        Side::Start => start.as_mut(),
        Side::End => end.as_mut(),
    }
}
