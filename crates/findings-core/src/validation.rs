//! Post-extraction validation of agent output against the source report.
//!
//! Two checks:
//! - Verbatim: every quoted segment must be an exact substring of the report.
//! - Coverage (informational): every non-empty report line should be contained
//!   in at least one quoted segment.

use crate::models::{ReportExtraction, ValidationResult};

const QUOTE_PREVIEW_CHARS: usize = 100;
const LINE_PREVIEW_CHARS: usize = 80;

/// Validate an extraction against the report it was produced from.
///
/// Pure function; mismatches are reported in the result, never raised.
pub fn validate_extraction(report_text: &str, extraction: &ReportExtraction) -> ValidationResult {
    let mut verbatim_errors = Vec::new();

    for (i, finding) in extraction.findings.iter().enumerate() {
        if !report_text.contains(finding.report_text.as_str()) {
            verbatim_errors.push(format!(
                "Finding {} ({}): report_text not found verbatim in report. Quote: '{}...'",
                i,
                finding.finding_name,
                preview(&finding.report_text, QUOTE_PREVIEW_CHARS)
            ));
        }
    }

    for (i, segment) in extraction.non_finding_text.iter().enumerate() {
        if !report_text.contains(segment.text.as_str()) {
            verbatim_errors.push(format!(
                "Non-finding {} ({}): text not found verbatim in report. Text: '{}...'",
                i,
                segment.category,
                preview(&segment.text, QUOTE_PREVIEW_CHARS)
            ));
        }
    }

    for error in &verbatim_errors {
        tracing::warn!("{}", error);
    }

    let coverage_warnings = coverage_warnings(report_text, extraction);

    ValidationResult {
        is_valid: verbatim_errors.is_empty(),
        verbatim_errors,
        coverage_warnings,
    }
}

/// Report lines not contained in any quoted segment.
pub fn unaccounted_lines<'a>(report_text: &'a str, extraction: &ReportExtraction) -> Vec<&'a str> {
    let extracted: Vec<&str> = extraction
        .findings
        .iter()
        .map(|f| f.report_text.as_str())
        .chain(extraction.non_finding_text.iter().map(|nf| nf.text.as_str()))
        .collect();

    report_text
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !extracted.iter().any(|text| text.contains(line)))
        .collect()
}

fn coverage_warnings(report_text: &str, extraction: &ReportExtraction) -> Vec<String> {
    let unaccounted = unaccounted_lines(report_text, extraction);
    match unaccounted.first() {
        Some(first) => vec![format!(
            "Some report lines may not be fully accounted for: {} lines. Example: '{}...'",
            unaccounted.len(),
            preview(first, LINE_PREVIEW_CHARS)
        )],
        None => Vec::new(),
    }
}

/// First `max_chars` characters of `text`, never splitting a character.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
