//! Human-readable output for extractions and evaluation reports.

use findings_core::evaluate::{ConfusionCounts, EvaluationReport, Scores};
use findings_core::models::{Presence, ReportExtraction, ValidationResult};
use findings_core::validation::preview;

const WIDTH: usize = 70;
const TEXT_PREVIEW_CHARS: usize = 60;
const MESSAGE_PREVIEW_CHARS: usize = 80;
const ABSENT_PER_LINE: usize = 4;

/// Summary of an extraction, with validation status when one is given.
pub fn render_summary(extraction: &ReportExtraction, validation: Option<&ValidationResult>) -> String {
    let heavy = "=".repeat(WIDTH);
    let light = "-".repeat(WIDTH);
    let mut lines: Vec<String> = Vec::new();

    lines.push(heavy.clone());
    lines.push("RADIOLOGY REPORT EXTRACTION".to_string());
    lines.push(heavy.clone());
    lines.push(String::new());

    let exam = &extraction.exam_info;
    lines.push(format!("Study: {}", exam.study_description));
    let optional = [
        ("Date", &exam.study_date),
        ("Modality", &exam.modality),
        ("Body Part", &exam.body_part),
    ];
    for (label, value) in optional {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            lines.push(format!("{}: {}", label, value));
        }
    }
    lines.push(String::new());

    let counts = extraction.count_by_presence();
    let count_line = Presence::ALL
        .iter()
        .map(|p| {
            let label = p.as_str();
            format!(
                "{}{}: {}",
                label[..1].to_uppercase(),
                &label[1..],
                counts.get(p).copied().unwrap_or(0)
            )
        })
        .collect::<Vec<_>>()
        .join(" | ");

    lines.push(light.clone());
    lines.push(format!("FINDINGS SUMMARY: {} total", extraction.findings.len()));
    lines.push(format!("  {}", count_line));
    lines.push(light.clone());
    lines.push(String::new());

    let present: Vec<_> = extraction.findings_with(Presence::Present).collect();
    if !present.is_empty() {
        lines.push("PRESENT FINDINGS:".to_string());
        lines.push(String::new());
        for (i, finding) in present.iter().enumerate() {
            lines.push(format!("  {}. {}", i + 1, finding.finding_name));
            if let Some(location) = &finding.location {
                lines.push(format!("     Location: {}", location.display_parts()));
            }
            if !finding.attributes.is_empty() {
                let attrs = finding
                    .attributes
                    .iter()
                    .map(|a| format!("{}={}", a.key, a.value))
                    .collect::<Vec<_>>()
                    .join(", ");
                lines.push(format!("     Attributes: {}", attrs));
            }
            let text = preview(&finding.report_text, TEXT_PREVIEW_CHARS);
            let ellipsis = if text.len() < finding.report_text.len() { "..." } else { "" };
            lines.push(format!("     Text: \"{}{}\"", text, ellipsis));
            lines.push(String::new());
        }
    }

    let absent: Vec<&str> = extraction
        .findings_with(Presence::Absent)
        .map(|f| f.finding_name.as_str())
        .collect();
    if !absent.is_empty() {
        lines.push("ABSENT FINDINGS (ruled out):".to_string());
        for chunk in absent.chunks(ABSENT_PER_LINE) {
            lines.push(format!("  {}", chunk.join(", ")));
        }
        lines.push(String::new());
    }

    let possible: Vec<_> = extraction.findings_with(Presence::Possible).collect();
    if !possible.is_empty() {
        lines.push("POSSIBLE FINDINGS (hedged/uncertain):".to_string());
        for finding in possible {
            lines.push(format!("  - {}", finding.finding_name));
        }
        lines.push(String::new());
    }

    if !extraction.non_finding_text.is_empty() {
        lines.push(light.clone());
        lines.push(format!(
            "NON-FINDING TEXT: {} segments",
            extraction.non_finding_text.len()
        ));
        let mut categories: Vec<_> = extraction.count_by_category().into_iter().collect();
        categories.sort_by_key(|(category, _)| category.as_str());
        for (category, count) in categories {
            lines.push(format!("  {}: {}", category, count));
        }
        lines.push(String::new());
    }

    if let Some(validation) = validation {
        lines.push(light);
        lines.push("VALIDATION:".to_string());
        let status = if validation.is_valid { "PASSED" } else { "FAILED" };
        lines.push(format!("  Status: {}", status));

        let errors = &validation.verbatim_errors;
        if !errors.is_empty() {
            lines.push(format!("  Verbatim Errors: {}", errors.len()));
            for error in errors.iter().take(3) {
                lines.push(format!("    - {}", preview(error, MESSAGE_PREVIEW_CHARS)));
            }
            if errors.len() > 3 {
                lines.push(format!("    ... and {} more", errors.len() - 3));
            }
        }

        let warnings = &validation.coverage_warnings;
        if !warnings.is_empty() {
            lines.push(format!("  Coverage Warnings: {}", warnings.len()));
            for warning in warnings.iter().take(2) {
                lines.push(format!("    - {}", preview(warning, MESSAGE_PREVIEW_CHARS)));
            }
        }
        lines.push(String::new());
    }

    lines.push(heavy);
    lines.join("\n")
}

/// Overall and per-finding score tables.
pub fn render_evaluation(report: &EvaluationReport) -> String {
    let headers = ["scope", "TP", "FP", "FN", "TN", "Prec", "Rec", "F1"];
    let overall = vec![score_row("micro-avg", &report.overall_counts, &report.overall)];

    let mut by_finding_headers = headers;
    by_finding_headers[0] = "finding";
    let by_finding: Vec<Vec<String>> = report
        .per_finding
        .iter()
        .map(|f| score_row(&f.finding, &f.counts, &f.scores))
        .collect();

    format!(
        "\n== Overall ==\n{}\n\n== By Finding ==\n{}",
        format_table(&headers, &overall),
        format_table(&by_finding_headers, &by_finding)
    )
}

fn score_row(label: &str, counts: &ConfusionCounts, scores: &Scores) -> Vec<String> {
    vec![
        label.to_string(),
        counts.tp.to_string(),
        counts.fp.to_string(),
        counts.fn_.to_string(),
        counts.tn.to_string(),
        format!("{:.2}", scores.precision),
        format!("{:.2}", scores.recall),
        format!("{:.2}", scores.f1),
    ]
}

/// Plain aligned table: first column left-aligned, the rest right-aligned.
fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render_row = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (cell, width))| {
                if i == 0 {
                    format!("{:<width$}", cell, width = *width)
                } else {
                    format!("{:>width$}", cell, width = *width)
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![render_row(headers.to_vec())];
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in rows {
        lines.push(render_row(row.iter().map(String::as_str).collect()));
    }
    lines.join("\n")
}
