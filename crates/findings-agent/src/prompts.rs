//! Prompts for radiology finding extraction.

use findings_core::models::{BodyRegion, NonFindingCategory, Presence};

/// System prompt describing the extraction task and the output shape.
pub const SYSTEM_PROMPT: &str = r#"You extract structured clinical findings from radiology reports.

Rules:
1. Go through the report section by section and extract every finding, whether present, absent, possible or indeterminate.
2. Name findings with short lowercase clinical terms ("renal calculus", "hepatic steatosis").
3. Normal statements are absent abnormalities: "clear lungs" is "pulmonary airspace abnormality", absent.
4. report_text must be copied exactly from the report. Never paraphrase.
5. Give each distinct instance its own finding (left and right kidney stones are two findings).
6. Use "possible" for hedged language such as "suggestive of" or "cannot exclude".
7. Put technique, indication, comparison, clinical history and impression text in non_finding_text.

Attribute keys: size, acuity, change_from_prior, severity, count, morphology.

Infer body_region from the exam type when the text does not state it. Use the most
specific anatomy mentioned for specific_anatomy, and laterality only when stated or clearly implied.

Output one JSON object with exam_info, findings and non_finding_text."#;

/// User prompt for one report.
pub fn make_extraction_prompt(report_text: &str, exam_description: Option<&str>) -> String {
    let rule = "-".repeat(40);
    let mut prompt = String::new();

    if let Some(description) = exam_description.filter(|d| !d.is_empty()) {
        prompt.push_str(&format!("Exam Description: {}\n\n", description));
    }

    prompt.push_str(&format!(
        "RADIOLOGY REPORT:\n{rule}\n{report}\n{rule}\n\n\
         Extract all findings from this report into the structured format described above.",
        rule = rule,
        report = report_text
    ));
    prompt
}

/// Allowed enum values, listed so an agent can constrain its output.
pub fn vocabulary() -> String {
    let join = |items: Vec<&str>| items.join(", ");
    format!(
        "presence: {}\nbody_region: {}\nnon_finding_text.category: {}",
        join(Presence::ALL.iter().map(|p| p.as_str()).collect()),
        join(BodyRegion::ALL.iter().map(|r| r.as_str()).collect()),
        join(NonFindingCategory::ALL.iter().map(|c| c.as_str()).collect()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_with_description() {
        let prompt = make_extraction_prompt("No acute findings.", Some("CT Head WO"));
        assert!(prompt.starts_with("Exam Description: CT Head WO\n\nRADIOLOGY REPORT:\n"));
        assert!(prompt.contains("\nNo acute findings.\n----------------------------------------\n"));
    }

    #[test]
    fn test_prompt_without_description() {
        let prompt = make_extraction_prompt("No acute findings.", None);
        assert!(prompt.starts_with("RADIOLOGY REPORT:"));
        assert_eq!(prompt, make_extraction_prompt("No acute findings.", Some("")));
    }

    #[test]
    fn test_vocabulary() {
        let vocab = vocabulary();
        assert!(vocab.contains("presence: present, absent, possible, indeterminate"));
        assert!(vocab.contains("upper extremity"));
        assert!(vocab.contains("clinical_history"));
    }
}
