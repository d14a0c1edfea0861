//! Calling an extraction agent and checking what comes back.

use std::path::{Path, PathBuf};

use findings_core::models::{ReportExtraction, ValidationResult};
use findings_core::validation::validate_extraction;
use thiserror::Error;

/// Agent errors.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("Agent call failed: {0}")]
    Agent(String),

    #[error("Failed to read recorded response {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Anything that turns a report into a structured extraction.
pub trait ExtractionAgent {
    fn extract(
        &self,
        report_text: &str,
        exam_description: Option<&str>,
    ) -> AgentResult<ReportExtraction>;
}

/// Parse a raw model response into an extraction.
///
/// Prose before the first `{` or after the last `}` is ignored.
pub fn parse_agent_output(raw: &str) -> AgentResult<ReportExtraction> {
    let json_start = raw
        .find('{')
        .ok_or_else(|| AgentError::InvalidFormat("No JSON object found in response".into()))?;
    let json_end = raw
        .rfind('}')
        .filter(|end| *end > json_start)
        .ok_or_else(|| AgentError::InvalidFormat("No closing brace found in response".into()))?;

    let extraction: ReportExtraction = serde_json::from_str(&raw[json_start..=json_end])?;
    Ok(extraction)
}

/// An extraction together with its validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedExtraction {
    pub extraction: ReportExtraction,
    pub validation: ValidationResult,
    /// Number of agent calls made, at least 1
    pub attempts: u32,
}

/// Call the agent and validate, re-calling while the result has verbatim errors.
///
/// Makes at most `max_attempts` calls (a value of 0 is treated as 1). When every
/// attempt fails validation the last extraction is returned as-is with its
/// errors; agent failures are returned immediately.
pub fn extract_validated<A: ExtractionAgent + ?Sized>(
    agent: &A,
    report_text: &str,
    exam_description: Option<&str>,
    max_attempts: u32,
) -> AgentResult<ValidatedExtraction> {
    let max_attempts = max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let extraction = agent.extract(report_text, exam_description)?;
        let validation = validate_extraction(report_text, &extraction);

        if validation.is_valid || attempts >= max_attempts {
            if !validation.is_valid {
                tracing::warn!(
                    "Extraction still has {} verbatim errors after {} attempts",
                    validation.verbatim_errors.len(),
                    attempts
                );
            }
            return Ok(ValidatedExtraction {
                extraction,
                validation,
                attempts,
            });
        }

        tracing::info!(
            "Attempt {}/{} failed verbatim validation ({} errors), retrying",
            attempts,
            max_attempts,
            validation.verbatim_errors.len()
        );
    }
}

/// Replays a previously captured model response.
///
/// Every call returns the same extraction, so retries cannot repair it.
#[derive(Debug, Clone)]
pub struct RecordedAgent {
    raw: String,
}

impl RecordedAgent {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn from_file(path: &Path) -> AgentResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| AgentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(raw))
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl ExtractionAgent for RecordedAgent {
    fn extract(
        &self,
        _report_text: &str,
        exam_description: Option<&str>,
    ) -> AgentResult<ReportExtraction> {
        let mut extraction = parse_agent_output(&self.raw)?;
        if let Some(description) = exam_description {
            if extraction.exam_info.study_description.is_empty() {
                extraction.exam_info.study_description = description.to_string();
            }
        }
        Ok(extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    const REPORT: &str = "FINDINGS:\nNo pleural effusion.\nMild cardiomegaly.";

    fn response(quote: &str) -> String {
        format!(
            r#"{{"exam_info": {{"study_description": "XR Chest"}}, "findings": [{{"finding_name": "pleural effusion", "presence": "absent", "report_text": "{}"}}]}}"#,
            quote
        )
    }

    /// Returns queued responses in order, repeating the last one.
    struct ScriptedAgent {
        responses: Vec<String>,
        calls: RefCell<usize>,
    }

    impl ScriptedAgent {
        fn new(responses: &[String]) -> Self {
            Self {
                responses: responses.to_vec(),
                calls: RefCell::new(0),
            }
        }
    }

    impl ExtractionAgent for ScriptedAgent {
        fn extract(&self, _: &str, _: Option<&str>) -> AgentResult<ReportExtraction> {
            let mut calls = self.calls.borrow_mut();
            let idx = (*calls).min(self.responses.len() - 1);
            *calls += 1;
            parse_agent_output(&self.responses[idx])
        }
    }

    struct FailingAgent;

    impl ExtractionAgent for FailingAgent {
        fn extract(&self, _: &str, _: Option<&str>) -> AgentResult<ReportExtraction> {
            Err(AgentError::Agent("rate limited".into()))
        }
    }

    #[test]
    fn test_parse_agent_output() {
        let output = parse_agent_output(&response("No pleural effusion.")).unwrap();
        assert_eq!(output.exam_info.study_description, "XR Chest");
        assert_eq!(output.findings.len(), 1);
        assert!(output.non_finding_text.is_empty());
    }

    #[test]
    fn test_parse_agent_output_with_prose() {
        let raw = format!("Here is the extraction:\n{}\nLet me know if...", response("x"));
        let output = parse_agent_output(&raw).unwrap();
        assert_eq!(output.findings[0].finding_name, "pleural effusion");
    }

    #[test]
    fn test_parse_agent_output_no_json() {
        assert!(matches!(
            parse_agent_output("I could not read the report."),
            Err(AgentError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_agent_output("} backwards {"),
            Err(AgentError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_agent_output_bad_presence() {
        let raw = response("x").replace("absent", "maybe");
        assert!(matches!(parse_agent_output(&raw), Err(AgentError::JsonParse(_))));
    }

    #[test]
    fn test_valid_on_first_attempt() {
        let agent = ScriptedAgent::new(&[response("No pleural effusion.")]);
        let result = extract_validated(&agent, REPORT, None, 3).unwrap();
        assert!(result.validation.is_valid);
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn test_retry_until_valid() {
        let agent = ScriptedAgent::new(&[
            response("No effusion."),
            response("No pleural effusion."),
        ]);
        let result = extract_validated(&agent, REPORT, None, 3).unwrap();
        assert!(result.validation.is_valid);
        assert_eq!(result.attempts, 2);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let agent = ScriptedAgent::new(&[response("No effusion.")]);
        let result = extract_validated(&agent, REPORT, None, 3).unwrap();
        assert!(!result.validation.is_valid);
        assert_eq!(result.validation.verbatim_errors.len(), 1);
        assert_eq!(result.attempts, 3);
        assert_eq!(*agent.calls.borrow(), 3);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let agent = ScriptedAgent::new(&[response("No effusion.")]);
        let result = extract_validated(&agent, REPORT, None, 0).unwrap();
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn test_agent_error_propagates() {
        let err = extract_validated(&FailingAgent, REPORT, None, 3).unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_recorded_agent_fills_missing_description() {
        let raw = response("No pleural effusion.").replace("XR Chest", "");
        let agent = RecordedAgent::new(raw);
        let extraction = agent.extract(REPORT, Some("XR Chest 2V")).unwrap();
        assert_eq!(extraction.exam_info.study_description, "XR Chest 2V");

        let agent = RecordedAgent::new(response("No pleural effusion."));
        let extraction = agent.extract(REPORT, Some("ignored")).unwrap();
        assert_eq!(extraction.exam_info.study_description, "XR Chest");
    }
}
