//! Exam Finding List (EFL) documents: one per imaging exam.

use serde::{Deserialize, Serialize};

/// Schema URL written into every EFL document.
pub const EFL_SCHEMA_URL: &str =
    "https://github.com/openimagingdata/imaging-problem-list/schema/exam-problem-list-schema.json";

/// Attribute description that marks the presence attribute of a finding.
pub const PRESENCE_ATTRIBUTE: &str = "presence";

/// Per-exam structured findings document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExamFindingList {
    #[serde(rename = "$schema", default = "default_efl_schema")]
    pub schema: String,
    /// Opaque identifier, unique per exam
    pub diagnostic_report_id: String,
    pub patient_info: EflPatientInfo,
    pub exam_info: EflExamInfo,
    #[serde(default)]
    pub findings: Vec<EflFinding>,
}

fn default_efl_schema() -> String {
    EFL_SCHEMA_URL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EflPatientInfo {
    pub patient_identifier: String,
    #[serde(rename = "patientDOB")]
    pub patient_dob: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EflExamInfo {
    pub study_identifier: String,
    /// ISO-8601, `YYYY-MM-DDTHH:MM:SSZ`
    pub study_date_time: String,
    pub study_loinc_code: String,
    pub study_description: String,
}

impl EflExamInfo {
    /// Date part (`YYYY-MM-DD`) of the study date-time.
    pub fn study_date(&self) -> &str {
        self.study_date_time
            .split('T')
            .next()
            .unwrap_or(&self.study_date_time)
    }
}

/// One observed finding instance within an exam.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EflFinding {
    /// `{finding_slug}_{counter}`
    pub observation_id: String,
    pub finding_code: String,
    #[serde(default)]
    pub finding_description: Option<String>,
    #[serde(default)]
    pub attributes: Vec<EflAttribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_text: Option<String>,
}

impl EflFinding {
    /// Value description of the first attribute describing presence.
    pub fn presence(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.attribute_description == PRESENCE_ATTRIBUTE)
            .map(|attr| attr.attribute_value_description.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EflAttribute {
    pub attribute_code: String,
    pub attribute_description: String,
    pub attribute_value_code: String,
    pub attribute_value_description: String,
}

/// Presence encoding used in EFL/IPL documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EflPresence {
    Present,
    Absent,
    Indeterminate,
}

impl EflPresence {
    /// Parse a table cell. "uncertain" is an alias of indeterminate; matching
    /// ignores case. Unknown values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "present" => Some(EflPresence::Present),
            "absent" => Some(EflPresence::Absent),
            "indeterminate" | "uncertain" => Some(EflPresence::Indeterminate),
            _ => None,
        }
    }

    /// Suffix appended to the presence attribute id to form the value code.
    pub fn value_suffix(&self) -> &'static str {
        match self {
            EflPresence::Present => ".1",
            EflPresence::Absent => ".0",
            EflPresence::Indeterminate => ".2",
        }
    }

    pub fn descriptor(&self) -> &'static str {
        match self {
            EflPresence::Present => "present",
            EflPresence::Absent => "absent",
            EflPresence::Indeterminate => "indeterminate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "$schema": "https://example.org/efl.json",
        "diagnosticReportId": "r-1",
        "patientInfo": {"patientIdentifier": "MRN1", "patientDOB": "1961-01-01"},
        "examInfo": {
            "studyIdentifier": "CT_ABDOMEN_20240101",
            "studyDateTime": "2024-01-01T10:00:00Z",
            "studyLoincCode": "L1",
            "studyDescription": "CT Abdomen"
        },
        "findings": [{
            "observationId": "renal_calculus_1",
            "findingCode": "OIFM_1",
            "findingDescription": "renal calculus",
            "attributes": [{
                "attributeCode": "OIFMA_1",
                "attributeDescription": "presence",
                "attributeValueCode": "OIFMA_1.1",
                "attributeValueDescription": "present"
            }]
        }]
    }"#;

    #[test]
    fn test_parse_efl_document() {
        let efl: ExamFindingList = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(efl.schema, "https://example.org/efl.json");
        assert_eq!(efl.patient_info.patient_dob, "1961-01-01");
        assert_eq!(efl.exam_info.study_date(), "2024-01-01");
        assert_eq!(efl.findings[0].presence(), Some("present"));
        assert!(efl.findings[0].report_text.is_none());
    }

    #[test]
    fn test_report_text_omitted_when_absent() {
        let efl: ExamFindingList = serde_json::from_str(SAMPLE).unwrap();
        let json = serde_json::to_string(&efl).unwrap();
        assert!(!json.contains("reportText"));
        assert!(json.starts_with("{\"$schema\""));
        assert!(json.contains("\"patientDOB\":\"1961-01-01\""));
    }

    #[test]
    fn test_presence_parse_case_insensitive() {
        assert_eq!(EflPresence::parse("Present"), Some(EflPresence::Present));
        assert_eq!(EflPresence::parse("ABSENT"), Some(EflPresence::Absent));
        assert_eq!(EflPresence::parse("Uncertain"), Some(EflPresence::Indeterminate));
        assert_eq!(EflPresence::parse("probable"), None);
    }

    #[test]
    fn test_presence_without_attribute() {
        let finding = EflFinding {
            observation_id: "x_0".into(),
            finding_code: "X".into(),
            finding_description: None,
            attributes: vec![EflAttribute {
                attribute_code: "A".into(),
                attribute_description: "size".into(),
                attribute_value_code: "A.1".into(),
                attribute_value_description: "small".into(),
            }],
            report_text: None,
        };
        assert_eq!(finding.presence(), None);
    }
}
