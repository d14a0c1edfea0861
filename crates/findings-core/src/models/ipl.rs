//! Imaging Problem List (IPL) documents: one per patient, across exams.

use serde::{Deserialize, Serialize};

pub const IPL_SCHEMA_URL: &str = "http://example.com/schemas/imaging_problem_list.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImagingProblemList {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub patient: IplPatient,
    pub findings: Vec<IplFinding>,
}

impl ImagingProblemList {
    pub fn total_observations(&self) -> usize {
        self.findings.iter().map(|f| f.observations.len()).sum()
    }

    pub fn finding(&self, finding_type_code: &str) -> Option<&IplFinding> {
        self.findings
            .iter()
            .find(|f| f.finding_type_code == finding_type_code)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IplPatient {
    pub id: String,
    pub name: String,
    pub dob: String,
}

/// All observations of one finding type, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IplFinding {
    /// `ipl-finding-NNN`, assigned after sorting by finding code
    pub id: String,
    pub finding_type_code: String,
    pub finding_type_display: Option<String>,
    pub observations: Vec<IplObservation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IplObservation {
    pub report_id: String,
    pub observation_id: String,
    /// `YYYY-MM-DD`
    pub exam_date: String,
    pub exam_type_code: String,
    pub exam_type_display: String,
    pub presence: String,
    #[serde(rename = "reportText", default, skip_serializing_if = "Option::is_none")]
    pub report_text: Option<String>,
}

/// Format the sequential identifier of the `index`-th (1-based) finding group.
pub fn ipl_finding_id(index: usize) -> String {
    format!("ipl-finding-{:03}", index)
}
