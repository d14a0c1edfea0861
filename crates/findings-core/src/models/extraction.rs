//! Per-report extraction models produced by the extraction agent.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Metadata about the imaging exam a report belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExamInfo {
    /// Study description, e.g. "CT Abdomen and Pelvis WO contrast"
    pub study_description: String,
    /// ISO date (YYYY-MM-DD) if known
    #[serde(default)]
    pub study_date: Option<String>,
    /// Modality code: "CT", "XR", "MR", "US", "NM", ...
    #[serde(default)]
    pub modality: Option<String>,
    /// Body part examined
    #[serde(default)]
    pub body_part: Option<String>,
}

impl ExamInfo {
    /// Create exam info with only the required description.
    pub fn new(study_description: impl Into<String>) -> Self {
        Self {
            study_description: study_description.into(),
            study_date: None,
            modality: None,
            body_part: None,
        }
    }
}

/// Body region a finding is located in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BodyRegion {
    #[serde(rename = "chest")]
    Chest,
    #[serde(rename = "abdomen")]
    Abdomen,
    #[serde(rename = "pelvis")]
    Pelvis,
    #[serde(rename = "head")]
    Head,
    #[serde(rename = "neck")]
    Neck,
    #[serde(rename = "upper extremity")]
    UpperExtremity,
    #[serde(rename = "lower extremity")]
    LowerExtremity,
    #[serde(rename = "breast")]
    Breast,
}

impl BodyRegion {
    pub const ALL: [BodyRegion; 8] = [
        BodyRegion::Chest,
        BodyRegion::Abdomen,
        BodyRegion::Pelvis,
        BodyRegion::Head,
        BodyRegion::Neck,
        BodyRegion::UpperExtremity,
        BodyRegion::LowerExtremity,
        BodyRegion::Breast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BodyRegion::Chest => "chest",
            BodyRegion::Abdomen => "abdomen",
            BodyRegion::Pelvis => "pelvis",
            BodyRegion::Head => "head",
            BodyRegion::Neck => "neck",
            BodyRegion::UpperExtremity => "upper extremity",
            BodyRegion::LowerExtremity => "lower extremity",
            BodyRegion::Breast => "breast",
        }
    }
}

impl fmt::Display for BodyRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side of the body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Laterality {
    Left,
    Right,
    Bilateral,
}

impl Laterality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Laterality::Left => "left",
            Laterality::Right => "right",
            Laterality::Bilateral => "bilateral",
        }
    }
}

/// Where a finding is occurring.
///
/// Kept apart from the attribute bag because location is often implied by the
/// exam type rather than stated in the report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FindingLocation {
    pub body_region: BodyRegion,
    /// e.g. "right lower lobe", "T9 vertebral body"
    #[serde(default)]
    pub specific_anatomy: Option<String>,
    #[serde(default)]
    pub laterality: Option<Laterality>,
}

impl FindingLocation {
    pub fn new(body_region: BodyRegion) -> Self {
        Self {
            body_region,
            specific_anatomy: None,
            laterality: None,
        }
    }

    /// Render as "region - anatomy - (laterality)" for summaries.
    pub fn display_parts(&self) -> String {
        let mut parts = vec![self.body_region.as_str().to_string()];
        if let Some(anatomy) = self.specific_anatomy.as_deref().filter(|a| !a.is_empty()) {
            parts.push(anatomy.to_string());
        }
        if let Some(laterality) = self.laterality {
            parts.push(format!("({})", laterality.as_str()));
        }
        parts.join(" - ")
    }
}

/// Free-form descriptor of a finding (size, acuity, change_from_prior, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FindingAttribute {
    pub key: String,
    pub value: String,
}

impl FindingAttribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Presence state assigned by the extraction agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Present,
    Absent,
    Indeterminate,
    /// Hedged language: "suggestive of", "cannot exclude"
    Possible,
}

impl Presence {
    pub const ALL: [Presence; 4] = [
        Presence::Present,
        Presence::Absent,
        Presence::Possible,
        Presence::Indeterminate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Present => "present",
            Presence::Absent => "absent",
            Presence::Indeterminate => "indeterminate",
            Presence::Possible => "possible",
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding extracted from a radiology report.
///
/// Multiple instances of the same finding (e.g. bilateral stones) are separate
/// entries and are never merged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedFinding {
    /// Canonical lowercase clinical term, e.g. "renal calculus"
    pub finding_name: String,
    pub presence: Presence,
    #[serde(default)]
    pub location: Option<FindingLocation>,
    #[serde(default)]
    pub attributes: Vec<FindingAttribute>,
    /// Verbatim quote from the source report
    pub report_text: String,
}

impl ExtractedFinding {
    pub fn new(
        finding_name: impl Into<String>,
        presence: Presence,
        report_text: impl Into<String>,
    ) -> Self {
        Self {
            finding_name: finding_name.into(),
            presence,
            location: None,
            attributes: Vec::new(),
            report_text: report_text.into(),
        }
    }

    /// First value recorded for `key`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| attr.value.as_str())
    }

    /// Attributes as a key/value map. The first occurrence of a key wins.
    pub fn attribute_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for attr in &self.attributes {
            map.entry(attr.key.clone())
                .or_insert_with(|| attr.value.clone());
        }
        map
    }
}

/// Category of report text that carries no finding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum NonFindingCategory {
    Metadata,
    Technique,
    Indication,
    Comparison,
    ClinicalHistory,
    Impression,
    Other,
}

impl NonFindingCategory {
    pub const ALL: [NonFindingCategory; 7] = [
        NonFindingCategory::Metadata,
        NonFindingCategory::Technique,
        NonFindingCategory::Indication,
        NonFindingCategory::Comparison,
        NonFindingCategory::ClinicalHistory,
        NonFindingCategory::Impression,
        NonFindingCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NonFindingCategory::Metadata => "metadata",
            NonFindingCategory::Technique => "technique",
            NonFindingCategory::Indication => "indication",
            NonFindingCategory::Comparison => "comparison",
            NonFindingCategory::ClinicalHistory => "clinical_history",
            NonFindingCategory::Impression => "impression",
            NonFindingCategory::Other => "other",
        }
    }
}

impl fmt::Display for NonFindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report segment identified as not containing findings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NonFindingText {
    pub text: String,
    pub category: NonFindingCategory,
}

impl NonFindingText {
    pub fn new(text: impl Into<String>, category: NonFindingCategory) -> Self {
        Self {
            text: text.into(),
            category,
        }
    }
}

/// Everything extracted from one report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportExtraction {
    pub exam_info: ExamInfo,
    #[serde(default)]
    pub findings: Vec<ExtractedFinding>,
    #[serde(default)]
    pub non_finding_text: Vec<NonFindingText>,
}

impl ReportExtraction {
    pub fn new(exam_info: ExamInfo) -> Self {
        Self {
            exam_info,
            findings: Vec::new(),
            non_finding_text: Vec::new(),
        }
    }

    /// Findings with the given presence, in report order.
    pub fn findings_with(&self, presence: Presence) -> impl Iterator<Item = &ExtractedFinding> {
        self.findings
            .iter()
            .filter(move |finding| finding.presence == presence)
    }

    /// Number of findings per presence state.
    pub fn count_by_presence(&self) -> BTreeMap<Presence, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            *counts.entry(finding.presence).or_insert(0) += 1;
        }
        counts
    }

    /// Number of non-finding segments per category.
    pub fn count_by_category(&self) -> BTreeMap<NonFindingCategory, usize> {
        let mut counts = BTreeMap::new();
        for segment in &self.non_finding_text {
            *counts.entry(segment.category).or_insert(0) += 1;
        }
        counts
    }
}

/// Outcome of post-extraction validation.
///
/// Never raised as an error: the caller decides whether to retry or accept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ValidationResult {
    /// True iff `verbatim_errors` is empty
    pub is_valid: bool,
    #[serde(default)]
    pub verbatim_errors: Vec<String>,
    #[serde(default)]
    pub coverage_warnings: Vec<String>,
}
