//! Imaging Problem List aggregation across a patient's EFL documents.
//!
//! Every run is a full rebuild from the complete set of documents; nothing is
//! patched incrementally.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::models::{
    ipl_finding_id, EflPatientInfo, ExamFindingList, ImagingProblemList, IplFinding,
    IplObservation, IplPatient, IPL_SCHEMA_URL,
};

/// IPL aggregation errors.
#[derive(Error, Debug)]
pub enum IplError {
    #[error("No EFL documents to aggregate")]
    NoDocuments,
}

pub type IplResult<T> = Result<T, IplError>;

/// Settings resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IplConfig {
    /// Display name written into the patient block
    pub patient_name: String,
}

impl Default for IplConfig {
    fn default() -> Self {
        Self {
            patient_name: "John Doe".to_string(),
        }
    }
}

/// Result of one aggregation run.
#[derive(Debug, Clone, PartialEq)]
pub struct IplBuild {
    pub document: ImagingProblemList,
    /// Findings dropped because they carry no presence attribute
    pub skipped_findings: usize,
    /// Every warning that was logged
    pub warnings: Vec<String>,
}

impl IplBuild {
    pub fn total_observations(&self) -> usize {
        self.document.total_observations()
    }
}

/// Accumulator for one finding code.
#[derive(Debug)]
struct FindingGroup {
    display: Option<String>,
    observations: Vec<IplObservation>,
}

/// Merge EFL documents (in the order given) into one problem list.
///
/// The patient block comes from the first document. Later documents with a
/// different patient block are accepted but warned about.
pub fn aggregate(documents: &[ExamFindingList], config: &IplConfig) -> IplResult<IplBuild> {
    let first = documents.first().ok_or(IplError::NoDocuments)?;
    let patient_info = &first.patient_info;

    let mut warnings = Vec::new();
    let mut skipped_findings = 0;
    let mut groups: BTreeMap<String, FindingGroup> = BTreeMap::new();

    for efl in documents {
        if efl.patient_info != *patient_info {
            let message = patient_mismatch(&efl.diagnostic_report_id, patient_info, &efl.patient_info);
            tracing::warn!("{}", message);
            warnings.push(message);
        }

        let exam = &efl.exam_info;
        for finding in &efl.findings {
            let Some(presence) = finding.presence() else {
                let message = format!("No presence attribute for {}", finding.observation_id);
                tracing::warn!("{}", message);
                warnings.push(message);
                skipped_findings += 1;
                continue;
            };

            let group = groups
                .entry(finding.finding_code.clone())
                .or_insert_with(|| FindingGroup {
                    display: finding.finding_description.clone(),
                    observations: Vec::new(),
                });

            group.observations.push(IplObservation {
                report_id: efl.diagnostic_report_id.clone(),
                observation_id: finding.observation_id.clone(),
                exam_date: exam.study_date().to_string(),
                exam_type_code: exam.study_loinc_code.clone(),
                exam_type_display: exam.study_description.clone(),
                presence: presence.to_string(),
                report_text: finding.report_text.clone().filter(|text| !text.is_empty()),
            });
        }
    }

    let findings = groups
        .into_iter()
        .enumerate()
        .map(|(idx, (code, mut group))| {
            // Stable: same-date observations keep encounter order.
            group
                .observations
                .sort_by(|a, b| a.exam_date.cmp(&b.exam_date));
            IplFinding {
                id: ipl_finding_id(idx + 1),
                finding_type_code: code,
                finding_type_display: group.display,
                observations: group.observations,
            }
        })
        .collect();

    let document = ImagingProblemList {
        schema: IPL_SCHEMA_URL.to_string(),
        patient: IplPatient {
            id: patient_info.patient_identifier.clone(),
            name: config.patient_name.clone(),
            dob: patient_info.patient_dob.clone(),
        },
        findings,
    };

    tracing::info!(
        "Generated IPL with {} unique finding types, {} observations",
        document.findings.len(),
        document.total_observations()
    );

    Ok(IplBuild {
        document,
        skipped_findings,
        warnings,
    })
}

fn patient_mismatch(report_id: &str, expected: &EflPatientInfo, found: &EflPatientInfo) -> String {
    format!(
        "Report {} has patient {} (DOB {}), expected {} (DOB {}); using the first document's patient",
        report_id,
        found.patient_identifier,
        found.patient_dob,
        expected.patient_identifier,
        expected.patient_dob
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EflAttribute, EflExamInfo, EflFinding, EFL_SCHEMA_URL};

    fn finding(obs: &str, code: &str, presence: Option<&str>) -> EflFinding {
        EflFinding {
            observation_id: obs.to_string(),
            finding_code: code.to_string(),
            finding_description: Some(format!("{} description", code)),
            attributes: presence
                .map(|p| {
                    vec![EflAttribute {
                        attribute_code: "OIFMA".into(),
                        attribute_description: "presence".into(),
                        attribute_value_code: "OIFMA.1".into(),
                        attribute_value_description: p.into(),
                    }]
                })
                .unwrap_or_default(),
            report_text: None,
        }
    }

    fn efl(report_id: &str, date: &str, findings: Vec<EflFinding>) -> ExamFindingList {
        ExamFindingList {
            schema: EFL_SCHEMA_URL.to_string(),
            diagnostic_report_id: report_id.to_string(),
            patient_info: EflPatientInfo {
                patient_identifier: "MRN1".into(),
                patient_dob: "1961-01-01".into(),
            },
            exam_info: EflExamInfo {
                study_identifier: format!("CT_CHEST_{}", date.replace('-', "")),
                study_date_time: format!("{}T10:00:00Z", date),
                study_loinc_code: "L1".into(),
                study_description: "CT Chest".into(),
            },
            findings,
        }
    }

    #[test]
    fn test_empty_input_is_fatal() {
        assert!(matches!(
            aggregate(&[], &IplConfig::default()),
            Err(IplError::NoDocuments)
        ));
    }

    #[test]
    fn test_two_exams_same_code() {
        let docs = vec![
            efl("r2", "2024-02-01", vec![finding("k1_1", "K1", Some("present"))]),
            efl("r1", "2024-01-01", vec![finding("k1_1", "K1", Some("present"))]),
        ];
        let build = aggregate(&docs, &IplConfig::default()).unwrap();

        assert_eq!(build.document.findings.len(), 1);
        let group = &build.document.findings[0];
        assert_eq!(group.id, "ipl-finding-001");
        assert_eq!(group.finding_type_code, "K1");
        assert_eq!(group.observations.len(), 2);
        assert_eq!(group.observations[0].exam_date, "2024-01-01");
        assert_eq!(group.observations[0].report_id, "r1");
        assert_eq!(group.observations[1].exam_date, "2024-02-01");
    }

    #[test]
    fn test_groups_sorted_by_code() {
        let docs = vec![efl(
            "r1",
            "2024-01-01",
            vec![
                finding("z_1", "ZETA", Some("present")),
                finding("a_0", "ALPHA", Some("absent")),
                finding("m_2", "MU", Some("indeterminate")),
            ],
        )];
        let build = aggregate(&docs, &IplConfig::default()).unwrap();

        let codes: Vec<(&str, &str)> = build
            .document
            .findings
            .iter()
            .map(|f| (f.id.as_str(), f.finding_type_code.as_str()))
            .collect();
        assert_eq!(
            codes,
            vec![
                ("ipl-finding-001", "ALPHA"),
                ("ipl-finding-002", "MU"),
                ("ipl-finding-003", "ZETA"),
            ]
        );
        assert_eq!(build.document.findings[0].observations[0].presence, "absent");
    }

    #[test]
    fn test_missing_presence_dropped() {
        let docs = vec![efl(
            "r1",
            "2024-01-01",
            vec![finding("a_1", "A", None), finding("b_1", "B", Some("present"))],
        )];
        let build = aggregate(&docs, &IplConfig::default()).unwrap();

        assert_eq!(build.skipped_findings, 1);
        assert_eq!(build.warnings, vec!["No presence attribute for a_1".to_string()]);
        assert!(build.document.finding("A").is_none());
        assert_eq!(build.total_observations(), 1);
    }

    #[test]
    fn test_same_date_keeps_encounter_order() {
        let docs = vec![
            efl("r1", "2024-03-01", vec![finding("k_1", "K", Some("present"))]),
            efl(
                "r2",
                "2024-01-01",
                vec![
                    finding("k_1", "K", Some("present")),
                    finding("k_2", "K", Some("present")),
                ],
            ),
            efl("r3", "2024-01-01", vec![finding("k_0", "K", Some("absent"))]),
        ];
        let build = aggregate(&docs, &IplConfig::default()).unwrap();

        let order: Vec<(&str, &str)> = build.document.findings[0]
            .observations
            .iter()
            .map(|o| (o.report_id.as_str(), o.observation_id.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![("r2", "k_1"), ("r2", "k_2"), ("r3", "k_0"), ("r1", "k_1")]
        );
    }

    #[test]
    fn test_patient_from_first_document() {
        let mut second = efl("r2", "2024-02-01", vec![finding("k_1", "K", Some("present"))]);
        second.patient_info.patient_identifier = "MRN2".into();
        let docs = vec![
            efl("r1", "2024-01-01", vec![finding("k_1", "K", Some("present"))]),
            second,
        ];
        let config = IplConfig {
            patient_name: "Jane Roe".into(),
        };
        let build = aggregate(&docs, &config).unwrap();

        assert_eq!(build.document.patient.id, "MRN1");
        assert_eq!(build.document.patient.name, "Jane Roe");
        assert_eq!(build.document.patient.dob, "1961-01-01");
        assert_eq!(build.warnings.len(), 1);
        assert!(build.warnings[0].contains("MRN2"));
        assert_eq!(build.total_observations(), 2);
    }

    #[test]
    fn test_display_from_first_instance_and_report_text() {
        let mut first = finding("k_1", "K", Some("present"));
        first.report_text = Some("Nodule in RUL.".into());
        let mut second = finding("k_1", "K", Some("present"));
        second.finding_description = Some("renamed".into());
        second.report_text = Some(String::new());

        let docs = vec![
            efl("r1", "2024-01-01", vec![first]),
            efl("r2", "2024-02-01", vec![second]),
        ];
        let build = aggregate(&docs, &IplConfig::default()).unwrap();
        let group = &build.document.findings[0];

        assert_eq!(group.finding_type_display.as_deref(), Some("K description"));
        assert_eq!(group.observations[0].report_text.as_deref(), Some("Nodule in RUL."));
        assert!(group.observations[1].report_text.is_none());
    }

    #[test]
    fn test_rebuild_is_byte_identical() {
        let docs = vec![
            efl("r1", "2024-01-01", vec![finding("b_1", "B", Some("present"))]),
            efl(
                "r2",
                "2024-02-01",
                vec![finding("a_0", "A", Some("absent")), finding("b_1", "B", Some("present"))],
            ),
        ];
        let first = aggregate(&docs, &IplConfig::default()).unwrap();
        let second = aggregate(&docs, &IplConfig::default()).unwrap();
        assert_eq!(
            serde_json::to_string_pretty(&first.document).unwrap(),
            serde_json::to_string_pretty(&second.document).unwrap()
        );
    }
}
