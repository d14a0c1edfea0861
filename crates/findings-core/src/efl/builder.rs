//! Groups finding rows into exams and builds one EFL document per exam.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Datelike, NaiveDate};
use sha2::{Digest, Sha256};

use super::{EflConfig, ReportIdStrategy, SourceRow};
use crate::models::{
    EflAttribute, EflExamInfo, EflFinding, EflPresence, ExamFindingList, EFL_SCHEMA_URL,
    PRESENCE_ATTRIBUTE,
};

/// Time of day assigned to every study (dates in the source table carry none).
const STUDY_TIME_SUFFIX: &str = "T10:00:00Z";

/// A built EFL document and the file name it should be written under.
#[derive(Debug, Clone, PartialEq)]
pub struct EflOutput {
    pub file_name: String,
    pub document: ExamFindingList,
}

/// A row dropped during grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub row_number: usize,
    pub reason: String,
}

/// Result of one builder run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EflBatch {
    /// One document per exam, ordered by (date, exam type, exam code)
    pub documents: Vec<EflOutput>,
    pub skipped_rows: Vec<SkippedRow>,
    /// Every row-level warning that was logged
    pub warnings: Vec<String>,
}

impl EflBatch {
    pub fn total_findings(&self) -> usize {
        self.documents
            .iter()
            .map(|output| output.document.findings.len())
            .sum()
    }
}

/// Grouping key for an exam, built from the date as written in the table.
/// Orders by date first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ExamKey {
    date: NaiveDate,
    /// Time part after the date, empty when absent
    time: String,
    exam_type: String,
    exam_code: String,
    /// Date after the year shift; determined by `date`
    shifted_date: NaiveDate,
}

/// A validated row within an exam group.
#[derive(Debug, Clone)]
struct ExamRow {
    finding_slug: String,
    finding_name: Option<String>,
    finding_model_id: String,
    presence_attribute_id: String,
    presence_value: String,
    text: Option<String>,
}

/// Per-exam instance counters for observation ids.
///
/// Present findings count 1, 2, ... per finding slug. Absent findings always
/// use 0 and indeterminate findings always use 2.
#[derive(Debug, Default)]
pub struct ObservationCounter {
    present: HashMap<String, u32>,
}

impl ObservationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for the next occurrence of `slug` in the given state.
    pub fn next(&mut self, slug: &str, presence: EflPresence) -> u32 {
        match presence {
            EflPresence::Present => {
                let count = self.present.entry(slug.to_string()).or_insert(0);
                *count += 1;
                *count
            }
            EflPresence::Absent => 0,
            EflPresence::Indeterminate => 2,
        }
    }
}

/// Builds EFL documents from source rows.
pub struct EflBuilder {
    config: EflConfig,
}

impl EflBuilder {
    pub fn new(config: EflConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EflConfig {
        &self.config
    }

    /// Group rows into exams and build one document per exam.
    ///
    /// Malformed rows are skipped with a warning; they never abort the run.
    pub fn build(&self, rows: &[SourceRow]) -> EflBatch {
        let mut batch = EflBatch::default();
        let mut exams: BTreeMap<ExamKey, Vec<ExamRow>> = BTreeMap::new();

        for row in rows {
            match self.classify_row(row) {
                Ok((key, exam_row)) => exams.entry(key).or_insert_with(Vec::new).push(exam_row),
                Err(reason) => {
                    let message = format!("Row {} {}, skipping", row.row_number, reason);
                    tracing::warn!("{}", message);
                    batch.warnings.push(message);
                    batch.skipped_rows.push(SkippedRow {
                        row_number: row.row_number,
                        reason,
                    });
                }
            }
        }

        tracing::info!("Found {} unique exams", exams.len());

        let mut file_names = HashSet::new();
        for (key, exam_rows) in &exams {
            let output = self.build_exam(key, exam_rows, &mut batch.warnings);
            if !file_names.insert(output.file_name.clone()) {
                let message = format!(
                    "Exam {} ({}) maps to existing file {}; the earlier exam will be overwritten",
                    output.document.exam_info.study_identifier, key.exam_code, output.file_name
                );
                tracing::warn!("{}", message);
                batch.warnings.push(message);
            }
            batch.documents.push(output);
        }

        batch
    }

    /// Validate a row and compute its exam key. Errors describe why it was dropped.
    fn classify_row(&self, row: &SourceRow) -> Result<(ExamKey, ExamRow), String> {
        let missing = row.missing_fields();
        if !missing.is_empty() {
            return Err(format!("missing required data ({})", missing.join(", ")));
        }

        // Checked non-empty above.
        let required = |value: &Option<String>| value.clone().unwrap_or_default();

        let raw_date = required(&row.exam_date);
        let date = parse_exam_date(&raw_date)
            .ok_or_else(|| format!("has unparseable exam date '{}'", raw_date))?;
        let shifted_date = shift_years(date, self.config.year_shift).ok_or_else(|| {
            format!(
                "exam date '{}' cannot be shifted by {} years",
                raw_date, self.config.year_shift
            )
        })?;

        let key = ExamKey {
            date,
            time: exam_time(&raw_date).to_string(),
            exam_type: required(&row.exam_type),
            exam_code: required(&row.exam_code),
            shifted_date,
        };
        let exam_row = ExamRow {
            finding_slug: required(&row.finding_slug),
            finding_name: row.finding_name.clone(),
            finding_model_id: required(&row.finding_model_id),
            presence_attribute_id: required(&row.presence_attribute_id),
            presence_value: required(&row.presence_value),
            text: row.text.clone(),
        };
        Ok((key, exam_row))
    }

    fn build_exam(&self, key: &ExamKey, rows: &[ExamRow], warnings: &mut Vec<String>) -> EflOutput {
        let study_id = study_identifier(&key.exam_type, key.shifted_date);
        let file_name = format!("{}_efl.json", study_id.to_lowercase());

        let mut counter = ObservationCounter::new();
        let mut seen_observations = HashSet::new();
        let mut findings = Vec::with_capacity(rows.len());

        for row in rows {
            let presence = match EflPresence::parse(&row.presence_value) {
                Some(presence) => presence,
                None => {
                    let message = format!(
                        "Unknown presence value '{}' for {}, defaulting to indeterminate",
                        row.presence_value, row.finding_model_id
                    );
                    tracing::warn!("{}", message);
                    warnings.push(message);
                    EflPresence::Indeterminate
                }
            };

            let count = counter.next(&row.finding_slug, presence);
            let observation_id = format!("{}_{}", row.finding_slug, count);
            if !seen_observations.insert(observation_id.clone()) {
                tracing::debug!(
                    "Observation id {} repeats within exam {}",
                    observation_id,
                    study_id
                );
            }

            findings.push(EflFinding {
                observation_id,
                finding_code: row.finding_model_id.clone(),
                finding_description: row.finding_name.clone(),
                attributes: vec![EflAttribute {
                    attribute_code: row.presence_attribute_id.clone(),
                    attribute_description: PRESENCE_ATTRIBUTE.to_string(),
                    attribute_value_code: format!(
                        "{}{}",
                        row.presence_attribute_id,
                        presence.value_suffix()
                    ),
                    attribute_value_description: presence.descriptor().to_string(),
                }],
                report_text: row.text.clone().filter(|text| !text.is_empty()),
            });
        }

        let document = ExamFindingList {
            schema: EFL_SCHEMA_URL.to_string(),
            diagnostic_report_id: self.report_id(&study_id, &key.exam_code),
            patient_info: self.config.patient.clone(),
            exam_info: EflExamInfo {
                study_identifier: study_id,
                study_date_time: format!(
                    "{}{}",
                    key.shifted_date.format("%Y-%m-%d"),
                    STUDY_TIME_SUFFIX
                ),
                study_loinc_code: key.exam_code.clone(),
                study_description: key.exam_type.clone(),
            },
            findings,
        };

        tracing::debug!("Built {} ({} findings)", file_name, rows.len());

        EflOutput { file_name, document }
    }

    fn report_id(&self, study_id: &str, exam_code: &str) -> String {
        match self.config.report_ids {
            ReportIdStrategy::Random => uuid::Uuid::new_v4().to_string(),
            ReportIdStrategy::Derived => {
                let seed = format!(
                    "{}|{}|{}",
                    self.config.patient.patient_identifier, study_id, exam_code
                );
                let digest = hex::encode(Sha256::digest(seed.as_bytes()));
                digest[..32].to_string()
            }
        }
    }
}

/// Parse `YYYY-MM-DD`, optionally followed by a time part.
pub fn parse_exam_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.get(..10)?;
    let rest = &raw[10..];
    if !(rest.is_empty() || rest.starts_with(' ') || rest.starts_with('T')) {
        return None;
    }
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Time part following the date in a raw exam date, trimmed.
fn exam_time(raw: &str) -> &str {
    let raw = raw.trim();
    raw.get(10..)
        .map(|rest| rest.trim_start_matches('T').trim())
        .unwrap_or("")
}

/// Move a date by whole years. Feb 29 lands on Feb 28 in non-leap years.
pub fn shift_years(date: NaiveDate, years: i32) -> Option<NaiveDate> {
    let year = date.year().checked_add(years)?;
    date.with_year(year)
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), 28))
}

/// First two words of the exam type, uppercased and underscore-joined, then
/// the compact date: "CT Abdomen Pelvis" on 2024-03-05 → `CT_ABDOMEN_20240305`.
pub fn study_identifier(exam_type: &str, date: NaiveDate) -> String {
    let prefix: Vec<String> = exam_type
        .split_whitespace()
        .take(2)
        .map(str::to_uppercase)
        .collect();
    format!("{}_{}", prefix.join("_"), date.format("%Y%m%d"))
}
