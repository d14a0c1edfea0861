//! Exam Finding List generation from a flat table of finding rows.
//!
//! Pipeline: Table → SourceRow → (skip malformed) → group by exam → EFL per exam

mod builder;
mod table;

pub use builder::*;
pub use table::*;

use thiserror::Error;

use crate::models::EflPatientInfo;

/// EFL generation errors. Row-level problems are not errors; they are logged
/// and reported in [`EflBatch`].
#[derive(Error, Debug)]
pub enum EflError {
    #[error("Required column '{0}' not found in table")]
    MissingColumn(String),

    #[error("Table is empty: no header row")]
    EmptyTable,

    #[error("Malformed table at line {line}: {reason}")]
    Table { line: usize, reason: String },
}

pub type EflResult<T> = Result<T, EflError>;

/// How diagnostic report identifiers are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportIdStrategy {
    /// Fresh UUID v4 per exam
    #[default]
    Random,
    /// Hash of patient, study identifier and exam code; stable across runs
    Derived,
}

/// Settings resolved once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct EflConfig {
    pub patient: EflPatientInfo,
    /// Years added to every exam date (de-identification shift)
    pub year_shift: i32,
    pub report_ids: ReportIdStrategy,
}

impl Default for EflConfig {
    fn default() -> Self {
        Self {
            patient: EflPatientInfo {
                patient_identifier: "MRN0000001".to_string(),
                patient_dob: "1961-01-01".to_string(),
            },
            year_shift: 15,
            report_ids: ReportIdStrategy::Random,
        }
    }
}
