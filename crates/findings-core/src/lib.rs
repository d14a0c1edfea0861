//! Imaging Findings Core Library
//!
//! Validation and aggregation of structured findings extracted from radiology
//! reports.
//!
//! # Architecture
//!
//! ```text
//! Report text → Extraction agent (external) → ReportExtraction
//!                                                    │
//!                                       [validation: verbatim + coverage]
//!
//! Finding table → EFL builder → one EFL per exam ─┐
//!                                                 ▼
//!                                  IPL aggregator → one IPL per patient
//!
//! Gold labels + predictions → Evaluator → precision / recall / F1
//! ```
//!
//! # Modules
//!
//! - [`models`]: Domain types (ReportExtraction, ExamFindingList, ImagingProblemList)
//! - [`validation`]: Verbatim-quote and coverage checks
//! - [`efl`]: Exam Finding List generation from a finding table
//! - [`ipl`]: Cross-exam Imaging Problem List aggregation
//! - [`evaluate`]: Micro-averaged and per-finding scoring
//! - [`io`]: JSON file reads/writes and EFL discovery

pub mod efl;
pub mod evaluate;
pub mod io;
pub mod ipl;
pub mod models;
pub mod validation;

// Re-export commonly used types
pub use efl::{EflBatch, EflBuilder, EflConfig, EflError, ReportIdStrategy, SourceRow};
pub use evaluate::{evaluate, EvaluationError, EvaluationReport, LabelSet};
pub use io::FindingsIoError;
pub use ipl::{aggregate, IplBuild, IplConfig, IplError};
pub use models::{
    ExamFindingList, ExamInfo, ExtractedFinding, ImagingProblemList, NonFindingText, Presence,
    ReportExtraction, ValidationResult,
};
pub use validation::validate_extraction;
