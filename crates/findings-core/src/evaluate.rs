//! Precision/recall/F1 of predicted findings against gold labels.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Evaluation errors. All are fatal for the run.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Mismatched report ids between gold and predictions (missing from predictions: {missing_in_predictions:?}; missing from gold: {missing_in_gold:?})")]
    MismatchedReportIds {
        missing_in_predictions: Vec<String>,
        missing_in_gold: Vec<String>,
    },

    #[error("Malformed label on line {line}: {source}")]
    MalformedLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub type EvaluationResult<T> = Result<T, EvaluationError>;

/// One labeled finding in a label file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabeledFinding {
    pub name: String,
    pub present: bool,
    /// Optional descriptors; not scored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<String>>,
}

/// One line of a gold or prediction label file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabeledReport {
    pub report_id: String,
    pub findings: Vec<LabeledFinding>,
}

/// Per-report finding map: lowercased finding name → present.
pub type FindingMap = BTreeMap<String, bool>;

/// Report id → finding map.
pub type LabelSet = BTreeMap<String, FindingMap>;

/// Parse newline-delimited JSON labels. Blank lines are ignored; later
/// duplicates of a report id or finding name overwrite earlier ones.
pub fn parse_label_lines(input: &str) -> EvaluationResult<LabelSet> {
    let mut labels = LabelSet::new();
    for (idx, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let report: LabeledReport = serde_json::from_str(line)
            .map_err(|source| EvaluationError::MalformedLine {
                line: idx + 1,
                source,
            })?;
        let findings = report
            .findings
            .into_iter()
            .map(|f| (f.name.to_lowercase(), f.present))
            .collect();
        labels.insert(report.report_id, findings);
    }
    Ok(labels)
}

/// Confusion-matrix counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub tp: u32,
    pub fp: u32,
    #[serde(rename = "fn")]
    pub fn_: u32,
    pub tn: u32,
}

impl ConfusionCounts {
    fn record(&mut self, gold: bool, predicted: bool) {
        match (gold, predicted) {
            (true, true) => self.tp += 1,
            (false, true) => self.fp += 1,
            (true, false) => self.fn_ += 1,
            (false, false) => self.tn += 1,
        }
    }

    pub fn scores(&self) -> Scores {
        Scores::from_counts(self.tp, self.fp, self.fn_)
    }
}

/// Precision, recall and F1. Each is 0.0 when its denominator is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Scores {
    pub fn from_counts(tp: u32, fp: u32, fn_: u32) -> Self {
        let precision = ratio(tp as f64, (tp + fp) as f64);
        let recall = ratio(tp as f64, (tp + fn_) as f64);
        let f1 = ratio(2.0 * precision * recall, precision + recall);
        Self {
            precision,
            recall,
            f1,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Scores for one finding name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingScore {
    pub finding: String,
    pub counts: ConfusionCounts,
    pub scores: Scores,
}

/// Micro-averaged overall scores plus per-finding rows sorted by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub overall_counts: ConfusionCounts,
    pub overall: Scores,
    pub per_finding: Vec<FindingScore>,
}

/// Compare predictions against gold labels.
///
/// Both sets must cover exactly the same report ids. A finding named on only
/// one side counts as not present on the other.
pub fn evaluate(gold: &LabelSet, predicted: &LabelSet) -> EvaluationResult<EvaluationReport> {
    let missing_in_predictions: Vec<String> = gold
        .keys()
        .filter(|id| !predicted.contains_key(*id))
        .cloned()
        .collect();
    let missing_in_gold: Vec<String> = predicted
        .keys()
        .filter(|id| !gold.contains_key(*id))
        .cloned()
        .collect();
    if !missing_in_predictions.is_empty() || !missing_in_gold.is_empty() {
        return Err(EvaluationError::MismatchedReportIds {
            missing_in_predictions,
            missing_in_gold,
        });
    }

    let mut overall = ConfusionCounts::default();
    let mut per_finding: BTreeMap<String, ConfusionCounts> = BTreeMap::new();

    for (report_id, gold_findings) in gold {
        let empty = FindingMap::new();
        let pred_findings = predicted.get(report_id).unwrap_or(&empty);
        let names: BTreeSet<&String> = gold_findings.keys().chain(pred_findings.keys()).collect();

        for name in names {
            let g = gold_findings.get(name).copied().unwrap_or(false);
            let p = pred_findings.get(name).copied().unwrap_or(false);
            overall.record(g, p);
            per_finding
                .entry(name.clone())
                .or_insert_with(ConfusionCounts::default)
                .record(g, p);
        }
    }

    let per_finding = per_finding
        .into_iter()
        .map(|(finding, counts)| FindingScore {
            finding,
            scores: counts.scores(),
            counts,
        })
        .collect();

    Ok(EvaluationReport {
        overall: overall.scores(),
        overall_counts: overall,
        per_finding,
    })
}
