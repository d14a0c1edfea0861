//! Delimited table reader for finding rows.
//!
//! Accepts CSV with RFC-4180 quoting (quoted fields, doubled quotes, embedded
//! separators and newlines). The header row selects columns by name.

use std::collections::HashMap;

use super::{EflError, EflResult};

pub const COL_EXAM_DATE: &str = "Exam Date";
pub const COL_EXAM_TYPE: &str = "Exam Type";
pub const COL_EXAM_CODE: &str = "Exam Code";
pub const COL_FINDING: &str = "Finding";
pub const COL_FINDING_NAME: &str = "OIDM Finding Model Name";
pub const COL_FINDING_MODEL_ID: &str = "OIDM FMID";
pub const COL_PRESENCE_ATTRIBUTE_ID: &str = "Presence OIFMA_ID";
pub const COL_PRESENCE: &str = "Present/Absent";
pub const COL_TEXT: &str = "Text";

/// Columns that must appear in the header.
pub const REQUIRED_COLUMNS: [&str; 9] = [
    COL_EXAM_DATE,
    COL_EXAM_TYPE,
    COL_EXAM_CODE,
    COL_FINDING,
    COL_FINDING_NAME,
    COL_FINDING_MODEL_ID,
    COL_PRESENCE_ATTRIBUTE_ID,
    COL_PRESENCE,
    COL_TEXT,
];

/// One data row of the finding table. Empty cells are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceRow {
    /// Spreadsheet row number (header is row 1)
    pub row_number: usize,
    pub exam_date: Option<String>,
    pub exam_type: Option<String>,
    pub exam_code: Option<String>,
    pub finding_slug: Option<String>,
    pub finding_name: Option<String>,
    pub finding_model_id: Option<String>,
    pub presence_attribute_id: Option<String>,
    pub presence_value: Option<String>,
    pub text: Option<String>,
}

impl SourceRow {
    /// Names of required cells that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            (COL_EXAM_DATE, &self.exam_date),
            (COL_EXAM_TYPE, &self.exam_type),
            (COL_EXAM_CODE, &self.exam_code),
            (COL_FINDING, &self.finding_slug),
            (COL_FINDING_MODEL_ID, &self.finding_model_id),
            (COL_PRESENCE_ATTRIBUTE_ID, &self.presence_attribute_id),
            (COL_PRESENCE, &self.presence_value),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Parse the table text into source rows.
///
/// Fails if any required column is missing from the header; nothing is
/// produced in that case.
pub fn read_source_rows(input: &str) -> EflResult<Vec<SourceRow>> {
    let mut records = parse_records(input)?.into_iter();

    let (_, header) = records.next().ok_or(EflError::EmptyTable)?;
    let columns: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim(), idx))
        .collect();

    for name in REQUIRED_COLUMNS {
        if !columns.contains_key(name) {
            return Err(EflError::MissingColumn(name.to_string()));
        }
    }

    let cell = |record: &[String], name: &str| -> Option<String> {
        columns
            .get(name)
            .and_then(|&idx| record.get(idx))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let rows = records
        .filter(|(_, record)| !is_blank(record))
        .map(|(row_number, record)| SourceRow {
            row_number,
            exam_date: cell(&record, COL_EXAM_DATE),
            exam_type: cell(&record, COL_EXAM_TYPE),
            exam_code: cell(&record, COL_EXAM_CODE),
            finding_slug: cell(&record, COL_FINDING),
            finding_name: cell(&record, COL_FINDING_NAME),
            finding_model_id: cell(&record, COL_FINDING_MODEL_ID),
            presence_attribute_id: cell(&record, COL_PRESENCE_ATTRIBUTE_ID),
            presence_value: cell(&record, COL_PRESENCE),
            text: cell(&record, COL_TEXT),
        })
        .collect();

    Ok(rows)
}

fn is_blank(record: &[String]) -> bool {
    record.iter().all(|field| field.trim().is_empty())
}

/// Split CSV text into records, each tagged with its 1-based record number.
fn parse_records(input: &str) -> EflResult<Vec<(usize, Vec<String>)>> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);

    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut quote_line = 1;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                quote_line = line;
            }
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                line += 1;
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(EflError::Table {
            line: quote_line,
            reason: "unterminated quoted field".to_string(),
        });
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    Ok(records
        .into_iter()
        .enumerate()
        .map(|(idx, record)| (idx + 1, record))
        .collect())
}
