// Strict whole-file validation, run before a sheet is accepted.
//
// This is deliberately stricter than the sanitizer used during aggregation:
// any partially filled row or malformed count/date is reported with its
// spreadsheet coordinates.
use crate::config::ColumnHeaders;
use crate::error::{ReportError, Result};
use crate::sanitize::{is_empty_row, row_number};
use crate::types::{Field, RawRow};
use crate::util::{date_from_cell, parse_count_strict};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<()>> for Validation {
    fn from(checked: Result<()>) -> Self {
        match checked {
            Ok(()) => Validation { ok: true, error: None },
            Err(e) => Validation {
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// `{ ok, error }` view over [`check_rows`].
pub fn validate_rows(rows: &[RawRow], headers: &ColumnHeaders) -> Validation {
    check_rows(rows, headers).into()
}

/// `{ ok, error }` view over [`check_sheet`].
pub fn validate_sheet(rows: &[RawRow], columns: &[String], headers: &ColumnHeaders) -> Validation {
    check_sheet(rows, columns, headers).into()
}

fn invalid(row: usize, column: &str, value: String, message: &str) -> ReportError {
    ReportError::Validation {
        row,
        column: column.to_string(),
        value,
        message: message.to_string(),
    }
}

/// First failure wins. Completely empty rows are ignored.
///
/// Without the header row, a column counts as present when any row has a
/// value in it. Prefer [`check_sheet`] when the header labels are known.
pub fn check_rows(rows: &[RawRow], headers: &ColumnHeaders) -> Result<()> {
    let seen: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.cells.keys().map(String::as_str))
        .collect();
    check(rows, &seen, headers)
}

/// Like [`check_rows`], with `columns` taken from the sheet's header row.
pub fn check_sheet(rows: &[RawRow], columns: &[String], headers: &ColumnHeaders) -> Result<()> {
    let seen: BTreeSet<&str> = columns.iter().map(|c| c.trim()).collect();
    check(rows, &seen, headers)
}

fn check(rows: &[RawRow], seen: &BTreeSet<&str>, headers: &ColumnHeaders) -> Result<()> {
    let data: Vec<(usize, &RawRow)> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| !is_empty_row(r))
        .collect();
    if data.is_empty() {
        return Err(invalid(1, "-", String::new(), "the sheet contains no data rows"));
    }

    for field in Field::ALL {
        let label = headers.label(field);
        if !seen.contains(label) {
            return Err(invalid(1, label, String::new(), "required column is missing"));
        }
    }

    for (idx, row) in data {
        let n = row_number(idx);
        for field in [Field::ProgramType, Field::ProgramName, Field::Action] {
            let label = headers.label(field);
            if row.text(label).is_empty() {
                return Err(invalid(n, label, String::new(), "value is required"));
            }
        }
        for field in [Field::PeopleCount, Field::ActionCount] {
            let label = headers.label(field);
            match row.get(label) {
                None => return Err(invalid(n, label, String::new(), "value is required")),
                Some(v) if v.is_blank() => {
                    return Err(invalid(n, label, String::new(), "value is required"))
                }
                Some(v) if parse_count_strict(v).is_none() => {
                    let message = "must be a non-negative whole number";
                    return Err(invalid(n, label, v.as_text(), message));
                }
                Some(_) => {}
            }
        }
        let label = headers.label(Field::Date);
        match row.get(label) {
            Some(v) if !v.is_blank() => {
                if date_from_cell(v).is_none() {
                    return Err(invalid(
                        n,
                        label,
                        v.as_text(),
                        "invalid date, expected YYYY-MM-DD or DD.MM.YYYY",
                    ));
                }
            }
            _ => return Err(invalid(n, label, String::new(), "value is required")),
        }
    }
    Ok(())
}
