// Row sanitation: sorts decoded rows into empty, incomplete, excluded site
// visits and valid activity rows.
//
// Empty and incomplete rows are dropped silently. Non-program site visits
// are dropped and reported in a single warning message.
use crate::config::ColumnHeaders;
use crate::types::{ActivityRow, Field, RawRow};
use crate::util::{date_from_cell, parse_count_loose};
use serde::Serialize;
use tracing::{debug, warn};

/// Spreadsheet row number for a zero-based data index (header is row 1).
pub fn row_number(index: usize) -> usize {
    index + 2
}

/// Lower-cased text with separators removed, so `Non-Program`,
/// `NONPROGRAM` and `non program` compare equal.
fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| !(c.is_whitespace() || matches!(c, '-' | '_' | '\u{2013}' | '\u{2014}')))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Substring test that ignores case and separators.
pub fn loosely_contains(haystack: &str, needle: &str) -> bool {
    squash(haystack).contains(&squash(needle))
}

pub fn is_non_program(program_type: &str) -> bool {
    loosely_contains(program_type, "non-program")
}

pub fn is_site_visit(action: &str) -> bool {
    squash(action) == "sitevisit"
}

/// The single exclusion predicate shared by every aggregation pass.
pub fn is_excluded_visit(program_type: &str, action: &str) -> bool {
    is_non_program(program_type) && is_site_visit(action)
}

/// Warning text for excluded site visits, `None` when there were none.
pub fn site_visit_warning(rows: &[usize]) -> Option<String> {
    if rows.is_empty() {
        return None;
    }
    let list = rows
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!(
        "Found {} non-program visit(s) in row(s) {} — not included in totals.",
        rows.len(),
        list
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowClass {
    Empty,
    Incomplete,
    ExcludedVisit,
    Valid(ActivityRow),
}

/// Every cell trims to `""` or `"0"`.
pub fn is_empty_row(row: &RawRow) -> bool {
    row.cells.values().all(|v| {
        let t = v.as_text();
        let t = t.trim();
        t.is_empty() || t == "0"
    })
}

/// Classify one row; checks run in order and the first match wins.
pub fn classify(row: &RawRow, index: usize, headers: &ColumnHeaders) -> RowClass {
    if is_empty_row(row) {
        return RowClass::Empty;
    }

    let text = |f: Field| row.text(headers.label(f));
    let present = |f: Field| {
        row.get(headers.label(f))
            .map(|v| !v.is_blank())
            .unwrap_or(false)
    };

    let program_type = text(Field::ProgramType);
    let program_name = text(Field::ProgramName);
    let action = text(Field::Action);
    let date_raw = text(Field::Date);
    if program_type.is_empty()
        || program_name.is_empty()
        || action.is_empty()
        || date_raw.is_empty()
        || !present(Field::PeopleCount)
        || !present(Field::ActionCount)
    {
        return RowClass::Incomplete;
    }

    if is_excluded_visit(&program_type, &action) {
        return RowClass::ExcludedVisit;
    }

    let date = row
        .get(headers.label(Field::Date))
        .and_then(date_from_cell)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or(date_raw);

    RowClass::Valid(ActivityRow {
        program_type,
        program_name,
        action,
        people: parse_count_loose(row.get(headers.label(Field::PeopleCount))),
        actions: parse_count_loose(row.get(headers.label(Field::ActionCount))),
        date,
        source_row: row_number(index),
    })
}

/// Rows excluded from totals, with the messages shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizeWarnings {
    pub excluded_row_numbers: Vec<usize>,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sanitized {
    pub rows: Vec<ActivityRow>,
    pub warnings: SanitizeWarnings,
    pub empty_rows: usize,
    pub incomplete_rows: usize,
}

pub fn sanitize(rows: &[RawRow], headers: &ColumnHeaders) -> Sanitized {
    let mut out = Sanitized::default();
    for (idx, row) in rows.iter().enumerate() {
        match classify(row, idx, headers) {
            RowClass::Empty => out.empty_rows += 1,
            RowClass::Incomplete => out.incomplete_rows += 1,
            RowClass::ExcludedVisit => out.warnings.excluded_row_numbers.push(row_number(idx)),
            RowClass::Valid(r) => out.rows.push(r),
        }
    }
    if let Some(msg) = site_visit_warning(&out.warnings.excluded_row_numbers) {
        warn!(rows = ?out.warnings.excluded_row_numbers, "excluded non-program site visits");
        out.warnings.messages.push(msg);
    }
    debug!(
        valid = out.rows.len(),
        empty = out.empty_rows,
        incomplete = out.incomplete_rows,
        "sanitized rows"
    );
    out
}

/// Valid rows only.
pub fn filter(rows: &[RawRow], headers: &ColumnHeaders) -> Vec<ActivityRow> {
    sanitize(rows, headers).rows
}

/// Exclusion warnings only.
pub fn warnings(rows: &[RawRow], headers: &ColumnHeaders) -> SanitizeWarnings {
    sanitize(rows, headers).warnings
}
