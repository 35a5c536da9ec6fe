// Spreadsheet encoders for aggregate trees.
//
// - flat report: one sheet, four columns (`No`, `Name`, `Participants`,
//   `Actions`); a label row per program type, a numbered row per program,
//   an `n.m` row per action, then a total row.
// - templates: the same tree written at the fixed coordinates of a
//   `TemplateLayout`.
//
// The `export_*` wrappers return `bool` and log failures so hosts can keep
// going when a write fails.

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Reader};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use tracing::{error, info};

use crate::config::TemplateLayout;
use crate::error::{ReportError, Result};
use crate::loader::cell_to_value;
use crate::types::{AggregateTree, CellValue, FlatReportRow};
use crate::util::add_count;

/// Excel sheet name maximum length.
const SHEET_NAME_MAX: usize = 31;
const SHEET_NAME_ILLEGAL: [char; 7] = ['*', ':', '?', '/', '\\', '[', ']'];

pub const FLAT_HEADERS: [&str; 4] = ["No", "Name", "Participants", "Actions"];
const FLAT_COLUMN_WIDTHS: [f64; 4] = [8.0, 50.0, 14.0, 14.0];
const TOTAL_LABEL: &str = "Total";

/// Strip characters Excel rejects and cap the length.
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if SHEET_NAME_ILLEGAL.contains(&c) { '_' } else { c })
        .take(SHEET_NAME_MAX)
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'').to_string();
    if cleaned.is_empty() {
        "Report".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatLineKind {
    ProgramType,
    Program,
    Action,
    Total,
}

/// One planned line of the flat report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatLine {
    pub kind: FlatLineKind,
    pub no: String,
    pub name: String,
    pub people: Option<u64>,
    pub actions: Option<u64>,
}

/// Plan the flat report lines for a tree. Shared by the workbook encoder,
/// the CSV mirror and console previews.
pub fn flat_lines(tree: &AggregateTree) -> Result<Vec<FlatLine>> {
    let mut lines = Vec::new();
    for (program_type, programs) in tree.types() {
        lines.push(FlatLine {
            kind: FlatLineKind::ProgramType,
            no: program_type.clone(),
            name: String::new(),
            people: None,
            actions: None,
        });
        for (p_idx, (program, actions)) in programs.iter().enumerate() {
            lines.push(FlatLine {
                kind: FlatLineKind::Program,
                no: format!("{}", p_idx + 1),
                name: program.clone(),
                people: None,
                actions: None,
            });
            for (a_idx, (action, leaf)) in actions.iter().enumerate() {
                lines.push(FlatLine {
                    kind: FlatLineKind::Action,
                    no: format!("{}.{}", p_idx + 1, a_idx + 1),
                    name: action.clone(),
                    people: Some(leaf.people),
                    actions: Some(leaf.action_number),
                });
            }
        }
    }
    let (people, actions) = tree.totals()?;
    lines.push(FlatLine {
        kind: FlatLineKind::Total,
        no: TOTAL_LABEL.to_string(),
        name: String::new(),
        people: Some(people),
        actions: Some(actions),
    });
    Ok(lines)
}

impl From<&FlatLine> for FlatReportRow {
    fn from(line: &FlatLine) -> Self {
        FlatReportRow {
            no: line.no.clone(),
            name: line.name.clone(),
            people: line.people.map(|n| n.to_string()).unwrap_or_default(),
            actions: line.actions.map(|n| n.to_string()).unwrap_or_default(),
        }
    }
}

pub fn flat_report_rows(tree: &AggregateTree) -> Result<Vec<FlatReportRow>> {
    Ok(flat_lines(tree)?.iter().map(FlatReportRow::from).collect())
}

struct Formats {
    header: Format,
    type_row: Format,
    program_row: Format,
    text: Format,
    integer: Format,
    total: Format,
}

impl Formats {
    fn new() -> Self {
        let base = Format::new().set_border(FormatBorder::Thin);
        Self {
            header: base.clone().set_bold().set_align(FormatAlign::Center),
            type_row: base.clone().set_bold().set_background_color(Color::RGB(0xD9E1F2)),
            program_row: base.clone().set_bold(),
            text: base.clone(),
            integer: base.clone().set_num_format("0"),
            total: base.set_bold().set_num_format("0"),
        }
    }
}

fn write_count(
    ws: &mut Worksheet,
    row: u32,
    col: u16,
    value: Option<u64>,
    fmt: &Format,
) -> Result<()> {
    match value {
        Some(n) => ws.write_number_with_format(row, col, n as f64, fmt)?,
        None => ws.write_blank(row, col, fmt)?,
    };
    Ok(())
}

/// Encode a tree as the flat report workbook.
pub fn encode_flat_report(tree: &AggregateTree, sheet_title: &str) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let formats = Formats::new();
    let ws = workbook.add_worksheet();
    ws.set_name(sanitize_sheet_name(sheet_title))?;
    for (col, width) in FLAT_COLUMN_WIDTHS.iter().enumerate() {
        ws.set_column_width(col as u16, *width)?;
    }
    for (col, h) in FLAT_HEADERS.iter().enumerate() {
        ws.write_string_with_format(0, col as u16, *h, &formats.header)?;
    }

    for (i, line) in flat_lines(tree)?.iter().enumerate() {
        let row = (i + 1) as u32;
        let (label_fmt, num_fmt) = match line.kind {
            FlatLineKind::ProgramType => (&formats.type_row, &formats.type_row),
            FlatLineKind::Program => (&formats.program_row, &formats.program_row),
            FlatLineKind::Action => (&formats.text, &formats.integer),
            FlatLineKind::Total => (&formats.total, &formats.total),
        };
        ws.write_string_with_format(row, 0, &line.no, label_fmt)?;
        if line.name.is_empty() {
            ws.write_blank(row, 1, label_fmt)?;
        } else {
            ws.write_string_with_format(row, 1, &line.name, label_fmt)?;
        }
        write_count(ws, row, 2, line.people, num_fmt)?;
        write_count(ws, row, 3, line.actions, num_fmt)?;
    }
    ws.set_freeze_panes(1, 0)?;

    Ok(workbook.save_to_buffer()?)
}

fn as_count(v: Option<&CellValue>) -> Option<u64> {
    match v? {
        CellValue::Number(n) if *n >= 0.0 => Some(*n as u64),
        CellValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Rebuild the tree from a flat report produced by [`encode_flat_report`].
/// Formatting is ignored; lines are recognized by which cells are filled.
pub fn decode_flat_report(bytes: &[u8]) -> Result<AggregateTree> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ReportError::FileCorrupted("workbook contains no worksheets".to_string()))?;
    let range = workbook.worksheet_range(&sheet)?;

    let mut tree = AggregateTree::new();
    let mut current_type: Option<String> = None;
    let mut current_program: Option<String> = None;
    for (idx, row) in range.rows().enumerate().skip(1) {
        let cell = |c: usize| row.get(c).and_then(cell_to_value);
        let label = cell(0).map(|v| v.as_text()).unwrap_or_default();
        let name = cell(1).map(|v| v.as_text()).unwrap_or_default();
        let people = as_count(cell(2).as_ref());
        let actions = as_count(cell(3).as_ref());

        match (name.is_empty(), people) {
            // total line closes the report
            (true, Some(_)) => break,
            (false, Some(p)) => {
                let (Some(t), Some(prog)) = (&current_type, &current_program) else {
                    return Err(ReportError::FileCorrupted(format!(
                        "action line at row {} has no program above it",
                        idx + 1
                    )));
                };
                tree.add(t, prog, &name, p, actions.unwrap_or(0))?;
            }
            (false, None) => current_program = Some(name),
            (true, None) if !label.is_empty() => {
                current_type = Some(label);
                current_program = None;
            }
            (true, None) => {}
        }
    }
    Ok(tree)
}

/// One titled block of a template, e.g. a health category.
pub struct TemplateBlock<'a> {
    pub heading: Option<String>,
    pub tree: &'a AggregateTree,
}

/// Write blocks at the fixed coordinates of `layout`. Program lines carry
/// their subtotals; a grand total closes the sheet.
pub fn encode_template(
    layout: &TemplateLayout,
    title: &str,
    period: &str,
    blocks: &[TemplateBlock<'_>],
) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let formats = Formats::new();
    let ws = workbook.add_worksheet();
    ws.set_name(layout.sheet_name)?;
    let (title_row, title_col) = layout.title_cell;
    ws.write_string_with_format(title_row, title_col, title, &formats.header)?;
    ws.write_string(layout.period_cell.0, layout.period_cell.1, period)?;
    ws.set_column_width(layout.col_name, 45)?;

    let mut row = layout.first_data_row;
    let (mut all_people, mut all_actions) = (0u64, 0u64);
    for block in blocks {
        if let Some(heading) = &block.heading {
            ws.write_string_with_format(row, layout.col_index, heading, &formats.type_row)?;
            row += 1;
        }
        for (program_type, programs) in block.tree.types() {
            ws.write_string_with_format(row, layout.col_name, program_type, &formats.type_row)?;
            row += 1;
            for (p_idx, (program, actions)) in programs.iter().enumerate() {
                let (sub_people, sub_actions) =
                    actions.values().try_fold((0u64, 0u64), |(p, a), l| {
                        Ok::<_, ReportError>((
                            add_count(p, l.people)?,
                            add_count(a, l.action_number)?,
                        ))
                    })?;
                let no = format!("{}", p_idx + 1);
                ws.write_string_with_format(row, layout.col_index, no, &formats.program_row)?;
                ws.write_string_with_format(row, layout.col_name, program, &formats.program_row)?;
                write_count(ws, row, layout.col_people, Some(sub_people), &formats.total)?;
                write_count(ws, row, layout.col_actions, Some(sub_actions), &formats.total)?;
                row += 1;
                for (a_idx, (action, leaf)) in actions.iter().enumerate() {
                    let no = format!("{}.{}", p_idx + 1, a_idx + 1);
                    ws.write_string_with_format(row, layout.col_index, no, &formats.text)?;
                    ws.write_string_with_format(row, layout.col_name, action, &formats.text)?;
                    write_count(ws, row, layout.col_people, Some(leaf.people), &formats.integer)?;
                    let actions = Some(leaf.action_number);
                    write_count(ws, row, layout.col_actions, actions, &formats.integer)?;
                    row += 1;
                }
            }
        }
        let (p, a) = block.tree.totals()?;
        all_people = add_count(all_people, p)?;
        all_actions = add_count(all_actions, a)?;
    }
    ws.write_string_with_format(row, layout.col_name, TOTAL_LABEL, &formats.total)?;
    write_count(ws, row, layout.col_people, Some(all_people), &formats.total)?;
    write_count(ws, row, layout.col_actions, Some(all_actions), &formats.total)?;

    Ok(workbook.save_to_buffer()?)
}

fn write_bytes(path: &Path, bytes: Result<Vec<u8>>) -> bool {
    match bytes.and_then(|b| std::fs::write(path, b).map_err(ReportError::from)) {
        Ok(()) => {
            info!(file = %path.display(), "wrote workbook");
            true
        }
        Err(e) => {
            error!(file = %path.display(), error = %e, "export failed");
            false
        }
    }
}

/// Write the flat report; `false` when encoding or writing failed.
pub fn export_flat_report(
    path: impl AsRef<Path>,
    tree: &AggregateTree,
    sheet_title: &str,
) -> bool {
    write_bytes(path.as_ref(), encode_flat_report(tree, sheet_title))
}

/// Write a template; `false` when encoding or writing failed.
pub fn export_template(
    path: impl AsRef<Path>,
    layout: &TemplateLayout,
    title: &str,
    period: &str,
    blocks: &[TemplateBlock<'_>],
) -> bool {
    write_bytes(path.as_ref(), encode_template(layout, title, period, blocks))
}
