use crate::config::{ColumnHeaders, ACCEPTED_EXTENSIONS, MAX_FILE_SIZE_BYTES};
use crate::error::{ReportError, Result};
use crate::types::{CellValue, RawRow};
use crate::util::date_from_cell;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use csv::ReaderBuilder;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub sheet_name: String,
    /// Non-empty header labels from row 1, in column order.
    pub columns: Vec<String>,
    pub total_rows: usize,
    pub blank_rows: usize,
    pub kept_rows: usize,
}

fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Input checks that run before any decoding.
pub fn check_file_constraints(file_name: &str, size: u64) -> Result<()> {
    let ext = extension_of(file_name);
    if !ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ReportError::FileType {
            extension: ext,
            accepted: ACCEPTED_EXTENSIONS.join(", "),
        });
    }
    if size > MAX_FILE_SIZE_BYTES {
        return Err(ReportError::FileSize {
            size,
            limit: MAX_FILE_SIZE_BYTES,
        });
    }
    Ok(())
}

/// Check, read and decode a spreadsheet file. The size limit is checked on
/// the file metadata before anything is read.
pub fn load_path(
    path: impl AsRef<Path>,
    headers: &ColumnHeaders,
) -> Result<(Vec<RawRow>, LoadReport)> {
    let path = path.as_ref();
    let name = path.to_string_lossy().to_string();
    let size = std::fs::metadata(path)?.len();
    check_file_constraints(&name, size)?;
    let bytes = std::fs::read(path)?;
    let out = decode(&bytes, &name, headers)?;
    info!(
        file = %name,
        rows = out.1.kept_rows,
        blank = out.1.blank_rows,
        "loaded spreadsheet"
    );
    Ok(out)
}

/// Check the name and size, then decode by file extension: CSV through the
/// `csv` reader, everything else as a workbook.
pub fn decode(
    bytes: &[u8],
    file_name: &str,
    headers: &ColumnHeaders,
) -> Result<(Vec<RawRow>, LoadReport)> {
    check_file_constraints(file_name, bytes.len() as u64)?;
    if extension_of(file_name) == "csv" {
        decode_csv(bytes, headers)
    } else {
        decode_workbook(bytes, headers)
    }
}

/// Render a workbook cell as a row value; `None` for blanks.
pub fn cell_to_value(cell: &Data) -> Option<CellValue> {
    let v = match cell {
        Data::Empty => return None,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(dt) => match crate::util::serial_to_date(dt.as_f64()) {
            Some(d) => CellValue::Text(d.format("%Y-%m-%d").to_string()),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => CellValue::Text(s.split('T').next().unwrap_or(s).to_string()),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    };
    if v.is_blank() {
        None
    } else {
        Some(v)
    }
}

/// Dates in the date column are stored as ISO text when they can be read.
fn normalize_date_cell(v: CellValue) -> CellValue {
    match date_from_cell(&v) {
        Some(d) => CellValue::Text(d.format("%Y-%m-%d").to_string()),
        None => v,
    }
}

fn build_rows<I>(
    header_row: Vec<String>,
    body: I,
    headers: &ColumnHeaders,
) -> (Vec<RawRow>, LoadReport)
where
    I: Iterator<Item = Vec<Option<CellValue>>>,
{
    let mut report = LoadReport::default();
    let mut rows = Vec::new();
    for cells in body {
        report.total_rows += 1;
        let mut row = RawRow::new();
        for (col, value) in cells.into_iter().enumerate() {
            let (Some(header), Some(value)) = (header_row.get(col), value) else {
                continue;
            };
            if header.is_empty() {
                continue;
            }
            let value = if header == &headers.date {
                normalize_date_cell(value)
            } else {
                value
            };
            row.insert(header.clone(), value);
        }
        if row.cells.is_empty() {
            report.blank_rows += 1;
            continue;
        }
        rows.push(row);
    }
    report.kept_rows = rows.len();
    report.columns = header_row.into_iter().filter(|h| !h.is_empty()).collect();
    (rows, report)
}

/// First worksheet only; row 1 is the header row. No size or extension
/// checks; see [`decode`].
pub fn decode_workbook(
    bytes: &[u8],
    headers: &ColumnHeaders,
) -> Result<(Vec<RawRow>, LoadReport)> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ReportError::FileCorrupted("workbook contains no worksheets".to_string()))?;
    let range = workbook.worksheet_range(&sheet_name)?;

    let mut iter = range.rows();
    let header_row: Vec<String> = match iter.next() {
        Some(r) => r
            .iter()
            .map(|c| {
                cell_to_value(c)
                    .map(|v| v.as_text().trim().to_string())
                    .unwrap_or_default()
            })
            .collect(),
        None => Vec::new(),
    };
    debug!(sheet = %sheet_name, columns = header_row.len(), "decoding worksheet");

    let body = iter.map(|r| r.iter().map(cell_to_value).collect::<Vec<_>>());
    let (rows, mut report) = build_rows(header_row, body, headers);
    report.sheet_name = sheet_name;
    Ok((rows, report))
}

/// CSV input: same shape as a workbook, all cells read as text.
pub fn decode_csv(bytes: &[u8], headers: &ColumnHeaders) -> Result<(Vec<RawRow>, LoadReport)> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(bytes);
    let header_row: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut records = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        records.push(
            rec.iter()
                .map(|s| {
                    let v = CellValue::Text(s.trim().to_string());
                    if v.is_blank() {
                        None
                    } else {
                        Some(v)
                    }
                })
                .collect::<Vec<_>>(),
        );
    }
    let (rows, mut report) = build_rows(header_row, records.into_iter(), headers);
    report.sheet_name = "csv".to_string();
    Ok((rows, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::CellErrorType;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn headers() -> ColumnHeaders {
        ColumnHeaders::default()
    }

    #[test]
    fn extension_and_size_limits() {
        assert!(check_file_constraints("report.XLSX", 100).is_ok());
        assert!(check_file_constraints("data.csv", MAX_FILE_SIZE_BYTES).is_ok());
        assert!(matches!(
            check_file_constraints("notes.txt", 1),
            Err(ReportError::FileType { .. })
        ));
        assert!(matches!(
            check_file_constraints("big.xlsx", MAX_FILE_SIZE_BYTES + 1),
            Err(ReportError::FileSize { .. })
        ));
    }

    #[test]
    fn csv_decode_skips_blank_rows_and_normalizes_dates() {
        let data = "Program type,Program name,Action,Participants,Action count,Date\n\
                    Programmed,Healthy Plate,Lecture,12,1,05.03.2024\n\
                    ,,,,,\n\
                    Programmed,Stop Vaping,Talk,4,2,45292\n";
        let (rows, report) = decode_csv(data.as_bytes(), &headers()).unwrap();
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.blank_rows, 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text("Date"), "2024-03-05");
        assert_eq!(rows[1].text("Date"), "2024-01-01");
        assert_eq!(rows[0].text("Participants"), "12");
    }

    #[test]
    fn workbook_decode_normalizes_cells() {
        let mut wb = Workbook::new();
        let ws = wb.add_worksheet();
        let cols = [
            "Program type",
            "Program name",
            "Action",
            "Participants",
            "Action count",
            "Date",
            "Flag",
        ];
        for (i, c) in cols.iter().enumerate() {
            ws.write_string(0, i as u16, *c).unwrap();
        }
        ws.write_string(1, 0, "Programmed").unwrap();
        ws.write_string(1, 1, "Active Kids").unwrap();
        ws.write_string(1, 2, "Game").unwrap();
        ws.write_number(1, 3, 20).unwrap();
        ws.write_number(1, 4, 2).unwrap();
        let date = ExcelDateTime::from_ymd(2024, 4, 9).unwrap();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        ws.write_datetime_with_format(1, 5, &date, &date_format).unwrap();
        ws.write_boolean(1, 6, true).unwrap();
        // Row 3 left blank, row 4 uses a raw serial in the date column.
        ws.write_string(3, 0, "Programmed").unwrap();
        ws.write_number(3, 5, 45292).unwrap();
        let bytes = wb.save_to_buffer().unwrap();

        let (rows, report) = decode_workbook(&bytes, &headers()).unwrap();
        assert_eq!(report.blank_rows, 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Participants"), Some(&CellValue::Number(20.0)));
        assert_eq!(rows[0].text("Date"), "2024-04-09");
        assert_eq!(rows[0].text("Flag"), "TRUE");
        assert_eq!(rows[1].text("Date"), "2024-01-01");
        assert_eq!(report.columns, cols);
    }

    #[test]
    fn error_cells_become_text() {
        let v = cell_to_value(&Data::Error(CellErrorType::Div0));
        assert_eq!(v, Some(CellValue::Text("#DIV/0!".into())));
        let v = cell_to_value(&Data::Error(CellErrorType::NA));
        assert_eq!(v, Some(CellValue::Text("#N/A".into())));
    }

    /// A structurally valid xlsx package whose workbook lists no sheets.
    fn workbook_without_sheets() -> Vec<u8> {
        let mut zip_data = Vec::new();
        {
            let mut writer = ZipWriter::new(Cursor::new(&mut zip_data));
            let options = SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);

            writer.start_file("[Content_Types].xml", options).unwrap();
            writer.write_all(br#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
    <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
    <Default Extension="xml" ContentType="application/xml"/>
    <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
</Types>"#).unwrap();

            writer.start_file("_rels/.rels", options).unwrap();
            writer.write_all(br#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
    <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#).unwrap();

            writer.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
            writer.write_all(br#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"/>"#).unwrap();

            writer.start_file("xl/workbook.xml", options).unwrap();
            writer.write_all(br#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
    <sheets/>
</workbook>"#).unwrap();

            writer.finish().unwrap();
        }
        zip_data
    }

    #[test]
    fn workbook_without_worksheets_is_corrupted() {
        let err = decode_workbook(&workbook_without_sheets(), &headers()).unwrap_err();
        assert!(matches!(err, ReportError::FileCorrupted(_)));
    }

    #[test]
    fn byte_decode_enforces_file_constraints() {
        let data = b"Program type,Date\nProgrammed,2024-01-01\n";
        assert!(matches!(
            decode(data, "notes.txt", &headers()),
            Err(ReportError::FileType { .. })
        ));
        let oversized = vec![b' '; MAX_FILE_SIZE_BYTES as usize + 1];
        assert!(matches!(
            decode(&oversized, "big.csv", &headers()),
            Err(ReportError::FileSize { .. })
        ));
        let (rows, report) = decode(data, "in.csv", &headers()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(report.columns, vec!["Program type", "Date"]);
    }

    #[test]
    fn garbage_bytes_are_a_corrupted_file() {
        let err = decode_workbook(b"definitely not a workbook", &headers()).unwrap_err();
        assert!(matches!(err, ReportError::FileCorrupted(_)));
    }

    #[test]
    fn load_path_checks_constraints_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();
        assert!(matches!(load_path(&path, &headers()), Err(ReportError::FileType { .. })));

        let csv_path = dir.path().join("in.csv");
        std::fs::write(&csv_path, "Program type,Date\nProgrammed,2024-01-01\n").unwrap();
        let (rows, _) = load_path(&csv_path, &headers()).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
