// Aggregation and indicator engine for spreadsheet activity reports.
//
// Data flow: `loader` decodes a workbook into raw rows, `sanitize` turns
// them into activity rows plus warnings, `aggregate` and `indicator` build
// independent views over the same rows, and `export` writes them back out
// as spreadsheets.
pub mod aggregate;
pub mod category;
pub mod config;
pub mod error;
pub mod export;
pub mod indicator;
pub mod loader;
pub mod monthly;
pub mod output;
pub mod sanitize;
pub mod types;
pub mod util;
pub mod validate;

pub use aggregate::{aggregate, aggregate_sanitized, aggregate_sheet};
pub use category::{category_of, normalize_program_name};
pub use config::{ColumnHeaders, IndicatorDefinition, ProgramGroup, Taxonomy, TemplateLayout};
pub use error::{ReportError, Result};
pub use export::{
    decode_flat_report, encode_flat_report, encode_template, export_flat_report, export_template,
    TemplateBlock,
};
pub use indicator::{aggregate_by_indicator, IndicatorOptions};
pub use loader::{check_file_constraints, decode, load_path};
pub use monthly::monthly_breakdown;
pub use sanitize::{is_excluded_visit, sanitize, Sanitized, SanitizeWarnings};
pub use types::{
    ActivityRow, AggregateTree, AggregatedResult, CellValue, Category, IndicatorAggregatedResult,
    MonthSelection, MonthlyEntry, ProgramAction, RawRow,
};
pub use validate::{validate_rows, validate_sheet, Validation};
