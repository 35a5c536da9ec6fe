use crate::types::{
    AggregatedResult, Category, CategoryTotal, CategoryTotalRow, IndicatorAggregatedResult,
    MonthlyEntry,
};
use crate::util::format_int;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

use crate::error::{ReportError, Result};

pub fn write_csv<T: Serialize>(path: impl AsRef<Path>, rows: &[T]) -> Result<()> {
    let processing = |e: csv::Error| ReportError::Processing(e.to_string());
    let mut wtr = csv::Writer::from_path(path).map_err(processing)?;
    for r in rows {
        wtr.serialize(r).map_err(processing)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Everything a host needs to render or archive one run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub all_people: u64,
    pub all_actions: u64,
    pub monthly: Vec<MonthlyEntry>,
    pub warnings: Vec<String>,
    pub indicator_people: u64,
    pub indicator_actions: u64,
    pub category_totals: BTreeMap<Category, CategoryTotal>,
    pub monthly_by_category: BTreeMap<Category, Vec<MonthlyEntry>>,
    pub group_definitions: BTreeMap<String, Vec<String>>,
}

pub fn build_summary(
    core: &AggregatedResult,
    indicator: &IndicatorAggregatedResult,
) -> ReportSummary {
    ReportSummary {
        all_people: core.all_people,
        all_actions: core.all_actions,
        monthly: core.monthly.clone(),
        warnings: core.warnings.clone(),
        indicator_people: indicator.total_people,
        indicator_actions: indicator.total_actions,
        category_totals: indicator.category_totals.clone(),
        monthly_by_category: indicator.monthly_by_category.clone(),
        group_definitions: indicator.group_definitions.clone(),
    }
}

pub fn category_rows(indicator: &IndicatorAggregatedResult) -> Vec<CategoryTotalRow> {
    indicator
        .category_totals
        .iter()
        .map(|(c, t)| CategoryTotalRow {
            category: c.label().to_string(),
            people: format_int(t.people),
            actions: format_int(t.actions),
        })
        .collect()
}

/// Render the first `max_rows` rows as a markdown table.
pub fn render_table_rows<T>(rows: &[T], max_rows: usize) -> String
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        return "(no rows)".to_string();
    }
    Table::new(slice).with(Style::markdown()).to_string()
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("{}\n", render_table_rows(rows, max_rows));
}
