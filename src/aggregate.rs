use crate::config::ColumnHeaders;
use crate::error::{ReportError, Result};
use crate::monthly::monthly_breakdown;
use crate::sanitize::{is_excluded_visit, sanitize, site_visit_warning, Sanitized};
use crate::types::{ActivityRow, AggregateTree, AggregatedResult, MonthSelection, RawRow};
use crate::util::{add_count, month_of};
use tracing::{debug, info};

/// Fold rows into the `type -> program -> action` tree for the selected months.
///
/// Keys match exactly; no normalization happens at this layer. Rows outside
/// the selection are skipped without a warning. Non-program site visits that
/// reach this point are skipped and reported.
pub fn aggregate(rows: &[ActivityRow], months: &MonthSelection) -> Result<AggregatedResult> {
    if months.is_empty() {
        return Err(ReportError::NoMonthSelected);
    }

    let mut tree = AggregateTree::new();
    let (mut all_people, mut all_actions) = (0u64, 0u64);
    let mut excluded = Vec::new();
    let mut included: Vec<&ActivityRow> = Vec::with_capacity(rows.len());

    for r in rows {
        if is_excluded_visit(&r.program_type, &r.action) {
            excluded.push(r.source_row);
            continue;
        }
        if !months.contains(month_of(&r.date)) {
            continue;
        }
        all_people = add_count(all_people, r.people)?;
        all_actions = add_count(all_actions, r.actions)?;
        tree.add(&r.program_type, &r.program_name, &r.action, r.people, r.actions)?;
        included.push(r);
    }

    let monthly = monthly_breakdown(included, Some(months))?;
    let warnings = site_visit_warning(&excluded).into_iter().collect();
    debug!(types = tree.types().len(), "aggregated program tree");
    info!(all_people, all_actions, "aggregation finished");

    Ok(AggregatedResult {
        tree,
        all_people,
        all_actions,
        warnings,
        monthly,
    })
}

/// Aggregate already sanitized rows, carrying the sanitizer's exclusion
/// warnings into the result.
pub fn aggregate_sanitized(clean: &Sanitized, months: &MonthSelection) -> Result<AggregatedResult> {
    let mut result = aggregate(&clean.rows, months)?;
    result.warnings.extend(clean.warnings.messages.iter().cloned());
    Ok(result)
}

/// Sanitize decoded rows, aggregate the survivors and attach the exclusion warnings.
pub fn aggregate_sheet(
    rows: &[RawRow],
    months: &MonthSelection,
    headers: &ColumnHeaders,
) -> Result<AggregatedResult> {
    if months.is_empty() {
        return Err(ReportError::NoMonthSelected);
    }
    aggregate_sanitized(&sanitize(rows, headers), months)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn r(t: &str, p: &str, a: &str, people: u64, actions: u64, date: &str) -> ActivityRow {
        ActivityRow {
            program_type: t.into(),
            program_name: p.into(),
            action: a.into(),
            people,
            actions,
            date: date.into(),
            source_row: 2,
        }
    }

    #[test]
    fn empty_selection_fails() {
        let err = aggregate(&[], &MonthSelection::default()).unwrap_err();
        assert!(matches!(err, ReportError::NoMonthSelected));
    }

    #[test]
    fn duplicate_keys_accumulate_across_months() {
        let rows = vec![
            r("Programmed", "Healthy Plate", "Lecture", 10, 1, "2024-01-10"),
            r("Programmed", "Healthy Plate", "Lecture", 7, 3, "2024-02-10"),
        ];
        let out = aggregate(&rows, &MonthSelection::new([1, 2])).unwrap();
        let leaf = out.tree.get("Programmed", "Healthy Plate", "Lecture").unwrap();
        assert_eq!((leaf.people, leaf.action_number), (17, 4));
        assert_eq!(out.monthly.len(), 2);
    }

    #[test]
    fn months_outside_selection_are_skipped_silently() {
        let rows = vec![
            r("Programmed", "A", "Lecture", 10, 1, "2024-01-10"),
            r("Programmed", "A", "Lecture", 7, 3, "2024-05-10"),
            r("Programmed", "A", "Lecture", 4, 1, "not a date"),
        ];
        let out = aggregate(&rows, &MonthSelection::new([1])).unwrap();
        assert_eq!(out.all_people, 10);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn keys_are_exact() {
        let rows = vec![
            r("Programmed", "Healthy Plate", "Lecture", 1, 1, "2024-01-10"),
            r("Programmed", "Healthy  Plate", "Lecture", 1, 1, "2024-01-10"),
        ];
        let out = aggregate(&rows, &MonthSelection::all()).unwrap();
        assert_eq!(out.tree.types()["Programmed"].len(), 2);
    }

    #[test]
    fn site_visits_in_input_are_excluded_and_warned() {
        let mut visit = r("NONPROGRAM", "B", "site-visit", 10, 1, "2024-01-10");
        visit.source_row = 3;
        let rows = vec![
            r("PROGRAM", "A", "Lecture", 30, 1, "2024-01-10"),
            visit,
            r("NONPROGRAM", "C", "consult", 5, 1, "2024-01-10"),
        ];
        let out = aggregate(&rows, &MonthSelection::all()).unwrap();
        assert_eq!(out.all_people, 35);
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("row(s) 3 "));
    }

    #[test]
    fn sheet_entry_point_merges_sanitizer_warnings() {
        let h = ColumnHeaders::default();
        let mk = |t: &str, a: &str, people: f64| {
            RawRow::new()
                .with("Program type", t)
                .with("Program name", "X")
                .with("Action", a)
                .with("Participants", people)
                .with("Action count", 1.0)
                .with("Date", "2024-04-01")
        };
        let rows = vec![mk("Programmed", "Lecture", 4.0), mk("Non-program", "site-visit", 9.0)];
        let out = aggregate_sheet(&rows, &MonthSelection::all(), &h).unwrap();
        assert_eq!(out.all_people, 4);
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("row(s) 3"));
    }

    #[test]
    fn oversized_counts_fail_instead_of_wrapping() {
        let h = ColumnHeaders::default();
        let mk = |people: f64| {
            RawRow::new()
                .with("Program type", "Programmed")
                .with("Program name", "Healthy Plate")
                .with("Action", "Lecture")
                .with("Participants", people)
                .with("Action count", 1.0)
                .with("Date", "2024-04-01")
        };
        let rows = vec![mk(1e19), mk(1e19)];
        assert!(crate::validate::validate_rows(&rows, &h).ok);
        let err = aggregate_sheet(&rows, &MonthSelection::all(), &h).unwrap_err();
        assert!(matches!(err, ReportError::Processing(ref m) if m.contains("overflow")));
    }

    fn arb_row() -> impl Strategy<Value = ActivityRow> {
        (
            prop::sample::select(vec!["Programmed", "Non-program"]),
            prop::sample::select(vec!["A", "B", "C"]),
            prop::sample::select(vec!["Lecture", "site-visit", "Workshop"]),
            0u64..500,
            0u64..20,
            1u32..=12,
        )
            .prop_map(|(t, p, a, people, actions, m)| {
                r(t, p, a, people, actions, &format!("2024-{:02}-15", m))
            })
    }

    proptest! {
        #[test]
        fn running_totals_match_traversal(rows in prop::collection::vec(arb_row(), 0..60)) {
            let out = aggregate(&rows, &MonthSelection::all()).unwrap();
            prop_assert_eq!(out.tree.totals().unwrap(), (out.all_people, out.all_actions));
            let expected: u64 = rows
                .iter()
                .filter(|r| !is_excluded_visit(&r.program_type, &r.action))
                .map(|r| r.people)
                .sum();
            prop_assert_eq!(out.all_people, expected);
            let monthly_people: u64 = out.monthly.iter().map(|m| m.people).sum();
            prop_assert_eq!(monthly_people, out.all_people);
        }
    }
}
