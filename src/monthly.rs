// Per-month subtotals at row-set, category and program/group granularity.
//
// Rows whose date cannot be parsed land in month 0 and are left out of
// every breakdown; they still count toward the aggregators' totals when no
// month filter applies.
use crate::error::Result;
use crate::types::{ActivityRow, MonthSelection, MonthlyEntry};
use crate::util::{add_count, month_of};
use std::collections::BTreeMap;

fn admits(month: u32, filter: Option<&MonthSelection>) -> bool {
    if month == 0 {
        return false;
    }
    match filter {
        Some(sel) if !sel.is_empty() => sel.contains(month),
        _ => true,
    }
}

/// Sorted by month; months without rows are omitted. An absent or empty
/// filter means every month.
pub fn monthly_breakdown<'a, I>(
    rows: I,
    filter: Option<&MonthSelection>,
) -> Result<Vec<MonthlyEntry>>
where
    I: IntoIterator<Item = &'a ActivityRow>,
{
    let mut acc: BTreeMap<u32, (u64, u64)> = BTreeMap::new();
    for r in rows {
        let month = month_of(&r.date);
        if !admits(month, filter) {
            continue;
        }
        let e = acc.entry(month).or_insert((0, 0));
        *e = (add_count(e.0, r.people)?, add_count(e.1, r.actions)?);
    }
    Ok(acc
        .into_iter()
        .map(|(month, (people, actions))| MonthlyEntry { month, people, actions })
        .collect())
}

/// Breakdown per key, e.g. per category or per display name.
pub fn monthly_by_key<'a, I, K, F>(
    rows: I,
    filter: Option<&MonthSelection>,
    key: F,
) -> Result<BTreeMap<K, Vec<MonthlyEntry>>>
where
    I: IntoIterator<Item = &'a ActivityRow>,
    K: Ord,
    F: Fn(&ActivityRow) -> K,
{
    let mut groups: BTreeMap<K, Vec<&ActivityRow>> = BTreeMap::new();
    for r in rows {
        groups.entry(key(r)).or_default().push(r);
    }
    let mut out = BTreeMap::new();
    for (k, rs) in groups {
        let entries = monthly_breakdown(rs, filter)?;
        if !entries.is_empty() {
            out.insert(k, entries);
        }
    }
    Ok(out)
}
