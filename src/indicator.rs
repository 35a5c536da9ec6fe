// Indicator regrouping: re-projects activity rows onto the health-category
// taxonomy, optionally merging several programs into one display group.
//
// Unlike `aggregate`, an empty or absent month selection
// is not an error here; it means "all months".

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use crate::category::normalize_program_name;
use crate::config::{IndicatorDefinition, ProgramGroup, Taxonomy};
use crate::error::{ReportError, Result};
use crate::monthly::{monthly_breakdown, monthly_by_key};
use crate::sanitize::{is_excluded_visit, is_non_program, loosely_contains, site_visit_warning};
use crate::types::{
    ActivityRow, AggregateTree, Category, CategoryTotal, IndicatorAggregatedResult, MonthSelection,
};
use crate::util::{add_count, month_of};

/// Which groupings are active and which indicator filters apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorOptions {
    pub indicator_id: Option<String>,
    /// Merge every indicator's groups into one lookup, in declaration order.
    pub use_all_groupings: bool,
}

impl IndicatorOptions {
    pub fn indicator(id: impl Into<String>) -> Self {
        Self {
            indicator_id: Some(id.into()),
            use_all_groupings: false,
        }
    }

    pub fn all_groupings() -> Self {
        Self {
            indicator_id: None,
            use_all_groupings: true,
        }
    }
}

/// Ordered group definitions plus the member -> group lookup built from them.
#[derive(Debug, Default)]
struct Groupings {
    groups: Vec<ProgramGroup>,
    member_to_group: HashMap<String, String>,
}

impl Groupings {
    /// Later definitions replace earlier ones that share a group name.
    fn merge(sources: &[&[ProgramGroup]]) -> Self {
        let mut groups: Vec<ProgramGroup> = Vec::new();
        for list in sources {
            for g in list.iter() {
                match groups.iter_mut().find(|existing| existing.name == g.name) {
                    Some(existing) => *existing = g.clone(),
                    None => groups.push(g.clone()),
                }
            }
        }
        let mut member_to_group = HashMap::new();
        for g in &groups {
            for m in &g.members {
                member_to_group.insert(m.clone(), g.name.clone());
            }
        }
        Self {
            groups,
            member_to_group,
        }
    }

    /// Group name when the exact program name is a member, else the name itself.
    fn display_name<'a>(&'a self, program_name: &'a str) -> &'a str {
        self.member_to_group
            .get(program_name)
            .map(String::as_str)
            .unwrap_or(program_name)
    }

    fn definitions(&self) -> BTreeMap<String, Vec<String>> {
        self.groups
            .iter()
            .map(|g| (g.name.clone(), g.members.clone()))
            .collect()
    }
}

impl IndicatorDefinition {
    /// Row-level filters of this indicator: non-program policy, category,
    /// explicit programme list (group members count as listed) and
    /// program-type include/exclude substrings.
    pub fn admits(&self, row: &ActivityRow, category: Category) -> bool {
        if !self.include_non_program && is_non_program(&row.program_type) {
            return false;
        }
        if let Some(wanted) = self.category {
            if wanted != category {
                return false;
            }
        }
        if let Some(programs) = &self.programs {
            let name = normalize_program_name(&row.program_name);
            let listed = programs
                .iter()
                .chain(self.program_groups.iter().flat_map(|g| g.members.iter()))
                .any(|p| normalize_program_name(p) == name);
            if !listed {
                return false;
            }
        }
        if let Some(filter) = &self.program_type {
            if !filter.include.is_empty()
                && !filter.include.iter().any(|s| loosely_contains(&row.program_type, s))
            {
                return false;
            }
            if filter.exclude.iter().any(|s| loosely_contains(&row.program_type, s)) {
                return false;
            }
        }
        true
    }
}

fn in_months(row: &ActivityRow, months: Option<&MonthSelection>) -> bool {
    match months {
        Some(sel) if !sel.is_empty() => sel.contains(month_of(&row.date)),
        _ => true,
    }
}

/// Aggregate rows by `category -> type -> display name -> action`.
///
/// Site-visit exclusion is re-applied with the same predicate the sanitizer
/// uses, so any row slice can be passed in.
pub fn aggregate_by_indicator(
    rows: &[ActivityRow],
    months: Option<&MonthSelection>,
    options: &IndicatorOptions,
    taxonomy: &Taxonomy,
) -> Result<IndicatorAggregatedResult> {
    let indicator = match &options.indicator_id {
        Some(id) => Some(
            taxonomy
                .indicator(id)
                .ok_or_else(|| ReportError::Processing(format!("unknown indicator '{}'", id)))?,
        ),
        None => None,
    };

    let groupings = if options.use_all_groupings {
        let sources: Vec<&[ProgramGroup]> = taxonomy
            .indicators
            .iter()
            .map(|i| i.program_groups.as_slice())
            .collect();
        Groupings::merge(&sources)
    } else if let Some(ind) = indicator {
        Groupings::merge(&[ind.program_groups.as_slice()])
    } else {
        Groupings::default()
    };

    let mut by_category: BTreeMap<Category, AggregateTree> = BTreeMap::new();
    let mut category_totals: BTreeMap<Category, CategoryTotal> = BTreeMap::new();
    let (mut total_people, mut total_actions) = (0u64, 0u64);
    let mut excluded = Vec::new();
    let mut kept: Vec<(Category, String, &ActivityRow)> = Vec::new();

    for r in rows {
        if is_excluded_visit(&r.program_type, &r.action) {
            excluded.push(r.source_row);
            continue;
        }
        if !in_months(r, months) {
            continue;
        }
        let category = taxonomy.category_of(&r.program_name);
        if let Some(ind) = indicator {
            if !ind.admits(r, category) {
                continue;
            }
        }
        let display = groupings.display_name(&r.program_name).to_string();

        total_people = add_count(total_people, r.people)?;
        total_actions = add_count(total_actions, r.actions)?;
        let t = category_totals.entry(category).or_default();
        t.people = add_count(t.people, r.people)?;
        t.actions = add_count(t.actions, r.actions)?;
        by_category.entry(category).or_default().add(
            &r.program_type,
            &display,
            &r.action,
            r.people,
            r.actions,
        )?;
        kept.push((category, display, r));
    }

    let monthly = monthly_breakdown(kept.iter().map(|(_, _, r)| *r), months)?;
    let monthly_by_category = monthly_by_key(kept.iter().map(|(_, _, r)| *r), months, |r| {
        taxonomy.category_of(&r.program_name)
    })?;
    let mut monthly_by_group: BTreeMap<Category, BTreeMap<String, Vec<_>>> = BTreeMap::new();
    for category in Category::ALL {
        let in_category = kept.iter().filter(|(c, _, _)| *c == category).map(|(_, _, r)| *r);
        let per_group = monthly_by_key(in_category, months, |r| {
            groupings.display_name(&r.program_name).to_string()
        })?;
        if !per_group.is_empty() {
            monthly_by_group.insert(category, per_group);
        }
    }

    debug!(
        categories = by_category.len(),
        groups = groupings.groups.len(),
        "regrouped rows by indicator"
    );
    info!(total_people, total_actions, "indicator aggregation finished");

    Ok(IndicatorAggregatedResult {
        by_category,
        total_people,
        total_actions,
        category_totals,
        group_definitions: groupings.definitions(),
        monthly,
        monthly_by_category,
        monthly_by_group,
        warnings: site_visit_warning(&excluded).into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::config::ProgramTypeFilter;
    use crate::types::MonthlyEntry;

    fn r(t: &str, p: &str, a: &str, people: u64, date: &str) -> ActivityRow {
        ActivityRow {
            program_type: t.into(),
            program_name: p.into(),
            action: a.into(),
            people,
            actions: 1,
            date: date.into(),
            source_row: 2,
        }
    }

    fn taxonomy_with(indicators: Vec<IndicatorDefinition>) -> Taxonomy {
        let mut t = Taxonomy::builtin().clone();
        t.indicators = indicators;
        t
    }

    fn indicator(id: &str, groups: Vec<ProgramGroup>) -> IndicatorDefinition {
        IndicatorDefinition {
            id: id.to_string(),
            name: id.to_string(),
            programs: None,
            program_groups: groups,
            category: None,
            program_type: None,
            include_non_program: true,
        }
    }

    #[test]
    fn empty_or_missing_selection_means_all_months() {
        let rows = vec![
            r("Programmed", "A", "Lecture", 3, "2024-01-01"),
            r("Programmed", "A", "Lecture", 4, "2024-09-01"),
        ];
        let t = Taxonomy::builtin();
        let opts = IndicatorOptions::default();
        let none = aggregate_by_indicator(&rows, None, &opts, t).unwrap();
        let empty_sel = MonthSelection::default();
        let empty = aggregate_by_indicator(&rows, Some(&empty_sel), &opts, t).unwrap();
        assert_eq!(none.total_people, 7);
        assert_eq!(empty.total_people, 7);
        assert!(aggregate(&rows, &MonthSelection::default()).is_err());
    }

    #[test]
    fn group_members_merge_under_group_name() {
        let t = taxonomy_with(vec![indicator(
            "vacc",
            vec![ProgramGroup::new("Vaccination Combo", &["Program X", "Program Y"])],
        )]);
        let rows = vec![
            r("Programmed", "Program X", "Jab", 10, "2024-02-01"),
            r("Programmed", "Program Y", "Jab", 6, "2024-02-03"),
            r("Programmed", "Program Z", "Jab", 1, "2024-02-03"),
        ];
        let out =
            aggregate_by_indicator(&rows, None, &IndicatorOptions::indicator("vacc"), &t).unwrap();
        let tree = &out.by_category[&Category::Other];
        let leaf = tree.get("Programmed", "Vaccination Combo", "Jab").unwrap();
        assert_eq!(leaf.people, 16);
        assert_eq!(leaf.action_number, 2);
        assert!(tree.get("Programmed", "Program Z", "Jab").is_some());
        assert_eq!(out.group_definitions["Vaccination Combo"], vec!["Program X", "Program Y"]);
        assert_eq!(out.monthly_by_group[&Category::Other]["Vaccination Combo"][0].people, 16);
    }

    #[test]
    fn merged_groupings_let_later_definitions_win() {
        let t = taxonomy_with(vec![
            indicator("first", vec![ProgramGroup::new("Combo", &["A"])]),
            indicator(
                "second",
                vec![
                    ProgramGroup::new("Combo", &["B"]),
                    ProgramGroup::new("Other Combo", &["C"]),
                ],
            ),
        ]);
        let rows = vec![
            r("Programmed", "A", "Talk", 1, "2024-01-01"),
            r("Programmed", "B", "Talk", 2, "2024-01-01"),
        ];
        let out =
            aggregate_by_indicator(&rows, None, &IndicatorOptions::all_groupings(), &t).unwrap();
        assert_eq!(out.group_definitions["Combo"], vec!["B"]);
        assert_eq!(out.group_definitions.len(), 2);
        let tree = &out.by_category[&Category::Other];
        assert_eq!(tree.get("Programmed", "Combo", "Talk").unwrap().people, 2);
        assert_eq!(tree.get("Programmed", "A", "Talk").unwrap().people, 1);
    }

    #[test]
    fn totals_match_core_aggregator_over_all_months() {
        let rows = vec![
            r("PROGRAM", "Healthy Plate", "Lecture", 30, "2024-01-10"),
            r("NONPROGRAM", "Stop Vaping", "site-visit", 10, "2024-02-10"),
            r("NONPROGRAM", "Mind Matters", "consult", 5, "2024-03-10"),
        ];
        let core = aggregate(&rows, &MonthSelection::all()).unwrap();
        let ind =
            aggregate_by_indicator(&rows, None, &IndicatorOptions::default(), Taxonomy::builtin())
                .unwrap();
        assert_eq!(core.all_people, 35);
        assert_eq!(ind.total_people, core.all_people);
        assert_eq!(ind.total_actions, core.all_actions);
        assert_eq!(ind.warnings, core.warnings);
        let sum: u64 = ind.category_totals.values().map(|t| t.people).sum();
        assert_eq!(sum, ind.total_people);
        assert_eq!(ind.category_totals[&Category::Nutrition].people, 30);
        assert_eq!(ind.category_totals[&Category::MentalHealth].people, 5);
    }

    #[test]
    fn monthly_by_category_splits_each_category_by_month() {
        let rows = vec![
            r("Programmed", "Healthy Plate", "Lecture", 30, "2024-01-10"),
            r("Programmed", "Healthy Plate", "Lecture", 4, "2024-03-02"),
            r("Programmed", "Mind Matters", "Talk", 5, "2024-03-10"),
            r("Programmed", "Mind Matters", "Talk", 7, "undated"),
        ];
        let out =
            aggregate_by_indicator(&rows, None, &IndicatorOptions::default(), Taxonomy::builtin())
                .unwrap();
        assert_eq!(
            out.monthly_by_category[&Category::Nutrition],
            vec![
                MonthlyEntry { month: 1, people: 30, actions: 1 },
                MonthlyEntry { month: 3, people: 4, actions: 1 },
            ]
        );
        assert_eq!(
            out.monthly_by_category[&Category::MentalHealth],
            vec![MonthlyEntry { month: 3, people: 5, actions: 1 }]
        );
        assert!(!out.monthly_by_category.contains_key(&Category::Other));
    }

    #[test]
    fn category_lookup_normalizes_names_but_keeps_display_names() {
        let name = "Alcohol \u{2014} Know Your Limits";
        let rows = vec![r("Programmed", name, "Talk", 4, "2024-01-01")];
        let out =
            aggregate_by_indicator(&rows, None, &IndicatorOptions::default(), Taxonomy::builtin())
                .unwrap();
        let tree = &out.by_category[&Category::AddictionPrevention];
        assert!(tree.get("Programmed", name, "Talk").is_some());
    }

    #[test]
    fn indicator_filters_apply() {
        let t = Taxonomy::builtin();
        let rows = vec![
            r("Programmed", "Active Kids", "Game", 8, "2024-01-01"),
            r("Programmed", "Walking Groups", "Walk", 2, "2024-01-01"),
            r("Programmed", "Healthy Spine", "Class", 3, "2024-01-01"),
            r("Programmed", "Mind Matters", "Talk", 100, "2024-01-01"),
            r("Non-program", "Active Kids", "Game", 50, "2024-01-01"),
        ];
        let active = IndicatorOptions::indicator("active_lifestyle");
        let out = aggregate_by_indicator(&rows, None, &active, t).unwrap();
        assert_eq!(out.total_people, 13);
        let tree = &out.by_category[&Category::PhysicalActivity];
        assert_eq!(tree.get("Programmed", "Movement Programmes", "Game").unwrap().people, 8);
        assert_eq!(tree.get("Programmed", "Movement Programmes", "Walk").unwrap().people, 2);

        let outreach = IndicatorOptions::indicator("non_program_outreach");
        let out = aggregate_by_indicator(&rows, None, &outreach, t).unwrap();
        assert_eq!(out.total_people, 50);
    }

    #[test]
    fn program_type_exclude_filter() {
        let mut ind = indicator("no_pilot", vec![]);
        ind.program_type = Some(ProgramTypeFilter {
            include: vec![],
            exclude: vec!["pilot".into()],
        });
        let t = taxonomy_with(vec![ind]);
        let rows = vec![
            r("Pilot programme", "A", "Talk", 9, "2024-01-01"),
            r("Programmed", "A", "Talk", 1, "2024-01-01"),
        ];
        let out = aggregate_by_indicator(&rows, None, &IndicatorOptions::indicator("no_pilot"), &t)
            .unwrap();
        assert_eq!(out.total_people, 1);
    }

    #[test]
    fn unknown_indicator_is_an_error() {
        let opts = IndicatorOptions::indicator("nope");
        let err = aggregate_by_indicator(&[], None, &opts, Taxonomy::builtin()).unwrap_err();
        assert!(matches!(err, ReportError::Processing(_)));
    }

    #[test]
    fn overflowing_totals_are_an_error() {
        let rows = vec![
            r("Programmed", "Healthy Plate", "Lecture", u64::MAX, "2024-01-10"),
            r("Programmed", "Mind Matters", "Talk", 1, "2024-01-10"),
        ];
        let err =
            aggregate_by_indicator(&rows, None, &IndicatorOptions::default(), Taxonomy::builtin())
                .unwrap_err();
        assert!(matches!(err, ReportError::Processing(ref m) if m.contains("overflow")));
    }

    #[test]
    fn month_filter_limits_totals_and_monthly() {
        let rows = vec![
            r("Programmed", "A", "Talk", 3, "2024-01-01"),
            r("Programmed", "A", "Talk", 4, "2024-02-01"),
            r("Programmed", "A", "Talk", 5, "bad"),
        ];
        let t = Taxonomy::builtin();
        let opts = IndicatorOptions::default();
        let sel = MonthSelection::new([2]);
        let out = aggregate_by_indicator(&rows, Some(&sel), &opts, t).unwrap();
        assert_eq!(out.total_people, 4);
        assert_eq!(out.monthly.len(), 1);
        let all = aggregate_by_indicator(&rows, None, &opts, t).unwrap();
        // The undated row counts toward totals but not toward any month.
        assert_eq!(all.total_people, 12);
        assert_eq!(all.monthly.iter().map(|m| m.people).sum::<u64>(), 7);
    }
}
