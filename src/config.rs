// Static configuration: header labels, file limits, the category taxonomy,
// indicator definitions and template layouts.
//
// The built-in `Taxonomy` is constructed once and shared read-only; a JSON
// file with the same shape can replace it at start-up.
use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::category::normalize_program_name;
use crate::error::Result;
use crate::types::{Category, Field};

/// Accepted input extensions (lower-case, without the dot).
pub const ACCEPTED_EXTENSIONS: [&str; 6] = ["xlsx", "xlsm", "xls", "xlsb", "ods", "csv"];
/// Upper bound on input size, checked before decoding.
pub const MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Exact, case-sensitive header labels of the required columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColumnHeaders {
    pub program_type: String,
    pub program_name: String,
    pub action: String,
    pub people_count: String,
    pub action_count: String,
    pub date: String,
}

impl Default for ColumnHeaders {
    fn default() -> Self {
        Self {
            program_type: "Program type".to_string(),
            program_name: "Program name".to_string(),
            action: "Action".to_string(),
            people_count: "Participants".to_string(),
            action_count: "Action count".to_string(),
            date: "Date".to_string(),
        }
    }
}

impl ColumnHeaders {
    pub fn label(&self, field: Field) -> &str {
        match field {
            Field::ProgramType => &self.program_type,
            Field::ProgramName => &self.program_name,
            Field::Action => &self.action,
            Field::PeopleCount => &self.people_count,
            Field::ActionCount => &self.action_count,
            Field::Date => &self.date,
        }
    }
}

/// Substring rules on the program type; matching ignores case and separators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgramTypeFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// A named rule set selecting and regrouping rows for one reporting metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub programs: Option<Vec<String>>,
    /// Group name -> member program names, in declaration order.
    #[serde(default)]
    pub program_groups: Vec<ProgramGroup>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub program_type: Option<ProgramTypeFilter>,
    #[serde(default)]
    pub include_non_program: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramGroup {
    pub name: String,
    pub members: Vec<String>,
}

impl ProgramGroup {
    pub fn new(name: &str, members: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Taxonomy {
    #[serde(default)]
    pub headers: ColumnHeaders,
    /// Normalized program name -> category. Misses fall into [`Category::Other`].
    pub categories: BTreeMap<String, Category>,
    #[serde(default)]
    pub indicators: Vec<IndicatorDefinition>,
}

static BUILTIN: Lazy<Taxonomy> = Lazy::new(builtin_taxonomy);

impl Taxonomy {
    /// Shared built-in taxonomy.
    pub fn builtin() -> &'static Taxonomy {
        &BUILTIN
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let mut taxonomy: Taxonomy = serde_json::from_str(s)?;
        taxonomy.categories = taxonomy
            .categories
            .into_iter()
            .map(|(k, v)| (normalize_program_name(&k), v))
            .collect();
        Ok(taxonomy)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_json_str(&s)
    }

    pub fn indicator(&self, id: &str) -> Option<&IndicatorDefinition> {
        self.indicators.iter().find(|i| i.id == id)
    }
}

fn builtin_taxonomy() -> Taxonomy {
    let mut categories = BTreeMap::new();
    let table: [(&str, Category); 15] = [
        ("Healthy Plate", Category::Nutrition),
        ("School Fruit Programme", Category::Nutrition),
        ("Nutrition Counselling", Category::Nutrition),
        ("Active Kids", Category::PhysicalActivity),
        ("Walking Groups", Category::PhysicalActivity),
        ("Healthy Spine", Category::PhysicalActivity),
        ("Mind Matters", Category::MentalHealth),
        ("Stress Less", Category::MentalHealth),
        ("Talk - Listen - Help", Category::MentalHealth),
        ("Smoke-Free Home", Category::AddictionPrevention),
        ("Stop Vaping", Category::AddictionPrevention),
        ("Alcohol - Know Your Limits", Category::AddictionPrevention),
        ("Drug-Free Youth", Category::AddictionPrevention),
        ("Screen Time Balance", Category::AddictionPrevention),
        ("Gambling Aware", Category::AddictionPrevention),
    ];
    for (name, category) in table {
        categories.insert(normalize_program_name(name), category);
    }

    let indicators = vec![
        IndicatorDefinition {
            id: "nutrition_reach".to_string(),
            name: "Reach of nutrition programmes".to_string(),
            programs: None,
            program_groups: vec![ProgramGroup::new(
                "School Nutrition",
                &["Healthy Plate", "School Fruit Programme"],
            )],
            category: Some(Category::Nutrition),
            program_type: None,
            include_non_program: false,
        },
        IndicatorDefinition {
            id: "active_lifestyle".to_string(),
            name: "Active lifestyle participation".to_string(),
            programs: Some(vec![
                "Active Kids".to_string(),
                "Walking Groups".to_string(),
                "Healthy Spine".to_string(),
            ]),
            program_groups: vec![ProgramGroup::new(
                "Movement Programmes",
                &["Active Kids", "Walking Groups"],
            )],
            category: None,
            program_type: None,
            include_non_program: false,
        },
        IndicatorDefinition {
            id: "mental_health".to_string(),
            name: "Mental health promotion".to_string(),
            programs: None,
            program_groups: Vec::new(),
            category: Some(Category::MentalHealth),
            program_type: None,
            include_non_program: true,
        },
        IndicatorDefinition {
            id: "addiction_prevention".to_string(),
            name: "Addiction prevention".to_string(),
            programs: None,
            program_groups: vec![
                ProgramGroup::new("Tobacco and Vaping", &["Smoke-Free Home", "Stop Vaping"]),
                ProgramGroup::new(
                    "Behavioural Addictions",
                    &["Screen Time Balance", "Gambling Aware"],
                ),
            ],
            category: Some(Category::AddictionPrevention),
            program_type: None,
            include_non_program: false,
        },
        IndicatorDefinition {
            id: "non_program_outreach".to_string(),
            name: "Outreach outside programmes".to_string(),
            programs: None,
            program_groups: Vec::new(),
            category: None,
            program_type: Some(ProgramTypeFilter {
                include: vec!["non-program".to_string()],
                exclude: Vec::new(),
            }),
            include_non_program: true,
        },
    ];

    Taxonomy {
        headers: ColumnHeaders::default(),
        categories,
        indicators,
    }
}

/// Fixed cell coordinates of an external report template (zero-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateLayout {
    pub sheet_name: &'static str,
    pub title_cell: (u32, u16),
    pub period_cell: (u32, u16),
    pub first_data_row: u32,
    pub col_index: u16,
    pub col_name: u16,
    pub col_people: u16,
    pub col_actions: u16,
}

/// Program/action rollup template.
pub const PROGRAM_ROLLUP_LAYOUT: TemplateLayout = TemplateLayout {
    sheet_name: "Programmes",
    title_cell: (1, 1),
    period_cell: (2, 1),
    first_data_row: 5,
    col_index: 0,
    col_name: 1,
    col_people: 4,
    col_actions: 5,
};

/// Health-indicator rollup template; category headings precede each block.
pub const INDICATOR_ROLLUP_LAYOUT: TemplateLayout = TemplateLayout {
    sheet_name: "Indicators",
    title_cell: (0, 0),
    period_cell: (1, 0),
    first_data_row: 4,
    col_index: 0,
    col_name: 2,
    col_people: 6,
    col_actions: 7,
};
