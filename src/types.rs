use crate::error;
use crate::util::add_count;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tabled::Tabled;

/// A decoded spreadsheet cell. Blank cells are never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Textual rendering; whole numbers print without a fractional part.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.trim().is_empty())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// One data row keyed by header label, exactly as decoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub cells: BTreeMap<String, CellValue>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful when assembling rows by hand.
    pub fn with(mut self, header: &str, value: impl Into<CellValue>) -> Self {
        self.cells.insert(header.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, header: impl Into<String>, value: CellValue) {
        self.cells.insert(header.into(), value);
    }

    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.cells.get(header)
    }

    /// Trimmed text of a cell, empty when the cell is absent.
    pub fn text(&self, header: &str) -> String {
        self.get(header)
            .map(|v| v.as_text().trim().to_string())
            .unwrap_or_default()
    }
}

/// The six semantic columns every activity sheet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Field {
    ProgramType,
    ProgramName,
    Action,
    PeopleCount,
    ActionCount,
    Date,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::ProgramType,
        Field::ProgramName,
        Field::Action,
        Field::PeopleCount,
        Field::ActionCount,
        Field::Date,
    ];
}

/// A row that survived sanitation, with typed counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRow {
    pub program_type: String,
    pub program_name: String,
    pub action: String,
    pub people: u64,
    pub actions: u64,
    /// ISO `YYYY-MM-DD` when the source was parseable, otherwise the raw text.
    pub date: String,
    /// Spreadsheet row number (data index + 2, header is row 1).
    pub source_row: usize,
}

/// Fixed health-domain taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Nutrition,
    PhysicalActivity,
    MentalHealth,
    AddictionPrevention,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Nutrition,
        Category::PhysicalActivity,
        Category::MentalHealth,
        Category::AddictionPrevention,
        Category::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Nutrition => "Nutrition",
            Category::PhysicalActivity => "Physical activity",
            Category::MentalHealth => "Mental health",
            Category::AddictionPrevention => "Addiction prevention",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Set of calendar months (1-12) the caller wants included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonthSelection(BTreeSet<u32>);

impl MonthSelection {
    /// Out-of-range months are dropped.
    pub fn new(months: impl IntoIterator<Item = u32>) -> Self {
        Self(months.into_iter().filter(|m| (1..=12).contains(m)).collect())
    }

    pub fn all() -> Self {
        Self::new(1..=12)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, month: u32) -> bool {
        self.0.contains(&month)
    }

    pub fn months(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

/// Accepts comma-separated months and inclusive ranges, e.g. `1-3,7`.
impl FromStr for MonthSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = BTreeSet::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (lo, hi) = match part.split_once('-') {
                Some((a, b)) => (parse_month(a)?, parse_month(b)?),
                None => {
                    let m = parse_month(part)?;
                    (m, m)
                }
            };
            if lo > hi {
                return Err(format!("invalid month range '{}'", part));
            }
            out.extend(lo..=hi);
        }
        Ok(Self(out))
    }
}

fn parse_month(s: &str) -> Result<u32, String> {
    match s.trim().parse::<u32>() {
        Ok(m) if (1..=12).contains(&m) => Ok(m),
        _ => Err(format!("'{}' is not a month between 1 and 12", s.trim())),
    }
}

/// Atomic accumulation unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramAction {
    pub people: u64,
    pub action_number: u64,
}

type ActionMap = BTreeMap<String, ProgramAction>;
type ProgramMap = BTreeMap<String, ActionMap>;

/// `program type -> program name -> action -> ProgramAction`, sorted at every level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AggregateTree {
    types: BTreeMap<String, ProgramMap>,
}

impl AggregateTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-insert at each level, then add onto the leaf. The leaf is left
    /// untouched when either sum would overflow.
    pub fn add(
        &mut self,
        program_type: &str,
        program: &str,
        action: &str,
        people: u64,
        actions: u64,
    ) -> error::Result<()> {
        let leaf = self
            .types
            .entry(program_type.to_string())
            .or_default()
            .entry(program.to_string())
            .or_default()
            .entry(action.to_string())
            .or_default();
        let summed_people = add_count(leaf.people, people)?;
        let summed_actions = add_count(leaf.action_number, actions)?;
        leaf.people = summed_people;
        leaf.action_number = summed_actions;
        Ok(())
    }

    pub fn get(&self, program_type: &str, program: &str, action: &str) -> Option<&ProgramAction> {
        self.types.get(program_type)?.get(program)?.get(action)
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn types(&self) -> &BTreeMap<String, ProgramMap> {
        &self.types
    }

    /// Flattened `(type, program, action, leaf)` view in sorted order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &str, &ProgramAction)> + '_ {
        self.types.iter().flat_map(|(t, programs)| {
            programs.iter().flat_map(move |(p, actions)| {
                actions
                    .iter()
                    .map(move |(a, leaf)| (t.as_str(), p.as_str(), a.as_str(), leaf))
            })
        })
    }

    /// Totals by traversal, as opposed to the running sums kept by aggregators.
    pub fn totals(&self) -> error::Result<(u64, u64)> {
        self.entries().try_fold((0, 0), |(p, a), (_, _, _, leaf)| {
            Ok((add_count(p, leaf.people)?, add_count(a, leaf.action_number)?))
        })
    }
}

/// Per-month subtotal. Months without data are omitted, never zero-filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthlyEntry {
    pub month: u32,
    pub people: u64,
    pub actions: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResult {
    pub tree: AggregateTree,
    pub all_people: u64,
    pub all_actions: u64,
    pub warnings: Vec<String>,
    pub monthly: Vec<MonthlyEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub people: u64,
    pub actions: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorAggregatedResult {
    pub by_category: BTreeMap<Category, AggregateTree>,
    pub total_people: u64,
    pub total_actions: u64,
    pub category_totals: BTreeMap<Category, CategoryTotal>,
    /// Active group name -> member program names.
    pub group_definitions: BTreeMap<String, Vec<String>>,
    pub monthly: Vec<MonthlyEntry>,
    pub monthly_by_category: BTreeMap<Category, Vec<MonthlyEntry>>,
    /// Category -> display key (group or program name) -> months.
    pub monthly_by_group: BTreeMap<Category, BTreeMap<String, Vec<MonthlyEntry>>>,
    pub warnings: Vec<String>,
}

/// One line of the flat report, as shown in previews and the CSV mirror.
#[derive(Debug, Serialize, Tabled, Clone)]
pub struct FlatReportRow {
    #[serde(rename = "No")]
    #[tabled(rename = "No")]
    pub no: String,
    #[serde(rename = "Name")]
    #[tabled(rename = "Name")]
    pub name: String,
    #[serde(rename = "Participants")]
    #[tabled(rename = "Participants")]
    pub people: String,
    #[serde(rename = "Actions")]
    #[tabled(rename = "Actions")]
    pub actions: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CategoryTotalRow {
    #[serde(rename = "Category")]
    #[tabled(rename = "Category")]
    pub category: String,
    #[serde(rename = "Participants")]
    #[tabled(rename = "Participants")]
    pub people: String,
    #[serde(rename = "Actions")]
    #[tabled(rename = "Actions")]
    pub actions: String,
}
