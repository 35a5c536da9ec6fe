// Category mapping for the health-indicator views.
//
// Names are normalized before lookup because the taxonomy keys are stored
// in canonical form.
use crate::config::Taxonomy;
use crate::types::Category;

/// Canonical form of a program name: every Unicode space variant becomes an
/// ASCII space, em/en dashes become `-`, runs of spaces collapse, ends trimmed.
pub fn normalize_program_name(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| match c {
            '\u{2014}' | '\u{2013}' => '-',
            c if c.is_whitespace() => ' ',
            c => c,
        })
        .collect();
    mapped.split(' ').filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ")
}

impl Taxonomy {
    pub fn category_of(&self, program_name: &str) -> Category {
        let key = normalize_program_name(program_name);
        if key.is_empty() {
            return Category::Other;
        }
        self.categories.get(&key).copied().unwrap_or(Category::Other)
    }
}

/// Category of a program name under the built-in taxonomy.
pub fn category_of(program_name: &str) -> Category {
    Taxonomy::builtin().category_of(program_name)
}
