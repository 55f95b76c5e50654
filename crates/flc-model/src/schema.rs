use rustc_hash::{FxHashMap, FxHashSet};

/// Per-cell checking rule from the template: a format mask like `N(8,2)`
/// or `C(80)`, a validation type 1..=5 with its parameter, an optional
/// catalog reference, and an optional default (used as the fallback value
/// of a specifics column).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatRule {
    pub format: Option<String>,
    pub vld_type: Option<String>,
    pub vld: Option<String>,
    pub dic: Option<String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SectionFormats {
    /// Specifics columns of the section: `(col_code, fld)` where the last
    /// character of `fld` is the axis index 1..=3. Declaration order.
    pub specs: Vec<(String, String)>,
    pub rows: FxHashMap<String, FxHashMap<String, FormatRule>>,
}

impl SectionFormats {
    pub fn insert_row(&mut self, row: String, cells: FxHashMap<String, FormatRule>) {
        self.rows.insert(row, cells);
    }
}

/// The `sec → row → col → FormatRule` table. Row entries are built on top
/// of the section's `default-cell` rules, so a lookup that hits a declared
/// row always sees the merged view.
#[derive(Debug, Clone, Default)]
pub struct Formats {
    sections: FxHashMap<String, SectionFormats>,
}

impl Formats {
    pub fn insert_section(&mut self, sec: String, formats: SectionFormats) {
        self.sections.insert(sec, formats);
    }

    pub fn rule(&self, sec: &str, row: &str, col: &str) -> Option<&FormatRule> {
        self.sections.get(sec)?.rows.get(row)?.get(col)
    }

    pub fn has_section(&self, sec: &str) -> bool {
        self.sections.contains_key(sec)
    }

    /// The specifics columns of a section, declaration order.
    pub fn specs_map(&self, sec: &str) -> Option<&[(String, String)]> {
        self.sections.get(sec).map(|s| s.specs.as_slice())
    }

    /// The axis index (1..=3) a specifics column maps to.
    pub fn spec_axis(&self, sec: &str, col: &str) -> Option<u8> {
        let (_, fld) = self
            .sections
            .get(sec)?
            .specs
            .iter()
            .find(|(code, _)| code == col)?;
        fld.chars().last()?.to_digit(10).map(|d| d as u8)
    }

    /// The checking rule governing one specifics axis of `(sec, row)`:
    /// the rule of the specifics column whose `fld` ends in the axis
    /// index.
    pub fn spec_params(&self, sec: &str, row: &str, axis: u8) -> Option<&FormatRule> {
        let section = self.sections.get(sec)?;
        let (col, _) = section
            .specs
            .iter()
            .find(|(_, fld)| fld.ends_with(char::from(b'0' + axis)))?;
        section.rows.get(row)?.get(col)
    }
}

/// A reference catalog: the ordered term ids, and the full per-term
/// attribute sets used by coordinate-linked specifics checks.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub ids: Vec<String>,
    pub full: FxHashMap<String, FxHashMap<String, FxHashSet<String>>>,
}

pub type Catalogs = FxHashMap<String, Catalog>;

/// One declarative control from the template.
#[derive(Debug, Clone)]
pub struct ControlDef {
    pub id: String,
    pub name: String,
    pub rule: String,
    pub condition: String,
    pub period_clause: String,
    /// `"1"` — mandatory, `"0"` — advisory.
    pub tip: String,
    /// Admissible absolute error of a rule comparison. `-1` disables
    /// tolerance entirely.
    pub fault: f64,
    /// Decimal digits both operands are rounded to before comparison.
    pub precision: i32,
}

impl ControlDef {
    pub fn mandatory(&self) -> bool {
        self.tip == "1"
    }
}

/// A parsed template.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// Expected period type, integer-as-string.
    pub idp: String,
    /// Title field identifying the respondent (the OKPO field).
    pub obj: String,
    /// Declared title fields, `(field_id, display_name)`.
    pub title_fields: Vec<(String, String)>,
    /// `(sec, row, col)` triples that must be filled.
    pub required: Vec<(String, String, String)>,
    /// Declared column universe per section (`type='Z'` columns).
    pub dimension: FxHashMap<String, Vec<String>>,
    pub formats: Formats,
    pub catalogs: Catalogs,
    pub controls: Vec<ControlDef>,
    /// Silently skip previous-period controls instead of warning.
    pub skip_warns: bool,
}

impl Schema {
    pub fn title_name(&self, field: &str) -> Option<&str> {
        self.title_fields
            .iter()
            .find(|(id, _)| id == field)
            .map(|(_, name)| name.as_str())
    }

    pub fn has_title_field(&self, field: &str) -> bool {
        self.title_fields.iter().any(|(id, _)| id == field)
    }
}
