use flc_common::canon_code;
use rustc_hash::FxHashMap;

use crate::schema::Catalogs;

/// Identity of a row for duplicate counting: code plus all three
/// specifics.
pub type RowKey = (String, Option<String>, Option<String>, Option<String>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub code: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Row {
    pub code: String,
    specs: [Option<String>; 3],
    columns: FxHashMap<String, Column>,
    blank: bool,
}

impl Row {
    pub fn new(
        code: String,
        s1: Option<String>,
        s2: Option<String>,
        s3: Option<String>,
    ) -> Self {
        Row {
            code,
            specs: [s1, s2, s3],
            columns: FxHashMap::default(),
            blank: true,
        }
    }

    /// The value of one classifier axis, 1-based.
    pub fn spec(&self, axis: u8) -> Option<&str> {
        self.specs
            .get(axis.checked_sub(1)? as usize)?
            .as_deref()
    }

    pub fn key(&self) -> RowKey {
        (
            self.code.clone(),
            self.specs[0].clone(),
            self.specs[1].clone(),
            self.specs[2].clone(),
        )
    }

    pub fn add_column(&mut self, code: String, value: Option<String>) {
        self.blank = false;
        self.columns.insert(code.clone(), Column { code, value });
    }

    pub fn column(&self, code: &str) -> Option<&Column> {
        self.columns.get(code)
    }

    /// Cell text for a column; `None` covers both a missing column and an
    /// empty one.
    pub fn value(&self, code: &str) -> Option<&str> {
        self.columns
            .get(code)
            .and_then(|col| col.value.as_deref())
            .filter(|value| !value.is_empty())
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    /// True until the first column is attached, however empty.
    pub fn blank(&self) -> bool {
        self.blank
    }
}

#[derive(Debug, Clone, Default)]
pub struct Section {
    pub code: String,
    rows: Vec<Row>,
}

impl Section {
    pub fn new(code: String) -> Self {
        Section {
            code,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// All rows carrying the given code, in insertion order. Row codes are
    /// multi-valued: the same code may repeat with different specifics.
    pub fn rows_by_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Row> {
        self.rows.iter().filter(move |row| row.code == code)
    }

    /// Distinct row codes, numerically ordered.
    pub fn row_codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.rows.iter().map(|row| row.code.as_str()).collect();
        codes.sort_by_key(|code| code.parse::<i64>().map_err(|_| code.to_string()));
        codes.dedup();
        codes
    }
}

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub title: Vec<(String, String)>,
    sections: Vec<Section>,
    pub year: String,
    period_raw: String,
    period_type: Option<String>,
    period_code: Option<String>,
    pub row_counters: FxHashMap<RowKey, usize>,
    pub blank: bool,
}

impl Report {
    /// A report shell with its attributes decomposed. The four-character
    /// period splits into type and code; anything else is kept raw until
    /// `set_periods` repairs it.
    pub fn new(year: String, period: String) -> Self {
        let period = period.trim().to_string();
        let (period_type, period_code) = if period.len() == 4 {
            (
                Some(canon_code(&period[..2])),
                Some(canon_code(&period[2..])),
            )
        } else {
            (None, None)
        };
        Report {
            title: Vec::new(),
            sections: Vec::new(),
            year,
            period_raw: period,
            period_type,
            period_code,
            row_counters: FxHashMap::default(),
            blank: true,
        }
    }

    pub fn period_type(&self) -> Option<&str> {
        self.period_type.as_deref()
    }

    pub fn period_code(&self) -> Option<&str> {
        self.period_code.as_deref()
    }

    pub fn add_section(&mut self, section: Section) {
        for row in section.rows() {
            *self.row_counters.entry(row.key()).or_insert(0) += 1;
        }
        self.sections.push(section);
    }

    pub fn mark_filled(&mut self) {
        self.blank = false;
    }

    pub fn section(&self, code: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.code == code)
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    /// Repair the period pair from a raw period value, using the period
    /// catalog (`s_time`, falling back to `s_mes`) as the admissible set.
    ///
    /// With `M` the largest admissible code: a raw code already on the
    /// template scale (`M <= idp`) is taken as is; otherwise the codes are
    /// assumed to be multiples of a common step `d` (e.g. month numbers
    /// reported on a quarterly template) and the raw code is divided down.
    pub fn set_periods(&mut self, catalogs: &Catalogs, idp: &str) -> bool {
        let Some(catalog) = catalogs.get("s_time").or_else(|| catalogs.get("s_mes")) else {
            return false;
        };
        let admissible: Vec<i64> = catalog
            .ids
            .iter()
            .filter_map(|id| canon_code(id).parse().ok())
            .collect();
        let Ok(raw) = canon_code(&self.period_raw).parse::<i64>() else {
            return false;
        };
        let Ok(idp_num) = idp.parse::<i64>() else {
            return false;
        };
        if !admissible.contains(&raw) {
            return false;
        }
        let Some(&max) = admissible.iter().max() else {
            return false;
        };

        if max <= idp_num {
            self.period_type = Some(idp.to_string());
            self.period_code = Some(raw.to_string());
            return true;
        }

        let step = admissible.iter().copied().fold(max, gcd);
        if step > 0 && max <= idp_num * step {
            self.period_type = Some(idp.to_string());
            self.period_code = Some((raw / step).to_string());
            return true;
        }
        false
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
