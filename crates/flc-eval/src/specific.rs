use rustc_hash::FxHashSet;

use flc_model::{Catalogs, Formats, Row};

use crate::interp::EvalError;

/// The report may mark an axis as "any" explicitly.
const REPORT_WILDCARD: &str = "XX";

/// One row-classifier axis of a cell slice: either "anything goes" (the
/// axis was omitted or written as `*`) or a literal set that may still
/// contain catalog ranges like `1.1-1.5` awaiting expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct Specific {
    axis: u8,
    items: Option<FxHashSet<String>>,
    default: Option<String>,
}

impl Specific {
    /// Build from the parsed bracket group of axis `axis` (1..=3).
    pub fn from_group(axis: u8, group: Option<&[String]>) -> Self {
        let items = match group {
            None => None,
            Some(items) if items.len() == 1 && items[0] == "*" => None,
            Some(items) => Some(items.iter().cloned().collect()),
        };
        Specific {
            axis,
            items,
            default: None,
        }
    }

    /// True when the literal set still has to be resolved against a
    /// catalog.
    pub fn need_expand(&self) -> bool {
        self.items.is_some()
    }

    /// Resolve ranges and pick up the axis default, using the checking
    /// rule of the first requested row to locate the catalog.
    pub fn prepare(
        &mut self,
        section: &str,
        row: &str,
        formats: &Formats,
        catalogs: &Catalogs,
    ) -> Result<(), EvalError> {
        let rule = formats.spec_params(section, row, self.axis);
        if let Some(rule) = rule {
            self.default = rule.default.clone();
        }
        if !self.need_expand() {
            return Ok(());
        }
        let ids: &[String] = rule
            .and_then(|rule| rule.dic.as_ref())
            .and_then(|dic| catalogs.get(dic))
            .map(|catalog| catalog.ids.as_slice())
            .unwrap_or(&[]);
        self.expand(section, row, ids)
    }

    /// Replace every `a-b` member with the inclusive slice of catalog ids
    /// between `a` and `b`.
    pub fn expand(&mut self, section: &str, row: &str, ids: &[String]) -> Result<(), EvalError> {
        let Some(items) = self.items.take() else {
            return Ok(());
        };
        let mut expanded = FxHashSet::default();
        for item in items {
            match item.split_once('-') {
                Some((from, to)) => {
                    let from = from.trim();
                    let to = to.trim();
                    let start = Self::index_of(ids, from, section, row)?;
                    let end = Self::index_of(ids, to, section, row)?;
                    for id in ids.iter().take(end + 1).skip(start) {
                        expanded.insert(id.clone());
                    }
                }
                None => {
                    expanded.insert(item);
                }
            }
        }
        self.items = Some(expanded);
        Ok(())
    }

    fn index_of(ids: &[String], id: &str, section: &str, row: &str) -> Result<usize, EvalError> {
        ids.iter()
            .position(|known| known == id)
            .ok_or_else(|| EvalError::NoFormatForRow {
                section: section.to_string(),
                row: row.to_string(),
            })
    }

    /// Does a row's axis value satisfy this specific? A missing value
    /// falls back to the axis default from the template.
    pub fn matches(&self, row: &Row) -> bool {
        let Some(items) = &self.items else {
            return true;
        };
        let value = row.spec(self.axis).or(self.default.as_deref());
        match value {
            Some(REPORT_WILDCARD) => true,
            Some(value) => items.contains(value),
            None => false,
        }
    }
}

/// All three axes of one slice.
pub fn match_all(specs: &[Specific; 3], row: &Row) -> bool {
    specs.iter().all(|spec| spec.matches(row))
}
